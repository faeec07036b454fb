//! The pipeline engine: one synchronous run from source to artifacts.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Extract    RecordSource::fetch
//!   2. Aggregate  normalized records, customer and geography summaries
//!   3. Export     customer summary to the flat file
//!   4. Report     three-sheet workbook with metrics and chart
//!
//! RULES:
//!   - Each stage completes before the next begins.
//!   - No retries. The first error ends the run and is returned unchanged.
//!   - A report failure after a successful export leaves the export file
//!     in place, but the run still fails.

use crate::{
    aggregate::{aggregate, Aggregation},
    clock::{ReportClock, SystemClock},
    config::EtlConfig,
    error::EtlResult,
    export::write_export,
    report::ReportAssembler,
    source::RecordSource,
    types::Money,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// What one successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub source:         &'static str,
    pub records:        usize,
    pub customer_rows:  usize,
    pub geography_rows: usize,
    pub top_countries:  usize,
    pub chart_included: bool,
    pub total_revenue:  Money,
    pub generated_at:   DateTime<Utc>,
    pub export_path:    PathBuf,
    pub report_path:    PathBuf,
}

pub struct EtlEngine {
    config: EtlConfig,
    clock:  Box<dyn ReportClock>,
}

impl EtlEngine {
    pub fn new(config: EtlConfig, clock: Box<dyn ReportClock>) -> EtlResult<Self> {
        config.validate()?;
        Ok(Self { config, clock })
    }

    /// Engine on the wall clock. Call this unless a test needs a fixed time.
    pub fn build(config: EtlConfig) -> EtlResult<Self> {
        Self::new(config, Box::new(SystemClock))
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// Stages 1 and 2 only. Nothing is written.
    pub fn extract_and_aggregate(&self, source: &dyn RecordSource) -> EtlResult<Aggregation> {
        log::info!("Extracting rows from {} source ...", source.name());
        let rows = source.fetch()?;
        log::info!("Rows extracted: {}", rows.len());

        log::info!("Transforming ...");
        aggregate(rows, self.config.empty_input)
    }

    /// Run every stage in order.
    pub fn run(&self, source: &dyn RecordSource) -> EtlResult<RunSummary> {
        let aggregation = self.extract_and_aggregate(source)?;

        write_export(&self.config.export_path, &aggregation.customers)?;

        let generated_at = self.clock.now();
        let layout = ReportAssembler::new(&self.config).build(
            &self.config.report_path,
            &aggregation.customers,
            &aggregation.geography,
            &aggregation.records,
            generated_at,
        )?;

        let summary = RunSummary {
            source:         source.name(),
            records:        aggregation.records.len(),
            customer_rows:  aggregation.customers.len(),
            geography_rows: aggregation.geography.len(),
            top_countries:  layout.top_countries.len(),
            chart_included: layout.chart().is_some(),
            total_revenue:  layout.metrics.total_revenue,
            generated_at,
            export_path:    self.config.export_path.clone(),
            report_path:    self.config.report_path.clone(),
        };
        log::info!(
            "Run complete: {} records, {} customers, {} geography rows",
            summary.records,
            summary.customer_rows,
            summary.geography_rows
        );
        Ok(summary)
    }
}
