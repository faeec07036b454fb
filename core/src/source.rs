//! Record source seam.
//!
//! The pipeline never builds or validates the extraction query. It asks a
//! `RecordSource` for rows and only checks their shape.

use crate::{error::EtlResult, record::SourceRow};

pub trait RecordSource {
    /// Stable name, used in log lines.
    fn name(&self) -> &'static str;

    /// Fetch every row of the extraction, in source order.
    fn fetch(&self) -> EtlResult<Vec<SourceRow>>;
}

/// Rows already held in memory.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    rows: Vec<SourceRow>,
}

impl VecSource {
    pub fn new(rows: Vec<SourceRow>) -> Self {
        Self { rows }
    }
}

impl RecordSource for VecSource {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn fetch(&self) -> EtlResult<Vec<SourceRow>> {
        Ok(self.rows.clone())
    }
}
