//! Report assembler: the three-sheet dashboard workbook.
//!
//! SHEET ORDER (fixed):
//!   1. Data       customer summary, verbatim
//!   2. Pivot      geography summary, verbatim, in aggregator order
//!   3. Dashboard  metrics panel, top-N country table, bar chart
//!
//! Assembly is split in two. `ReportAssembler::plan` lays every cell out
//! in a `ReportLayout` without touching the filesystem; `render` turns the
//! layout into a workbook. Dashboard positions come from a `RowCursor`, so
//! the chart follows the table no matter how tall the metrics panel is.

use crate::{
    aggregate::{add_money, checked_sum, round_money, CustomerSummary, GeographySummary},
    atomic::AtomicFile,
    config::{ChartConfig, EtlConfig},
    error::{EtlError, EtlResult},
    record::TransactionRecord,
    types::{Money, CUSTOMER_COLUMNS, GEOGRAPHY_COLUMNS},
};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Chart, ChartType, ExcelDateTime, Format, Workbook, Worksheet, XlsxError};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

pub const DATA_SHEET: &str = "Data";
pub const PIVOT_SHEET: &str = "Pivot";
pub const DASHBOARD_SHEET: &str = "Dashboard";

pub const METRIC_NAMES: [&str; 4] = [
    "generation_timestamp",
    "distinct_customer_count",
    "total_revenue",
    "average_customer_avg_payment",
];

// ── Cells and sheets ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Header(String),
    Text(String),
    Integer(i64),
    Money(Money),
    Date(NaiveDate),
    Blank,
}

impl Cell {
    fn text_or_blank(value: &Option<String>) -> Self {
        match value {
            Some(v) => Cell::Text(v.clone()),
            None => Cell::Blank,
        }
    }
}

/// Zero-based position of the next row to write.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowCursor {
    next: u32,
}

impl RowCursor {
    /// Claim the current row and advance.
    pub fn take(&mut self) -> u32 {
        let row = self.next;
        self.next += 1;
        row
    }

    pub fn skip(&mut self, rows: u32) {
        self.next += rows;
    }

    pub fn position(&self) -> u32 {
        self.next
    }
}

#[derive(Debug, Clone)]
pub struct SheetLayout {
    pub name:  &'static str,
    pub cells: BTreeMap<(u32, u16), Cell>,
    pub chart: Option<ChartSpec>,
}

impl SheetLayout {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            cells: BTreeMap::new(),
            chart: None,
        }
    }

    fn put_row(&mut self, row: u32, cells: Vec<Cell>) {
        for (col, cell) in cells.into_iter().enumerate() {
            self.cells.insert((row, col as u16), cell);
        }
    }

    fn put_header(&mut self, row: u32, names: &[&str]) {
        self.put_row(row, names.iter().map(|n| Cell::Header((*n).into())).collect());
    }

    pub fn cell(&self, row: u32, col: u16) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Last row holding any cell.
    pub fn last_row(&self) -> Option<u32> {
        self.cells.keys().map(|(row, _)| *row).max()
    }
}

// ── Chart ────────────────────────────────────────────────────────────────────

/// A single-column block of rows. Never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_row: u32,
    pub last_row:  u32,
    pub col:       u16,
}

impl CellRange {
    /// `None` for a zero-row range.
    pub fn rows(first_row: u32, len: usize, col: u16) -> Option<Self> {
        (len > 0).then(|| CellRange {
            first_row,
            last_row: first_row + len as u32 - 1,
            col,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub categories: CellRange,
    pub values:     CellRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub title:     String,
    pub x_axis:    String,
    pub y_axis:    String,
    pub series:    Vec<ChartSeries>,
    pub anchor:    (u32, u16),
    pub width_px:  u32,
    pub height_px: u32,
}

// ── Metrics ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ReportMetrics {
    pub generated_at:                 DateTime<Utc>,
    pub distinct_customer_count:      usize,
    pub total_revenue:                Money,
    /// `None` when the customer summary is empty.
    pub average_customer_avg_payment: Option<Money>,
}

impl ReportMetrics {
    pub fn compute(
        customers: &[CustomerSummary],
        records: &[TransactionRecord],
        generated_at: DateTime<Utc>,
    ) -> EtlResult<Self> {
        let distinct: HashSet<_> = customers.iter().map(|c| c.customer_id).collect();
        let total = checked_sum(records.iter().map(|r| r.amount))?;
        let average = if customers.is_empty() {
            None
        } else {
            let sum = checked_sum(customers.iter().map(|c| c.avg_payment))?;
            Some(round_money(sum / Decimal::from(customers.len())))
        };
        Ok(Self {
            generated_at,
            distinct_customer_count: distinct.len(),
            total_revenue: round_money(total),
            average_customer_avg_payment: average,
        })
    }

    /// Value cells in `METRIC_NAMES` order.
    fn cells(&self) -> [Cell; 4] {
        [
            Cell::Text(self.generated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::Integer(self.distinct_customer_count as i64),
            Cell::Money(self.total_revenue),
            self.average_customer_avg_payment
                .map(Cell::Money)
                .unwrap_or(Cell::Blank),
        ]
    }
}

// ── Top-N ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct TopCountry {
    pub country:       String,
    pub total_revenue: Money,
}

/// Re-group the geography summary by country alone, highest revenue first,
/// at most `n` entries. Rows without a country are left out: a chart
/// category needs a name. Ties keep country-name order.
pub fn top_countries(geography: &[GeographySummary], n: usize) -> EtlResult<Vec<TopCountry>> {
    let mut by_country: BTreeMap<&str, Money> = BTreeMap::new();
    for row in geography {
        if let Some(country) = row.country.as_deref() {
            let total = by_country.entry(country).or_default();
            *total = add_money(*total, row.total_revenue)?;
        }
    }
    let mut ranked: Vec<TopCountry> = by_country
        .into_iter()
        .map(|(country, total_revenue)| TopCountry {
            country: country.to_string(),
            total_revenue,
        })
        .collect();
    ranked.sort_by(|a, b| b.total_revenue.cmp(&a.total_revenue));
    ranked.truncate(n);
    Ok(ranked)
}

// ── Layout ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReportLayout {
    pub sheets:        Vec<SheetLayout>,
    pub metrics:       ReportMetrics,
    pub top_countries: Vec<TopCountry>,
}

impl ReportLayout {
    pub fn sheet(&self, name: &str) -> Option<&SheetLayout> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn chart(&self) -> Option<&ChartSpec> {
        self.sheets.iter().find_map(|s| s.chart.as_ref())
    }
}

pub struct ReportAssembler {
    top_n:       usize,
    chart_title: String,
    chart:       ChartConfig,
}

impl ReportAssembler {
    pub fn new(config: &EtlConfig) -> Self {
        Self {
            top_n:       config.top_n,
            chart_title: config.chart.title_for(config.top_n),
            chart:       config.chart.clone(),
        }
    }

    pub fn plan(
        &self,
        customers: &[CustomerSummary],
        geography: &[GeographySummary],
        records: &[TransactionRecord],
        generated_at: DateTime<Utc>,
    ) -> EtlResult<ReportLayout> {
        let metrics = ReportMetrics::compute(customers, records, generated_at)?;
        let top = top_countries(geography, self.top_n)?;

        let sheets = vec![
            data_sheet(customers),
            pivot_sheet(geography),
            self.dashboard_sheet(&metrics, &top),
        ];
        Ok(ReportLayout {
            sheets,
            metrics,
            top_countries: top,
        })
    }

    fn dashboard_sheet(&self, metrics: &ReportMetrics, top: &[TopCountry]) -> SheetLayout {
        let mut sheet = SheetLayout::new(DASHBOARD_SHEET);
        let mut cursor = RowCursor::default();

        sheet.put_header(cursor.take(), &["metric", "value"]);
        for (name, value) in METRIC_NAMES.iter().zip(metrics.cells()) {
            sheet.put_row(cursor.take(), vec![Cell::Text((*name).into()), value]);
        }

        // One blank separator row between the panel and the ranking.
        cursor.skip(1);
        let header_row = cursor.take();
        let first_data_row = cursor.position();
        let (Some(categories), Some(values)) = (
            CellRange::rows(first_data_row, top.len(), 0),
            CellRange::rows(first_data_row, top.len(), 1),
        ) else {
            log::debug!("No countries to rank; dashboard has no chart");
            return sheet;
        };

        sheet.put_header(header_row, &["country", "total_revenue"]);
        for entry in top {
            sheet.put_row(
                cursor.take(),
                vec![Cell::Text(entry.country.clone()), Cell::Money(entry.total_revenue)],
            );
        }

        cursor.skip(1);
        let anchor = (cursor.position(), 0);
        log::debug!(
            "Top-{} block at rows {}..={}, chart anchored at row {}",
            top.len(),
            header_row,
            values.last_row,
            anchor.0
        );
        sheet.chart = Some(ChartSpec {
            title:     self.chart_title.clone(),
            x_axis:    self.chart.x_axis.clone(),
            y_axis:    self.chart.y_axis.clone(),
            series:    vec![ChartSeries { categories, values }],
            anchor,
            width_px:  self.chart.width_px,
            height_px: self.chart.height_px,
        });
        sheet
    }

    /// Plan, render, and atomically replace the workbook at `path`.
    pub fn build(
        &self,
        path: &Path,
        customers: &[CustomerSummary],
        geography: &[GeographySummary],
        records: &[TransactionRecord],
        generated_at: DateTime<Utc>,
    ) -> EtlResult<ReportLayout> {
        log::info!("Generating report at {} ...", path.display());
        let layout = self.plan(customers, geography, records, generated_at)?;
        let bytes = render(&layout)
            .and_then(|mut workbook| workbook.save_to_buffer())
            .map_err(|e| EtlError::write(path, e))?;
        AtomicFile::replace(path, &bytes)?;
        log::info!(
            "Report written: {} sheets, chart {}",
            layout.sheets.len(),
            if layout.chart().is_some() { "included" } else { "omitted" }
        );
        Ok(layout)
    }
}

fn data_sheet(customers: &[CustomerSummary]) -> SheetLayout {
    let mut sheet = SheetLayout::new(DATA_SHEET);
    let mut cursor = RowCursor::default();
    sheet.put_header(cursor.take(), &CUSTOMER_COLUMNS);
    for c in customers {
        sheet.put_row(
            cursor.take(),
            vec![
                Cell::Integer(c.customer_id),
                Cell::Text(c.customer_name.clone()),
                Cell::text_or_blank(&c.city),
                Cell::text_or_blank(&c.country),
                Cell::Money(c.total_paid),
                Cell::Integer(c.rentals_count as i64),
                Cell::Money(c.avg_payment),
                Cell::Date(c.last_rental),
            ],
        );
    }
    sheet
}

fn pivot_sheet(geography: &[GeographySummary]) -> SheetLayout {
    let mut sheet = SheetLayout::new(PIVOT_SHEET);
    let mut cursor = RowCursor::default();
    sheet.put_header(cursor.take(), &GEOGRAPHY_COLUMNS);
    for g in geography {
        sheet.put_row(
            cursor.take(),
            vec![
                Cell::text_or_blank(&g.country),
                Cell::text_or_blank(&g.city),
                Cell::Money(g.total_revenue),
                Cell::Integer(g.rentals_count as i64),
            ],
        );
    }
    sheet
}

// ── Rendering ────────────────────────────────────────────────────────────────

/// Turn a layout into an in-memory workbook.
pub fn render(layout: &ReportLayout) -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    for sheet in &layout.sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name)?;
        for (&(row, col), cell) in &sheet.cells {
            write_cell(worksheet, row, col, cell, &header_format, &date_format)?;
        }
        if let Some(spec) = &sheet.chart {
            let chart = build_chart(sheet.name, spec);
            worksheet.insert_chart(spec.anchor.0, spec.anchor.1, &chart)?;
        }
        worksheet.autofit();
    }
    Ok(workbook)
}

const EXCEL_YEARS: std::ops::RangeInclusive<i32> = 1900..=9999;

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    header_format: &Format,
    date_format: &Format,
) -> Result<(), XlsxError> {
    match cell {
        Cell::Header(name) => {
            worksheet.write_string_with_format(row, col, name, header_format)?;
        }
        Cell::Text(text) => {
            worksheet.write_string(row, col, text)?;
        }
        Cell::Integer(n) => {
            worksheet.write_number(row, col, *n as f64)?;
        }
        Cell::Money(amount) => {
            worksheet.write_number(row, col, amount.to_f64().unwrap_or_default())?;
        }
        Cell::Date(date) if EXCEL_YEARS.contains(&date.year()) => {
            let excel_date =
                ExcelDateTime::from_ymd(date.year() as u16, date.month() as u8, date.day() as u8)?;
            worksheet.write_datetime_with_format(row, col, &excel_date, date_format)?;
        }
        // Excel has no serial date outside its calendar; keep the value as text.
        Cell::Date(date) => {
            worksheet.write_string(row, col, date.format("%Y-%m-%d").to_string())?;
        }
        Cell::Blank => {}
    }
    Ok(())
}

fn build_chart(sheet_name: &str, spec: &ChartSpec) -> Chart {
    let mut chart = Chart::new(ChartType::Column);
    for series in &spec.series {
        let c = series.categories;
        let v = series.values;
        chart
            .add_series()
            .set_categories((sheet_name, c.first_row, c.col, c.last_row, c.col))
            .set_values((sheet_name, v.first_row, v.col, v.last_row, v.col));
    }
    chart.title().set_name(&spec.title);
    chart.x_axis().set_name(&spec.x_axis);
    chart.y_axis().set_name(&spec.y_axis);
    chart.legend().set_hidden();
    chart.set_width(spec.width_px).set_height(spec.height_px);
    chart
}
