//! Flat export of the customer summary.
//!
//! UTF-8, comma-delimited, one header row, columns in `CUSTOMER_COLUMNS`
//! order. Absent geography is an empty field, dates are `YYYY-MM-DD`, and
//! decimals keep their full scale.

use crate::{
    aggregate::CustomerSummary,
    atomic::AtomicFile,
    error::{EtlError, EtlResult},
    types::CUSTOMER_COLUMNS,
};
use std::io::Write;
use std::path::Path;

/// Serialize `customers` as CSV into any writer. The header row is always
/// written, even for an empty table.
pub fn write_customers<W: Write>(writer: W, customers: &[CustomerSummary]) -> csv::Result<W> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(CUSTOMER_COLUMNS)?;
    for row in customers {
        wtr.serialize(row)?;
    }
    wtr.into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Replace the file at `path` with the export. Returns the number of data
/// rows written.
pub fn write_export(path: &Path, customers: &[CustomerSummary]) -> EtlResult<usize> {
    log::info!("Writing export to {} ...", path.display());
    let file = AtomicFile::create(path)?;
    let file = write_customers(file, customers).map_err(|e| EtlError::write(path, e))?;
    file.commit()?;
    log::info!("Export written: {} rows", customers.len());
    Ok(customers.len())
}
