//! Rental ETL core: extract payments from the rental database, summarize
//! them per customer and per geography, and persist a flat export plus a
//! dashboard workbook.

pub mod aggregate;
pub mod atomic;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod record;
pub mod report;
pub mod source;
pub mod store;
pub mod types;
