//! Shared primitive types used across the entire pipeline.

use rust_decimal::Decimal;

/// Monetary amounts. Exact decimal arithmetic, never floats.
pub type Money = Decimal;

pub type PaymentId = i64;
pub type RentalId = i64;
pub type CustomerId = i64;

/// Canonical column order of the customer summary, shared by the flat
/// export and the report's data sheet.
pub const CUSTOMER_COLUMNS: [&str; 8] = [
    "customer_id",
    "customer_name",
    "city",
    "country",
    "total_paid",
    "rentals_count",
    "avg_payment",
    "last_rental",
];

pub const GEOGRAPHY_COLUMNS: [&str; 4] = ["country", "city", "total_revenue", "rentals_count"];
