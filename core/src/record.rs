//! Transaction records: the untyped shape a source yields, and the
//! normalized form the aggregator works on.

use crate::types::{CustomerId, Money, PaymentId, RentalId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Amount column as it arrives from the source, before coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Number(f64),
    Text(String),
    Missing,
}

/// One extracted row. Timestamps are still text at this point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    pub payment_id:        PaymentId,
    pub payment_timestamp: String,
    pub amount:            RawAmount,
    pub rental_id:         RentalId,
    pub rental_timestamp:  String,
    pub customer_id:       CustomerId,
    pub customer_name:     String,
    pub address:           Option<String>,
    pub city:              Option<String>,
    pub country:           Option<String>,
}

/// A transaction after coercion. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub payment_id:        PaymentId,
    pub payment_timestamp: NaiveDateTime,
    pub amount:            Money,
    pub rental_id:         RentalId,
    pub rental_timestamp:  NaiveDateTime,
    pub customer_id:       CustomerId,
    pub customer_name:     String,
    pub address:           Option<String>,
    pub city:              Option<String>,
    pub country:           Option<String>,
}
