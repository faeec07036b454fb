//! Aggregator: turns the flat transaction stream into summary tables.
//!
//! Two tables come out of one pass:
//!   1. Customer summary, keyed by (customer_id, customer_name, city, country)
//!   2. Geography summary, keyed by (country, city), sorted by revenue
//!
//! RULES:
//!   - A bad timestamp fails the whole run. There is no per-row skip.
//!   - An amount that cannot be read counts as zero; the row is kept.
//!   - A numeric amount that does not fit `Money` fails the run, and so
//!     does any sum that overflows. Nothing is silently zeroed or wrapped.
//!   - Missing city/country is its own key value, never merged or dropped.
//!   - rentals_count is the number of distinct rental ids, not of payments.

use crate::{
    config::EmptyInputPolicy,
    error::{EtlError, EtlResult},
    record::{RawAmount, SourceRow, TransactionRecord},
    types::{CustomerId, Money, RentalId},
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;
use std::str::FromStr;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerSummary {
    pub customer_id:   CustomerId,
    pub customer_name: String,
    pub city:          Option<String>,
    pub country:       Option<String>,
    pub total_paid:    Money,
    pub rentals_count: usize,
    pub avg_payment:   Money,
    pub last_rental:   NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeographySummary {
    pub country:       Option<String>,
    pub city:          Option<String>,
    pub total_revenue: Money,
    pub rentals_count: usize,
}

/// Everything downstream stages consume.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub records:   Vec<TransactionRecord>,
    pub customers: Vec<CustomerSummary>,
    pub geography: Vec<GeographySummary>,
}

impl Aggregation {
    /// Sum of amount over the normalized records.
    pub fn total_amount(&self) -> EtlResult<Money> {
        checked_sum(self.records.iter().map(|r| r.amount))
    }
}

// ── Reductions ───────────────────────────────────────────────────────────────

/// Set-cardinality accumulator: how many different values were pushed.
#[derive(Debug, Clone)]
pub struct DistinctCount<T: Eq + Hash> {
    seen: HashSet<T>,
}

impl<T: Eq + Hash> Default for DistinctCount<T> {
    fn default() -> Self {
        Self { seen: HashSet::new() }
    }
}

impl<T: Eq + Hash> DistinctCount<T> {
    pub fn push(&mut self, value: T) {
        self.seen.insert(value);
    }

    pub fn count(&self) -> usize {
        self.seen.len()
    }
}

/// Running sum plus row count, for both totals and means.
#[derive(Debug, Clone, Default)]
pub struct SumMean {
    sum:  Money,
    rows: usize,
}

impl SumMean {
    pub fn push(&mut self, amount: Money) -> EtlResult<()> {
        self.sum = add_money(self.sum, amount)?;
        self.rows += 1;
        Ok(())
    }

    pub fn sum(&self) -> Money {
        self.sum
    }

    /// Mean over every pushed row. `None` when nothing was pushed.
    pub fn mean(&self) -> Option<Money> {
        (self.rows > 0).then(|| self.sum / Decimal::from(self.rows))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaxTimestamp {
    max: NaiveDateTime,
}

impl MaxTimestamp {
    pub fn new(first: NaiveDateTime) -> Self {
        Self { max: first }
    }

    pub fn push(&mut self, value: NaiveDateTime) {
        if value > self.max {
            self.max = value;
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.max.date()
    }
}

pub fn add_money(a: Money, b: Money) -> EtlResult<Money> {
    a.checked_add(b)
        .ok_or_else(|| EtlError::DataIntegrity("amount sum overflows decimal range".into()))
}

/// Overflow-checked total. `Decimal`'s own `Sum` panics instead.
pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> EtlResult<Money> {
    amounts.into_iter().try_fold(Decimal::ZERO, add_money)
}

/// Two-place rounding, ties to even. The result always carries scale 2,
/// so `7.5` prints as `7.50`.
pub fn round_money(value: Money) -> Money {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(2);
    rounded
}

// ── Grouping keys ────────────────────────────────────────────────────────────

/// A nullable key component. `Absent` orders after every present value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Slot {
    Present(String),
    Absent,
}

impl Slot {
    fn of(value: &Option<String>) -> Self {
        match value {
            Some(v) => Slot::Present(v.clone()),
            None => Slot::Absent,
        }
    }

    fn into_option(self) -> Option<String> {
        match self {
            Slot::Present(v) => Some(v),
            Slot::Absent => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CustomerKey {
    customer_id:   CustomerId,
    customer_name: String,
    city:          Slot,
    country:       Slot,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GeographyKey {
    country: Slot,
    city:    Slot,
}

struct CustomerGroup {
    money:       SumMean,
    rentals:     DistinctCount<RentalId>,
    last_rental: MaxTimestamp,
}

#[derive(Default)]
struct GeographyGroup {
    money:   SumMean,
    rentals: DistinctCount<RentalId>,
}

// ── Aggregation ──────────────────────────────────────────────────────────────

/// Normalize every row, then build both summary tables.
pub fn aggregate(rows: Vec<SourceRow>, policy: EmptyInputPolicy) -> EtlResult<Aggregation> {
    if rows.is_empty() {
        return match policy {
            EmptyInputPolicy::Reject => Err(EtlError::EmptyInput),
            EmptyInputPolicy::Allow => {
                log::warn!("No source rows; producing empty summary tables");
                Ok(Aggregation::default())
            }
        };
    }

    let records = rows
        .into_iter()
        .map(normalize)
        .collect::<EtlResult<Vec<_>>>()?;

    let customers = summarize_customers(&records)?;
    let geography = summarize_geography(&records)?;
    check_totals(&records, &customers, &geography)?;
    log::info!(
        "Aggregated {} records into {} customer rows and {} geography rows",
        records.len(),
        customers.len(),
        geography.len()
    );

    Ok(Aggregation {
        records,
        customers,
        geography,
    })
}

/// Both regroupings must account for every unit of money in the input.
fn check_totals(
    records: &[TransactionRecord],
    customers: &[CustomerSummary],
    geography: &[GeographySummary],
) -> EtlResult<()> {
    let raw = checked_sum(records.iter().map(|r| r.amount))?;
    let by_customer = checked_sum(customers.iter().map(|c| c.total_paid))?;
    let by_geography = checked_sum(geography.iter().map(|g| g.total_revenue))?;
    if by_customer != raw || by_geography != raw {
        return Err(EtlError::DataIntegrity(format!(
            "totals diverge: records {raw}, customers {by_customer}, geography {by_geography}"
        )));
    }
    Ok(())
}

/// Group by customer identity plus geography. Rows come out in key order,
/// so identical input always yields identical output.
pub fn summarize_customers(records: &[TransactionRecord]) -> EtlResult<Vec<CustomerSummary>> {
    let mut groups: BTreeMap<CustomerKey, CustomerGroup> = BTreeMap::new();
    for record in records {
        let key = CustomerKey {
            customer_id:   record.customer_id,
            customer_name: record.customer_name.clone(),
            city:          Slot::of(&record.city),
            country:       Slot::of(&record.country),
        };
        let group = groups.entry(key).or_insert_with(|| CustomerGroup {
            money:       SumMean::default(),
            rentals:     DistinctCount::default(),
            last_rental: MaxTimestamp::new(record.rental_timestamp),
        });
        group.money.push(record.amount)?;
        group.rentals.push(record.rental_id);
        group.last_rental.push(record.rental_timestamp);
    }

    let rows = groups
        .into_iter()
        .map(|(key, group)| CustomerSummary {
            customer_id:   key.customer_id,
            customer_name: key.customer_name,
            city:          key.city.into_option(),
            country:       key.country.into_option(),
            total_paid:    group.money.sum(),
            rentals_count: group.rentals.count(),
            avg_payment:   round_money(group.money.mean().unwrap_or_default()),
            last_rental:   group.last_rental.date(),
        })
        .collect();
    Ok(rows)
}

/// Group by (country, city), then sort by revenue, highest first.
/// The sort is stable: ties keep key order.
pub fn summarize_geography(records: &[TransactionRecord]) -> EtlResult<Vec<GeographySummary>> {
    let mut groups: BTreeMap<GeographyKey, GeographyGroup> = BTreeMap::new();
    for record in records {
        let key = GeographyKey {
            country: Slot::of(&record.country),
            city:    Slot::of(&record.city),
        };
        let group = groups.entry(key).or_default();
        group.money.push(record.amount)?;
        group.rentals.push(record.rental_id);
    }

    let mut rows: Vec<GeographySummary> = groups
        .into_iter()
        .map(|(key, group)| GeographySummary {
            country:       key.country.into_option(),
            city:          key.city.into_option(),
            total_revenue: group.money.sum(),
            rentals_count: group.rentals.count(),
        })
        .collect();
    rows.sort_by(|a, b| b.total_revenue.cmp(&a.total_revenue));
    Ok(rows)
}

// ── Coercion ─────────────────────────────────────────────────────────────────

pub fn normalize(row: SourceRow) -> EtlResult<TransactionRecord> {
    let payment_timestamp = parse_timestamp(&row.payment_timestamp).ok_or_else(|| {
        EtlError::InvalidTimestamp {
            payment_id: row.payment_id,
            field: "payment_timestamp",
            value: row.payment_timestamp.clone(),
        }
    })?;
    let rental_timestamp = parse_timestamp(&row.rental_timestamp).ok_or_else(|| {
        EtlError::InvalidTimestamp {
            payment_id: row.payment_id,
            field: "rental_timestamp",
            value: row.rental_timestamp.clone(),
        }
    })?;
    let amount = match coerce_amount(&row.amount) {
        Coerced::Amount(amount) => amount,
        Coerced::NotNumeric => {
            log::warn!(
                "Payment {}: amount {:?} is not numeric, counted as 0",
                row.payment_id,
                row.amount
            );
            Decimal::ZERO
        }
        Coerced::OutOfRange => {
            return Err(EtlError::DataIntegrity(format!(
                "payment {}: amount {:?} is outside the decimal range",
                row.payment_id, row.amount
            )));
        }
    };

    Ok(TransactionRecord {
        payment_id: row.payment_id,
        payment_timestamp,
        amount,
        rental_id: row.rental_id,
        rental_timestamp,
        customer_id: row.customer_id,
        customer_name: row.customer_name,
        address: row.address,
        city: row.city,
        country: row.country,
    })
}

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Accepts SQL-style and ISO datetimes, RFC 3339 with an offset (taken as
/// UTC), and bare dates (midnight).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// How a raw amount reads as money.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coerced {
    Amount(Money),
    /// Missing, non-finite, or not a number at all.
    NotNumeric,
    /// A real number too large for `Money`.
    OutOfRange,
}

pub fn coerce_amount(raw: &RawAmount) -> Coerced {
    match raw {
        RawAmount::Number(v) if v.is_finite() => match Decimal::from_str(&v.to_string()) {
            Ok(amount) => Coerced::Amount(amount),
            Err(_) if v.abs() >= 1.0 => Coerced::OutOfRange,
            // Too small to show at any money scale.
            Err(_) => Coerced::Amount(Decimal::ZERO),
        },
        RawAmount::Number(_) | RawAmount::Missing => Coerced::NotNumeric,
        RawAmount::Text(s) => {
            let s = s.trim();
            if let Ok(amount) = Decimal::from_str(s).or_else(|_| Decimal::from_scientific(s)) {
                return Coerced::Amount(amount);
            }
            match s.parse::<f64>() {
                Ok(v) if v.is_finite() => coerce_amount(&RawAmount::Number(v)),
                _ => Coerced::NotNumeric,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parses_every_supported_timestamp_shape() {
        let expected = NaiveDate::from_ymd_opt(2005, 5, 24)
            .unwrap()
            .and_hms_opt(22, 53, 30)
            .unwrap();
        assert_eq!(parse_timestamp("2005-05-24 22:53:30"), Some(expected));
        assert_eq!(parse_timestamp(" 2005-05-24T22:53:30 "), Some(expected));
        assert_eq!(parse_timestamp("2005-05-24T20:53:30-02:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2005-05-24 22:53:30.250").map(|t| t.date()),
            Some(expected.date())
        );
        assert_eq!(
            parse_timestamp("2005-05-24"),
            NaiveDate::from_ymd_opt(2005, 5, 24).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("24/05/2005"), None);
        assert_eq!(parse_timestamp("2005-02-30 10:00:00"), None);
    }

    #[test]
    fn amounts_coerce_or_report_why_not() {
        assert_eq!(coerce_amount(&RawAmount::Number(4.99)), Coerced::Amount(dec("4.99")));
        assert_eq!(
            coerce_amount(&RawAmount::Text(" 2.50 ".into())),
            Coerced::Amount(dec("2.50"))
        );
        assert_eq!(coerce_amount(&RawAmount::Text("1e1".into())), Coerced::Amount(dec("10")));
        assert_eq!(coerce_amount(&RawAmount::Text("free".into())), Coerced::NotNumeric);
        assert_eq!(coerce_amount(&RawAmount::Text("inf".into())), Coerced::NotNumeric);
        assert_eq!(coerce_amount(&RawAmount::Number(f64::NAN)), Coerced::NotNumeric);
        assert_eq!(coerce_amount(&RawAmount::Missing), Coerced::NotNumeric);
    }

    #[test]
    fn real_numbers_beyond_decimal_range_are_out_of_range() {
        assert_eq!(coerce_amount(&RawAmount::Number(1e30)), Coerced::OutOfRange);
        assert_eq!(coerce_amount(&RawAmount::Number(-1e30)), Coerced::OutOfRange);
        assert_eq!(
            coerce_amount(&RawAmount::Text("1000000000000000000000000000000".into())),
            Coerced::OutOfRange
        );
    }

    #[test]
    fn sum_mean_reports_overflow() {
        let mut acc = SumMean::default();
        acc.push(Decimal::MAX).unwrap();
        let err = acc.push(Decimal::ONE).unwrap_err();
        assert!(matches!(err, EtlError::DataIntegrity(_)));
        assert_eq!(acc.sum(), Decimal::MAX);
        assert!(checked_sum([Decimal::MAX, Decimal::MAX]).is_err());
    }

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(round_money(dec("2.345")), dec("2.34"));
        assert_eq!(round_money(dec("2.355")), dec("2.36"));
        assert_eq!(round_money(dec("7.5")).to_string(), "7.50");
    }

    #[test]
    fn distinct_count_ignores_repeats() {
        let mut acc = DistinctCount::default();
        for id in [100, 100, 101, 100] {
            acc.push(id);
        }
        assert_eq!(acc.count(), 2);
    }

    #[test]
    fn absent_slot_orders_after_present() {
        let mut slots = vec![
            Slot::Absent,
            Slot::Present("Lima".into()),
            Slot::Present("Cusco".into()),
        ];
        slots.sort();
        assert_eq!(
            slots,
            vec![Slot::Present("Cusco".into()), Slot::Present("Lima".into()), Slot::Absent]
        );
    }

    #[test]
    fn empty_input_follows_policy() {
        let allowed = aggregate(Vec::new(), EmptyInputPolicy::Allow).unwrap();
        assert!(allowed.records.is_empty());
        assert!(allowed.customers.is_empty());
        assert!(allowed.geography.is_empty());

        let rejected = aggregate(Vec::new(), EmptyInputPolicy::Reject);
        assert!(matches!(rejected, Err(EtlError::EmptyInput)));
    }
}
