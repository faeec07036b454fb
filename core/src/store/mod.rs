//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The pipeline asks it for rows through `RecordSource` and never runs SQL.

use crate::{
    error::{EtlError, EtlResult},
    record::{RawAmount, SourceRow},
    source::RecordSource,
};
use rusqlite::{types::Value, Connection, Row};

mod seed;

const EXTRACT_SQL: &str = "
    SELECT
        p.payment_id,
        p.payment_date,
        p.amount,
        r.rental_id,
        r.rental_date,
        c.customer_id,
        c.first_name || ' ' || c.last_name AS customer_name,
        a.address,
        ci.city,
        co.country
    FROM payment p
    JOIN rental r         ON p.rental_id   = r.rental_id
    JOIN customer c       ON r.customer_id = c.customer_id
    LEFT JOIN address a   ON c.address_id  = a.address_id
    LEFT JOIN city ci     ON a.city_id     = ci.city_id
    LEFT JOIN country co  ON ci.country_id = co.country_id
    ORDER BY p.payment_date ASC, p.payment_id ASC";

pub struct RentalStore {
    conn: Connection,
}

impl RentalStore {
    /// Open (or create) the rental database at `path`.
    pub fn open(path: &str) -> EtlResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EtlResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EtlResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_rental_schema.sql"))?;
        Ok(())
    }

    // ── Extraction ─────────────────────────────────────────────

    pub fn extract(&self) -> EtlResult<Vec<SourceRow>> {
        let mut stmt = self.conn.prepare(EXTRACT_SQL)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(row, out.len())?);
        }
        Ok(out)
    }
}

impl RecordSource for RentalStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn fetch(&self) -> EtlResult<Vec<SourceRow>> {
        self.extract()
    }
}

// ── Row decoding ───────────────────────────────────────────────

fn read_row(row: &Row<'_>, index: usize) -> EtlResult<SourceRow> {
    let cell = |col: usize| row.get::<_, Value>(col);

    Ok(SourceRow {
        payment_id:        integer(cell(0)?, "payment_id", index)?,
        payment_timestamp: timestamp_text(cell(1)?, "payment_date", index)?,
        amount:            raw_amount(cell(2)?),
        rental_id:         integer(cell(3)?, "rental_id", index)?,
        rental_timestamp:  timestamp_text(cell(4)?, "rental_date", index)?,
        customer_id:       integer(cell(5)?, "customer_id", index)?,
        customer_name:     text(cell(6)?, "customer_name", index)?,
        address:           optional_text(cell(7)?, "address", index)?,
        city:              optional_text(cell(8)?, "city", index)?,
        country:           optional_text(cell(9)?, "country", index)?,
    })
}

fn malformed(index: usize, column: &str, found: &Value) -> EtlError {
    EtlError::MalformedRow {
        row: index,
        reason: format!("{column}: unexpected value {found:?}"),
    }
}

fn integer(value: Value, column: &str, index: usize) -> EtlResult<i64> {
    match value {
        Value::Integer(i) => Ok(i),
        other => Err(malformed(index, column, &other)),
    }
}

fn text(value: Value, column: &str, index: usize) -> EtlResult<String> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(malformed(index, column, &other)),
    }
}

fn optional_text(value: Value, column: &str, index: usize) -> EtlResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        other => text(other, column, index).map(Some),
    }
}

/// NULL becomes empty text so the aggregator rejects it with the payment id.
fn timestamp_text(value: Value, column: &str, index: usize) -> EtlResult<String> {
    match value {
        Value::Null => Ok(String::new()),
        other => text(other, column, index),
    }
}

fn raw_amount(value: Value) -> RawAmount {
    match value {
        Value::Integer(i) => RawAmount::Text(i.to_string()),
        Value::Real(f) => RawAmount::Number(f),
        Value::Text(s) => RawAmount::Text(s),
        Value::Null | Value::Blob(_) => RawAmount::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> RentalStore {
        let store = RentalStore::in_memory().expect("in-memory store");
        store.migrate().expect("migration");
        store.insert_country(1, "Peru").unwrap();
        store.insert_city(10, "Lima", Some(1)).unwrap();
        store.insert_address(100, "Av. Grau 1", Some(10)).unwrap();
        store.insert_customer(1, "ANA", "QUISPE", Some(100)).unwrap();
        store.insert_customer(2, "JOSÉ", "RAMÍREZ", None).unwrap();
        store.insert_rental(500, "2005-05-24 22:53:30", 1).unwrap();
        store.insert_rental(501, "2005-05-25 10:00:00", 2).unwrap();
        store
    }

    #[test]
    fn extract_joins_geography_and_orders_by_payment_date() {
        let store = seeded();
        store.insert_payment(2, 500, 5.0, "2005-05-26 09:00:00").unwrap();
        store.insert_payment(1, 500, 2.99, "2005-05-25 11:30:37").unwrap();
        store.insert_payment(3, 501, 4.99, "2005-05-25 12:00:00").unwrap();

        let rows = store.fetch().unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.payment_id).collect();
        assert_eq!(ids, vec![1, 3, 2]);

        let first = &rows[0];
        assert_eq!(first.customer_name, "ANA QUISPE");
        assert_eq!(first.city.as_deref(), Some("Lima"));
        assert_eq!(first.country.as_deref(), Some("Peru"));
        assert_eq!(first.amount, RawAmount::Number(2.99));
        assert_eq!(first.rental_timestamp, "2005-05-24 22:53:30");

        let no_address = &rows[1];
        assert_eq!(no_address.customer_name, "JOSÉ RAMÍREZ");
        assert_eq!(no_address.address, None);
        assert_eq!(no_address.city, None);
        assert_eq!(no_address.country, None);
    }

    #[test]
    fn integer_and_text_amounts_stay_coercible() {
        let store = seeded();
        store.insert_payment(1, 500, 10, "2005-05-25 11:30:37").unwrap();
        store.insert_payment(2, 500, "n/a", "2005-05-25 11:31:00").unwrap();

        let rows = store.fetch().unwrap();
        assert_eq!(rows[0].amount, RawAmount::Text("10".into()));
        assert_eq!(rows[1].amount, RawAmount::Text("n/a".into()));
    }

    #[test]
    fn blob_geography_is_a_malformed_row() {
        let store = seeded();
        store.insert_payment(1, 500, 1.0, "2005-05-25 11:30:37").unwrap();
        store
            .conn
            .execute(
                "INSERT INTO address (address_id, address, city_id) VALUES (101, x'DEADBEEF', 10)",
                [],
            )
            .unwrap();
        store.insert_customer(3, "EVA", "LUNA", Some(101)).unwrap();
        store.insert_rental(502, "2005-05-26 08:00:00", 3).unwrap();
        store.insert_payment(2, 502, 1.0, "2005-05-26 09:00:00").unwrap();

        let err = store.fetch().unwrap_err();
        assert!(
            matches!(err, EtlError::MalformedRow { row: 1, .. }),
            "unexpected error: {err}"
        );
    }
}
