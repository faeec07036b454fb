use super::RentalStore;
use crate::error::EtlResult;
use rusqlite::{params, ToSql};

impl RentalStore {
    // ── Geography ─────────────────────────────────────────────────

    pub fn insert_country(&self, country_id: i64, country: &str) -> EtlResult<()> {
        self.conn.execute(
            "INSERT INTO country (country_id, country) VALUES (?1, ?2)",
            params![country_id, country],
        )?;
        Ok(())
    }

    pub fn insert_city(&self, city_id: i64, city: &str, country_id: Option<i64>) -> EtlResult<()> {
        self.conn.execute(
            "INSERT INTO city (city_id, city, country_id) VALUES (?1, ?2, ?3)",
            params![city_id, city, country_id],
        )?;
        Ok(())
    }

    pub fn insert_address(
        &self,
        address_id: i64,
        address: &str,
        city_id: Option<i64>,
    ) -> EtlResult<()> {
        self.conn.execute(
            "INSERT INTO address (address_id, address, city_id) VALUES (?1, ?2, ?3)",
            params![address_id, address, city_id],
        )?;
        Ok(())
    }

    // ── Customer ──────────────────────────────────────────────────

    pub fn insert_customer(
        &self,
        customer_id: i64,
        first_name: &str,
        last_name: &str,
        address_id: Option<i64>,
    ) -> EtlResult<()> {
        self.conn.execute(
            "INSERT INTO customer (customer_id, first_name, last_name, address_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![customer_id, first_name, last_name, address_id],
        )?;
        Ok(())
    }

    /// Re-point a customer at another address. Later extractions report the
    /// new geography for every one of the customer's payments.
    pub fn move_customer(&self, customer_id: i64, address_id: Option<i64>) -> EtlResult<()> {
        self.conn.execute(
            "UPDATE customer SET address_id = ?1 WHERE customer_id = ?2",
            params![address_id, customer_id],
        )?;
        Ok(())
    }

    // ── Rental / payment ──────────────────────────────────────────

    pub fn insert_rental(&self, rental_id: i64, rental_date: &str, customer_id: i64) -> EtlResult<()> {
        self.conn.execute(
            "INSERT INTO rental (rental_id, rental_date, customer_id) VALUES (?1, ?2, ?3)",
            params![rental_id, rental_date, customer_id],
        )?;
        Ok(())
    }

    /// `amount` is stored as given; the column has NUMERIC affinity, so text
    /// that does not look like a number stays text.
    pub fn insert_payment<A: ToSql>(
        &self,
        payment_id: i64,
        rental_id: i64,
        amount: A,
        payment_date: &str,
    ) -> EtlResult<()> {
        self.conn.execute(
            "INSERT INTO payment (payment_id, rental_id, amount, payment_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![payment_id, rental_id, amount, payment_date],
        )?;
        Ok(())
    }

    pub fn payment_count(&self) -> EtlResult<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM payment", [], |row| row.get(0))?;
        Ok(n)
    }
}
