//! SQLite passthrough writer.
//!
//! Append-only persistence for collected rows, mirroring the report
//! tables downstream consumers expect. This is a table writer, not a
//! read-back cache: rows go in as collected and queries stay on the
//! consumer's side.

use fundflow_core::{FlowError, InstitutionalFlow, Result, Transaction};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// SQLite-backed passthrough store for collected data.
#[derive(Debug)]
pub struct FlowStore {
    conn: Mutex<Connection>,
}

impl FlowStore {
    /// Opens (and initializes) a store at the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| FlowError::Storage(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Opens an in-memory store. Useful for testing; data is lost when
    /// the store is dropped.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| FlowError::Storage(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tw_institutional_investors (
                date TEXT NOT NULL,
                stock_code TEXT NOT NULL,
                stock_name TEXT NOT NULL,
                foreign_buy REAL NOT NULL,
                foreign_sell REAL NOT NULL,
                investment_trust_buy REAL NOT NULL,
                investment_trust_sell REAL NOT NULL,
                dealer_buy REAL NOT NULL,
                dealer_sell REAL NOT NULL,
                PRIMARY KEY (date, stock_code)
            )",
            [],
        )
        .map_err(|e| FlowError::Storage(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS insider_transactions (
                ticker TEXT NOT NULL,
                reporter_name TEXT NOT NULL,
                reporter_cik TEXT NOT NULL,
                security_title TEXT NOT NULL,
                transaction_date TEXT NOT NULL,
                transaction_code TEXT NOT NULL,
                shares REAL NOT NULL,
                price_per_share REAL NOT NULL,
                total_value REAL NOT NULL,
                side TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| FlowError::Storage(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_insider_ticker_date
             ON insider_transactions(ticker, transaction_date)",
            [],
        )
        .map_err(|e| FlowError::Storage(e.to_string()))?;

        debug!("store schema initialized");
        Ok(())
    }

    /// Appends institutional flow rows; a re-collected (date, stock)
    /// pair replaces its previous row.
    pub fn save_institutional(&self, rows: &[InstitutionalFlow]) -> Result<usize> {
        let conn = self.lock()?;
        let mut written = 0;
        for row in rows {
            written += conn
                .execute(
                    "INSERT OR REPLACE INTO tw_institutional_investors
                     (date, stock_code, stock_name, foreign_buy, foreign_sell,
                      investment_trust_buy, investment_trust_sell, dealer_buy, dealer_sell)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        row.date.to_string(),
                        row.stock_code,
                        row.stock_name,
                        row.foreign_buy,
                        row.foreign_sell,
                        row.investment_trust_buy,
                        row.investment_trust_sell,
                        row.dealer_buy,
                        row.dealer_sell,
                    ],
                )
                .map_err(|e| FlowError::Storage(e.to_string()))?;
        }
        debug!(rows = written, "saved institutional flows");
        Ok(written)
    }

    /// Appends insider transaction rows as-is.
    pub fn save_transactions(&self, rows: &[Transaction]) -> Result<usize> {
        let conn = self.lock()?;
        let mut written = 0;
        for row in rows {
            written += conn
                .execute(
                    "INSERT INTO insider_transactions
                     (ticker, reporter_name, reporter_cik, security_title, transaction_date,
                      transaction_code, shares, price_per_share, total_value, side)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        row.ticker.as_str(),
                        row.reporter_name,
                        row.reporter_cik,
                        row.security_title,
                        row.transaction_date.to_string(),
                        row.transaction_code,
                        row.shares,
                        row.price_per_share,
                        row.total_value,
                        row.side.as_str(),
                    ],
                )
                .map_err(|e| FlowError::Storage(e.to_string()))?;
        }
        debug!(rows = written, "saved insider transactions");
        Ok(written)
    }

    /// Number of rows in a table, for consumers verifying an append.
    pub fn count(&self, table: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .map_err(|e| FlowError::Storage(e.to_string()))?;
        Ok(count as usize)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| FlowError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fundflow_core::Ticker;

    #[test]
    fn test_transactions_append() {
        let store = FlowStore::in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let rows = vec![Transaction::new(
            Ticker::new("AAPL"),
            "Doe Jane",
            "0000000001",
            "Common Stock",
            date,
            "P",
            100.0,
            10.0,
        )];
        assert_eq!(store.save_transactions(&rows).unwrap(), 1);
        assert_eq!(store.save_transactions(&rows).unwrap(), 1);
        assert_eq!(store.count("insider_transactions").unwrap(), 2);
    }

    #[test]
    fn test_institutional_replaces_same_day() {
        let store = FlowStore::in_memory().unwrap();
        let row = InstitutionalFlow {
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            stock_code: "2330".to_string(),
            stock_name: "TSMC".to_string(),
            foreign_buy: 100.0,
            foreign_sell: 50.0,
            ..Default::default()
        };
        assert_eq!(store.save_institutional(std::slice::from_ref(&row)).unwrap(), 1);
        assert_eq!(store.save_institutional(std::slice::from_ref(&row)).unwrap(), 1);
        assert_eq!(store.count("tw_institutional_investors").unwrap(), 1);
    }
}
