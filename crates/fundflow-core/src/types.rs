//! Core data types for disclosure and fund-flow data.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Ticker`] - Trading symbol, the case-insensitive match key
//! - [`Cik`] - The regulator's canonical numeric company identifier
//! - [`FilingReference`] - One entry from the filing index
//! - [`Transaction`] - A normalized insider transaction record
//! - [`TransactionSide`] - Buy/sell classification derived from the transaction code
//! - [`YearMonth`] - Calendar-month aggregation key
//! - [`InstitutionalFlow`] - One day of Taiwan institutional-investor flows for one stock
//! - [`DownloadRecord`] - Typed manifest entry for one persisted filing

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A trading symbol/ticker.
///
/// Tickers are automatically uppercased on creation, so lookups against
/// the identifier index are case-insensitive by construction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticker(String);

impl Ticker {
    /// Creates a new ticker from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    /// Returns the ticker as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Ticker {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Ticker {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Ticker {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// The regulator's canonical numeric company identifier.
///
/// Stored zero-padded to the fixed 10-digit width the regulator's
/// endpoints expect. Immutable once resolved.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cik(String);

impl Cik {
    /// Creates a CIK from any numeric string, zero-padding to 10 digits.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(format!("{:0>10}", s.into()))
    }

    /// Returns the zero-padded identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for Cik {
    fn from(n: u64) -> Self {
        Self(format!("{n:010}"))
    }
}

impl fmt::Display for Cik {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry from the regulator's filing index for a company.
///
/// Produced by the filing enumerator, newest filing date first;
/// consumed by the document fetcher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilingReference {
    /// Ticker the filing was enumerated for.
    pub ticker: Ticker,
    /// Regulator-assigned unique identifier for this submission.
    pub accession_number: String,
    /// Date the filing was submitted.
    pub filing_date: NaiveDate,
    /// Period-of-report date, when the index carries one.
    pub report_date: Option<NaiveDate>,
    /// URL of the filing's detail page.
    pub detail_url: String,
}

/// Buy/sell classification of an insider transaction.
///
/// Derived deterministically from the transaction code: open-market
/// purchases (`P`) and other acquisitions (`J`) are buys, every other
/// code is a sell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionSide {
    /// Acquisition of the underlying security.
    Buy,
    /// Disposition of the underlying security.
    Sell,
}

impl TransactionSide {
    /// Classifies a raw transaction code.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "P" | "J" => Self::Buy,
            _ => Self::Sell,
        }
    }

    /// Returns the side as the conventional uppercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for TransactionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A normalized non-derivative insider transaction.
///
/// Records are created by the extractor and never mutated afterwards.
/// `total_value` is always `shares * price_per_share` and `side` is
/// always derived from `transaction_code`; both are set only by
/// [`Transaction::new`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Ticker of the issuer.
    pub ticker: Ticker,
    /// Name of the reporting insider.
    pub reporter_name: String,
    /// Regulator identifier of the reporting insider.
    pub reporter_cik: String,
    /// Title of the security transacted.
    pub security_title: String,
    /// Date of the transaction.
    pub transaction_date: NaiveDate,
    /// Raw transaction code from the filing.
    pub transaction_code: String,
    /// Number of shares transacted.
    pub shares: f64,
    /// Price per share.
    pub price_per_share: f64,
    /// `shares * price_per_share`.
    pub total_value: f64,
    /// Buy/sell classification derived from the code.
    pub side: TransactionSide,
}

impl Transaction {
    /// Creates a transaction, deriving `total_value` and `side`.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ticker: Ticker,
        reporter_name: impl Into<String>,
        reporter_cik: impl Into<String>,
        security_title: impl Into<String>,
        transaction_date: NaiveDate,
        transaction_code: impl Into<String>,
        shares: f64,
        price_per_share: f64,
    ) -> Self {
        let transaction_code = transaction_code.into();
        let side = TransactionSide::from_code(&transaction_code);
        Self {
            ticker,
            reporter_name: reporter_name.into(),
            reporter_cik: reporter_cik.into(),
            security_title: security_title.into(),
            transaction_date,
            transaction_code,
            shares,
            price_per_share,
            total_value: shares * price_per_share,
            side,
        }
    }

    /// The calendar month this transaction falls in.
    #[must_use]
    pub fn year_month(&self) -> YearMonth {
        YearMonth::from_date(self.transaction_date)
    }

    /// Signed flow value: positive for buys, negative for sells.
    #[must_use]
    pub fn signed_flow(&self) -> f64 {
        match self.side {
            TransactionSide::Buy => self.total_value,
            TransactionSide::Sell => -self.total_value,
        }
    }
}

/// Calendar-month aggregation key, displayed and serialized as `YYYY-MM`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    /// Calendar year.
    pub year: i32,
    /// Calendar month, 1-12.
    pub month: u32,
}

impl YearMonth {
    /// Derives the month key from a date.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid year-month key: {s}"))?;
        let year = year
            .parse()
            .map_err(|e| format!("Invalid year in {s}: {e}"))?;
        let month: u32 = month
            .parse()
            .map_err(|e| format!("Invalid month in {s}: {e}"))?;
        if !(1..=12).contains(&month) {
            return Err(format!("Month out of range in {s}"));
        }
        Ok(Self { year, month })
    }
}

impl Serialize for YearMonth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One day of institutional-investor buy/sell flows for one listed stock.
///
/// Share counts come straight from the exchange's daily report; the
/// three investor categories are foreign investors, investment trusts,
/// and dealers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InstitutionalFlow {
    /// Trading date.
    pub date: NaiveDate,
    /// Exchange stock code.
    pub stock_code: String,
    /// Stock display name.
    pub stock_name: String,
    /// Shares bought by foreign investors.
    pub foreign_buy: f64,
    /// Shares sold by foreign investors.
    pub foreign_sell: f64,
    /// Shares bought by investment trusts.
    pub investment_trust_buy: f64,
    /// Shares sold by investment trusts.
    pub investment_trust_sell: f64,
    /// Shares bought by dealers.
    pub dealer_buy: f64,
    /// Shares sold by dealers.
    pub dealer_sell: f64,
}

/// Typed manifest entry for one persisted filing download.
///
/// Carries the identity the filename convention would otherwise have to
/// be re-parsed for, so downstream stages never derive identity from
/// string position unless they are in directory-scan mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Ticker the filing belongs to.
    pub ticker: Ticker,
    /// Accession number of the downloaded submission.
    pub accession_number: String,
    /// Path of the unmodified submission bytes.
    pub raw_path: PathBuf,
    /// Path of the isolated, repaired structured document.
    pub document_path: PathBuf,
    /// When the download completed.
    pub fetched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_uppercases() {
        assert_eq!(Ticker::new("aapl").as_str(), "AAPL");
        assert_eq!(Ticker::new("AAPL"), Ticker::new("aApL"));
    }

    #[test]
    fn test_cik_zero_padding() {
        assert_eq!(Cik::new("320193").as_str(), "0000320193");
        assert_eq!(Cik::from(320_193).as_str(), "0000320193");
        assert_eq!(Cik::new("0000320193").as_str(), "0000320193");
    }

    #[test]
    fn test_side_from_code() {
        assert_eq!(TransactionSide::from_code("P"), TransactionSide::Buy);
        assert_eq!(TransactionSide::from_code("J"), TransactionSide::Buy);
        assert_eq!(TransactionSide::from_code("S"), TransactionSide::Sell);
        assert_eq!(TransactionSide::from_code("F"), TransactionSide::Sell);
        assert_eq!(TransactionSide::from_code("A"), TransactionSide::Sell);
    }

    #[test]
    fn test_transaction_invariants() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let tx = Transaction::new(
            Ticker::new("AAPL"),
            "Doe Jane",
            "0001234567",
            "Common Stock",
            date,
            "P",
            100.0,
            10.0,
        );
        assert_eq!(tx.total_value, 1000.0);
        assert_eq!(tx.side, TransactionSide::Buy);
        assert_eq!(tx.signed_flow(), 1000.0);

        let tx = Transaction::new(
            Ticker::new("AAPL"),
            "Doe Jane",
            "0001234567",
            "Common Stock",
            date,
            "S",
            50.0,
            12.0,
        );
        assert_eq!(tx.total_value, 600.0);
        assert_eq!(tx.signed_flow(), -600.0);
    }

    #[test]
    fn test_year_month_key() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let ym = YearMonth::from_date(date);
        assert_eq!(ym.to_string(), "2024-02");
        assert_eq!("2024-02".parse::<YearMonth>().unwrap(), ym);
        assert!(YearMonth::from_date(date) > "2024-01".parse().unwrap());
        assert!("2024-13".parse::<YearMonth>().is_err());
    }
}
