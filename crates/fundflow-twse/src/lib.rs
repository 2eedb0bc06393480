#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fundflow-rs/fundflow/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Taiwan Stock Exchange institutional-investor flow provider.
//!
//! # Example
//!
//! ```no_run
//! use fundflow_twse::TwseProvider;
//! use fundflow_core::InstitutionalDataProvider;
//! use chrono::NaiveDate;
//!
//! # async fn example() -> fundflow_core::Result<()> {
//! let provider = TwseProvider::new();
//! let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
//! let end = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
//! let flows = provider.fetch_range(start, end).await?;
//! println!("{} rows", flows.len());
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use fundflow_core::{
    DataProvider, FlowError, InstitutionalDataProvider, InstitutionalFlow, Result,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Daily institutional-investor report endpoint.
const T86_URL: &str = "https://www.twse.com.tw/fund/T86";

/// Courtesy delay between requests, per the exchange's usage guidance.
const DEFAULT_RATE_LIMIT_MS: u64 = 3000;

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Column headers of the T86 report, as published by the exchange.
const COLUMN_STOCK_CODE: &str = "證券代號";
const COLUMN_STOCK_NAME: &str = "證券名稱";
const COLUMN_FOREIGN_BUY: &str = "外陸資買進股數";
const COLUMN_FOREIGN_SELL: &str = "外陸資賣出股數";
const COLUMN_TRUST_BUY: &str = "投信買進股數";
const COLUMN_TRUST_SELL: &str = "投信賣出股數";
const COLUMN_DEALER_BUY: &str = "自營商買進股數";
const COLUMN_DEALER_SELL: &str = "自營商賣出股數";

/// Taiwan Stock Exchange institutional flow provider.
#[derive(Debug)]
pub struct TwseProvider {
    client: reqwest::Client,
    rate_limit_ms: u64,
    last_request_time: AtomicU64,
}

impl TwseProvider {
    /// Creates a provider with the exchange's default 3-second delay.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rate_limit(Duration::from_millis(DEFAULT_RATE_LIMIT_MS))
    }

    /// Creates a provider with a custom inter-request delay.
    #[must_use]
    pub fn with_rate_limit(rate_limit: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            rate_limit_ms: rate_limit.as_millis() as u64,
            last_request_time: AtomicU64::new(0),
        }
    }

    /// Apply rate limiting before making a request.
    async fn apply_rate_limit(&self) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let last = self.last_request_time.load(Ordering::Relaxed);
        let elapsed = now.saturating_sub(last);

        if elapsed < self.rate_limit_ms {
            let wait_time = self.rate_limit_ms - elapsed;
            debug!("Rate limiting: waiting {}ms", wait_time);
            sleep(Duration::from_millis(wait_time)).await;
        }

        self.last_request_time.store(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            Ordering::Relaxed,
        );
    }
}

impl Default for TwseProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DataProvider for TwseProvider {
    fn name(&self) -> &str {
        "TWSE"
    }

    fn description(&self) -> &str {
        "Taiwan Stock Exchange daily institutional-investor buy/sell flows"
    }
}

#[async_trait]
impl InstitutionalDataProvider for TwseProvider {
    async fn fetch_daily(&self, date: NaiveDate) -> Result<Vec<InstitutionalFlow>> {
        self.apply_rate_limit().await;

        debug!(date = %date, "Fetching institutional flows");
        let response = self
            .client
            .get(T86_URL)
            .query(&[
                ("response", "json"),
                ("date", &date.format("%Y%m%d").to_string()),
                ("selectType", "ALL"),
            ])
            .send()
            .await
            .map_err(|e| FlowError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FlowError::Upstream(format!(
                "HTTP {} for {date}",
                response.status()
            )));
        }

        let report: T86Response = response
            .json()
            .await
            .map_err(|e| FlowError::Parse(e.to_string()))?;

        Ok(parse_report(&report, date))
    }

    async fn fetch_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<InstitutionalFlow>> {
        if start > end {
            return Err(FlowError::InvalidParameter(format!(
                "Start date {start} is after end date {end}"
            )));
        }

        let mut flows = Vec::new();
        let mut current = start;
        while current <= end {
            // The exchange only publishes on trading days.
            if current.weekday().number_from_monday() <= 5 {
                match self.fetch_daily(current).await {
                    Ok(mut rows) => flows.append(&mut rows),
                    // A failed day aborts only itself, not the range.
                    Err(e) => warn!(date = %current, error = %e, "skipping day"),
                }
            }
            current = current + chrono::Duration::days(1);
        }
        Ok(flows)
    }
}

/// Maps the exchange's response onto typed rows.
///
/// A non-OK `stat` (holiday, no data yet) yields an empty Vec, not an
/// error. Rows are matched to columns by header name, so column
/// reordering by the exchange does not break parsing.
fn parse_report(report: &T86Response, date: NaiveDate) -> Vec<InstitutionalFlow> {
    let stat = report.stat.as_deref().unwrap_or("").to_uppercase();
    if stat != "OK" {
        warn!(date = %date, stat = %stat, "exchange reported no data");
        return Vec::new();
    }

    let columns = Columns::locate(&report.fields);
    let Some(columns) = columns else {
        warn!(date = %date, "report is missing expected columns");
        return Vec::new();
    };

    report
        .data
        .iter()
        .filter_map(|row| columns.parse_row(row, date))
        .collect()
}

/// Column indices located from the report header.
#[derive(Debug)]
struct Columns {
    stock_code: usize,
    stock_name: usize,
    foreign_buy: usize,
    foreign_sell: usize,
    trust_buy: usize,
    trust_sell: usize,
    dealer_buy: usize,
    dealer_sell: usize,
}

impl Columns {
    fn locate(fields: &[String]) -> Option<Self> {
        let find = |name: &str| fields.iter().position(|f| f.starts_with(name));
        Some(Self {
            stock_code: find(COLUMN_STOCK_CODE)?,
            stock_name: find(COLUMN_STOCK_NAME)?,
            foreign_buy: find(COLUMN_FOREIGN_BUY)?,
            foreign_sell: find(COLUMN_FOREIGN_SELL)?,
            trust_buy: find(COLUMN_TRUST_BUY)?,
            trust_sell: find(COLUMN_TRUST_SELL)?,
            dealer_buy: find(COLUMN_DEALER_BUY)?,
            dealer_sell: find(COLUMN_DEALER_SELL)?,
        })
    }

    fn parse_row(&self, row: &[Value], date: NaiveDate) -> Option<InstitutionalFlow> {
        Some(InstitutionalFlow {
            date,
            stock_code: text_at(row, self.stock_code)?,
            stock_name: text_at(row, self.stock_name)?,
            foreign_buy: number_at(row, self.foreign_buy),
            foreign_sell: number_at(row, self.foreign_sell),
            investment_trust_buy: number_at(row, self.trust_buy),
            investment_trust_sell: number_at(row, self.trust_sell),
            dealer_buy: number_at(row, self.dealer_buy),
            dealer_sell: number_at(row, self.dealer_sell),
        })
    }
}

fn text_at(row: &[Value], index: usize) -> Option<String> {
    row.get(index)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}

/// Parses a comma-grouped share count; anything unparseable counts as 0.
fn number_at(row: &[Value], index: usize) -> f64 {
    match row.get(index) {
        Some(Value::String(s)) => s.replace(',', "").trim().parse().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Envelope of the exchange's JSON report.
#[derive(Debug, Default, Deserialize)]
struct T86Response {
    stat: Option<String>,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> T86Response {
        serde_json::from_str(
            r#"{
                "stat": "OK",
                "date": "20240105",
                "fields": ["證券代號", "證券名稱",
                           "外陸資買進股數(不含外資自營商)", "外陸資賣出股數(不含外資自營商)",
                           "外陸資買賣超股數(不含外資自營商)",
                           "投信買進股數", "投信賣出股數", "投信買賣超股數",
                           "自營商買進股數", "自營商賣出股數"],
                "data": [
                    ["2330", "台積電", "25,262,118", "12,634,166", "12,627,952",
                     "1,651,000", "215,000", "1,436,000", "801,000", "438,000"],
                    ["2317", "鴻海", "10,000", "20,500", "-10,500",
                     "0", "0", "0", "5,000", "1,000"]
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_report() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let flows = parse_report(&sample_response(), date);
        assert_eq!(flows.len(), 2);

        let tsmc = &flows[0];
        assert_eq!(tsmc.stock_code, "2330");
        assert_eq!(tsmc.stock_name, "台積電");
        assert_eq!(tsmc.foreign_buy, 25_262_118.0);
        assert_eq!(tsmc.foreign_sell, 12_634_166.0);
        assert_eq!(tsmc.investment_trust_buy, 1_651_000.0);
        assert_eq!(tsmc.dealer_sell, 438_000.0);
        assert_eq!(tsmc.date, date);
    }

    #[test]
    fn test_non_ok_stat_is_empty_not_error() {
        let report: T86Response =
            serde_json::from_str(r#"{"stat": "很抱歉，沒有符合條件的資料!"}"#).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        assert!(parse_report(&report, date).is_empty());
    }

    #[test]
    fn test_missing_columns_is_empty() {
        let report: T86Response =
            serde_json::from_str(r#"{"stat": "OK", "fields": ["其他"], "data": []}"#).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert!(parse_report(&report, date).is_empty());
    }

    #[test]
    fn test_provider_metadata() {
        let provider = TwseProvider::new();
        assert_eq!(provider.name(), "TWSE");
        assert!(!provider.description().is_empty());
    }
}
