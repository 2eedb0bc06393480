#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fundflow-rs/fundflow/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Yahoo Finance provider for supplementary market fund-flow data.
//!
//! # Example
//!
//! ```no_run
//! use fundflow_yahoo::YahooMarketProvider;
//! use fundflow_core::{MarketFlowProvider, Ticker};
//!
//! # async fn example() -> fundflow_core::Result<()> {
//! let provider = YahooMarketProvider::new();
//! let tickers = [Ticker::new("SPY"), Ticker::new("QQQ")];
//! let flows = provider.fetch_fund_flows(&tickers, 30).await?;
//! println!("{} rows", flows.height());
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use fundflow_core::{DataProvider, FlowError, MarketFlowProvider, Result, Ticker};
use polars::prelude::*;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Yahoo Finance chart API base URL.
const CHART_API_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance quote summary API base URL.
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";

/// Default rate limit delay in milliseconds.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Default ETF basket for market-wide fund flows.
pub const DEFAULT_ETF_BASKET: &[&str] = &[
    "SPY", // S&P 500
    "QQQ", // NASDAQ 100
    "IWM", // Russell 2000
    "DIA", // Dow Jones Industrial Average
    "XLF", // Financials
    "XLK", // Technology
    "XLE", // Energy
    "XLV", // Health Care
    "XLI", // Industrials
    "XLP", // Consumer Staples
];

/// Sector ETFs and their sector labels.
pub const SECTOR_ETFS: &[(&str, &str)] = &[
    ("XLF", "Financials"),
    ("XLK", "Technology"),
    ("XLE", "Energy"),
    ("XLV", "Health Care"),
    ("XLI", "Industrials"),
    ("XLP", "Consumer Staples"),
    ("XLY", "Consumer Discretionary"),
    ("XLB", "Materials"),
    ("XLU", "Utilities"),
    ("XLRE", "Real Estate"),
];

/// Major indices used for market breadth.
pub const MARKET_INDICES: &[(&str, &str)] = &[
    ("^GSPC", "S&P 500"),
    ("^NDX", "NASDAQ 100"),
    ("^RUT", "Russell 2000"),
    ("^DJI", "Dow Jones"),
];

/// One institutional holder of a company, from the quote summary API.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct InstitutionalHolder {
    /// Ticker of the held company.
    pub ticker: Ticker,
    /// Holding organization.
    pub organization: String,
    /// Date of the holding report.
    pub report_date: Option<NaiveDate>,
    /// Fraction of the company held.
    pub pct_held: Option<f64>,
    /// Number of shares held.
    pub position: Option<f64>,
    /// Market value of the position.
    pub value: Option<f64>,
}

/// Yahoo Finance market fund-flow provider.
#[derive(Debug)]
pub struct YahooMarketProvider {
    client: reqwest::Client,
    rate_limit_ms: u64,
    last_request_time: AtomicU64,
}

impl YahooMarketProvider {
    /// Creates a provider with the default 1 request/second limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rate_limit(Duration::from_millis(DEFAULT_RATE_LIMIT_MS))
    }

    /// Creates a provider with a custom rate limit.
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

    /// Fetches chart data for one symbol over the trailing `days` window.
    async fn fetch_chart(&self, symbol: &str, days: u32) -> Result<ChartData> {
        self.apply_rate_limit().await;

        let end = Utc::now().timestamp();
        let start = end - i64::from(days) * 86_400;
        let url = format!(
            "{CHART_API_URL}/{symbol}?period1={start}&period2={end}&interval=1d&includeAdjustedClose=true"
        );
        debug!("Fetching chart: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FlowError::Upstream(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FlowError::RateLimited {
                src: "Yahoo Finance".to_string(),
                retry_after: Some(Duration::from_secs(60)),
            });
        }

        if !response.status().is_success() {
            return Err(FlowError::Upstream(format!(
                "HTTP {} for {symbol}",
                response.status()
            )));
        }

        let chart: ChartResponse = response
            .json()
            .await
            .map_err(|e| FlowError::Parse(e.to_string()))?;

        chart
            .chart
            .result
            .into_iter()
            .next()
            .ok_or_else(|| FlowError::Upstream(format!("Empty chart result for {symbol}")))
    }

    /// Builds the per-day fund-flow frame for one symbol.
    ///
    /// Columns: date, ticker, open, high, low, close, volume, fund_flow,
    /// fund_flow_normalized, where `fund_flow = (close - open) * volume`.
    fn fund_flow_frame(&self, symbol: &str, chart: &ChartData) -> Result<DataFrame> {
        let timestamps = chart.timestamp.clone().unwrap_or_default();
        if timestamps.is_empty() {
            return Err(FlowError::NoData);
        }
        let quote = chart
            .indicators
            .quote
            .first()
            .ok_or_else(|| FlowError::Parse("Missing quote data".to_string()))?;

        let dates: Vec<i32> = timestamps
            .iter()
            .map(|&ts| {
                Utc.timestamp_opt(ts, 0)
                    .single()
                    .map(|dt| dt.date_naive())
                    .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
            })
            .map(|d| (d - NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()).num_days() as i32)
            .collect();

        let n = dates.len();
        let opens = &quote.open;
        let closes = &quote.close;
        let volumes = &quote.volume;

        let mut fund_flows: Vec<Option<f64>> = Vec::with_capacity(n);
        let mut normalized: Vec<Option<f64>> = Vec::with_capacity(n);
        for i in 0..n {
            let flow = match (
                opens.get(i).copied().flatten(),
                closes.get(i).copied().flatten(),
                volumes.get(i).copied().flatten(),
            ) {
                (Some(open), Some(close), Some(volume)) => {
                    Some((close - open) * volume as f64)
                }
                _ => None,
            };
            fund_flows.push(flow);
            normalized.push(match (flow, closes.get(i).copied().flatten()) {
                (Some(flow), Some(close)) if close != 0.0 => Some(flow / close),
                _ => None,
            });
        }

        let date_col = Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| FlowError::Other(e.to_string()))?;

        DataFrame::new(vec![
            date_col,
            Column::new("ticker".into(), vec![symbol; n]),
            Column::new("open".into(), quote.open.clone()),
            Column::new("high".into(), quote.high.clone()),
            Column::new("low".into(), quote.low.clone()),
            Column::new("close".into(), quote.close.clone()),
            Column::new("volume".into(), quote.volume.clone()),
            Column::new("fund_flow".into(), fund_flows),
            Column::new("fund_flow_normalized".into(), normalized),
        ])
        .map_err(|e| FlowError::Other(e.to_string()))
    }

    /// Fetches fund flows for an ETF basket (the default basket when
    /// `tickers` is empty). Symbols that fail are skipped with a warning.
    pub async fn fetch_etf_fund_flows(&self, tickers: &[Ticker], days: u32) -> Result<DataFrame> {
        let symbols: Vec<String> = if tickers.is_empty() {
            DEFAULT_ETF_BASKET.iter().map(|s| (*s).to_string()).collect()
        } else {
            tickers.iter().map(|t| t.as_str().to_string()).collect()
        };

        let mut frames = Vec::with_capacity(symbols.len());
        for symbol in &symbols {
            match self.fetch_chart(symbol, days).await {
                Ok(chart) => match self.fund_flow_frame(symbol, &chart) {
                    Ok(frame) => frames.push(frame),
                    Err(e) => warn!(symbol = %symbol, error = %e, "skipping symbol"),
                },
                Err(e) => warn!(symbol = %symbol, error = %e, "skipping symbol"),
            }
        }

        if frames.is_empty() {
            return Ok(DataFrame::empty());
        }

        concat(
            frames
                .iter()
                .map(|df| df.clone().lazy())
                .collect::<Vec<_>>(),
            UnionArgs::default(),
        )
        .map_err(|e| FlowError::Other(e.to_string()))?
        .collect()
        .map_err(|e| FlowError::Other(e.to_string()))
    }

    /// Fetches sector fund flows: the sector-ETF basket's flows rolled
    /// up by (date, sector).
    pub async fn fetch_sector_fund_flows(&self, days: u32) -> Result<DataFrame> {
        let tickers: Vec<Ticker> = SECTOR_ETFS.iter().map(|(s, _)| Ticker::new(*s)).collect();
        let mut flows = self.fetch_etf_fund_flows(&tickers, days).await?;
        if flows.height() == 0 {
            return Ok(flows);
        }

        let sectors: Vec<Option<String>> = flows
            .column("ticker")
            .map_err(|e| FlowError::Other(e.to_string()))?
            .str()
            .map_err(|e| FlowError::Other(e.to_string()))?
            .into_iter()
            .map(|ticker| {
                ticker.and_then(|t| {
                    SECTOR_ETFS
                        .iter()
                        .find(|(symbol, _)| *symbol == t)
                        .map(|(_, sector)| (*sector).to_string())
                })
            })
            .collect();

        flows
            .with_column(Column::new("sector".into(), sectors))
            .map_err(|e| FlowError::Other(e.to_string()))?;

        flows
            .lazy()
            .group_by([col("date"), col("sector")])
            .agg([
                col("fund_flow").sum(),
                col("fund_flow_normalized").sum(),
                col("volume").sum(),
                col("close").mean(),
            ])
            .sort(["date", "sector"], Default::default())
            .collect()
            .map_err(|e| FlowError::Other(e.to_string()))
    }

    /// Fetches the institutional holders of one company.
    pub async fn fetch_institutional_holders(
        &self,
        ticker: &Ticker,
    ) -> Result<Vec<InstitutionalHolder>> {
        self.apply_rate_limit().await;

        let url = format!(
            "{QUOTE_SUMMARY_URL}/{}?modules=institutionOwnership",
            ticker.as_str()
        );
        debug!("Fetching institutional holders: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FlowError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FlowError::Upstream(format!(
                "HTTP {} for {ticker}",
                response.status()
            )));
        }

        let summary: QuoteSummaryResponse = response
            .json()
            .await
            .map_err(|e| FlowError::Parse(e.to_string()))?;

        let holders = summary
            .quote_summary
            .result
            .into_iter()
            .next()
            .and_then(|r| r.institution_ownership)
            .map(|o| o.ownership_list)
            .unwrap_or_default();

        Ok(holders
            .into_iter()
            .map(|h| InstitutionalHolder {
                ticker: ticker.clone(),
                organization: h.organization,
                report_date: h.report_date.and_then(|d| d.raw).and_then(|ts| {
                    Utc.timestamp_opt(ts, 0).single().map(|dt| dt.date_naive())
                }),
                pct_held: h.pct_held.and_then(|v| v.raw),
                position: h.position.and_then(|v| v.raw),
                value: h.value.and_then(|v| v.raw),
            })
            .collect())
    }

    /// Fetches market breadth for the major indices: daily closes,
    /// volumes, and percent returns.
    pub async fn fetch_market_breadth(&self, days: u32) -> Result<DataFrame> {
        let mut frames = Vec::with_capacity(MARKET_INDICES.len());
        for (symbol, name) in MARKET_INDICES {
            let chart = match self.fetch_chart(symbol, days).await {
                Ok(chart) => chart,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "skipping index");
                    continue;
                }
            };
            match self.breadth_frame(symbol, name, &chart) {
                Ok(frame) => frames.push(frame),
                Err(e) => warn!(symbol = %symbol, error = %e, "skipping index"),
            }
        }

        if frames.is_empty() {
            return Ok(DataFrame::empty());
        }

        concat(
            frames
                .iter()
                .map(|df| df.clone().lazy())
                .collect::<Vec<_>>(),
            UnionArgs::default(),
        )
        .map_err(|e| FlowError::Other(e.to_string()))?
        .collect()
        .map_err(|e| FlowError::Other(e.to_string()))
    }

    /// Builds the market-breadth frame for one index.
    fn breadth_frame(&self, symbol: &str, name: &str, chart: &ChartData) -> Result<DataFrame> {
        let timestamps = chart.timestamp.clone().unwrap_or_default();
        if timestamps.is_empty() {
            return Err(FlowError::NoData);
        }
        let quote = chart
            .indicators
            .quote
            .first()
            .ok_or_else(|| FlowError::Parse("Missing quote data".to_string()))?;

        let dates: Vec<i32> = timestamps
            .iter()
            .map(|&ts| {
                Utc.timestamp_opt(ts, 0)
                    .single()
                    .map(|dt| dt.date_naive())
                    .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
            })
            .map(|d| (d - NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()).num_days() as i32)
            .collect();

        let closes = &quote.close;
        let mut daily_returns: Vec<Option<f64>> = Vec::with_capacity(closes.len());
        let mut previous: Option<f64> = None;
        for close in closes {
            daily_returns.push(match (previous, close) {
                (Some(prev), Some(close)) if prev != 0.0 => Some((close / prev - 1.0) * 100.0),
                _ => None,
            });
            if close.is_some() {
                previous = *close;
            }
        }

        let n = dates.len();
        let date_col = Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| FlowError::Other(e.to_string()))?;

        DataFrame::new(vec![
            date_col,
            Column::new("index_symbol".into(), vec![symbol; n]),
            Column::new("index_name".into(), vec![name; n]),
            Column::new("close".into(), quote.close.clone()),
            Column::new("volume".into(), quote.volume.clone()),
            Column::new("daily_return".into(), daily_returns),
        ])
        .map_err(|e| FlowError::Other(e.to_string()))
    }
}

impl Default for YahooMarketProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DataProvider for YahooMarketProvider {
    fn name(&self) -> &str {
        "Yahoo Finance"
    }

    fn description(&self) -> &str {
        "Yahoo Finance provider for ETF/sector fund flows and institutional holdings"
    }
}

#[async_trait]
impl MarketFlowProvider for YahooMarketProvider {
    async fn fetch_fund_flows(&self, tickers: &[Ticker], days: u32) -> Result<DataFrame> {
        self.fetch_etf_fund_flows(tickers, days).await
    }
}

// ============================================================================
// Yahoo Finance API Response Types
// ============================================================================

/// Chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Vec<ChartData>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

/// Quote Summary API response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: QuoteSummaryResult,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResult {
    result: Vec<QuoteSummaryData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryData {
    institution_ownership: Option<InstitutionOwnership>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstitutionOwnership {
    #[serde(default)]
    ownership_list: Vec<OwnershipEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnershipEntry {
    organization: String,
    report_date: Option<RawValue<i64>>,
    pct_held: Option<RawValue<f64>>,
    position: Option<RawValue<f64>>,
    value: Option<RawValue<f64>>,
}

/// Yahoo's `{raw, fmt}` value wrapper.
#[derive(Debug, Deserialize)]
struct RawValue<T> {
    raw: Option<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chart() -> ChartData {
        serde_json::from_str(
            r#"{
                "timestamp": [1704412800, 1704499200, 1704758400],
                "indicators": {
                    "quote": [{
                        "open":   [470.0, 468.0, 472.0],
                        "high":   [474.0, 471.0, 475.0],
                        "low":    [469.0, 466.0, 471.0],
                        "close":  [472.5, 467.0, 474.0],
                        "volume": [1000000, 1200000, 900000]
                    }]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_fund_flow_frame_columns_and_values() {
        let provider = YahooMarketProvider::new();
        let frame = provider.fund_flow_frame("SPY", &sample_chart()).unwrap();
        assert_eq!(frame.height(), 3);
        let names: Vec<&str> = frame
            .get_column_names()
            .iter()
            .map(|s| s.as_str())
            .collect();
        assert!(names.contains(&"fund_flow"));
        assert!(names.contains(&"fund_flow_normalized"));

        // (472.5 - 470.0) * 1_000_000
        let flow = frame
            .column("fund_flow")
            .unwrap()
            .f64()
            .unwrap()
            .get(0)
            .unwrap();
        assert!((flow - 2_500_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_breadth_frame_daily_returns() {
        let provider = YahooMarketProvider::new();
        let frame = provider
            .breadth_frame("^GSPC", "S&P 500", &sample_chart())
            .unwrap();
        let returns = frame.column("daily_return").unwrap().f64().unwrap();
        assert!(returns.get(0).is_none());
        // 467.0 / 472.5 - 1
        let second = returns.get(1).unwrap();
        assert!((second - (467.0 / 472.5 - 1.0) * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_sector_map_covers_basket() {
        for (symbol, sector) in SECTOR_ETFS {
            assert!(!symbol.is_empty());
            assert!(!sector.is_empty());
        }
        assert_eq!(SECTOR_ETFS.len(), 10);
    }

    #[test]
    fn test_provider_metadata() {
        let provider = YahooMarketProvider::new();
        assert_eq!(provider.name(), "Yahoo Finance");
        assert!(!provider.description().is_empty());
    }
}
