#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fundflow-rs/fundflow/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Unified collection pipeline for insider and institutional fund-flow data.
//!
//! This crate re-exports the workspace's types and providers and adds the
//! [`FundFlowClient`] orchestration. Feature flags select the optional
//! providers:
//!
//! - `twse` - Taiwan Stock Exchange institutional-investor flows
//! - `yahoo` - ETF/sector fund flows and institutional holdings
//! - `store-sqlite` - SQLite passthrough persistence
//!
//! # Example
//!
//! ```rust,ignore
//! use fundflow::{FundFlowClientBuilder, Ticker};
//!
//! #[tokio::main]
//! async fn main() -> fundflow::Result<()> {
//!     let client = FundFlowClientBuilder::new("contact@example.com").build()?;
//!     let tickers = [Ticker::new("AAPL"), Ticker::new("MSFT")];
//!     let run = client.collect_insider_flows(&tickers, 10, false).await?;
//!
//!     if let Some(analysis) = &run.analysis {
//!         for row in &analysis.cumulative_flow {
//!             println!("{}: net {}", row.ticker, row.net_flow);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use fundflow_core::*;

// Aggregation views
pub use fundflow_analytics::{
    CompanyFlowRow, CompanyMonthlyFlowRow, ConfidenceRow, CumulativeFlowRow, FundFlowAnalysis,
    MonthlyFlowRow, RecentChangeRow, TrendFlowRow,
};

// Providers
pub use fundflow_edgar::EdgarProvider;
#[cfg(feature = "twse")]
pub use fundflow_twse::TwseProvider;
#[cfg(feature = "yahoo")]
pub use fundflow_yahoo::YahooMarketProvider;

// Persistence and reports
#[cfg(feature = "store-sqlite")]
pub use fundflow_store::FlowStore;
pub use fundflow_store::{DataPaths, IntermediateFiles, ReportWriter};

mod pipeline;
#[cfg(feature = "yahoo")]
pub use pipeline::MarketFlowBundle;
pub use pipeline::{
    FundFlowClient, FundFlowClientBuilder, InsiderFlowRun, TickerSummaryRow, ticker_summary,
};
