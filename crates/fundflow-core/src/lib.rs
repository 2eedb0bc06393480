#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fundflow-rs/fundflow/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for disclosure and fund-flow data.
//!
//! This crate provides the foundational abstractions for the workspace:
//!
//! - [`DataProvider`](provider::DataProvider) - Base trait for all providers
//! - [`InsiderDataProvider`](provider::InsiderDataProvider) - Insider-transaction filings
//! - [`InstitutionalDataProvider`](provider::InstitutionalDataProvider) - Exchange institutional flows
//! - [`MarketFlowProvider`](provider::MarketFlowProvider) - Supplementary market fund flows
//! - [`Transaction`](types::Transaction) and friends - the shared data model

/// Error types for collection and aggregation operations.
pub mod error;
/// Provider traits for fetching disclosure and market data.
pub mod provider;
/// Core data types (Ticker, Cik, Transaction, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use error::{FlowError, Result};
pub use provider::{
    DataProvider, InsiderDataProvider, InstitutionalDataProvider, MarketFlowProvider,
};
pub use types::{
    Cik, DownloadRecord, FilingReference, InstitutionalFlow, Ticker, Transaction, TransactionSide,
    YearMonth,
};
