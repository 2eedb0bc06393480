//! Provider traits for fetching disclosure and market data.
//!
//! This module defines the core provider traits:
//!
//! - [`DataProvider`] - Base trait for all data providers
//! - [`InsiderDataProvider`] - Insider-transaction filings from a regulator
//! - [`InstitutionalDataProvider`] - Exchange institutional-investor flows
//! - [`MarketFlowProvider`] - Supplementary market fund-flow frames

use async_trait::async_trait;
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use std::fmt::Debug;

use crate::{
    error::Result,
    types::{Cik, FilingReference, InstitutionalFlow, Ticker, Transaction},
};

/// Base trait for all data providers.
pub trait DataProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "SEC EDGAR").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;
}

/// Provider for insider-transaction filings.
///
/// The three operations form the dependent front half of the pipeline
/// and must be called sequentially for the same ticker: resolve the
/// identifier, enumerate filings, then fetch and extract.
#[async_trait]
pub trait InsiderDataProvider: DataProvider {
    /// Resolves a ticker to the regulator's numeric company identifier.
    ///
    /// Fails with [`crate::FlowError::TickerNotFound`] when the symbol has no
    /// entry in the identifier index and with
    /// [`crate::FlowError::Upstream`] when the index cannot be retrieved
    /// or parsed. No retry is attempted internally.
    async fn resolve(&self, ticker: &Ticker) -> Result<Cik>;

    /// Lists up to `max_count` filings of `filing_type`, newest first.
    ///
    /// A company with no matching filings yields an empty sequence, not
    /// an error.
    async fn list_filings(
        &self,
        ticker: &Ticker,
        cik: &Cik,
        filing_type: &str,
        max_count: usize,
    ) -> Result<Vec<FilingReference>>;

    /// Runs the full per-ticker pipeline and returns the normalized
    /// transaction records from up to `max_filings` filings.
    ///
    /// A filing that fails to download or extract is skipped; the
    /// remaining filings for the ticker continue.
    async fn fetch_insider_transactions(
        &self,
        ticker: &Ticker,
        max_filings: usize,
    ) -> Result<Vec<Transaction>>;
}

/// Provider for exchange institutional-investor daily flows.
#[async_trait]
pub trait InstitutionalDataProvider: DataProvider {
    /// Fetches one trading day of flows for all listed stocks.
    ///
    /// A day the exchange reports no data for (holiday, weekend) yields
    /// an empty Vec.
    async fn fetch_daily(&self, date: NaiveDate) -> Result<Vec<InstitutionalFlow>>;

    /// Fetches a date range, skipping weekends and failed days.
    async fn fetch_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<InstitutionalFlow>>;
}

/// Provider for supplementary market fund-flow data.
///
/// Results cross the boundary as DataFrames with a fixed column schema,
/// ready for projection to reports.
#[async_trait]
pub trait MarketFlowProvider: DataProvider {
    /// Fetches per-ticker daily fund flows over the trailing `days` window.
    ///
    /// Returns a DataFrame with columns: date, ticker, open, high, low,
    /// close, volume, fund_flow, fund_flow_normalized.
    async fn fetch_fund_flows(&self, tickers: &[Ticker], days: u32) -> Result<DataFrame>;
}
