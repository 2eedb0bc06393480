//! Per-ticker collection pipeline and report orchestration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use fundflow_analytics::FundFlowAnalysis;
use fundflow_core::{InsiderDataProvider, Result, Ticker, Transaction};
use fundflow_edgar::EdgarProvider;
use fundflow_store::{DataPaths, IntermediateFiles, ReportWriter};
use serde::Serialize;
use tracing::{info, warn};

/// Builder for [`FundFlowClient`].
#[derive(Debug, Clone)]
pub struct FundFlowClientBuilder {
    user_agent: String,
    data_dir: PathBuf,
    keep_intermediate_files: bool,
}

impl FundFlowClientBuilder {
    /// Starts a builder. The contact e-mail goes into the identifying
    /// user agent every regulator request carries.
    #[must_use]
    pub fn new(contact_email: &str) -> Self {
        Self {
            user_agent: format!("fundflow/0.1 ({contact_email})"),
            data_dir: PathBuf::from("data"),
            keep_intermediate_files: false,
        }
    }

    /// Sets the data root (default `data`).
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Keeps per-view intermediate reports on disk after the run
    /// (default: they are deleted when the run handle drops).
    #[must_use]
    pub fn keep_intermediate_files(mut self, keep: bool) -> Self {
        self.keep_intermediate_files = keep;
        self
    }

    /// Bootstraps the directory layout and builds the client.
    pub fn build(self) -> Result<FundFlowClient> {
        let paths = DataPaths::new(&self.data_dir);
        paths.ensure()?;
        let edgar = EdgarProvider::new(&self.user_agent, &paths.downloads)?;
        let reports = ReportWriter::new(&paths.us_market)?;
        Ok(FundFlowClient {
            edgar,
            reports,
            paths,
            keep_intermediate_files: self.keep_intermediate_files,
        })
    }
}

/// The collection pipeline: providers, directory layout, and report
/// writers behind one entry point.
#[derive(Debug)]
pub struct FundFlowClient {
    edgar: EdgarProvider,
    reports: ReportWriter,
    paths: DataPaths,
    keep_intermediate_files: bool,
}

/// Result of one insider-flow collection run.
#[derive(Debug)]
pub struct InsiderFlowRun {
    /// Every transaction extracted this run, across all tickers.
    pub transactions: Vec<Transaction>,
    /// The aggregate views, or `None` when nothing was extracted.
    pub analysis: Option<FundFlowAnalysis>,
    /// Tickers whose whole pipeline failed, with the reason.
    pub failed_tickers: Vec<(Ticker, String)>,
    /// Every report written this run.
    pub report_paths: Vec<PathBuf>,
    /// Disposal handle for the run's intermediate files.
    pub intermediate: IntermediateFiles,
}

impl FundFlowClient {
    /// The directory layout this client works under.
    #[must_use]
    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// The underlying filings provider.
    #[must_use]
    pub fn edgar(&self) -> &EdgarProvider {
        &self.edgar
    }

    /// Collects insider transactions for each ticker, aggregates the
    /// fund-flow views, and writes the reports.
    ///
    /// Tickers are processed sequentially and independently: a failure
    /// aborts only its own ticker and is reported in
    /// [`InsiderFlowRun::failed_tickers`]. With `force_update` false, a
    /// ticker whose documents are already on disk is re-extracted from
    /// the download directory instead of re-fetched.
    pub async fn collect_insider_flows(
        &self,
        tickers: &[Ticker],
        filings_per_ticker: usize,
        force_update: bool,
    ) -> Result<InsiderFlowRun> {
        let mut transactions = Vec::new();
        let mut failed_tickers = Vec::new();

        for ticker in tickers {
            let resumable = !force_update && self.edgar.downloads().has_documents_for(ticker)?;
            let result = if resumable {
                info!(ticker = %ticker, "reusing completed downloads");
                fundflow_edgar::extract_for_ticker(self.edgar.downloads(), ticker)
            } else {
                self.edgar
                    .fetch_insider_transactions(ticker, filings_per_ticker)
                    .await
            };

            match result {
                Ok(rows) => {
                    if rows.is_empty() {
                        info!(ticker = %ticker, "no transactions extracted");
                    }
                    transactions.extend(rows);
                }
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "ticker pipeline failed");
                    failed_tickers.push((ticker.clone(), e.to_string()));
                }
            }
        }

        let analysis = FundFlowAnalysis::from_transactions(&transactions);
        let mut intermediate = IntermediateFiles::new();
        let report_paths = match &analysis {
            Some(analysis) => self.write_analysis(analysis, &mut intermediate)?,
            None => Vec::new(),
        };
        if self.keep_intermediate_files {
            intermediate.keep();
        }

        Ok(InsiderFlowRun {
            transactions,
            analysis,
            failed_tickers,
            report_paths,
            intermediate,
        })
    }

    /// Writes the per-view CSV projections (tracked as intermediates)
    /// and the consolidated JSON report (always kept).
    fn write_analysis(
        &self,
        analysis: &FundFlowAnalysis,
        intermediate: &mut IntermediateFiles,
    ) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();

        macro_rules! view_csv {
            ($name:literal, $rows:expr) => {{
                let path = self.reports.write_csv($name, $rows)?;
                intermediate.track(&path);
                paths.push(path);
            }};
        }

        view_csv!("form4_company_flow", &analysis.company_flow);
        view_csv!("form4_monthly_flow", &analysis.monthly_flow);
        view_csv!("form4_company_monthly_flow", &analysis.company_monthly_flow);
        view_csv!("form4_cumulative_flow", &analysis.cumulative_flow);
        view_csv!("form4_trend_flow", &analysis.trend_flow);
        view_csv!("form4_confidence", &analysis.confidence);
        view_csv!("form4_recent_change", &analysis.recent_change);

        paths.push(self.reports.write_json("form4_fund_flow_report", analysis)?);
        Ok(paths)
    }

    /// Builds and writes the per-ticker summary report.
    pub fn write_ticker_summary(
        &self,
        transactions: &[Transaction],
    ) -> Result<(Vec<TickerSummaryRow>, PathBuf)> {
        let summary = ticker_summary(transactions);
        let path = self.reports.write_csv("form4_ticker_summary", &summary)?;
        Ok((summary, path))
    }

    /// Collects Taiwan institutional-investor flows over a date range
    /// and writes the CSV projection.
    #[cfg(feature = "twse")]
    pub async fn collect_institutional_flows(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(Vec<fundflow_core::InstitutionalFlow>, PathBuf)> {
        use fundflow_core::InstitutionalDataProvider;

        let provider = fundflow_twse::TwseProvider::new();
        let flows = provider.fetch_range(start, end).await?;
        let writer = ReportWriter::new(&self.paths.tw_market)?;
        let path = writer.write_csv("institutional_investors", &flows)?;
        Ok((flows, path))
    }

    /// Collects the supplementary market fund-flow bundle.
    #[cfg(feature = "yahoo")]
    pub async fn collect_market_flows(
        &self,
        tickers: &[Ticker],
        days: u32,
    ) -> Result<MarketFlowBundle> {
        let provider = fundflow_yahoo::YahooMarketProvider::new();

        let etf_flows = provider.fetch_etf_fund_flows(&[], days).await?;
        let sector_flows = provider.fetch_sector_fund_flows(days).await?;
        let market_breadth = provider.fetch_market_breadth(days).await?;

        let mut holders = Vec::new();
        for ticker in tickers {
            match provider.fetch_institutional_holders(ticker).await {
                Ok(rows) => holders.extend(rows),
                Err(e) => warn!(ticker = %ticker, error = %e, "skipping holders"),
            }
        }
        if !holders.is_empty() {
            self.reports.write_csv("institutional_holders", &holders)?;
        }

        Ok(MarketFlowBundle {
            etf_flows,
            sector_flows,
            market_breadth,
            holders,
        })
    }
}

/// Supplementary market fund-flow data for one collection run.
#[cfg(feature = "yahoo")]
#[derive(Debug)]
pub struct MarketFlowBundle {
    /// Per-ETF daily fund flows.
    pub etf_flows: polars::prelude::DataFrame,
    /// Flows rolled up by (date, sector).
    pub sector_flows: polars::prelude::DataFrame,
    /// Major-index daily returns.
    pub market_breadth: polars::prelude::DataFrame,
    /// Institutional holders of the requested tickers.
    pub holders: Vec<fundflow_yahoo::InstitutionalHolder>,
}

/// One row of the per-ticker activity summary.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TickerSummaryRow {
    /// Ticker.
    pub ticker: Ticker,
    /// Number of transaction records.
    pub total_records: usize,
    /// Earliest transaction date.
    pub earliest_transaction: NaiveDate,
    /// Latest transaction date.
    pub latest_transaction: NaiveDate,
    /// Number of distinct calendar months with activity.
    pub months_with_activity: usize,
    /// Average records per active month, rounded to two decimals.
    pub activity_level: f64,
    /// Days between the earliest and latest transaction.
    pub date_range_days: i64,
}

/// Summarizes per-ticker activity over a transaction set.
#[must_use]
pub fn ticker_summary(transactions: &[Transaction]) -> Vec<TickerSummaryRow> {
    let mut per_ticker: BTreeMap<Ticker, Vec<&Transaction>> = BTreeMap::new();
    for tx in transactions {
        per_ticker.entry(tx.ticker.clone()).or_default().push(tx);
    }

    per_ticker
        .into_iter()
        .filter_map(|(ticker, txs)| {
            let earliest = txs.iter().map(|tx| tx.transaction_date).min()?;
            let latest = txs.iter().map(|tx| tx.transaction_date).max()?;
            let months: std::collections::BTreeSet<_> =
                txs.iter().map(|tx| tx.year_month()).collect();
            let activity = txs.len() as f64 / months.len() as f64;
            Some(TickerSummaryRow {
                ticker,
                total_records: txs.len(),
                earliest_transaction: earliest,
                latest_transaction: latest,
                months_with_activity: months.len(),
                activity_level: (activity * 100.0).round() / 100.0,
                date_range_days: (latest - earliest).num_days(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundflow_core::Ticker;

    fn tx(ticker: &str, date: &str) -> Transaction {
        Transaction::new(
            Ticker::new(ticker),
            "Doe Jane",
            "0000000001",
            "Common Stock",
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            "P",
            10.0,
            5.0,
        )
    }

    #[test]
    fn test_ticker_summary() {
        let transactions = vec![
            tx("AAPL", "2024-01-05"),
            tx("AAPL", "2024-01-20"),
            tx("AAPL", "2024-03-01"),
            tx("MSFT", "2024-02-14"),
        ];
        let summary = ticker_summary(&transactions);
        assert_eq!(summary.len(), 2);

        let aapl = &summary[0];
        assert_eq!(aapl.ticker, Ticker::new("AAPL"));
        assert_eq!(aapl.total_records, 3);
        assert_eq!(aapl.months_with_activity, 2);
        assert_eq!(aapl.activity_level, 1.5);
        assert_eq!(aapl.date_range_days, 56);

        let msft = &summary[1];
        assert_eq!(msft.total_records, 1);
        assert_eq!(msft.date_range_days, 0);
    }

    #[test]
    fn test_ticker_summary_empty() {
        assert!(ticker_summary(&[]).is_empty());
    }

    #[test]
    fn test_builder_defaults() {
        let builder = FundFlowClientBuilder::new("contact@example.com");
        assert!(builder.user_agent.contains("contact@example.com"));
        assert!(!builder.keep_intermediate_files);
    }
}
