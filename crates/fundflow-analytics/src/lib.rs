#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fundflow-rs/fundflow/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Fund-flow aggregation over normalized insider transactions.
//!
//! [`FundFlowAnalysis::from_transactions`] recomputes the full view
//! family from an immutable transaction slice on every invocation:
//!
//! 1. [`CompanyFlowRow`] - per (ticker, side) value/share sums
//! 2. [`MonthlyFlowRow`] / [`CompanyMonthlyFlowRow`] - calendar-month groupings,
//!    the latter pivoted into BUY/SELL columns with `NET_FLOW = BUY - SELL`
//! 3. [`CumulativeFlowRow`] - lifetime sums per ticker
//! 4. [`TrendFlowRow`] - running cumulative sum in chronological order
//! 5. [`ConfidenceRow`] - BUY/SELL ratio, `+inf` when there are no sells
//! 6. [`RecentChangeRow`] - net-flow delta across the two most recent months
//!
//! Groupings use ordered maps so every view comes out in a deterministic
//! order, and the trend is a strict prefix-sum: ties in transaction date
//! keep their input order.

use std::collections::{BTreeMap, BTreeSet};

use fundflow_core::{Ticker, Transaction, TransactionSide, YearMonth};
use serde::{Serialize, Serializer};

/// Per-(ticker, side) flow totals.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompanyFlowRow {
    /// Ticker.
    pub ticker: Ticker,
    /// Buy or sell side.
    pub side: TransactionSide,
    /// Sum of transaction values.
    pub total_value: f64,
    /// Sum of transacted shares.
    pub shares: f64,
}

/// Per-(month, side) flow totals across all companies.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthlyFlowRow {
    /// Calendar month.
    pub month: YearMonth,
    /// Buy or sell side.
    pub side: TransactionSide,
    /// Sum of transaction values.
    pub total_value: f64,
    /// Sum of transacted shares.
    pub shares: f64,
}

/// Per-(ticker, month) pivot with buy and sell columns.
///
/// A month with activity on only one side carries 0 on the other.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompanyMonthlyFlowRow {
    /// Ticker.
    pub ticker: Ticker,
    /// Calendar month.
    pub month: YearMonth,
    /// Total buy value in the month.
    pub buy: f64,
    /// Total sell value in the month.
    pub sell: f64,
    /// `buy - sell`.
    pub net_flow: f64,
}

/// Lifetime flow totals per ticker.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CumulativeFlowRow {
    /// Ticker.
    pub ticker: Ticker,
    /// Lifetime buy value.
    pub buy: f64,
    /// Lifetime sell value.
    pub sell: f64,
    /// `buy - sell`.
    pub net_flow: f64,
}

/// One point of the chronological cumulative-flow trend for a ticker.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrendFlowRow {
    /// Ticker.
    pub ticker: Ticker,
    /// Transaction date of this point.
    pub transaction_date: chrono::NaiveDate,
    /// Signed flow of the transaction: positive buys, negative sells.
    pub signed_flow: f64,
    /// Running cumulative sum up to and including this point.
    pub cumulative_flow: f64,
}

/// Insider-confidence ratio per ticker.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfidenceRow {
    /// Ticker.
    pub ticker: Ticker,
    /// `buy / sell`; `+inf` when the ticker has no sell-side value.
    #[serde(serialize_with = "serialize_sentinel")]
    pub confidence: f64,
}

/// Net-flow change across the two most recent months in the data set.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecentChangeRow {
    /// Ticker.
    pub ticker: Ticker,
    /// The earlier of the two months.
    pub earlier_month: YearMonth,
    /// The later of the two months.
    pub later_month: YearMonth,
    /// Net flow in the earlier month (0 when the ticker was inactive).
    pub earlier_net_flow: f64,
    /// Net flow in the later month (0 when the ticker was inactive).
    pub later_net_flow: f64,
    /// `later - earlier`.
    pub change: f64,
    /// `change / earlier * 100`; `+inf` when the earlier value is 0.
    #[serde(serialize_with = "serialize_sentinel")]
    pub change_pct: f64,
}

/// The full derived-view family for one analysis invocation.
///
/// Owned by the caller; recomputed in full from the current transaction
/// set each time, never updated incrementally.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FundFlowAnalysis {
    /// Per-(ticker, side) totals.
    pub company_flow: Vec<CompanyFlowRow>,
    /// Per-(month, side) totals.
    pub monthly_flow: Vec<MonthlyFlowRow>,
    /// Per-(ticker, month) pivot with net flow.
    pub company_monthly_flow: Vec<CompanyMonthlyFlowRow>,
    /// Lifetime totals per ticker.
    pub cumulative_flow: Vec<CumulativeFlowRow>,
    /// Chronological cumulative trend per ticker.
    pub trend_flow: Vec<TrendFlowRow>,
    /// Buy/sell confidence ratio per ticker.
    pub confidence: Vec<ConfidenceRow>,
    /// Month-over-month net-flow change; empty when fewer than two
    /// distinct months exist in the input.
    pub recent_change: Vec<RecentChangeRow>,
}

impl FundFlowAnalysis {
    /// Computes the full view family, or `None` when the input is empty
    /// (the explicit no-data result).
    #[must_use]
    pub fn from_transactions(transactions: &[Transaction]) -> Option<Self> {
        if transactions.is_empty() {
            return None;
        }

        // 1. Group by (ticker, side).
        let mut by_company: BTreeMap<(Ticker, TransactionSide), (f64, f64)> = BTreeMap::new();
        // 2. Group by (month, side) and (ticker, month, side).
        let mut by_month: BTreeMap<(YearMonth, TransactionSide), (f64, f64)> = BTreeMap::new();
        let mut by_company_month: BTreeMap<(Ticker, YearMonth, TransactionSide), (f64, f64)> =
            BTreeMap::new();

        for tx in transactions {
            let month = tx.year_month();
            for (value, shares) in [
                by_company.entry((tx.ticker.clone(), tx.side)).or_default(),
                by_month.entry((month, tx.side)).or_default(),
                by_company_month
                    .entry((tx.ticker.clone(), month, tx.side))
                    .or_default(),
            ] {
                *value += tx.total_value;
                *shares += tx.shares;
            }
        }

        let company_flow = by_company
            .into_iter()
            .map(|((ticker, side), (total_value, shares))| CompanyFlowRow {
                ticker,
                side,
                total_value,
                shares,
            })
            .collect();

        let monthly_flow = by_month
            .into_iter()
            .map(|((month, side), (total_value, shares))| MonthlyFlowRow {
                month,
                side,
                total_value,
                shares,
            })
            .collect();

        // 3. Pivot the company/month grouping into BUY and SELL columns.
        let mut pivot: BTreeMap<(Ticker, YearMonth), (f64, f64)> = BTreeMap::new();
        for ((ticker, month, side), (value, _shares)) in &by_company_month {
            let entry = pivot.entry((ticker.clone(), *month)).or_default();
            match side {
                TransactionSide::Buy => entry.0 += value,
                TransactionSide::Sell => entry.1 += value,
            }
        }
        let company_monthly_flow: Vec<CompanyMonthlyFlowRow> = pivot
            .iter()
            .map(|((ticker, month), (buy, sell))| CompanyMonthlyFlowRow {
                ticker: ticker.clone(),
                month: *month,
                buy: *buy,
                sell: *sell,
                net_flow: buy - sell,
            })
            .collect();

        // 4. Roll the pivot up by ticker.
        let mut rollup: BTreeMap<Ticker, (f64, f64)> = BTreeMap::new();
        for row in &company_monthly_flow {
            let entry = rollup.entry(row.ticker.clone()).or_default();
            entry.0 += row.buy;
            entry.1 += row.sell;
        }
        let cumulative_flow: Vec<CumulativeFlowRow> = rollup
            .into_iter()
            .map(|(ticker, (buy, sell))| CumulativeFlowRow {
                ticker,
                buy,
                sell,
                net_flow: buy - sell,
            })
            .collect();

        // 5. Chronological prefix-sum per ticker; ties keep input order.
        let mut per_ticker: BTreeMap<Ticker, Vec<&Transaction>> = BTreeMap::new();
        for tx in transactions {
            per_ticker.entry(tx.ticker.clone()).or_default().push(tx);
        }
        let mut trend_flow = Vec::with_capacity(transactions.len());
        for (ticker, mut txs) in per_ticker {
            txs.sort_by_key(|tx| tx.transaction_date);
            let mut cumulative = 0.0;
            for tx in txs {
                let signed_flow = tx.signed_flow();
                cumulative += signed_flow;
                trend_flow.push(TrendFlowRow {
                    ticker: ticker.clone(),
                    transaction_date: tx.transaction_date,
                    signed_flow,
                    cumulative_flow: cumulative,
                });
            }
        }

        // 6. Confidence ratio, with the +inf sentinel for sell-free tickers.
        let confidence = cumulative_flow
            .iter()
            .map(|row| ConfidenceRow {
                ticker: row.ticker.clone(),
                confidence: if row.sell == 0.0 {
                    f64::INFINITY
                } else {
                    row.buy / row.sell
                },
            })
            .collect();

        // 7. Net-flow change across the two most recent distinct months
        // (global across all tickers).
        let recent_change = recent_change(&company_monthly_flow);

        Some(Self {
            company_flow,
            monthly_flow,
            company_monthly_flow,
            cumulative_flow,
            trend_flow,
            confidence,
            recent_change,
        })
    }
}

/// Computes the recent-change view from the company/month pivot.
///
/// Empty when fewer than two distinct months exist. Otherwise one row
/// per ticker active in either of the two most recent months, with the
/// inactive month contributing 0.
fn recent_change(pivot: &[CompanyMonthlyFlowRow]) -> Vec<RecentChangeRow> {
    let months: BTreeSet<YearMonth> = pivot.iter().map(|row| row.month).collect();
    let mut recent = months.iter().rev();
    let (Some(&later_month), Some(&earlier_month)) = (recent.next(), recent.next()) else {
        return Vec::new();
    };

    let mut net_by_ticker: BTreeMap<Ticker, (f64, f64)> = BTreeMap::new();
    for row in pivot {
        if row.month == earlier_month {
            net_by_ticker.entry(row.ticker.clone()).or_default().0 += row.net_flow;
        } else if row.month == later_month {
            net_by_ticker.entry(row.ticker.clone()).or_default().1 += row.net_flow;
        }
    }

    net_by_ticker
        .into_iter()
        .map(|(ticker, (earlier_net_flow, later_net_flow))| {
            let change = later_net_flow - earlier_net_flow;
            RecentChangeRow {
                ticker,
                earlier_month,
                later_month,
                earlier_net_flow,
                later_net_flow,
                change,
                change_pct: if earlier_net_flow == 0.0 {
                    f64::INFINITY
                } else {
                    change / earlier_net_flow * 100.0
                },
            }
        })
        .collect()
}

/// Serializes a ratio, writing positive infinity as the string
/// `"Infinity"` so the sentinel survives JSON projection instead of
/// being coerced to null.
fn serialize_sentinel<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_infinite() && value.is_sign_positive() {
        serializer.serialize_str("Infinity")
    } else {
        serializer.serialize_f64(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(ticker: &str, date: &str, code: &str, shares: f64, price: f64) -> Transaction {
        Transaction::new(
            Ticker::new(ticker),
            "Doe Jane",
            "0000000001",
            "Common Stock",
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            code,
            shares,
            price,
        )
    }

    /// The reference scenario: one buy, one sell, two months.
    fn aapl_scenario() -> Vec<Transaction> {
        vec![
            tx("AAPL", "2024-01-05", "P", 100.0, 10.0),
            tx("AAPL", "2024-02-10", "S", 50.0, 12.0),
        ]
    }

    #[test]
    fn test_empty_input_is_no_data() {
        assert!(FundFlowAnalysis::from_transactions(&[]).is_none());
    }

    #[test]
    fn test_reference_scenario() {
        let analysis = FundFlowAnalysis::from_transactions(&aapl_scenario()).unwrap();

        assert_eq!(analysis.company_flow.len(), 2);
        let buy = &analysis.company_flow[0];
        assert_eq!(buy.side, TransactionSide::Buy);
        assert_eq!(buy.total_value, 1000.0);
        let sell = &analysis.company_flow[1];
        assert_eq!(sell.side, TransactionSide::Sell);
        assert_eq!(sell.total_value, 600.0);

        let cumulative = &analysis.cumulative_flow[0];
        assert_eq!(cumulative.buy, 1000.0);
        assert_eq!(cumulative.sell, 600.0);
        assert_eq!(cumulative.net_flow, 400.0);

        let confidence = analysis.confidence[0].confidence;
        assert!((confidence - 1000.0 / 600.0).abs() < 1e-12);

        let trend: Vec<f64> = analysis
            .trend_flow
            .iter()
            .map(|row| row.cumulative_flow)
            .collect();
        assert_eq!(trend, vec![1000.0, 400.0]);
    }

    #[test]
    fn test_cumulative_is_consistent_with_monthly_pivot() {
        let transactions = vec![
            tx("AAPL", "2024-01-05", "P", 100.0, 10.0),
            tx("AAPL", "2024-01-20", "S", 30.0, 11.0),
            tx("AAPL", "2024-02-10", "S", 50.0, 12.0),
            tx("MSFT", "2024-02-14", "P", 10.0, 400.0),
        ];
        let analysis = FundFlowAnalysis::from_transactions(&transactions).unwrap();

        for cumulative in &analysis.cumulative_flow {
            let buy: f64 = analysis
                .company_monthly_flow
                .iter()
                .filter(|row| row.ticker == cumulative.ticker)
                .map(|row| row.buy)
                .sum();
            let sell: f64 = analysis
                .company_monthly_flow
                .iter()
                .filter(|row| row.ticker == cumulative.ticker)
                .map(|row| row.sell)
                .sum();
            assert_eq!(cumulative.buy, buy);
            assert_eq!(cumulative.sell, sell);
            assert_eq!(cumulative.net_flow, buy - sell);
        }
    }

    #[test]
    fn test_trend_final_point_equals_cumulative_net() {
        let transactions = vec![
            tx("AAPL", "2024-01-05", "P", 100.0, 10.0),
            tx("AAPL", "2024-03-01", "S", 20.0, 15.0),
            tx("AAPL", "2024-02-10", "S", 50.0, 12.0),
        ];
        let analysis = FundFlowAnalysis::from_transactions(&transactions).unwrap();
        let last = analysis.trend_flow.last().unwrap();
        assert_eq!(
            last.transaction_date,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert_eq!(last.cumulative_flow, analysis.cumulative_flow[0].net_flow);
    }

    #[test]
    fn test_trend_ties_keep_input_order() {
        let transactions = vec![
            tx("AAPL", "2024-01-05", "P", 1.0, 100.0),
            tx("AAPL", "2024-01-05", "S", 1.0, 40.0),
        ];
        let analysis = FundFlowAnalysis::from_transactions(&transactions).unwrap();
        let signed: Vec<f64> = analysis
            .trend_flow
            .iter()
            .map(|row| row.signed_flow)
            .collect();
        assert_eq!(signed, vec![100.0, -40.0]);
        assert_eq!(analysis.trend_flow[1].cumulative_flow, 60.0);
    }

    #[test]
    fn test_confidence_sentinel_iff_no_sells() {
        let transactions = vec![
            tx("AAPL", "2024-01-05", "P", 100.0, 10.0),
            tx("MSFT", "2024-01-06", "P", 10.0, 400.0),
            tx("MSFT", "2024-01-07", "S", 5.0, 400.0),
        ];
        let analysis = FundFlowAnalysis::from_transactions(&transactions).unwrap();
        let aapl = &analysis.confidence[0];
        assert_eq!(aapl.ticker, Ticker::new("AAPL"));
        assert!(aapl.confidence.is_infinite());
        let msft = &analysis.confidence[1];
        assert!((msft.confidence - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_recent_change_needs_two_months() {
        let transactions = vec![
            tx("AAPL", "2024-01-05", "P", 100.0, 10.0),
            tx("MSFT", "2024-01-06", "S", 10.0, 400.0),
        ];
        let analysis = FundFlowAnalysis::from_transactions(&transactions).unwrap();
        assert!(analysis.recent_change.is_empty());
    }

    #[test]
    fn test_recent_change_uses_two_most_recent_months() {
        let transactions = vec![
            tx("AAPL", "2023-11-05", "P", 1.0, 1.0),
            tx("AAPL", "2024-01-05", "P", 100.0, 10.0),
            tx("AAPL", "2024-02-10", "S", 50.0, 12.0),
        ];
        let analysis = FundFlowAnalysis::from_transactions(&transactions).unwrap();
        assert_eq!(analysis.recent_change.len(), 1);
        let row = &analysis.recent_change[0];
        assert_eq!(row.earlier_month.to_string(), "2024-01");
        assert_eq!(row.later_month.to_string(), "2024-02");
        assert_eq!(row.earlier_net_flow, 1000.0);
        assert_eq!(row.later_net_flow, -600.0);
        assert_eq!(row.change, -1600.0);
        assert!((row.change_pct - -160.0).abs() < 1e-12);
    }

    #[test]
    fn test_recent_change_zero_fills_missing_month() {
        // MSFT is active only in the later month; it still gets a row
        // with 0 for the earlier month.
        let transactions = vec![
            tx("AAPL", "2024-01-05", "P", 100.0, 10.0),
            tx("AAPL", "2024-02-10", "S", 50.0, 12.0),
            tx("MSFT", "2024-02-14", "P", 10.0, 400.0),
        ];
        let analysis = FundFlowAnalysis::from_transactions(&transactions).unwrap();
        assert_eq!(analysis.recent_change.len(), 2);
        let msft = analysis
            .recent_change
            .iter()
            .find(|row| row.ticker == Ticker::new("MSFT"))
            .unwrap();
        assert_eq!(msft.earlier_net_flow, 0.0);
        assert_eq!(msft.later_net_flow, 4000.0);
        assert!(msft.change_pct.is_infinite());
    }

    #[test]
    fn test_sentinel_survives_json_projection() {
        let transactions = vec![tx("AAPL", "2024-01-05", "P", 100.0, 10.0)];
        let analysis = FundFlowAnalysis::from_transactions(&transactions).unwrap();
        let json = serde_json::to_string(&analysis.confidence).unwrap();
        assert!(json.contains("\"Infinity\""));
        assert!(!json.contains("null"));
    }
}
