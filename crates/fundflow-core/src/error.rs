//! Error types for collection and aggregation operations.
//!
//! This module defines [`FlowError`] which covers all error cases that can occur
//! when resolving identifiers, fetching filings, extracting records, or
//! aggregating fund flows.

use thiserror::Error;

/// Errors that can occur during collection and aggregation.
#[derive(Error, Debug)]
pub enum FlowError {
    /// An upstream endpoint could not be reached or returned a non-success
    /// response. The caller may retry the whole ticker later.
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    /// Rate limit exceeded at a source.
    #[error("Rate limited by {src}: retry after {retry_after:?}")]
    RateLimited {
        /// The source that rate limited the request.
        src: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// The ticker has no entry in the regulator's identifier index.
    /// Terminal for that ticker; not retried.
    #[error("Ticker not found in identifier index: {0}")]
    TickerNotFound(String),

    /// A filing's structured document could not be isolated or parsed,
    /// even after the tolerant repair pass. Terminal for that filing only.
    #[error("Extraction failed for {ticker} filing {accession}: {reason}")]
    Extraction {
        /// Ticker the filing belongs to.
        ticker: String,
        /// Accession number of the filing.
        accession: String,
        /// What went wrong.
        reason: String,
    },

    /// A single transaction entry's fields could not be parsed.
    /// That entry is skipped; sibling entries continue.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Aggregation was invoked with zero input rows.
    #[error("No data: aggregation input was empty")]
    NoData,

    /// Error parsing data from a source.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error writing to or reading from local storage.
    #[error("Storage error: {0}")]
    Storage(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// An I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using [`FlowError`].
pub type Result<T> = std::result::Result<T, FlowError>;
