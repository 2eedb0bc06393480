#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fundflow-rs/fundflow/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Persistence and report writers for collected fund-flow data.
//!
//! - [`FlowStore`] - SQLite passthrough writer (feature `sqlite`)
//! - [`ReportWriter`] - CSV/JSON projections of typed rows
//! - [`DataPaths`] - idempotent directory bootstrap
//! - [`IntermediateFiles`] - scoped disposal of a run's intermediate files

mod files;
mod report;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use files::{DataPaths, IntermediateFiles};
pub use report::ReportWriter;
#[cfg(feature = "sqlite")]
pub use sqlite::FlowStore;
