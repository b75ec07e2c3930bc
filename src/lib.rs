//! # Elephant
//!
//! Aggregates a researcher's publications and citation counts from several
//! platforms into one local database, and derives statistics and
//! recommendations from it.
//!
//! ## Architecture
//!
//! - [`sources`]: platform adapters behind the [`Source`] trait
//! - [`reconcile`]: merges raw records into canonical papers
//! - [`store`]: SQLite persistence with append-only citation history
//! - [`pipeline`]: one fetch cycle (adapters, reconciliation, store, alerts)
//! - [`metrics`] and [`recommend`]: read-only views over the store
//! - [`export`]: CSV, JSON and XLSX export, CSV and JSON import
//! - [`config`]: configuration file and environment layering
//! - [`models`]: shared data types
//! - [`ui`] and [`utils`]: terminal output, HTTP client and retry

pub mod config;
pub mod export;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod recommend;
pub mod reconcile;
pub mod sources;
pub mod store;
pub mod ui;
pub mod utils;

pub use config::Config;
pub use models::{Paper, RawRecord};
pub use pipeline::{FetchOptions, FetchSummary, Pipeline};
pub use sources::{Source, SourceRegistry};
pub use store::Store;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
