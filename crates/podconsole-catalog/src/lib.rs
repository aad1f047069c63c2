//! Podconsole Catalog - Operator Catalog Ingestion
//!
//! This crate keeps a local, queryable copy of operator catalog metadata,
//! including:
//! - JSON-Lines: incremental decoding of File-Based Catalog feeds
//! - Store: SQLite tables for packages, channels, bundles and catalog items
//! - Ingest: fail-soft fan-out over catalog sources plus item derivation
//! - Refresh: debounced re-ingestion with at most one pass in flight
//! - Watch: polling the cluster for the set of serving catalogs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod jsonl;
pub mod refresh;
pub mod schema;
pub mod store;
pub mod watch;

pub use config::CatalogConfig;
pub use error::{Error, Result};
pub use feed::{CatalogFeed, HttpCatalogFeed, ObjectStream};
pub use ingest::{CatalogIngestor, IngestReport, SourceOutcome};
pub use jsonl::JsonLinesDecoder;
pub use refresh::{DebouncedRefreshTrigger, RefreshHandler};
pub use schema::{CatalogItem, CatalogRecord, CatalogSource, IdScheme, Schema};
pub use store::CatalogStore;
pub use watch::CatalogWatcher;
