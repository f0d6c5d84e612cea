//! # ATSD Finder
//!
//! Exposes Axibase Time Series Database series as a Graphite-style
//! hierarchical namespace, and reads them in batches.
//!
//! ## Modules
//!
//! - [`pattern`]: path tokenizer, typed tokens, quoting and globbing
//! - [`finder`]: tree and view namespaces, pattern resolution
//! - [`reader`]: per-leaf series reader with deferred fetches
//! - [`batch`]: coalesces queued series queries into one backend request
//! - [`retention`]: aggregation selection by look-back
//! - [`series`]: series identity, aggregation descriptors, regularization
//! - [`backend`]: ATSD REST client behind the [`AtsdBackend`] trait
//! - [`cache`]: TTL cache of repeated metadata lookups
//! - [`api`]: Graphite-compatible HTTP API with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use atsd_finder::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AtsdClient::new(AtsdConfig::default())?;
//!     let backend: Arc<dyn AtsdBackend> = Arc::new(client);
//!     let context = ReaderContext::new(backend, RetentionPolicy::empty(), 60_000);
//!     let finder = Finder::new(TreeSchema::default(), Vec::new(), context)?;
//!
//!     let nodes = finder.find_nodes(&FindQuery::new("entities.n.*.cpu_busy.detail")).await;
//!     let range = TimeRange::last_millis(3_600_000);
//!
//!     // Queue every fetch first; the first wait sends them as one batch
//!     let pending: Vec<_> = nodes.iter().filter_map(Node::reader).map(|r| r.fetch(range)).collect();
//!     for fetch in pending {
//!         let data = fetch.wait().await?;
//!         println!("{} buckets of {} ms", data.values.len(), data.time_info.step);
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod backend;
pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod finder;
pub mod pattern;
pub mod reader;
pub mod retention;
pub mod series;

// Re-export top-level types for convenience
pub use error::{FinderError, FinderResult};

pub use series::{
    AggregationDescriptor, Interpolation, Sample, SeriesData, SeriesIdentity, Statistic, TimeInfo,
    TimeRange, TimeUnit,
};

pub use backend::{AtsdBackend, AtsdClient, AtsdConfig, BackendError, NameFilter};

pub use batch::{FetchHandle, QueryBatcher, RequestId};

pub use cache::MetadataCache;

pub use retention::{RetentionPolicy, RetentionTier};

pub use reader::{PendingFetch, ReaderContext, SeriesReader};

pub use finder::{FindQuery, Finder, Node, TreeSchema, ViewConfig, ViewSchema};

pub use pattern::{metric_quote, parse_query, PathGlob, Scope, Token, TokenKind};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{Config, ConfigError};
