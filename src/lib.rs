//! Per-stream stat ingestion.
//!
//! `POST /<stream>` decodes one stat and hands it to the writer registered
//! for that stream, creating the writer on first use. Writers persist to an
//! append-only local log, a Redis-backed document store, or periodic
//! object-storage uploads.

use std::sync::Arc;

pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod load;
pub mod logging;
pub mod metrics;
mod middleware;
pub mod redis_client;
pub mod registry;
pub mod server;
pub mod stat;
pub mod writer;

pub use error::{Error, Result};
pub use registry::{StreamPaths, StreamRegistry};
pub use stat::Stat;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Stream key → writer, created lazily.
    pub registry: Arc<StreamRegistry>,

    /// Ingest latency and volume, read by `/api/metrics`.
    pub metrics: Arc<metrics::MetricsCollector>,
}

impl AppState {
    pub fn new(registry: Arc<StreamRegistry>) -> Self {
        Self {
            registry,
            metrics: Arc::new(metrics::MetricsCollector::new()),
        }
    }
}
