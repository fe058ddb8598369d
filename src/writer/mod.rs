//! Pluggable persistence strategies for a single stream.
//!
//! A writer is bound to one stream for its lifetime. The registry only ever
//! sees `Arc<dyn StatsWriter>`; which backend sits behind it is decided once
//! at startup through [`WriterConfig`].

pub mod append_log;
pub mod buffered_upload;
pub mod document_store;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::stat::Stat;

pub use append_log::AppendLogWriter;
pub use buffered_upload::{BufferedUploadConfig, BufferedUploadWriter, UploadTarget};
pub use document_store::{DocumentStore, DocumentStoreWriter};

/// Which persistence strategy a writer implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriterKind {
    SimpleLog,
    DocumentStore,
    BufferedUpload,
}

impl fmt::Display for WriterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SimpleLog => "simple-log",
            Self::DocumentStore => "document-store",
            Self::BufferedUpload => "buffered-upload",
        })
    }
}

/// Persistence capability shared by every writer variant.
///
/// `write` may be called concurrently from many requests targeting the same
/// stream.
#[async_trait]
pub trait StatsWriter: Send + Sync {
    async fn write(&self, stats: &[Stat]) -> Result<()>;

    fn kind(&self) -> WriterKind;

    /// Release backend resources. Writers without a background task have
    /// nothing to do here.
    async fn close(&self) {}
}

/// Creates a ready-to-use writer for a derived stream filename.
#[async_trait]
pub trait WriterFactory: Send + Sync {
    async fn create(&self, filename: &str) -> Result<Arc<dyn StatsWriter>>;
}

/// Strategy selection plus the typed configuration each variant needs.
#[derive(Clone)]
pub enum WriterConfig {
    SimpleLog,
    DocumentStore(Arc<dyn DocumentStore>),
    BufferedUpload(BufferedUploadConfig),
}

impl WriterConfig {
    pub fn kind(&self) -> WriterKind {
        match self {
            Self::SimpleLog => WriterKind::SimpleLog,
            Self::DocumentStore(_) => WriterKind::DocumentStore,
            Self::BufferedUpload(_) => WriterKind::BufferedUpload,
        }
    }
}

impl fmt::Debug for WriterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferedUpload(cfg) => f.debug_tuple("BufferedUpload").field(cfg).finish(),
            other => write!(f, "{}", other.kind()),
        }
    }
}

#[async_trait]
impl WriterFactory for WriterConfig {
    async fn create(&self, filename: &str) -> Result<Arc<dyn StatsWriter>> {
        let writer: Arc<dyn StatsWriter> = match self {
            Self::SimpleLog => Arc::new(AppendLogWriter::setup(filename).await?),
            Self::DocumentStore(store) => {
                Arc::new(DocumentStoreWriter::setup(filename, store.clone()))
            }
            Self::BufferedUpload(cfg) => {
                Arc::new(BufferedUploadWriter::setup(filename, cfg.clone())?)
            }
        };
        Ok(writer)
    }
}
