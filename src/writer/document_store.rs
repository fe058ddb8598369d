use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{StatsWriter, WriterKind};
use crate::error::Result;
use crate::stat::Stat;

/// Remote store that can append a document to a named collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn add_document(&self, collection: &str, stat: &Stat) -> Result<()>;
}

/// Forwards each stat as one document into the collection named after the
/// stream's filename.
pub struct DocumentStoreWriter {
    collection: String,
    store: Arc<dyn DocumentStore>,
}

impl DocumentStoreWriter {
    pub fn setup(filename: &str, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            collection: filename.to_owned(),
            store,
        }
    }
}

#[async_trait]
impl StatsWriter for DocumentStoreWriter {
    /// Stops at the first failed insert; earlier stats in the batch stay
    /// committed.
    async fn write(&self, stats: &[Stat]) -> Result<()> {
        for (idx, stat) in stats.iter().enumerate() {
            if let Err(e) = self.store.add_document(&self.collection, stat).await {
                warn!(
                    collection = %self.collection,
                    committed = idx,
                    remaining = stats.len() - idx,
                    error = %e,
                    "document insert failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    fn kind(&self) -> WriterKind {
        WriterKind::DocumentStore
    }
}
