use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::Result;
use crate::stat::Stat;
use crate::writer::DocumentStore;

/// Creates a single `ConnectionManager` that auto-reconnects on failure.
///
/// `ConnectionManager` is cheaply cloneable — every clone shares the same
/// underlying multiplexed TCP connection, so one instance serves every
/// stream's writer.
pub async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    let client = redis::Client::open(url)?;
    ConnectionManager::new(client).await
}

/// Document store backed by Redis lists: a collection is a list key and
/// every document is one JSON element pushed on its tail.
#[derive(Clone)]
pub struct RedisDocumentStore {
    conn: ConnectionManager,
}

impl RedisDocumentStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DocumentStore for RedisDocumentStore {
    async fn add_document(&self, collection: &str, stat: &Stat) -> Result<()> {
        let doc = serde_json::to_string(stat)?;
        let mut conn = self.conn.clone();
        let _: usize = conn.rpush(collection, doc).await?;
        Ok(())
    }
}
