//! Stream key → writer registry.
//!
//! Writers are created lazily on the first request for a key and live until
//! shutdown. Creation runs under the registry's write lock and re-checks the
//! map first, so concurrent first requests for one key share a single setup.
//! A failed setup leaves nothing behind; the next request simply retries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::stat::Stat;
use crate::writer::{StatsWriter, WriterFactory, WriterKind};

pub const DEFAULT_LOG_DIR: &str = "/logs";

/// How a stream key becomes the filename handed to its writer.
#[derive(Debug, Clone)]
pub struct StreamPaths {
    pub log_dir: PathBuf,
    /// When false the bare `<key>.log` is used, relative to the working
    /// directory.
    pub sandboxed: bool,
}

impl Default for StreamPaths {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            sandboxed: true,
        }
    }
}

impl StreamPaths {
    pub fn filename_for(&self, key: &str) -> String {
        let file = format!("{key}.log");
        if self.sandboxed {
            self.log_dir.join(file).to_string_lossy().into_owned()
        } else {
            file
        }
    }
}

/// One live stream: its writer plus bookkeeping reported by `/api/streams`.
pub struct Stream {
    key: String,
    id: Uuid,
    filename: String,
    started_at: DateTime<Utc>,
    request_count: AtomicU64,
    writer: Arc<dyn StatsWriter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub key: String,
    pub id: Uuid,
    pub filename: String,
    pub kind: WriterKind,
    pub started_at: DateTime<Utc>,
    pub request_count: u64,
}

impl Stream {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn writer(&self) -> &Arc<dyn StatsWriter> {
        &self.writer
    }

    /// Persist through the writer and count the request on success.
    pub async fn write(&self, stats: &[Stat]) -> Result<()> {
        self.writer.write(stats).await?;
        self.request_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            key: self.key.clone(),
            id: self.id,
            filename: self.filename.clone(),
            kind: self.writer.kind(),
            started_at: self.started_at,
            request_count: self.request_count.load(Ordering::Relaxed),
        }
    }
}

pub struct StreamRegistry {
    factory: Arc<dyn WriterFactory>,
    paths: StreamPaths,
    streams: RwLock<HashMap<String, Arc<Stream>>>,
    /// Mirrors `streams.len()` so `/api/metrics` can read the count without
    /// awaiting the lock. Only bumped under the write lock; entries are
    /// never removed.
    live: AtomicUsize,
    visits: AtomicU64,
}

impl StreamRegistry {
    pub fn new(factory: Arc<dyn WriterFactory>, paths: StreamPaths) -> Self {
        Self {
            factory,
            paths,
            streams: RwLock::new(HashMap::new()),
            live: AtomicUsize::new(0),
            visits: AtomicU64::new(0),
        }
    }

    /// Return the stream for `key`, creating and setting up its writer if
    /// this is the first request for it. Every call counts as a visit.
    pub async fn resolve(&self, key: &str) -> Result<Arc<Stream>> {
        self.visits.fetch_add(1, Ordering::Relaxed);

        if let Some(stream) = self.streams.read().await.get(key) {
            return Ok(stream.clone());
        }

        let mut streams = self.streams.write().await;
        if let Some(stream) = streams.get(key) {
            return Ok(stream.clone());
        }

        let filename = self.paths.filename_for(key);
        info!(stream = %key, filename = %filename, "creating stats writer");
        let writer = match self.factory.create(&filename).await {
            Ok(writer) => writer,
            Err(e) => {
                warn!(stream = %key, error = %e, "stats writer setup failed");
                return Err(e);
            }
        };

        let stream = Arc::new(Stream {
            key: key.to_owned(),
            id: Uuid::new_v4(),
            filename,
            started_at: Utc::now(),
            request_count: AtomicU64::new(0),
            writer,
        });
        streams.insert(key.to_owned(), stream.clone());
        self.live.fetch_add(1, Ordering::Relaxed);
        Ok(stream)
    }

    /// Snapshot of every live stream, sorted by key.
    pub async fn list(&self) -> Vec<StreamInfo> {
        let mut out: Vec<StreamInfo> = self
            .streams
            .read()
            .await
            .values()
            .map(|s| s.info())
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    pub fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits since the last call; resets the counter.
    pub fn take_visits(&self) -> u64 {
        self.visits.swap(0, Ordering::Relaxed)
    }

    pub fn visits(&self) -> u64 {
        self.visits.load(Ordering::Relaxed)
    }

    /// Close every writer, joining background tasks. Streams stay
    /// registered.
    pub async fn shutdown(&self) {
        let streams: Vec<Arc<Stream>> = self.streams.read().await.values().cloned().collect();
        info!(streams = streams.len(), "closing stats writers");
        for stream in streams {
            stream.writer.close().await;
        }
    }
}
