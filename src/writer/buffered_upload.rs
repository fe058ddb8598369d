//! Buffered, periodic uploads of a stream's stats to object storage.
//!
//! `write` only enqueues. A background task owned by the writer moves queued
//! stats into an in-memory batch and, on every flush tick, uploads the batch
//! as one JSON array object. Failed uploads are logged and the batch dropped.
//!
//! Stopping the task abandons whatever is buffered unless `flush_on_stop`
//! is set, in which case the queue is drained and flushed one last time.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{StatsWriter, WriterKind};
use crate::error::{Error, Result};
use crate::stat::Stat;

/// Pending stats a writer will hold before `write` starts to wait.
pub const QUEUE_CAPACITY: usize = 100;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(300);

/// Bucket plus the client bound to it.
#[derive(Clone)]
pub struct UploadTarget {
    pub bucket: String,
    pub store: Arc<dyn ObjectStore>,
}

impl fmt::Debug for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTarget")
            .field("bucket", &self.bucket)
            .field("store", &format_args!("{}", self.store))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct BufferedUploadConfig {
    pub target: UploadTarget,
    pub flush_interval: Duration,
    pub queue_capacity: usize,
    pub flush_on_stop: bool,
}

impl BufferedUploadConfig {
    pub fn new(target: UploadTarget) -> Self {
        Self {
            target,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            queue_capacity: QUEUE_CAPACITY,
            flush_on_stop: false,
        }
    }
}

pub struct BufferedUploadWriter {
    name: String,
    queue: mpsc::Sender<Stat>,
    buffer: Arc<Mutex<Vec<Stat>>>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BufferedUploadWriter {
    /// Validates the config and spawns the flush task. Must be called from
    /// within a Tokio runtime.
    pub fn setup(filename: &str, config: BufferedUploadConfig) -> Result<Self> {
        if config.flush_interval.is_zero() {
            return Err(Error::Config("flush interval must be non-zero".into()));
        }
        if config.queue_capacity == 0 {
            return Err(Error::Config("queue capacity must be non-zero".into()));
        }

        let (queue, pending) = mpsc::channel(config.queue_capacity);
        let (stop_tx, stop_rx) = oneshot::channel();
        let buffer = Arc::new(Mutex::new(Vec::new()));

        info!(
            stream = %filename,
            bucket = %config.target.bucket,
            interval_secs = config.flush_interval.as_secs_f64(),
            "starting buffered upload writer"
        );

        let flusher = Flusher {
            name: filename.to_owned(),
            target: config.target,
            buffer: buffer.clone(),
            sequence: 0,
        };
        let task = tokio::spawn(run_flush_loop(
            flusher,
            pending,
            stop_rx,
            config.flush_interval,
            config.flush_on_stop,
        ));

        Ok(Self {
            name: filename.to_owned(),
            queue,
            buffer,
            stop: Mutex::new(Some(stop_tx)),
            task: tokio::sync::Mutex::new(Some(task)),
        })
    }

    /// Stats moved out of the queue but not yet uploaded.
    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Signal the flush task to exit. Idempotent.
    pub fn stop(&self) {
        if let Some(tx) = self.stop.lock().take() {
            let _ = tx.send(());
        }
    }
}

#[async_trait]
impl StatsWriter for BufferedUploadWriter {
    /// Waits for queue space when the flush task falls behind.
    async fn write(&self, stats: &[Stat]) -> Result<()> {
        for stat in stats {
            self.queue
                .send(stat.clone())
                .await
                .map_err(|_| Error::WriterClosed(self.name.clone()))?;
        }
        Ok(())
    }

    fn kind(&self) -> WriterKind {
        WriterKind::BufferedUpload
    }

    async fn close(&self) {
        self.stop();
        let mut guard = self.task.lock().await;
        if let Some(handle) = guard.take() {
            if let Err(e) = handle.await {
                warn!(stream = %self.name, error = %e, "flush task ended abnormally");
            }
        }
    }
}

// ─── Background task ─────────────────────────────────────────────

async fn run_flush_loop(
    mut flusher: Flusher,
    mut pending: mpsc::Receiver<Stat>,
    mut stop: oneshot::Receiver<()>,
    every: Duration,
    flush_on_stop: bool,
) {
    let mut ticker = time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            Some(stat) = pending.recv() => {
                flusher.buffer.lock().push(stat);
            }
            _ = ticker.tick() => {
                flusher.flush().await;
            }
            _ = &mut stop => {
                if flush_on_stop {
                    pending.close();
                    while let Ok(stat) = pending.try_recv() {
                        flusher.buffer.lock().push(stat);
                    }
                    flusher.flush().await;
                } else {
                    let abandoned = flusher.buffer.lock().len();
                    if abandoned > 0 {
                        warn!(stream = %flusher.name, abandoned, "stopping with unflushed stats");
                    }
                }
                break;
            }
        }
    }

    info!(stream = %flusher.name, flushes = flusher.sequence, "buffered upload writer stopped");
}

struct Flusher {
    name: String,
    target: UploadTarget,
    buffer: Arc<Mutex<Vec<Stat>>>,
    sequence: u64,
}

impl Flusher {
    async fn flush(&mut self) {
        let batch = std::mem::take(&mut *self.buffer.lock());
        if batch.is_empty() {
            debug!(stream = %self.name, "no stats to upload");
            return;
        }

        let object = self.next_object_name();
        match self.upload(&object, &batch).await {
            Ok(bytes) => info!(
                stream = %self.name,
                bucket = %self.target.bucket,
                object = %object,
                stats = batch.len(),
                bytes,
                "uploaded batch"
            ),
            Err(e) => error!(
                stream = %self.name,
                bucket = %self.target.bucket,
                object = %object,
                dropped = batch.len(),
                error = %e,
                "upload failed, dropping batch"
            ),
        }
    }

    /// `<stream>-<unix seconds>-<sequence>.json`; the sequence keeps two
    /// flushes within the same second apart.
    fn next_object_name(&mut self) -> ObjectPath {
        self.sequence += 1;
        ObjectPath::from(format!(
            "{}-{}-{}.json",
            self.name,
            Utc::now().timestamp(),
            self.sequence
        ))
    }

    async fn upload(&self, object: &ObjectPath, batch: &[Stat]) -> Result<usize> {
        let body = serde_json::to_vec(batch)?;
        let len = body.len();
        self.target.store.put(object, PutPayload::from(body)).await?;
        Ok(len)
    }
}
