//! Command-line / environment configuration.
//!
//! Every flag can also be supplied through a `STAT_SINK_*` environment
//! variable. The persistence mode is chosen by at most one of
//! `--document-store` / `--buffered-upload`; simple append logs are the
//! default.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;
use tracing::info;

use crate::error::{Error, Result};
use crate::redis_client::{self, RedisDocumentStore};
use crate::registry::{StreamPaths, DEFAULT_LOG_DIR};
use crate::writer::{BufferedUploadConfig, UploadTarget, WriterConfig, WriterKind};

#[derive(Parser, Debug, Clone)]
#[command(name = "stat-sink", version, about = "Collects posted stats into per-stream sinks")]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, default_value_t = 20080, env = "STAT_SINK_PORT")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "STAT_SINK_HOST")]
    pub host: String,

    /// Store each stat as a document in a Redis-backed collection
    #[arg(long, env = "STAT_SINK_DOCUMENT_STORE", conflicts_with = "buffered_upload")]
    pub document_store: bool,

    /// Buffer stats in memory and upload them periodically to object storage
    #[arg(long, env = "STAT_SINK_BUFFERED_UPLOAD")]
    pub buffered_upload: bool,

    /// Use `<stream>.log` as the filename instead of prefixing the log dir
    #[arg(long, env = "STAT_SINK_NO_SANDBOX")]
    pub no_sandbox: bool,

    /// Directory holding the per-stream logs
    #[arg(long, default_value = DEFAULT_LOG_DIR, env = "STAT_SINK_LOG_DIR")]
    pub log_dir: PathBuf,

    /// Redis server used by the document store mode
    #[arg(long, default_value = "redis://127.0.0.1:6379/", env = "STAT_SINK_REDIS_URL")]
    pub redis_url: String,

    /// Bucket receiving buffered uploads
    #[arg(long, default_value = "", env = "STAT_SINK_BUCKET")]
    pub bucket: String,

    /// Write uploads under this local directory instead of S3
    #[arg(long, env = "STAT_SINK_OBJECT_STORE_ROOT")]
    pub object_store_root: Option<PathBuf>,

    /// Seconds between buffered uploads
    #[arg(long, default_value_t = 300, env = "STAT_SINK_FLUSH_INTERVAL_SECS")]
    pub flush_interval_secs: u64,

    /// Drain and upload buffered stats when a writer is stopped
    #[arg(long, env = "STAT_SINK_FLUSH_ON_STOP")]
    pub flush_on_stop: bool,

    /// Seconds between request-volume reports
    #[arg(long, default_value_t = 60, env = "STAT_SINK_REPORT_INTERVAL_SECS")]
    pub report_interval_secs: u64,
}

impl Config {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn mode(&self) -> WriterKind {
        if self.document_store {
            WriterKind::DocumentStore
        } else if self.buffered_upload {
            WriterKind::BufferedUpload
        } else {
            WriterKind::SimpleLog
        }
    }

    pub fn stream_paths(&self) -> StreamPaths {
        StreamPaths {
            log_dir: self.log_dir.clone(),
            sandboxed: !self.no_sandbox,
        }
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs.max(1))
    }

    /// Connect the backend the selected mode needs.
    pub async fn writer_config(&self) -> Result<WriterConfig> {
        match self.mode() {
            WriterKind::SimpleLog => Ok(WriterConfig::SimpleLog),
            WriterKind::DocumentStore => {
                info!(url = %self.redis_url, "connecting to document store");
                let conn = redis_client::connect(&self.redis_url).await?;
                Ok(WriterConfig::DocumentStore(Arc::new(RedisDocumentStore::new(conn))))
            }
            WriterKind::BufferedUpload => {
                let target = self.upload_target()?;
                Ok(WriterConfig::BufferedUpload(BufferedUploadConfig {
                    flush_interval: Duration::from_secs(self.flush_interval_secs),
                    flush_on_stop: self.flush_on_stop,
                    ..BufferedUploadConfig::new(target)
                }))
            }
        }
    }

    fn upload_target(&self) -> Result<UploadTarget> {
        if self.bucket.is_empty() {
            return Err(Error::Config("--bucket is required for buffered uploads".into()));
        }
        if self.flush_interval_secs == 0 {
            return Err(Error::Config("--flush-interval-secs must be at least 1".into()));
        }

        let store: Arc<dyn ObjectStore> = match &self.object_store_root {
            Some(root) => {
                let dir = root.join(&self.bucket);
                std::fs::create_dir_all(&dir)?;
                Arc::new(LocalFileSystem::new_with_prefix(dir)?)
            }
            None => Arc::new(
                AmazonS3Builder::from_env()
                    .with_bucket_name(&self.bucket)
                    .build()?,
            ),
        };
        info!(bucket = %self.bucket, store = %store, "object store ready");

        Ok(UploadTarget {
            bucket: self.bucket.clone(),
            store,
        })
    }
}
