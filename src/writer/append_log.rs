use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use super::{StatsWriter, WriterKind};
use crate::error::{Error, Result};
use crate::stat::Stat;

/// Appends one JSON line per stat to a local file.
///
/// The handle is opened once at setup; the mutex serializes every append so
/// lines never interleave. Each line is flushed to the OS before `write`
/// returns but not fsynced, so it survives a process crash, not a power loss.
pub struct AppendLogWriter {
    file: Mutex<File>,
}

impl AppendLogWriter {
    pub async fn setup(filename: &str) -> Result<Self> {
        let path = PathBuf::from(filename);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| Error::OpenLog {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "opened append log");
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl StatsWriter for AppendLogWriter {
    async fn write(&self, stats: &[Stat]) -> Result<()> {
        let mut file = self.file.lock().await;
        for stat in stats {
            let mut line = serde_json::to_vec(stat)?;
            line.push(b'\n');
            file.write_all(&line).await?;
            file.flush().await?;
        }
        Ok(())
    }

    fn kind(&self) -> WriterKind {
        WriterKind::SimpleLog
    }
}
