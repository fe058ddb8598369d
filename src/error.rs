use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by stream writers and by the posting client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open log file {}: {source}", path.display())]
    OpenLog {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("document store error: {0}")]
    DocumentStore(String),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("writer for {0} is closed")]
    WriterClosed(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered {status}")]
    Rejected { url: String, status: u16 },
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Self::DocumentStore(err.to_string())
    }
}
