//! Client side of the ingest endpoint: posts stats to `http://host:port/<stream>`.

use reqwest::Client;
use tracing::warn;

use crate::error::{Error, Result};
use crate::stat::Stat;

/// One remote stream. Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct StatsEndpoint {
    host: String,
    port: u16,
    stream: String,
    client: Client,
}

impl StatsEndpoint {
    pub fn new(host: impl Into<String>, port: u16, stream: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            stream: stream.into(),
            client: Client::new(),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}/{}", self.host, self.port, self.stream)
    }

    /// POST one stat as JSON. Anything but 200 is returned as
    /// `Error::Rejected` and logged with the server's reply.
    pub async fn post_stat(&self, stat: &Stat) -> Result<()> {
        let url = self.url();
        let response = self.client.post(&url).json(stat).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), body = %body.trim(), "stat rejected");
            return Err(Error::Rejected {
                url,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
