use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::traits::{ArchiveSource, WorkId};
use crate::error::{Result, WorkerError};

/// Plain HTTP GET download of submission archives.
pub struct HttpArchiveSource {
    client: Client,
}

impl HttpArchiveSource {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpArchiveSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArchiveSource for HttpArchiveSource {
    async fn download(&self, work_id: WorkId, url: &str) -> Result<Bytes> {
        let resp = self.client.get(url).send().await?;

        let status = resp.status();
        debug!(work_id, status = status.as_u16(), "download response");
        if status != StatusCode::OK {
            warn!(work_id, status = status.as_u16(), "download rejected");
            return Err(WorkerError::NotAvailable { work_id });
        }

        let body = resp.bytes().await?;
        Ok(body)
    }
}
