//! Writing a cover image next to an audio file.

use std::path::Path;

use async_trait::async_trait;

use super::{CoverError, http_client};

/// Fetches an image URL to a local path.
#[async_trait]
pub trait CoverDownloader: Send + Sync {
    /// Returns the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, CoverError>;
}

/// reqwest-backed [`CoverDownloader`].
pub struct HttpCoverDownloader {
    http_client: reqwest::Client,
}

impl HttpCoverDownloader {
    pub fn new() -> Self {
        Self {
            http_client: http_client(),
        }
    }
}

impl Default for HttpCoverDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoverDownloader for HttpCoverDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, CoverError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| CoverError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoverError::Network(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| CoverError::Network(e.to_string()))?;

        if data.is_empty() {
            return Err(CoverError::Network("empty image".to_string()));
        }

        tokio::fs::write(dest, &data)
            .await
            .map_err(|e| CoverError::Io(e.to_string()))?;
        Ok(data.len() as u64)
    }
}
