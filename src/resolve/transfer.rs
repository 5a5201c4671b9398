//! Streaming HTTP download to disk.
//!
//! Bytes are written to `<dest>.part` and renamed into place only once the
//! body has been fully received, so `dest` never holds a truncated file.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use super::ServiceError;

/// Suffix for in-progress downloads.
const PART_SUFFIX: &str = "part";

/// The temporary path used while `dest` is being downloaded.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".");
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// HTTP file fetcher shared by the service adapters.
#[derive(Debug, Clone, Default)]
pub struct HttpTransfer {
    http_client: reqwest::Client,
}

impl HttpTransfer {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Download `url` to `dest`, calling `progress` with the running total.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64, ServiceError> {
        let mut response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ServiceError::RateLimited);
        }

        if !status.is_success() {
            return Err(ServiceError::Network(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let part = part_path(dest);
        let result = async {
            let mut file = tokio::fs::File::create(&part).await?;
            let mut written: u64 = 0;
            while let Some(chunk) = response.chunk().await.map_err(std::io::Error::other)? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
                progress(written);
            }
            file.flush().await?;
            drop(file);
            tokio::fs::rename(&part, dest).await?;
            Ok::<u64, std::io::Error>(written)
        }
        .await;

        match result {
            Ok(written) if written > 0 => Ok(written),
            Ok(_) => {
                let _ = tokio::fs::remove_file(dest).await;
                Err(ServiceError::TransferFailed("empty response body".to_string()))
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(ServiceError::TransferFailed(e.to_string()))
            }
        }
    }
}
