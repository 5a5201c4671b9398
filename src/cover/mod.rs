//! Cover art lookup and download.
//!
//! A cover URL for a track is resolved through a fixed priority chain:
//!
//! 1. **Local catalog** - by album name, then by track name + artist
//! 2. **iTunes Search** - artwork upgraded to 3000x3000
//! 3. **Deezer** - album `cover_xl`
//! 4. **MusicBrainz + Cover Art Archive** - rate limited, front cover checked
//!
//! The first source that answers wins. Catalog errors are treated as a miss.

pub mod dto;
mod deezer;
mod download;
mod itunes;
mod musicbrainz;
mod resolver;

pub use deezer::DeezerClient;
pub use download::{CoverDownloader, HttpCoverDownloader};
pub use itunes::ITunesClient;
pub use musicbrainz::{DEFAULT_SPACING, MusicBrainzCoverClient};
pub use resolver::{CoverFinder, FoundCover};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::CatalogError;

/// User agent for cover services; MusicBrainz rejects anonymous clients
pub(crate) const USER_AGENT: &str = concat!(
    "flac-harvest/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/flac-harvest)"
);

/// Errors from cover services.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoverError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Rate limited - try again later")]
    RateLimited,

    #[error("Failed to write cover: {0}")]
    Io(String),
}

/// A remote service that can find a cover URL for a track.
#[async_trait]
pub trait CoverArtSource: Send + Sync {
    /// Short name for logs and reports
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the service has no cover for this track.
    async fn find_cover(&self, title: &str, artist: &str) -> Result<Option<String>, CoverError>;
}

/// Local metadata cache queried before any remote service.
#[async_trait]
pub trait CoverCatalog: Send + Sync {
    async fn cover_for_album(&self, album: &str) -> Result<Option<String>, CatalogError>;

    async fn cover_for_track(&self, title: &str, artist: &str) -> Result<Option<String>, CatalogError>;
}

/// Build the default remote chain for the given service names.
///
/// Unknown names are logged and ignored.
pub fn sources_from_names(names: &[String], musicbrainz_spacing: Duration) -> Vec<Arc<dyn CoverArtSource>> {
    names
        .iter()
        .filter_map(|name| -> Option<Arc<dyn CoverArtSource>> {
            match name.trim().to_ascii_lowercase().as_str() {
                "itunes" => Some(Arc::new(ITunesClient::new())),
                "deezer" => Some(Arc::new(DeezerClient::new())),
                "musicbrainz" => Some(Arc::new(
                    MusicBrainzCoverClient::new().with_spacing(musicbrainz_spacing),
                )),
                other => {
                    tracing::warn!("Unknown cover service '{}', ignoring", other);
                    None
                }
            }
        })
        .collect()
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_default()
}

/// GET `url` and decode JSON, mapping status codes the same way for every
/// cover service. 404 is a miss, not an error.
async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<Option<T>, CoverError> {
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| CoverError::Network(e.to_string()))?;

    let status = response.status();

    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
        return Err(CoverError::RateLimited);
    }

    if !status.is_success() {
        return Err(CoverError::Network(format!(
            "HTTP {}: {}",
            status,
            status.canonical_reason().unwrap_or("Unknown")
        )));
    }

    response
        .json::<T>()
        .await
        .map(Some)
        .map_err(|e| CoverError::Parse(e.to_string()))
}

/// Mock cover collaborators for testing.
#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Cover source returning a fixed answer and counting calls.
    pub struct MockCoverSource {
        pub name: &'static str,
        pub url: Option<String>,
        pub error: Option<CoverError>,
        calls: AtomicUsize,
    }

    impl MockCoverSource {
        pub fn found(name: &'static str, url: &str) -> Self {
            Self {
                name,
                url: Some(url.to_string()),
                error: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn missing(name: &'static str) -> Self {
            Self {
                name,
                url: None,
                error: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(name: &'static str) -> Self {
            Self {
                error: Some(CoverError::Network("connection refused".to_string())),
                ..Self::missing(name)
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CoverArtSource for MockCoverSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn find_cover(&self, _title: &str, _artist: &str) -> Result<Option<String>, CoverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ref err) = self.error {
                return Err(err.clone());
            }
            Ok(self.url.clone())
        }
    }

    /// Catalog keyed by album name and by `title|artist`.
    #[derive(Default)]
    pub struct MockCoverCatalog {
        pub albums: HashMap<String, String>,
        pub tracks: HashMap<String, String>,
        pub broken: bool,
    }

    #[async_trait]
    impl CoverCatalog for MockCoverCatalog {
        async fn cover_for_album(&self, album: &str) -> Result<Option<String>, CatalogError> {
            if self.broken {
                return Err(CatalogError::Unavailable("mock catalog offline".to_string()));
            }
            Ok(self.albums.get(album).cloned())
        }

        async fn cover_for_track(&self, title: &str, artist: &str) -> Result<Option<String>, CatalogError> {
            if self.broken {
                return Err(CatalogError::Unavailable("mock catalog offline".to_string()));
            }
            Ok(self.tracks.get(&format!("{title}|{artist}")).cloned())
        }
    }

    /// Writes a small JPEG-ish payload instead of downloading.
    #[derive(Default)]
    pub struct MockCoverDownloader {
        calls: AtomicUsize,
    }

    impl MockCoverDownloader {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CoverDownloader for MockCoverDownloader {
        async fn download(&self, _url: &str, dest: &Path) -> Result<u64, CoverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let data = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0];
            tokio::fs::write(dest, data)
                .await
                .map_err(|e| CoverError::Io(e.to_string()))?;
            Ok(data.len() as u64)
        }
    }
}
