//! MusicBrainz + Cover Art Archive cover lookup.
//!
//! IMPORTANT: MusicBrainz rate limits to 1 req/sec per client. Every search
//! waits a fixed spacing first; other cover services are not affected.

use std::time::Duration;

use async_trait::async_trait;

use super::{CoverArtSource, CoverError, dto, get_json, http_client};

/// Delay before each MusicBrainz request.
pub const DEFAULT_SPACING: Duration = Duration::from_millis(1100);

/// MusicBrainz recording search followed by a Cover Art Archive check
pub struct MusicBrainzCoverClient {
    http_client: reqwest::Client,
    base_url: String,
    archive_url: String,
    spacing: Duration,
}

impl MusicBrainzCoverClient {
    pub fn new() -> Self {
        Self {
            http_client: http_client(),
            base_url: "https://musicbrainz.org/ws/2".to_string(),
            archive_url: "https://coverartarchive.org".to_string(),
            spacing: DEFAULT_SPACING,
        }
    }

    /// Create a client for testing with custom base URLs
    #[cfg(test)]
    pub fn with_base_urls(base_url: impl Into<String>, archive_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            archive_url: archive_url.into(),
            ..Self::new()
        }
    }

    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.spacing = spacing;
        self
    }

    /// Whether the archive serves an image at `url`.
    async fn front_cover_exists(&self, url: &str) -> Result<bool, CoverError> {
        let response = self
            .http_client
            .head(url)
            .send()
            .await
            .map_err(|e| CoverError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

impl Default for MusicBrainzCoverClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoverArtSource for MusicBrainzCoverClient {
    fn name(&self) -> &'static str {
        "musicbrainz"
    }

    async fn find_cover(&self, title: &str, artist: &str) -> Result<Option<String>, CoverError> {
        let query = format!("recording:\"{title}\" AND artist:\"{artist}\"");
        let url = format!(
            "{}/recording/?query={}&fmt=json&limit=1",
            self.base_url,
            urlencoding::encode(&query)
        );

        // Rate limiting - MusicBrainz allows 1 request per second
        tokio::time::sleep(self.spacing).await;

        let Some(response) = get_json::<dto::RecordingSearchResponse>(&self.http_client, &url).await? else {
            return Ok(None);
        };

        let Some(release) = response
            .recordings
            .into_iter()
            .next()
            .and_then(|recording| recording.releases.into_iter().next())
        else {
            return Ok(None);
        };

        // The /front endpoint redirects to the image; HEAD confirms it exists
        let cover_url = format!("{}/release/{}/front", self.archive_url, release.id);
        if self.front_cover_exists(&cover_url).await? {
            Ok(Some(cover_url))
        } else {
            tracing::debug!(release = %release.id, "Release has no front cover");
            Ok(None)
        }
    }
}
