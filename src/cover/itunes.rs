//! iTunes Search API cover lookup.
//!
//! Free, no authentication. Artwork URLs come back at 100x100 and are
//! rewritten to the largest size the CDN serves.

use async_trait::async_trait;

use super::{CoverArtSource, CoverError, dto, get_json, http_client};

/// iTunes Search API client
pub struct ITunesClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl ITunesClient {
    pub fn new() -> Self {
        Self {
            http_client: http_client(),
            base_url: "https://itunes.apple.com".to_string(),
        }
    }

    /// Create a client for testing with custom base URL
    #[cfg(test)]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: http_client(),
            base_url: base_url.into(),
        }
    }
}

impl Default for ITunesClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite a 100x100 artwork URL to 3000x3000.
pub fn upgrade_artwork(url: &str) -> String {
    url.replacen("100x100bb", "3000x3000bb", 1)
}

#[async_trait]
impl CoverArtSource for ITunesClient {
    fn name(&self) -> &'static str {
        "itunes"
    }

    async fn find_cover(&self, title: &str, artist: &str) -> Result<Option<String>, CoverError> {
        let term = format!("{title} {artist}");
        let url = format!(
            "{}/search?term={}&media=music&entity=song&limit=5",
            self.base_url,
            urlencoding::encode(&term)
        );

        let Some(response) = get_json::<dto::ITunesSearchResponse>(&self.http_client, &url).await? else {
            return Ok(None);
        };

        Ok(response
            .results
            .into_iter()
            .next()
            .map(|track| track.artwork_url100)
            .filter(|artwork| !artwork.is_empty())
            .map(|artwork| upgrade_artwork(&artwork)))
    }
}
