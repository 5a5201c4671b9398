//! Deezer search cover lookup.

use async_trait::async_trait;

use super::{CoverArtSource, CoverError, dto, get_json, http_client};

/// Deezer public API client
pub struct DeezerClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl DeezerClient {
    pub fn new() -> Self {
        Self {
            http_client: http_client(),
            base_url: "https://api.deezer.com".to_string(),
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

impl Default for DeezerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoverArtSource for DeezerClient {
    fn name(&self) -> &'static str {
        "deezer"
    }

    async fn find_cover(&self, title: &str, artist: &str) -> Result<Option<String>, CoverError> {
        let url = format!(
            "{}/search?q={}&limit=1",
            self.base_url,
            urlencoding::encode(&format!("{title} {artist}"))
        );

        let Some(response) = get_json::<dto::DeezerSearchResponse>(&self.http_client, &url).await? else {
            return Ok(None);
        };

        Ok(response
            .data
            .into_iter()
            .next()
            .map(|track| track.album.cover_xl)
            .filter(|cover| !cover.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;

    #[tokio::test]
    async fn test_find_cover_uses_cover_xl() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/search").query_param("q", "Song Band");
                then.status(200).json_body(serde_json::json!({
                    "data": [{
                        "title": "Song",
                        "artist": {"name": "Band"},
                        "album": {"title": "Record", "cover_xl": "https://e-cdns/cover/1000x1000.jpg"}
                    }]
                }));
            })
            .await;

        let url = DeezerClient::with_base_url(server.base_url())
            .find_cover("Song", "Band")
            .await
            .unwrap();

        assert_eq!(url.as_deref(), Some("https://e-cdns/cover/1000x1000.jpg"));
    }

    #[tokio::test]
    async fn test_server_error_is_network_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/search");
                then.status(500).body("oops");
            })
            .await;

        let err = DeezerClient::with_base_url(server.base_url())
            .find_cover("Song", "Band")
            .await
            .unwrap_err();
        assert!(matches!(err, CoverError::Network(_)));
    }
}
