//! LRCLIB HTTP client
//!
//! Free lyrics database with synced lyrics. No API key required.
//!
//! API: https://lrclib.net/docs

use async_trait::async_trait;
use serde::Deserialize;

use super::{LyricLine, Lyrics, LyricsError, LyricsSource, SyncType, parse_lrc};

/// User agent string - LRCLIB asks clients to identify themselves
const USER_AGENT: &str = concat!(
    "flac-harvest/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/flac-harvest)"
);

/// Response body of `/api/get` and each entry of `/api/search`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LrclibTrack {
    #[serde(default)]
    instrumental: bool,
    plain_lyrics: Option<String>,
    synced_lyrics: Option<String>,
}

/// LRCLIB API client
pub struct LrclibClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl LrclibClient {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
            base_url: "https://lrclib.net/api".to_string(),
        }
    }

    /// Create a client for testing with custom base URL
    #[cfg(test)]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::new()
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<Option<T>, LyricsError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| LyricsError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LyricsError::RateLimited);
        }

        if !status.is_success() {
            return Err(LyricsError::Network(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| LyricsError::Parse(e.to_string()))
    }
}

impl Default for LrclibClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Prefer synced lyrics, fall back to plain text.
fn convert(track: LrclibTrack) -> Option<Lyrics> {
    if track.instrumental {
        return None;
    }

    if let Some(synced) = track.synced_lyrics.as_deref().filter(|s| !s.trim().is_empty()) {
        let lines = parse_lrc(synced);
        if !lines.is_empty() {
            return Some(Lyrics {
                sync: SyncType::LineSynced,
                lines,
                source: "lrclib".to_string(),
            });
        }
    }

    let plain = track.plain_lyrics.filter(|s| !s.trim().is_empty())?;
    Some(Lyrics {
        sync: SyncType::Unsynced,
        lines: plain
            .lines()
            .map(|line| LyricLine {
                start_ms: None,
                text: line.to_string(),
            })
            .collect(),
        source: "lrclib".to_string(),
    })
}

#[async_trait]
impl LyricsSource for LrclibClient {
    fn name(&self) -> &'static str {
        "lrclib"
    }

    async fn fetch_lyrics(
        &self,
        title: &str,
        artist: &str,
        duration_secs: Option<u32>,
    ) -> Result<Option<Lyrics>, LyricsError> {
        let mut url = format!(
            "{}/get?track_name={}&artist_name={}",
            self.base_url,
            urlencoding::encode(title),
            urlencoding::encode(artist)
        );
        if let Some(duration) = duration_secs {
            url.push_str(&format!("&duration={duration}"));
        }

        if let Some(track) = self.get::<LrclibTrack>(&url).await?
            && let Some(lyrics) = convert(track)
        {
            return Ok(Some(lyrics));
        }

        // Exact lookup missed; the search endpoint is more forgiving
        let url = format!(
            "{}/search?track_name={}&artist_name={}",
            self.base_url,
            urlencoding::encode(title),
            urlencoding::encode(artist)
        );
        let results = self.get::<Vec<LrclibTrack>>(&url).await?.unwrap_or_default();
        Ok(results.into_iter().find_map(convert))
    }
}
