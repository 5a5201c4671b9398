//! Lyrics lookup and LRC rendering.
//!
//! Used in two places: embedding lyrics into freshly downloaded FLAC files,
//! and writing `.lrc` siblings during library repair.

mod lrc;
mod lrclib;

pub use lrc::{format_timestamp, parse_lrc, to_lrc};
pub use lrclib::LrclibClient;

use async_trait::async_trait;
use serde::Serialize;

/// Whether lines carry timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncType {
    LineSynced,
    Unsynced,
}

/// One line of lyrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LyricLine {
    /// Offset from the start of the track, when synced
    pub start_ms: Option<u64>,
    pub text: String,
}

/// Lyrics for one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lyrics {
    pub sync: SyncType,
    pub lines: Vec<LyricLine>,
    /// Service the lyrics came from
    pub source: String,
}

impl Lyrics {
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.text.trim().is_empty())
    }
}

/// Errors from lyrics services.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LyricsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Rate limited - try again later")]
    RateLimited,
}

/// A service that returns lyrics by track name and artist.
#[async_trait]
pub trait LyricsSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the service has no lyrics for this track.
    async fn fetch_lyrics(
        &self,
        title: &str,
        artist: &str,
        duration_secs: Option<u32>,
    ) -> Result<Option<Lyrics>, LyricsError>;
}
