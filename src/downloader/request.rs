//! Request and response shapes of the download boundary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dedup::{FilenameFormat, NameFields, build_filename};
use crate::queue::{ItemId, TrackIdentity};
use crate::resolve::{ServiceKind, TrackQuery};

/// One track to download.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadRequest {
    pub isrc: String,
    #[serde(alias = "track_name")]
    pub title: String,
    #[serde(alias = "artist_name")]
    pub artist: String,
    #[serde(alias = "album_name")]
    pub album: String,
    pub album_artist: String,
    pub release_date: String,
    /// Position in the album or playlist, 0 if unknown
    pub position: u32,
    pub disc_number: u32,
    pub duration_secs: Option<u32>,
    pub spotify_id: Option<String>,
    /// Direct per-service URLs; a service with a URL skips search
    pub service_urls: HashMap<ServiceKind, String>,
    /// Overrides the configured service order for this request
    pub service_order: Option<Vec<ServiceKind>>,
    pub output_dir: PathBuf,
    pub filename_format: FilenameFormat,
    pub track_number: bool,
    pub embed_lyrics: bool,
    /// Existing queue item to report on; a new one is created if absent
    pub item_id: Option<ItemId>,
}

impl DownloadRequest {
    pub fn identity(&self) -> TrackIdentity {
        TrackIdentity::new(&self.isrc, &self.title, &self.artist, &self.album)
    }

    /// Deterministic destination for this request.
    pub fn expected_path(&self) -> PathBuf {
        self.expected_path_in(&self.output_dir)
    }

    fn expected_path_in(&self, dir: &Path) -> PathBuf {
        let fields = NameFields {
            title: &self.title,
            artist: &self.artist,
            album: &self.album,
            album_artist: &self.album_artist,
            release_date: &self.release_date,
            position: self.position,
            disc: self.disc_number,
        };
        dir.join(build_filename(&fields, &self.filename_format, self.track_number))
    }

    pub fn query(&self) -> TrackQuery {
        TrackQuery {
            isrc: self.isrc.trim().to_string(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            duration_secs: self.duration_secs,
            spotify_id: self.spotify_id.clone().filter(|s| !s.is_empty()),
            service_urls: self
                .service_urls
                .iter()
                .filter(|(_, url)| !url.trim().is_empty())
                .map(|(kind, url)| (*kind, url.clone()))
                .collect(),
        }
    }
}

/// Outcome of one download request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// The file was already on disk and nothing was downloaded
    pub already_exists: bool,
    pub item_id: ItemId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadResponse {
    pub(crate) fn downloaded(item_id: &str, file: PathBuf) -> Self {
        Self {
            success: true,
            message: "Download completed successfully".to_string(),
            file: Some(file),
            item_id: item_id.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn existing(item_id: &str, file: PathBuf) -> Self {
        Self {
            success: true,
            message: "File already exists".to_string(),
            file: Some(file),
            already_exists: true,
            item_id: item_id.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn failed(item_id: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            message: format!("Download failed: {error}"),
            error: Some(error),
            item_id: item_id.to_string(),
            ..Default::default()
        }
    }
}
