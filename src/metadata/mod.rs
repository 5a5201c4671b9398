//! Audio file tag introspection.
//!
//! Uses the lofty crate for format-independent metadata access across
//! FLAC, MP3 and M4A.
//!
//! # Features
//! - Read the embedded ISRC used for content-identity checks
//! - Read title/artist/album/album artist for cover and lyrics lookups
//! - Embed lyrics into a downloaded file
//!
//! The [`TagReader`] and [`TagWriter`] traits are the seams the rest of the
//! crate depends on; [`LoftyTags`] is the production implementation.

use std::path::{Path, PathBuf};

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag, TagExt};

/// Display fields read from a file's tags. Empty strings mean "absent".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
}

impl TrackTags {
    /// Fill missing title/artist from an `"Artist - Title"` file stem.
    ///
    /// Tag values always win; the filename only fills fields that are
    /// empty. If no title can be found the whole stem becomes the title.
    pub fn with_filename_fallback(mut self, path: &Path) -> Self {
        if !self.title.is_empty() && !self.artist.is_empty() {
            return self;
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        if let Some((artist, title)) = stem.split_once(" - ") {
            if self.artist.is_empty() {
                self.artist = artist.trim().to_string();
            }
            if self.title.is_empty() {
                self.title = title.trim().to_string();
            }
        }

        if self.title.is_empty() {
            self.title = stem;
        }
        self
    }
}

/// Errors from reading or writing tags.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to read tags from {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to write tags to {path}: {message}")]
    Write { path: PathBuf, message: String },
}

impl MetadataError {
    fn read(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    fn write(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Read-only tag access.
pub trait TagReader: Send + Sync {
    /// The embedded content identifier (ISRC), `None` if absent or blank.
    fn read_identifier(&self, path: &Path) -> Result<Option<String>, MetadataError>;

    /// Title/artist/album/album artist as stored in the tags.
    fn extract_tags(&self, path: &Path) -> Result<TrackTags, MetadataError>;
}

/// Tag mutation used after a download completes.
pub trait TagWriter: Send + Sync {
    fn embed_lyrics(&self, path: &Path, lyrics: &str) -> Result<(), MetadataError>;
}

/// lofty-backed tag access.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTags;

impl LoftyTags {
    fn open(path: &Path) -> Result<lofty::file::TaggedFile, MetadataError> {
        Probe::open(path)
            .map_err(|e| MetadataError::read(path, e))?
            .read()
            .map_err(|e| MetadataError::read(path, e))
    }
}

impl TagReader for LoftyTags {
    fn read_identifier(&self, path: &Path) -> Result<Option<String>, MetadataError> {
        let tagged_file = Self::open(path)?;

        // Any tag may carry the ISRC (e.g. ID3v2 alongside an APE tag)
        let isrc = tagged_file
            .tags()
            .iter()
            .find_map(|tag| tag.get_string(&ItemKey::Isrc))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(isrc)
    }

    fn extract_tags(&self, path: &Path) -> Result<TrackTags, MetadataError> {
        let tagged_file = Self::open(path)?;

        // Get the primary tag, or fall back to the first available tag
        let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
        else {
            return Ok(TrackTags::default());
        };

        Ok(TrackTags {
            title: tag.title().map(|s| s.to_string()).unwrap_or_default(),
            artist: tag.artist().map(|s| s.to_string()).unwrap_or_default(),
            album: tag.album().map(|s| s.to_string()).unwrap_or_default(),
            album_artist: tag
                .get_string(&ItemKey::AlbumArtist)
                .map(|s| s.to_string())
                .unwrap_or_default(),
        })
    }
}

impl TagWriter for LoftyTags {
    fn embed_lyrics(&self, path: &Path, lyrics: &str) -> Result<(), MetadataError> {
        let mut tagged_file = Probe::open(path)
            .map_err(|e| MetadataError::write(path, e))?
            .read()
            .map_err(|e| MetadataError::write(path, e))?;

        let tag_type = tagged_file.primary_tag_type();
        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let Some(tag) = tagged_file.tag_mut(tag_type) else {
            return Err(MetadataError::write(path, "no writable tag"));
        };

        tag.insert_text(ItemKey::Lyrics, lyrics.to_string());
        tag.save_to_path(path, WriteOptions::default())
            .map_err(|e| MetadataError::write(path, e))
    }
}

/// Audio extensions the downloader produces and the scanners recognise.
pub const AUDIO_EXTENSIONS: &[&str] = &["flac", "mp3", "m4a"];

/// Case-insensitive check against [`AUDIO_EXTENSIONS`].
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            AUDIO_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}
