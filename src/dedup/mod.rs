//! Existing-library deduplication.
//!
//! Two independent checks decide whether a download can be skipped:
//!
//! - **Identity**: some audio file in the output directory carries the
//!   requested ISRC in its tags.
//! - **Path**: the deterministic expected path exists, is larger than the
//!   minimum plausible size, and carries a non-empty ISRC. A file at the
//!   expected path that fails either test is treated as a broken leftover
//!   and deleted so the download can replace it.

mod filename;
mod locks;

pub use filename::{FilenameFormat, NameFields, OUTPUT_EXTENSION, build_filename, sanitize_filename};
pub use locks::{PathGuard, PathLocks};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metadata::TagReader;
use crate::scanner::{Depth, audio_files};

/// Files at or below this size are never treated as finished downloads.
pub const DEFAULT_MIN_EXISTING_BYTES: u64 = 100 * 1024;

/// Result of checking the expected output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupOutcome {
    /// A valid file is already there
    Existing(PathBuf),
    /// A broken file was there and has been deleted
    Healed(PathBuf),
    /// Nothing at the path
    Absent,
}

/// Errors from deduplication.
#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("Failed to remove corrupt file {path}: {source}")]
    RemoveCorrupt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One entry of a bulk existence check.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExistenceQuery {
    #[serde(default)]
    pub isrc: String,
    #[serde(default, alias = "track_name")]
    pub title: String,
    #[serde(default, alias = "artist_name")]
    pub artist: String,
}

/// How an existing file was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Isrc,
    Filename,
}

/// Answer for one [`ExistenceQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistenceResult {
    pub isrc: String,
    pub title: String,
    pub artist: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<MatchKind>,
}

/// On-disk duplicate detection.
#[derive(Clone)]
pub struct Deduplicator {
    reader: Arc<dyn TagReader>,
    min_bytes: u64,
}

impl Deduplicator {
    pub fn new(reader: Arc<dyn TagReader>) -> Self {
        Self {
            reader,
            min_bytes: DEFAULT_MIN_EXISTING_BYTES,
        }
    }

    pub fn with_min_bytes(mut self, min_bytes: u64) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    pub fn min_bytes(&self) -> u64 {
        self.min_bytes
    }

    /// Find an audio file directly inside `dir` whose embedded ISRC equals
    /// `isrc` (case-insensitive). Unreadable files are ignored.
    pub fn find_by_identity(&self, dir: &Path, isrc: &str) -> Option<PathBuf> {
        let isrc = isrc.trim();
        if isrc.is_empty() {
            return None;
        }

        audio_files(dir, Depth::Shallow).into_iter().find(|path| {
            matches!(
                self.reader.read_identifier(path),
                Ok(Some(found)) if found.eq_ignore_ascii_case(isrc)
            )
        })
    }

    /// Check the expected output path, deleting it if it holds a broken file.
    pub fn check_expected_path(&self, path: &Path) -> Result<DedupOutcome, DedupError> {
        let Ok(meta) = std::fs::metadata(path) else {
            return Ok(DedupOutcome::Absent);
        };
        if !meta.is_file() {
            return Ok(DedupOutcome::Absent);
        }

        let reason = if meta.len() <= self.min_bytes {
            format!("only {} bytes", meta.len())
        } else {
            match self.reader.read_identifier(path) {
                Ok(Some(_)) => {
                    debug!(path = %path.display(), "Valid file already at expected path");
                    return Ok(DedupOutcome::Existing(path.to_path_buf()));
                }
                Ok(None) => "no ISRC in tags".to_string(),
                Err(e) => e.to_string(),
            }
        };

        info!(path = %path.display(), "Removing corrupted file ({})", reason);
        std::fs::remove_file(path).map_err(|source| DedupError::RemoveCorrupt {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(DedupOutcome::Healed(path.to_path_buf()))
    }

    /// Size-only existence check (no tag read, never deletes).
    pub fn check_track_exists(&self, path: &Path) -> Option<PathBuf> {
        std::fs::metadata(path)
            .ok()
            .filter(|meta| meta.is_file() && meta.len() > self.min_bytes)
            .map(|_| path.to_path_buf())
    }

    /// Bulk existence check against `dir`, evaluated in parallel.
    ///
    /// Each query matches by ISRC first, then by the `Title - Artist` file
    /// name. Results are returned in input order.
    pub fn check_files_exist(
        &self,
        dir: &Path,
        queries: &[ExistenceQuery],
        format: &FilenameFormat,
    ) -> Vec<ExistenceResult> {
        let files = audio_files(dir, Depth::Shallow);
        let index: HashMap<String, PathBuf> = files
            .par_iter()
            .filter_map(|path| match self.reader.read_identifier(path) {
                Ok(Some(isrc)) => Some((isrc.to_ascii_uppercase(), path.clone())),
                Ok(None) => None,
                Err(e) => {
                    warn!(path = %path.display(), "Skipping unreadable file: {}", e);
                    None
                }
            })
            .collect();
        debug!(files = files.len(), indexed = index.len(), "Built ISRC index");

        queries
            .par_iter()
            .map(|query| {
                let by_isrc = (!query.isrc.trim().is_empty())
                    .then(|| index.get(&query.isrc.trim().to_ascii_uppercase()))
                    .flatten()
                    .map(|path| (path.clone(), MatchKind::Isrc));

                let found = by_isrc.or_else(|| {
                    if query.title.is_empty() || query.artist.is_empty() {
                        return None;
                    }
                    let fields = NameFields {
                        title: &query.title,
                        artist: &query.artist,
                        ..Default::default()
                    };
                    self.check_track_exists(&dir.join(build_filename(&fields, format, false)))
                        .map(|path| (path, MatchKind::Filename))
                });

                ExistenceResult {
                    isrc: query.isrc.clone(),
                    title: query.title.clone(),
                    artist: query.artist.clone(),
                    exists: found.is_some(),
                    matched_by: found.as_ref().map(|(_, kind)| *kind),
                    file_path: found.map(|(path, _)| path),
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for Deduplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deduplicator")
            .field("min_bytes", &self.min_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockTagReader, write_file};

    const BIG: usize = 200 * 1024;

    fn dedup(reader: &Arc<MockTagReader>) -> Deduplicator {
        Deduplicator::new(Arc::clone(reader) as Arc<dyn TagReader>)
    }

    #[test]
    fn test_find_by_identity() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(&dir.path().join("a.flac"), 10);
        let b = write_file(&dir.path().join("b.mp3"), 10);
        write_file(&dir.path().join("notes.txt"), 10);
        let nested = write_file(&dir.path().join("sub/c.flac"), 10);

        let reader = Arc::new(MockTagReader::new());
        reader.set_isrc(&a, Some("USUM71703861"));
        reader.set_isrc(&b, Some("GBAYE0601498"));
        reader.set_isrc(&nested, Some("FRZ039800212"));

        let d = dedup(&reader);
        assert_eq!(d.find_by_identity(dir.path(), "gbaye0601498"), Some(b));
        assert_eq!(d.find_by_identity(dir.path(), "FRZ039800212"), None);
        assert_eq!(d.find_by_identity(dir.path(), ""), None);
    }

    #[test]
    fn test_valid_file_at_expected_path_is_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir.path().join("Song - Artist.flac"), BIG);
        let reader = Arc::new(MockTagReader::with_default_isrc("USUM71703861"));

        let outcome = dedup(&reader).check_expected_path(&path).unwrap();
        assert_eq!(outcome, DedupOutcome::Existing(path.clone()));
        assert!(path.exists());
    }

    #[test]
    fn test_zero_byte_file_is_healed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir.path().join("Song - Artist.flac"), 0);
        let reader = Arc::new(MockTagReader::with_default_isrc("USUM71703861"));

        let outcome = dedup(&reader).check_expected_path(&path).unwrap();
        assert_eq!(outcome, DedupOutcome::Healed(path.clone()));
        assert!(!path.exists());
        assert_eq!(reader.reads(), 0, "size check comes before the tag read");
    }

    #[test]
    fn test_tagless_file_is_healed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir.path().join("Song - Artist.flac"), BIG);
        let reader = Arc::new(MockTagReader::new());
        reader.set_isrc(&path, None);

        let outcome = dedup(&reader).check_expected_path(&path).unwrap();
        assert_eq!(outcome, DedupOutcome::Healed(path.clone()));
        assert!(!path.exists());
    }

    #[test]
    fn test_absent_path() {
        let dir = tempfile::tempdir().unwrap();
        let reader = Arc::new(MockTagReader::new());
        let outcome = dedup(&reader)
            .check_expected_path(&dir.path().join("nothing.flac"))
            .unwrap();
        assert_eq!(outcome, DedupOutcome::Absent);
    }

    #[test]
    fn test_check_track_exists_is_size_only() {
        let dir = tempfile::tempdir().unwrap();
        let big = write_file(&dir.path().join("big.flac"), BIG);
        let small = write_file(&dir.path().join("small.flac"), 1024);
        let reader = Arc::new(MockTagReader::new());
        let d = dedup(&reader);

        assert_eq!(d.check_track_exists(&big), Some(big.clone()));
        assert_eq!(d.check_track_exists(&small), None);
        assert!(small.exists(), "size-only check never deletes");
        assert_eq!(reader.reads(), 0);
    }

    #[test]
    fn test_check_files_exist_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let tagged = write_file(&dir.path().join("whatever.flac"), 10);
        let named = write_file(&dir.path().join("Yesterday - The Beatles.flac"), BIG);
        let reader = Arc::new(MockTagReader::new());
        reader.set_isrc(&tagged, Some("USUM71703861"));
        reader.set_isrc(&named, None);

        let queries = vec![
            ExistenceQuery {
                isrc: "XX0000000000".to_string(),
                title: "Missing".to_string(),
                artist: "Nobody".to_string(),
            },
            ExistenceQuery {
                isrc: "usum71703861".to_string(),
                ..Default::default()
            },
            ExistenceQuery {
                isrc: String::new(),
                title: "Yesterday".to_string(),
                artist: "The Beatles".to_string(),
            },
        ];

        let results = dedup(&reader).check_files_exist(dir.path(), &queries, &FilenameFormat::TitleArtist);

        assert_eq!(results.len(), 3);
        assert!(!results[0].exists);
        assert_eq!(results[1].file_path.as_ref(), Some(&tagged));
        assert_eq!(results[1].matched_by, Some(MatchKind::Isrc));
        assert_eq!(results[2].file_path.as_ref(), Some(&named));
        assert_eq!(results[2].matched_by, Some(MatchKind::Filename));
    }

    #[test]
    fn test_existence_query_accepts_legacy_field_names() {
        let q: ExistenceQuery =
            serde_json::from_str(r#"{"isrc":"X","track_name":"T","artist_name":"A"}"#).unwrap();
        assert_eq!(q.title, "T");
        assert_eq!(q.artist, "A");
    }
}
