//! Test utilities and fixtures for flac-harvest tests.
//!
//! This module provides mock tag access, filler audio files and a catalog
//! database fixture. HTTP clients are tested against `httpmock::MockServer`.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{temp_catalog, insert_track};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (path, pool, _dir) = temp_catalog().await;
//!     insert_track(&pool, "sp1", "Song", "Band", "USRC17607839", None).await;
//!     // ... open a Catalog at `path`
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use crate::metadata::{MetadataError, TagReader, TagWriter, TrackTags};

/// Write `len` filler bytes to `path`, creating parent directories.
pub fn write_file(path: &Path, len: usize) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    std::fs::write(path, vec![0x5A; len]).expect("Failed to write fixture file");
    path.to_path_buf()
}

/// In-memory [`TagReader`]: ISRCs and tags are registered per path.
///
/// Reading a path that does not exist on disk fails like a real reader.
#[derive(Default)]
pub struct MockTagReader {
    isrcs: Mutex<HashMap<PathBuf, Option<String>>>,
    tags: Mutex<HashMap<PathBuf, TrackTags>>,
    default_isrc: Option<String>,
    reads: AtomicUsize,
}

impl MockTagReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every unregistered file reports this ISRC.
    pub fn with_default_isrc(isrc: &str) -> Self {
        Self {
            default_isrc: Some(isrc.to_string()),
            ..Self::default()
        }
    }

    pub fn set_isrc(&self, path: &Path, isrc: Option<&str>) {
        self.isrcs
            .lock()
            .insert(path.to_path_buf(), isrc.map(String::from));
    }

    pub fn set_tags(&self, path: &Path, tags: TrackTags) {
        self.tags.lock().insert(path.to_path_buf(), tags);
    }

    /// Number of `read_identifier` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl TagReader for MockTagReader {
    fn read_identifier(&self, path: &Path) -> Result<Option<String>, MetadataError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !path.exists() {
            return Err(MetadataError::Read {
                path: path.to_path_buf(),
                message: "No such file".to_string(),
            });
        }
        Ok(self
            .isrcs
            .lock()
            .get(path)
            .cloned()
            .unwrap_or_else(|| self.default_isrc.clone()))
    }

    fn extract_tags(&self, path: &Path) -> Result<TrackTags, MetadataError> {
        Ok(self.tags.lock().get(path).cloned().unwrap_or_default())
    }
}

/// [`TagWriter`] that records what would have been embedded.
#[derive(Default)]
pub struct MockTagWriter {
    pub embedded: Mutex<Vec<(PathBuf, String)>>,
}

impl TagWriter for MockTagWriter {
    fn embed_lyrics(&self, path: &Path, lyrics: &str) -> Result<(), MetadataError> {
        self.embedded
            .lock()
            .push((path.to_path_buf(), lyrics.to_string()));
        Ok(())
    }
}

/// Creates a temporary catalog database with the metadata-cache schema.
///
/// Keep the returned `TempDir` alive for the duration of the test.
pub async fn temp_catalog() -> (PathBuf, SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("catalog.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let pool = SqlitePool::connect(&db_url)
        .await
        .expect("Failed to create test catalog");

    for statement in [
        "CREATE TABLE tracks (id TEXT PRIMARY KEY, name TEXT, artists TEXT, external_id_isrc TEXT, album_rowid INTEGER)",
        "CREATE TABLE albums (name TEXT)",
        "CREATE TABLE album_images (album_rowid INTEGER, url TEXT, width INTEGER)",
    ] {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to create catalog schema");
    }

    (db_path, pool, dir)
}

/// Insert an album with images, returning its rowid.
pub async fn insert_album(pool: &SqlitePool, name: &str, images: &[(&str, i64)]) -> i64 {
    let rowid = sqlx::query("INSERT INTO albums (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await
        .expect("Failed to insert album")
        .last_insert_rowid();

    for (url, width) in images {
        sqlx::query("INSERT INTO album_images (album_rowid, url, width) VALUES (?, ?, ?)")
            .bind(rowid)
            .bind(url)
            .bind(width)
            .execute(pool)
            .await
            .expect("Failed to insert album image");
    }
    rowid
}

/// Insert a catalog track row.
pub async fn insert_track(
    pool: &SqlitePool,
    id: &str,
    name: &str,
    artists: &str,
    isrc: &str,
    album_rowid: Option<i64>,
) {
    sqlx::query(
        "INSERT INTO tracks (id, name, artists, external_id_isrc, album_rowid) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(artists)
    .bind(isrc)
    .bind(album_rowid)
    .execute(pool)
    .await
    .expect("Failed to insert track");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_tag_reader_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir.path().join("a.flac"), 10);
        let reader = MockTagReader::with_default_isrc("X");

        assert_eq!(reader.read_identifier(&path).unwrap().as_deref(), Some("X"));
        assert!(reader.read_identifier(&dir.path().join("missing.flac")).is_err());

        reader.set_isrc(&path, None);
        assert_eq!(reader.read_identifier(&path).unwrap(), None);
        assert_eq!(reader.reads(), 3);
    }

    #[tokio::test]
    async fn test_temp_catalog_schema() {
        let (_path, pool, _dir) = temp_catalog().await;
        let album = insert_album(&pool, "Abbey Road", &[("http://img/640", 640)]).await;
        insert_track(&pool, "sp1", "Something", "The Beatles", "GBAYE0601690", Some(album)).await;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
