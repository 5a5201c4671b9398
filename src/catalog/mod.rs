//! Read-only access to the local metadata cache.
//!
//! The catalog is a SQLite database of streaming-service metadata built by an
//! external tool. Only three tables are used:
//!
//! - `tracks` (`id`, `name`, `artists`, `external_id_isrc`, `album_rowid`)
//! - `albums` (`name`, keyed by `rowid`)
//! - `album_images` (`album_rowid`, `url`, `width`)
//!
//! The database is opened with `mode=ro`; nothing here writes to it.
//!
//! # Example
//!
//! ```ignore
//! use flac_harvest::catalog::Catalog;
//!
//! let catalog = Catalog::open(Path::new("spotify.db")).await?;
//! let isrc = catalog.isrc_for_spotify_id("4uLU6hMCjMI75M1A2tKUQC").await?;
//! ```

mod identity;

pub use identity::{IdentityLookup, IdentityOrigin, IdentitySource, lookup_identity};

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::cover::CoverCatalog;

/// Errors from the metadata cache.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Catalog schema is missing {0}")]
    MissingSchema(String),
}

/// Read-only connection pool over a catalog database.
#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Open an existing catalog. Never creates the file.
    pub async fn open(path: &Path) -> Result<Self, CatalogError> {
        if !path.is_file() {
            return Err(CatalogError::Unavailable(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&format!("sqlite:{}?mode=ro", path.display()))
            .await?;

        Ok(Self { pool })
    }

    /// ISRC recorded for a Spotify track id, if any.
    pub async fn isrc_for_spotify_id(&self, spotify_id: &str) -> Result<Option<String>, CatalogError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT external_id_isrc FROM tracks WHERE id = ? LIMIT 1")
                .bind(spotify_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row
            .and_then(|(isrc,)| isrc)
            .map(|isrc| isrc.trim().to_string())
            .filter(|isrc| !isrc.is_empty()))
    }

    /// Widest image URL of the album with this exact name.
    pub async fn album_cover(&self, album: &str) -> Result<Option<String>, CatalogError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT rowid FROM albums WHERE name = ? LIMIT 1")
            .bind(album)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((rowid,)) => self.widest_image(rowid).await,
            None => Ok(None),
        }
    }

    /// Cover of the album a track belongs to, matched by name and artist.
    ///
    /// The artist matches anywhere in the `artists` column, so featured
    /// artists and multi-artist credits still hit.
    pub async fn track_cover(&self, title: &str, artist: &str) -> Result<Option<String>, CatalogError> {
        let row: Option<(Option<i64>,)> = sqlx::query_as(
            r#"
            SELECT album_rowid FROM tracks
            WHERE LOWER(name) LIKE LOWER(?)
              AND (LOWER(artists) LIKE LOWER(?) OR LOWER(artists) LIKE LOWER(?))
            LIMIT 1
            "#,
        )
        .bind(title)
        .bind(format!("%{artist}%"))
        .bind(format!("{artist}%"))
        .fetch_optional(&self.pool)
        .await?;

        match row.and_then(|(rowid,)| rowid) {
            Some(rowid) => self.widest_image(rowid).await,
            None => Ok(None),
        }
    }

    async fn widest_image(&self, album_rowid: i64) -> Result<Option<String>, CatalogError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT url FROM album_images WHERE album_rowid = ? ORDER BY width DESC LIMIT 1",
        )
        .bind(album_rowid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(url,)| url).filter(|url| !url.is_empty()))
    }

    /// Check the schema this crate relies on and return the track count.
    pub async fn test_connection(&self) -> Result<i64, CatalogError> {
        let table: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'tracks'")
                .fetch_optional(&self.pool)
                .await?;
        if table.is_none() {
            return Err(CatalogError::MissingSchema("table 'tracks'".to_string()));
        }

        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('tracks')")
            .fetch_all(&self.pool)
            .await?;
        for required in ["id", "external_id_isrc"] {
            if !columns.iter().any(|c| c == required) {
                return Err(CatalogError::MissingSchema(format!("column 'tracks.{required}'")));
            }
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
            .fetch_one(&self.pool)
            .await?;
        tracing::info!("Catalog OK: {} tracks", count);
        Ok(count)
    }
}

#[async_trait]
impl CoverCatalog for Catalog {
    async fn cover_for_album(&self, album: &str) -> Result<Option<String>, CatalogError> {
        self.album_cover(album).await
    }

    async fn cover_for_track(&self, title: &str, artist: &str) -> Result<Option<String>, CatalogError> {
        self.track_cover(title, artist).await
    }
}
