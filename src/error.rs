//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level application error enum
//! - Module-specific errors (e.g., [`QueueError`], [`ResolveError`]) for detailed handling
//! - Per-service errors ([`crate::resolve::ServiceError`]) never appear here; the
//!   resolver absorbs them and only surfaces [`ResolveError`]
//!
//! # Example
//!
//! ```ignore
//! use flac_harvest::error::{Error, Result};
//!
//! fn start(store: &QueueStore, id: &str) -> Result<()> {
//!     store.start(id)?; // Queue errors auto-convert
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::cover::CoverError;
use crate::dedup::DedupError;
use crate::lyrics::LyricsError;
use crate::metadata::MetadataError;
use crate::queue::QueueError;
use crate::resolve::ResolveError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Aggregates errors from all subsystems for unified handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Queue contract violation (duplicate id, invalid transition)
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// All download sources exhausted
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Existing-file check error
    #[error("Dedup error: {0}")]
    Dedup(#[from] DedupError),

    /// Tag reading/writing error
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Local metadata catalog error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Cover art lookup/download error
    #[error("Cover error: {0}")]
    Cover(#[from] CoverError),

    /// Lyrics lookup error
    #[error("Lyrics error: {0}")]
    Lyrics(#[from] LyricsError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Caller supplied an unusable request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// File or directory not found
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a not found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, QueueError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Queue(e).context(ctx))
    }
}
