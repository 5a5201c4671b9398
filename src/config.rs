//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\flac-harvest\config.toml
//! - macOS: ~/Library/Application Support/flac-harvest/config.toml
//! - Linux: ~/.config/flac-harvest/config.toml
//!
//! Every section is optional; missing keys take their defaults. Command
//! line flags override what is loaded here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dedup::{DEFAULT_MIN_EXISTING_BYTES, FilenameFormat};
use crate::pool::DEFAULT_CONCURRENCY;
use crate::resolve::{DEFAULT_TOLERANCE_SECS, ServiceKind};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub download: DownloadConfig,

    /// Gateway base URL per streaming service
    pub services: ServicesConfig,

    pub library: LibraryConfig,
}

/// Download behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Where new files are written
    pub output_dir: PathBuf,

    /// "title-artist", "artist-title", "title", or a `{placeholder}` template
    pub filename_format: FilenameFormat,

    /// Prefix file names with `NN. `
    pub track_number: bool,

    /// Services to try, in priority order
    pub service_order: Vec<ServiceKind>,

    /// Concurrent downloads in a batch
    pub concurrency: usize,

    /// Embed lyrics into freshly downloaded FLAC files
    pub embed_lyrics: bool,

    /// Smaller files at the expected path are treated as broken
    pub min_existing_bytes: u64,

    /// Allowed duration difference when a service has no ISRC
    pub duration_tolerance_secs: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs::audio_dir()
                .or_else(|| dirs::home_dir().map(|h| h.join("Music")))
                .unwrap_or_else(|| PathBuf::from(".")),
            filename_format: FilenameFormat::default(),
            track_number: false,
            service_order: ServiceKind::ALL.to_vec(),
            concurrency: DEFAULT_CONCURRENCY,
            embed_lyrics: false,
            min_existing_bytes: DEFAULT_MIN_EXISTING_BYTES,
            duration_tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }
}

/// Gateway URLs. A service without a URL is skipped by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub tidal: Option<String>,
    pub qobuz: Option<String>,
    pub amazon: Option<String>,
}

impl ServicesConfig {
    pub fn url(&self, kind: ServiceKind) -> Option<&str> {
        match kind {
            ServiceKind::Tidal => self.tidal.as_deref(),
            ServiceKind::Qobuz => self.qobuz.as_deref(),
            ServiceKind::Amazon => self.amazon.as_deref(),
        }
        .map(str::trim)
        .filter(|url| !url.is_empty())
    }

    /// Configured services with their URLs, in [`ServiceKind::ALL`] order.
    pub fn configured(&self) -> Vec<(ServiceKind, String)> {
        ServiceKind::ALL
            .into_iter()
            .filter_map(|kind| self.url(kind).map(|url| (kind, url.to_string())))
            .collect()
    }
}

/// Library verification and metadata cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// SQLite metadata cache (read-only)
    pub catalog_path: Option<PathBuf>,

    /// Concurrent repairs during verification
    pub verify_concurrency: usize,

    /// Remote cover services in priority order
    pub cover_services: Vec<String>,

    /// Delay before each MusicBrainz request
    pub musicbrainz_spacing_ms: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            catalog_path: None,
            verify_concurrency: DEFAULT_CONCURRENCY,
            cover_services: vec![
                "itunes".to_string(),
                "deezer".to_string(),
                "musicbrainz".to_string(),
            ],
            musicbrainz_spacing_ms: 1100,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("flac-harvest"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location.
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    match config_path() {
        Some(path) => load_from(&path),
        None => {
            tracing::warn!("Could not determine config directory, using defaults");
            Config::default()
        }
    }
}

/// Load configuration from `path`, falling back to defaults.
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to the default location.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save configuration to `path`, creating its directory.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
