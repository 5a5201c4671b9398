//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `download`: single track or JSON batch download
//! - `verify`: library cover/lyrics audit and repair
//! - `lookup`: existence checks, ISRC lookup, catalog check, config

mod download;
mod lookup;
mod verify;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use crate::catalog::Catalog;
use crate::config::{self, Config};
use crate::cover::{CoverCatalog, CoverFinder, HttpCoverDownloader, sources_from_names};
use crate::dedup::{Deduplicator, FilenameFormat};
use crate::downloader::DownloadManager;
use crate::library::LibraryVerifier;
use crate::lyrics::LrclibClient;
use crate::metadata::LoftyTags;
use crate::queue::QueueStore;
use crate::resolve::{GatewayService, Resolver, ServiceKind, TrackService};

pub use download::cmd_download;
pub use lookup::{cmd_config, cmd_exists, cmd_isrc, cmd_test_catalog};
pub use verify::cmd_verify;

/// flac-harvest CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to the OS config directory)
    #[arg(long, global = true, env = "FLAC_HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Download one track, or a batch from a JSON file
    Download {
        /// ISRC of the track (looked up from --spotify-id if omitted)
        isrc: Option<String>,
        /// JSON file with an array of download requests
        #[arg(long, conflicts_with = "isrc")]
        batch: Option<PathBuf>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        album: Option<String>,
        #[arg(long)]
        album_artist: Option<String>,
        /// YYYY or YYYY-MM-DD
        #[arg(long)]
        release_date: Option<String>,
        /// Position in album or playlist
        #[arg(long)]
        position: Option<u32>,
        #[arg(long)]
        disc: Option<u32>,
        /// Expected duration in seconds
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        spotify_id: Option<String>,
        /// Direct service URL as SERVICE=URL (repeatable)
        #[arg(long = "url", value_name = "SERVICE=URL")]
        urls: Vec<String>,
        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Filename format: title-artist, artist-title, title or a template
        #[arg(short, long)]
        format: Option<FilenameFormat>,
        /// Prefix file names with the track number
        #[arg(long)]
        track_number: bool,
        /// Service order, comma separated (e.g. qobuz,tidal)
        #[arg(short, long, value_delimiter = ',')]
        services: Vec<ServiceKind>,
        /// Concurrent downloads for a batch
        #[arg(short, long)]
        concurrency: Option<usize>,
        /// Embed lyrics into downloaded FLAC files
        #[arg(long)]
        embed_lyrics: bool,
        /// Print responses as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a library for missing cover art and lyrics
    Verify {
        /// Library root
        path: PathBuf,
        /// Skip the cover check
        #[arg(long)]
        no_covers: bool,
        /// Skip the lyrics check
        #[arg(long)]
        no_lyrics: bool,
        /// Download whatever is missing
        #[arg(long)]
        repair: bool,
        #[arg(short, long)]
        concurrency: Option<usize>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check which tracks from a JSON file already exist
    Exists {
        /// JSON array of {isrc, track_name, artist_name}
        file: PathBuf,
        /// Directory to check (defaults to the configured output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        format: Option<FilenameFormat>,
    },
    /// Look up the ISRC of a Spotify track
    Isrc {
        spotify_id: String,
        /// Metadata cache database
        #[arg(long, env = "FLAC_HARVEST_CATALOG")]
        catalog: Option<PathBuf>,
    },
    /// Check that a metadata cache database is usable
    TestCatalog {
        path: PathBuf,
    },
    /// Show the effective configuration
    Config {
        /// Write the current configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config = load_config(cli);

    match &cli.command {
        Commands::Download { .. } => cmd_download(&rt, &config, &cli.command),
        Commands::Verify {
            path,
            no_covers,
            no_lyrics,
            repair,
            concurrency,
            json,
        } => cmd_verify(
            &rt,
            &config,
            path,
            !*no_covers,
            !*no_lyrics,
            *repair,
            concurrency.unwrap_or(config.library.verify_concurrency),
            *json,
        ),
        Commands::Exists {
            file,
            output,
            format,
        } => cmd_exists(
            &config,
            file,
            output.as_ref().unwrap_or(&config.download.output_dir),
            format.as_ref().unwrap_or(&config.download.filename_format),
        ),
        Commands::Isrc {
            spotify_id,
            catalog,
        } => cmd_isrc(
            &rt,
            &config,
            spotify_id,
            catalog.as_ref().or(config.library.catalog_path.as_ref()),
        ),
        Commands::TestCatalog { path } => cmd_test_catalog(&rt, path),
        Commands::Config { save } => cmd_config(cli.config.as_deref(), &config, *save),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

fn load_config(cli: &Cli) -> Config {
    match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    }
}

/// Gateway-backed services from the `[services]` section.
pub(crate) fn gateway_services(config: &Config) -> Vec<GatewayService> {
    config
        .services
        .configured()
        .into_iter()
        .map(|(kind, url)| GatewayService::new(kind, url))
        .collect()
}

/// Wire the download manager from config.
pub(crate) fn build_manager(config: &Config) -> Arc<DownloadManager> {
    let tags = Arc::new(LoftyTags);
    let services: Vec<Arc<dyn TrackService>> = gateway_services(config)
        .into_iter()
        .map(|s| Arc::new(s) as Arc<dyn TrackService>)
        .collect();
    if services.is_empty() {
        tracing::warn!("No services configured; add gateway URLs under [services]");
    }

    let resolver = Resolver::new(services)
        .with_order(config.download.service_order.clone())
        .with_tolerance(config.download.duration_tolerance_secs)
        .with_tag_check(tags.clone());
    let dedup = Deduplicator::new(tags.clone()).with_min_bytes(config.download.min_existing_bytes);

    let manager = DownloadManager::new(Arc::new(QueueStore::new()), dedup, resolver, tags);
    let manager = if config.download.embed_lyrics {
        manager.with_lyrics(Arc::new(LrclibClient::new()))
    } else {
        manager
    };
    Arc::new(manager)
}

/// Open the configured catalog, logging instead of failing.
pub(crate) async fn open_catalog(path: Option<&PathBuf>) -> Option<Catalog> {
    let path = path?;
    match Catalog::open(path).await {
        Ok(catalog) => Some(catalog),
        Err(e) => {
            tracing::warn!("Catalog {} unavailable: {}", path.display(), e);
            None
        }
    }
}

/// Wire the library verifier from config.
pub(crate) async fn build_verifier(config: &Config) -> LibraryVerifier {
    let sources = sources_from_names(
        &config.library.cover_services,
        Duration::from_millis(config.library.musicbrainz_spacing_ms),
    );
    let mut finder = CoverFinder::new(sources);
    if let Some(catalog) = open_catalog(config.library.catalog_path.as_ref()).await {
        finder = finder.with_catalog(Arc::new(catalog) as Arc<dyn CoverCatalog>);
    }

    LibraryVerifier::new(Arc::new(LoftyTags), finder, Arc::new(HttpCoverDownloader::new()))
        .with_lyrics(Arc::new(LrclibClient::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_download_flags() {
        let cli = Cli::parse_from([
            "flac-harvest",
            "download",
            "USUM71703861",
            "--title",
            "Perfect",
            "--services",
            "qobuz,tidal",
            "--url",
            "tidal=https://tidal.example/track/1",
            "-f",
            "artist-title",
        ]);
        let Commands::Download {
            isrc,
            services,
            urls,
            format,
            ..
        } = cli.command
        else {
            panic!("expected download");
        };
        assert_eq!(isrc.as_deref(), Some("USUM71703861"));
        assert_eq!(services, vec![ServiceKind::Qobuz, ServiceKind::Tidal]);
        assert_eq!(urls.len(), 1);
        assert_eq!(format, Some(FilenameFormat::ArtistTitle));
    }

    #[test]
    fn test_unknown_service_rejected() {
        let result = Cli::try_parse_from(["flac-harvest", "download", "X", "--services", "napster"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_gateway_services_from_config() {
        let mut config = Config::default();
        config.services.amazon = Some("http://localhost:9000".to_string());
        let services = gateway_services(&config);
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].kind(), ServiceKind::Amazon);
    }
}
