//! Download command.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::runtime::Runtime;
use tracing::{info, warn};

use super::{Commands, build_manager, gateway_services, open_catalog};
use crate::catalog::{IdentitySource, lookup_identity};
use crate::config::Config;
use crate::downloader::{DownloadRequest, DownloadResponse};
use crate::resolve::ServiceKind;

/// Download one track or a JSON batch.
pub fn cmd_download(rt: &Runtime, config: &Config, command: &Commands) -> anyhow::Result<()> {
    let Commands::Download {
        isrc,
        batch,
        title,
        artist,
        album,
        album_artist,
        release_date,
        position,
        disc,
        duration,
        spotify_id,
        urls,
        output,
        format,
        track_number,
        services,
        concurrency,
        embed_lyrics,
        json,
    } = command
    else {
        bail!("not a download command");
    };

    let mut config = config.clone();
    if *embed_lyrics {
        config.download.embed_lyrics = true;
    }

    let mut requests = match batch {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<Vec<DownloadRequest>>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => vec![DownloadRequest {
            isrc: isrc.clone().unwrap_or_default(),
            title: title.clone().unwrap_or_default(),
            artist: artist.clone().unwrap_or_default(),
            album: album.clone().unwrap_or_default(),
            album_artist: album_artist.clone().unwrap_or_default(),
            release_date: release_date.clone().unwrap_or_default(),
            position: position.unwrap_or_default(),
            disc_number: disc.unwrap_or_default(),
            duration_secs: *duration,
            spotify_id: spotify_id.clone(),
            service_urls: parse_urls(urls)?,
            filename_format: config.download.filename_format.clone(),
            track_number: config.download.track_number,
            ..Default::default()
        }],
    };

    for request in &mut requests {
        if let Some(dir) = output {
            request.output_dir = dir.clone();
        } else if request.output_dir.as_os_str().is_empty() {
            request.output_dir = config.download.output_dir.clone();
        }
        if let Some(format) = format {
            request.filename_format = format.clone();
        }
        if *track_number {
            request.track_number = true;
        }
        if !services.is_empty() {
            request.service_order = Some(services.clone());
        }
        request.embed_lyrics |= config.download.embed_lyrics;
    }

    let concurrency = concurrency.unwrap_or(config.download.concurrency);
    rt.block_on(run_batch(&config, requests, concurrency, *json))
}

async fn run_batch(
    config: &Config,
    mut requests: Vec<DownloadRequest>,
    concurrency: usize,
    json: bool,
) -> anyhow::Result<()> {
    fill_missing_isrcs(config, &mut requests).await;

    let manager = build_manager(config);
    let total = requests.len();

    let cancel = Arc::clone(&manager);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling pending downloads...");
            cancel.cancel_all_pending();
        }
    });

    let responses = manager.download_batch(requests, concurrency).await?;
    ctrl_c.abort();

    let lyrics = manager.wait_background().await;
    if lyrics > 0 {
        info!("Finished {} lyrics jobs", lyrics);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&responses)?);
    } else {
        for response in &responses {
            print_response(response);
        }
        let counts = manager.snapshot().counts;
        println!(
            "\n{} tracks: {} downloaded, {} already present, {} failed",
            total, counts.completed, counts.skipped, counts.failed
        );
    }

    if responses.iter().any(|r| !r.success) {
        bail!("some downloads failed");
    }
    Ok(())
}

/// `SERVICE=URL` pairs into a map.
fn parse_urls(urls: &[String]) -> anyhow::Result<HashMap<ServiceKind, String>> {
    urls.iter()
        .map(|pair| -> anyhow::Result<(ServiceKind, String)> {
            let (service, url) = pair
                .split_once('=')
                .with_context(|| format!("expected SERVICE=URL, got '{pair}'"))?;
            let service: ServiceKind = service.parse().map_err(anyhow::Error::msg)?;
            Ok((service, url.to_string()))
        })
        .collect()
}

/// Look up ISRCs for requests that only carry a Spotify id.
async fn fill_missing_isrcs(config: &Config, requests: &mut [DownloadRequest]) {
    if requests.iter().all(|r| !r.isrc.trim().is_empty()) {
        return;
    }

    let catalog = open_catalog(config.library.catalog_path.as_ref()).await;
    let gateways = gateway_services(config);
    let remote = gateways.first().map(|g| g as &dyn IdentitySource);

    for request in requests.iter_mut().filter(|r| r.isrc.trim().is_empty()) {
        let Some(spotify_id) = request.spotify_id.clone().filter(|s| !s.is_empty()) else {
            continue;
        };
        match lookup_identity(catalog.as_ref(), remote, &spotify_id).await {
            Ok(Some(found)) => {
                info!("ISRC for {} from {:?}: {}", spotify_id, found.origin, found.isrc);
                request.isrc = found.isrc;
            }
            Ok(None) => warn!("No ISRC found for {}", spotify_id),
            Err(e) => warn!("ISRC lookup for {} failed: {}", spotify_id, e),
        }
    }
}

fn print_response(response: &DownloadResponse) {
    let file = response
        .file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    match (response.success, response.already_exists) {
        (true, true) => println!("  = {} (exists)", file),
        (true, false) => println!("  + {}", file),
        (false, _) => println!(
            "  ! {}: {}",
            response.item_id,
            response.error.as_deref().unwrap_or("unknown error")
        ),
    }
}
