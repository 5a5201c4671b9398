//! Library verification command.

use std::path::Path;

use tokio::runtime::Runtime;

use super::build_verifier;
use crate::config::Config;
use crate::library::{LibraryReport, VerifyRequest};

/// Audit a library and optionally repair missing assets
#[allow(clippy::too_many_arguments)]
pub fn cmd_verify(
    rt: &Runtime,
    config: &Config,
    path: &Path,
    check_covers: bool,
    check_lyrics: bool,
    repair: bool,
    concurrency: usize,
    json: bool,
) -> anyhow::Result<()> {
    let request = VerifyRequest {
        scan_path: path.to_path_buf(),
        check_covers,
        check_lyrics,
        download_missing: repair,
        concurrency,
    };

    let report = rt.block_on(async {
        let verifier = build_verifier(config).await;
        verifier.verify(&request).await
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, repair);
    }
    Ok(())
}

fn print_report(report: &LibraryReport, repair: bool) {
    println!("Tracks:           {}", report.total_tracks);
    println!("With cover:       {}", report.tracks_with_cover);
    println!("With lyrics:      {}", report.tracks_with_lyrics);
    println!("Missing covers:   {}", report.missing_covers);
    println!("Missing lyrics:   {}", report.missing_lyrics);
    if repair {
        println!("Covers fetched:   {}", report.covers_downloaded);
        println!("Lyrics fetched:   {}", report.lyrics_downloaded);
    }

    let failed: Vec<_> = report.tracks.iter().filter(|t| t.error.is_some()).collect();
    if !failed.is_empty() {
        println!("\nProblems:");
        for track in failed {
            println!(
                "  {}: {}",
                track.file_path.display(),
                track.error.as_deref().unwrap_or_default()
            );
        }
    }
}
