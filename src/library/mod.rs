//! Library verification: audit a directory tree for missing cover art and
//! lyrics, and optionally repair what is missing.
//!
//! Assets are siblings of the audio file with the same base name:
//! `song.flac` → `song.jpg` / `song.png` and `song.lrc` / `song.txt`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cover::{CoverDownloader, CoverFinder};
use crate::error::{Error, Result};
use crate::lyrics::{LyricsSource, to_lrc};
use crate::metadata::{TagReader, TrackTags};
use crate::pool::{DEFAULT_CONCURRENCY, WorkerPool};
use crate::scanner::{self, Depth};

/// Sibling extensions that count as cover art, in preference order.
pub const COVER_EXTENSIONS: [&str; 2] = ["jpg", "png"];

/// Sibling extensions that count as lyrics, in preference order.
pub const LYRICS_EXTENSIONS: [&str; 2] = ["lrc", "txt"];

/// What to check and whether to repair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyRequest {
    pub scan_path: PathBuf,
    pub check_covers: bool,
    pub check_lyrics: bool,
    pub download_missing: bool,
    pub concurrency: usize,
}

impl Default for VerifyRequest {
    fn default() -> Self {
        Self {
            scan_path: PathBuf::new(),
            check_covers: true,
            check_lyrics: true,
            download_missing: false,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Per-file result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackCheck {
    pub file_path: PathBuf,
    pub track_name: String,
    pub has_cover: bool,
    pub has_lyrics: bool,
    pub cover_path: Option<PathBuf>,
    pub lyrics_path: Option<PathBuf>,
    pub missing_cover: bool,
    pub missing_lyrics: bool,
    pub cover_downloaded: bool,
    pub lyrics_downloaded: bool,
    pub error: Option<String>,
}

/// Aggregated verification result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LibraryReport {
    pub total_tracks: usize,
    pub tracks_with_cover: usize,
    pub tracks_with_lyrics: usize,
    pub missing_covers: usize,
    pub missing_lyrics: usize,
    pub covers_downloaded: usize,
    pub lyrics_downloaded: usize,
    pub tracks: Vec<TrackCheck>,
}

/// First existing sibling of `audio` with one of `extensions`.
pub fn find_sibling(audio: &Path, extensions: &[&str]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| audio.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

#[derive(Debug, Default)]
struct RepairCounters {
    covers: usize,
    lyrics: usize,
}

#[derive(Debug, Default)]
struct RepairOutcome {
    cover_path: Option<PathBuf>,
    lyrics_path: Option<PathBuf>,
    errors: Vec<String>,
}

/// Scans a library and repairs missing assets.
#[derive(Clone)]
pub struct LibraryVerifier {
    tags: Arc<dyn TagReader>,
    covers: CoverFinder,
    cover_downloader: Arc<dyn CoverDownloader>,
    lyrics: Option<Arc<dyn LyricsSource>>,
}

impl LibraryVerifier {
    pub fn new(
        tags: Arc<dyn TagReader>,
        covers: CoverFinder,
        cover_downloader: Arc<dyn CoverDownloader>,
    ) -> Self {
        Self {
            tags,
            covers,
            cover_downloader,
            lyrics: None,
        }
    }

    pub fn with_lyrics(mut self, lyrics: Arc<dyn LyricsSource>) -> Self {
        self.lyrics = Some(lyrics);
        self
    }

    /// Audit `request.scan_path` and, if asked, repair missing assets.
    ///
    /// A missing scan path is an error. Per-file repair failures are
    /// recorded on the track and never abort the run.
    pub async fn verify(&self, request: &VerifyRequest) -> Result<LibraryReport> {
        if !request.scan_path.is_dir() {
            return Err(Error::not_found(request.scan_path.clone()));
        }

        let root = request.scan_path.clone();
        let files = tokio::task::spawn_blocking(move || scanner::audio_files(&root, Depth::Recursive))
            .await
            .map_err(|e| Error::invalid_request(format!("Library scan aborted: {e}")))?;

        info!(target: "verifier", path = %request.scan_path.display(), files = files.len(), "Verifying library");

        let mut report = LibraryReport {
            total_tracks: files.len(),
            ..Default::default()
        };

        for path in files {
            let cover_path = find_sibling(&path, &COVER_EXTENSIONS);
            let lyrics_path = find_sibling(&path, &LYRICS_EXTENSIONS);
            let check = TrackCheck {
                track_name: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default(),
                has_cover: cover_path.is_some(),
                has_lyrics: lyrics_path.is_some(),
                missing_cover: request.check_covers && cover_path.is_none(),
                missing_lyrics: request.check_lyrics && lyrics_path.is_none(),
                cover_path,
                lyrics_path,
                file_path: path,
                ..Default::default()
            };

            report.tracks_with_cover += usize::from(check.has_cover);
            report.tracks_with_lyrics += usize::from(check.has_lyrics);
            report.missing_covers += usize::from(check.missing_cover);
            report.missing_lyrics += usize::from(check.missing_lyrics);
            report.tracks.push(check);
        }

        if request.download_missing {
            self.repair(&mut report, request.concurrency).await;
        }

        info!(
            target: "verifier",
            total = report.total_tracks,
            missing_covers = report.missing_covers,
            missing_lyrics = report.missing_lyrics,
            covers_downloaded = report.covers_downloaded,
            lyrics_downloaded = report.lyrics_downloaded,
            "Library verification complete"
        );
        Ok(report)
    }

    async fn repair(&self, report: &mut LibraryReport, concurrency: usize) {
        let work: Vec<(usize, PathBuf, bool, bool)> = report
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.missing_cover || t.missing_lyrics)
            .map(|(i, t)| (i, t.file_path.clone(), t.missing_cover, t.missing_lyrics))
            .collect();

        if work.is_empty() {
            return;
        }

        debug!(target: "verifier", tracks = work.len(), concurrency, "Repairing missing assets");

        let counters = Arc::new(Mutex::new(RepairCounters::default()));
        let this = Arc::new(self.clone());
        let shared = Arc::clone(&counters);

        let outcomes = WorkerPool::new(concurrency)
            .run(work, move |(index, path, need_cover, need_lyrics)| {
                let this = Arc::clone(&this);
                let counters = Arc::clone(&shared);
                async move {
                    let outcome = this.repair_track(&path, need_cover, need_lyrics).await;
                    {
                        let mut counters = counters.lock();
                        counters.covers += usize::from(outcome.cover_path.is_some());
                        counters.lyrics += usize::from(outcome.lyrics_path.is_some());
                    }
                    (index, outcome)
                }
            })
            .await;

        for (index, outcome) in outcomes.into_iter().filter_map(|o| o.finished()) {
            let track = &mut report.tracks[index];
            if let Some(path) = outcome.cover_path {
                track.cover_downloaded = true;
                track.has_cover = true;
                track.cover_path = Some(path);
            }
            if let Some(path) = outcome.lyrics_path {
                track.lyrics_downloaded = true;
                track.has_lyrics = true;
                track.lyrics_path = Some(path);
            }
            if !outcome.errors.is_empty() {
                track.error = Some(outcome.errors.join("; "));
            }
        }

        let counters = counters.lock();
        report.covers_downloaded = counters.covers;
        report.lyrics_downloaded = counters.lyrics;
    }

    async fn repair_track(&self, path: &Path, need_cover: bool, need_lyrics: bool) -> RepairOutcome {
        let tags = match self.tags.extract_tags(path) {
            Ok(tags) => tags,
            Err(e) => {
                debug!(target: "verifier", "Tag read failed, using filename: {}", e);
                TrackTags::default()
            }
        }
        .with_filename_fallback(path);

        let mut outcome = RepairOutcome::default();

        if need_cover {
            match self.fetch_cover(path, &tags).await {
                Ok(dest) => outcome.cover_path = Some(dest),
                Err(e) => outcome.errors.push(e),
            }
        }

        if need_lyrics && let Some(source) = &self.lyrics {
            match fetch_lyrics(source.as_ref(), path, &tags).await {
                Ok(Some(dest)) => outcome.lyrics_path = Some(dest),
                Ok(None) => {}
                Err(e) => outcome.errors.push(e),
            }
        }

        outcome
    }

    async fn fetch_cover(&self, path: &Path, tags: &TrackTags) -> std::result::Result<PathBuf, String> {
        let found = self
            .covers
            .find(tags)
            .await
            .ok_or_else(|| "No cover found".to_string())?;

        let dest = path.with_extension(COVER_EXTENSIONS[0]);
        self.cover_downloader
            .download(&found.url, &dest)
            .await
            .map_err(|e| format!("Cover download failed: {e}"))?;

        debug!(target: "verifier", path = %dest.display(), source = %found.source, "Cover saved");
        Ok(dest)
    }
}

/// Fetch lyrics for `tags` and write `<base>.lrc`. `Ok(None)` when the
/// track has no title or the service has nothing.
async fn fetch_lyrics(
    source: &dyn LyricsSource,
    path: &Path,
    tags: &TrackTags,
) -> std::result::Result<Option<PathBuf>, String> {
    if tags.title.is_empty() {
        return Ok(None);
    }

    let lyrics = match source.fetch_lyrics(&tags.title, &tags.artist, None).await {
        Ok(Some(lyrics)) if !lyrics.is_empty() => lyrics,
        Ok(_) => return Err("No lyrics found".to_string()),
        Err(e) => {
            warn!(target: "verifier", "Lyrics lookup for '{}' failed: {}", tags.title, e);
            return Err(format!("Lyrics lookup failed: {e}"));
        }
    };

    let dest = path.with_extension(LYRICS_EXTENSIONS[0]);
    tokio::fs::write(&dest, to_lrc(&lyrics, &tags.title, &tags.artist))
        .await
        .map_err(|e| format!("Failed to write lyrics: {e}"))?;
    Ok(Some(dest))
}

impl std::fmt::Debug for LibraryVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryVerifier")
            .field("covers", &self.covers)
            .field("lyrics", &self.lyrics.as_ref().map(|l| l.name()))
            .finish()
    }
}
