//! Download orchestration.
//!
//! [`DownloadManager`] is the boundary callers use: it owns the queue store
//! and wires each request through deduplication, the resolver and the
//! follow-up lyrics jobs.
//!
//! Per request the flow is:
//!
//! 1. enqueue (or reuse the caller's item) and mark it `Downloading`
//! 2. identity dedup: any file in the output directory with the same ISRC
//! 3. path dedup under the per-path lock, healing broken leftovers
//! 4. resolve through the configured services
//! 5. `Completed` with the size on disk, or `Failed` with the aggregate error
//!
//! A single download returns queue contract violations as errors. A batch
//! reports them per request and settles the affected item.

mod request;

pub use request::{DownloadRequest, DownloadResponse};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dedup::{DedupOutcome, Deduplicator, ExistenceQuery, ExistenceResult, FilenameFormat, PathLocks};
use crate::error::{Error, Result, ResultExt};
use crate::lyrics::{LyricsSource, to_lrc};
use crate::metadata::TagWriter;
use crate::pool::{BackgroundTasks, CancelFlag, TaskOutcome, WorkerPool};
use crate::queue::{CANCELLED_MESSAGE, ItemId, ItemState, QueueError, QueueSnapshot, QueueStore};
use crate::resolve::{ResolveError, Resolver};

/// Concurrent lyrics embedding jobs.
const LYRICS_JOB_LIMIT: usize = 4;

/// Queue-backed download front end.
pub struct DownloadManager {
    store: Arc<QueueStore>,
    dedup: Deduplicator,
    resolver: Resolver,
    locks: PathLocks,
    tag_writer: Arc<dyn TagWriter>,
    lyrics: Option<Arc<dyn LyricsSource>>,
    lyrics_jobs: BackgroundTasks,
    cancel: CancelFlag,
}

impl DownloadManager {
    pub fn new(
        store: Arc<QueueStore>,
        dedup: Deduplicator,
        resolver: Resolver,
        tag_writer: Arc<dyn TagWriter>,
    ) -> Self {
        Self {
            store,
            dedup,
            resolver,
            locks: PathLocks::new(),
            tag_writer,
            lyrics: None,
            lyrics_jobs: BackgroundTasks::new("lyrics", LYRICS_JOB_LIMIT),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_lyrics(mut self, lyrics: Arc<dyn LyricsSource>) -> Self {
        self.lyrics = Some(lyrics);
        self
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.store.snapshot()
    }

    /// Add a request to the queue without starting it.
    pub fn enqueue_track(&self, request: &DownloadRequest) -> Result<ItemId> {
        let identity = request.identity();
        let item = match &request.item_id {
            Some(id) => self.store.enqueue(id.clone(), identity)?,
            None => self.store.enqueue_generated(identity),
        };
        Ok(item.id)
    }

    /// Download one track.
    ///
    /// Returns `Err` for unusable requests and queue contract violations.
    /// Download failures are reported in the response and on the item.
    pub async fn download_track(&self, request: DownloadRequest) -> Result<DownloadResponse> {
        validate(&request)?;

        let id = match &request.item_id {
            Some(id) if self.store.get(id).is_some() => id.clone(),
            _ => self.enqueue_track(&request)?,
        };

        match self.store.start(&id) {
            Ok(()) => {}
            // Cancelled while waiting for a worker slot
            Err(QueueError::InvalidTransition {
                found: Some(ItemState::Skipped),
                ..
            }) if self.cancel.is_cancelled() => {
                return Ok(DownloadResponse::failed(&id, CANCELLED_MESSAGE));
            }
            Err(e) => return Err(e.into()),
        }

        // From here on the item is Downloading and every exit must settle it
        match self.process(&id, &request).await {
            Ok(response) => Ok(response),
            Err(e @ Error::Queue(_)) => {
                self.settle_failed(&id, &e.to_string());
                Err(e)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(target: "queue", item = %id, "Download aborted: {}", message);
                self.store.fail(&id, &message)?;
                Ok(DownloadResponse::failed(&id, message))
            }
        }
    }

    async fn process(&self, id: &str, request: &DownloadRequest) -> Result<DownloadResponse> {
        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .with_context(format!("creating {}", request.output_dir.display()))?;

        if let Some(existing) = self.find_by_identity(request).await {
            info!(target: "queue", item = %id, path = %existing.display(), "Already in library (ISRC)");
            self.store.skip(id, &existing)?;
            return Ok(DownloadResponse::existing(id, existing));
        }

        let dest = request.expected_path();
        let _guard = self.locks.lock(&dest).await;

        match self.check_expected_path(&dest).await? {
            DedupOutcome::Existing(path) => {
                info!(target: "queue", item = %id, path = %path.display(), "Already in library (path)");
                self.store.skip(id, &path)?;
                return Ok(DownloadResponse::existing(id, path));
            }
            DedupOutcome::Healed(path) => {
                debug!(target: "queue", item = %id, path = %path.display(), "Replacing broken file");
            }
            DedupOutcome::Absent => {}
        }

        let query = request.query();
        let store = Arc::clone(&self.store);
        let progress_id = id.to_string();
        let progress = move |bytes: u64| {
            // Only fails once the item has settled
            let _ = store.update_progress(&progress_id, bytes);
        };

        let resolved = self
            .resolver
            .resolve(
                &query,
                &dest,
                request.service_order.as_deref(),
                &self.cancel,
                &progress,
            )
            .await;

        match resolved {
            Ok(resolved) => {
                let size = tokio::fs::metadata(&resolved.path)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(resolved.bytes);
                self.store.complete(id, &resolved.path, size)?;
                info!(
                    target: "queue",
                    item = %id,
                    service = %resolved.service,
                    size,
                    "Downloaded"
                );

                if request.embed_lyrics {
                    self.schedule_lyrics(request, &resolved.path);
                }
                Ok(DownloadResponse::downloaded(id, resolved.path))
            }
            Err(ResolveError::Cancelled) => {
                self.store.fail(id, CANCELLED_MESSAGE)?;
                Ok(DownloadResponse::failed(id, CANCELLED_MESSAGE))
            }
            Err(e) => {
                let message = e.to_string();
                warn!(target: "queue", item = %id, "Download failed: {}", message);
                self.store.fail(id, &message)?;
                Ok(DownloadResponse::failed(id, message))
            }
        }
    }

    /// Download every request with at most `concurrency` in flight.
    ///
    /// Valid requests are enqueued up front so the snapshot shows the whole
    /// batch. A request that errors is reported as failed without touching
    /// its siblings. Responses are returned in input order.
    pub async fn download_batch(
        self: &Arc<Self>,
        requests: Vec<DownloadRequest>,
        concurrency: usize,
    ) -> Result<Vec<DownloadResponse>> {
        self.cancel.reset();

        let mut prepared = Vec::with_capacity(requests.len());
        for mut request in requests {
            if request.item_id.is_none() && validate(&request).is_ok() {
                request.item_id = Some(self.enqueue_track(&request)?);
            }
            prepared.push(request);
        }
        let ids: Vec<ItemId> = prepared
            .iter()
            .map(|r| r.item_id.clone().unwrap_or_default())
            .collect();

        info!(target: "queue", total = prepared.len(), concurrency, "Starting batch");

        let this = Arc::clone(self);
        let outcomes = WorkerPool::with_cancel(concurrency, self.cancel.clone())
            .run(prepared, move |request| {
                let this = Arc::clone(&this);
                async move { this.download_track(request).await }
            })
            .await;

        let responses = outcomes
            .into_iter()
            .zip(ids)
            .map(|(outcome, id)| match outcome {
                TaskOutcome::Finished(Ok(response)) => response,
                TaskOutcome::Finished(Err(e)) => {
                    let message = e.to_string();
                    warn!(target: "queue", item = %id, "Request rejected: {}", message);
                    self.settle_failed(&id, &message);
                    DownloadResponse::failed(&id, message)
                }
                TaskOutcome::Panicked(message) => {
                    self.settle_failed(&id, &format!("worker panicked: {message}"));
                    DownloadResponse::failed(&id, message)
                }
                TaskOutcome::NotStarted => DownloadResponse::failed(&id, CANCELLED_MESSAGE),
            })
            .collect();
        Ok(responses)
    }

    /// Move an item that left the normal flow early to `Failed`.
    ///
    /// Terminal and unknown items are left alone.
    fn settle_failed(&self, id: &str, message: &str) {
        let result = match self.store.get(id).map(|item| item.state) {
            Some(ItemState::Queued) => self
                .store
                .start(id)
                .and_then(|()| self.store.fail(id, message)),
            Some(ItemState::Downloading) => self.store.fail(id, message),
            _ => return,
        };
        if let Err(e) = result {
            warn!(target: "queue", item = %id, "Could not settle item: {}", e);
        }
    }

    /// Skip everything still `Queued` and stop admitting new work.
    pub fn cancel_all_pending(&self) -> usize {
        self.cancel.cancel();
        let skipped = self.store.cancel_pending();
        info!(target: "queue", skipped, "Cancelled pending downloads");
        skipped
    }

    /// Size-only check of the expected path. Needs output dir, title and
    /// artist.
    pub fn check_track_exists(&self, request: &DownloadRequest) -> Option<PathBuf> {
        if request.output_dir.as_os_str().is_empty()
            || request.title.is_empty()
            || request.artist.is_empty()
        {
            return None;
        }
        self.dedup.check_track_exists(&request.expected_path())
    }

    pub fn check_files_exist(
        &self,
        dir: &Path,
        queries: &[ExistenceQuery],
        format: &FilenameFormat,
    ) -> Vec<ExistenceResult> {
        self.dedup.check_files_exist(dir, queries, format)
    }

    /// Wait for all lyrics jobs. Returns how many finished.
    pub async fn wait_background(&self) -> usize {
        self.lyrics_jobs.drain().await
    }

    async fn find_by_identity(&self, request: &DownloadRequest) -> Option<PathBuf> {
        let dedup = self.dedup.clone();
        let dir = request.output_dir.clone();
        let isrc = request.isrc.clone();
        tokio::task::spawn_blocking(move || dedup.find_by_identity(&dir, &isrc))
            .await
            .unwrap_or_else(|e| {
                warn!(target: "queue", "ISRC scan aborted: {}", e);
                None
            })
    }

    async fn check_expected_path(&self, dest: &Path) -> Result<DedupOutcome> {
        let dedup = self.dedup.clone();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || dedup.check_expected_path(&dest))
            .await
            .map_err(|e| Error::invalid_request(format!("Existence check aborted: {e}")))?
            .map_err(Error::from)
    }

    /// Fetch lyrics and embed them in a freshly written FLAC.
    fn schedule_lyrics(&self, request: &DownloadRequest, path: &Path) {
        let Some(source) = self.lyrics.clone() else {
            return;
        };
        if request.spotify_id.as_deref().is_none_or(str::is_empty) {
            return;
        }
        if !path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("flac"))
        {
            return;
        }

        let writer = Arc::clone(&self.tag_writer);
        let path = path.to_path_buf();
        let title = request.title.clone();
        let artist = request.artist.clone();
        let duration = request.duration_secs;

        self.lyrics_jobs.spawn(async move {
            let lyrics = match source.fetch_lyrics(&title, &artist, duration).await {
                Ok(Some(lyrics)) if !lyrics.is_empty() => lyrics,
                Ok(_) => {
                    debug!(target: "queue", "No lyrics for {} - {}", title, artist);
                    return;
                }
                Err(e) => {
                    warn!(target: "queue", "Lyrics lookup for {} failed: {}", title, e);
                    return;
                }
            };

            let text = to_lrc(&lyrics, &title, &artist);
            let shown = path.display().to_string();
            match tokio::task::spawn_blocking(move || writer.embed_lyrics(&path, &text)).await {
                Ok(Ok(())) => debug!(target: "queue", path = %shown, "Embedded lyrics"),
                Ok(Err(e)) => warn!(target: "queue", "Failed to embed lyrics: {}", e),
                Err(e) => warn!(target: "queue", "Lyrics job aborted: {}", e),
            }
        });
    }
}

fn validate(request: &DownloadRequest) -> Result<()> {
    if request.isrc.trim().is_empty() {
        return Err(Error::invalid_request("ISRC is required"));
    }
    if request.output_dir.as_os_str().is_empty() {
        return Err(Error::invalid_request("Output directory is required"));
    }
    Ok(())
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("resolver", &self.resolver)
            .field("lyrics", &self.lyrics.as_ref().map(|l| l.name()))
            .field("background", &self.lyrics_jobs)
            .finish()
    }
}
