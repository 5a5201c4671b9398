//! Fallback resolution across services.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::transfer::part_path;
use super::{
    ResolveError, ServiceAttempt, ServiceError, ServiceKind, TrackQuery, TrackService,
    Verification, verify_candidate,
};
use crate::metadata::TagReader;
use crate::pool::CancelFlag;

/// Default duration tolerance for fuzzy verification.
pub const DEFAULT_TOLERANCE_SECS: u32 = 3;

/// A verified file on disk.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub service: ServiceKind,
    pub path: PathBuf,
    pub bytes: u64,
    /// Every try up to and including the successful one
    pub attempts: Vec<ServiceAttempt>,
}

/// Tries services in priority order until one yields a verified file.
pub struct Resolver {
    services: HashMap<ServiceKind, Arc<dyn TrackService>>,
    order: Vec<ServiceKind>,
    /// Optional post-download ISRC check against the written file
    tags: Option<Arc<dyn TagReader>>,
    tolerance_secs: u32,
}

impl Resolver {
    /// Default order is the order `services` are given in.
    pub fn new(services: Vec<Arc<dyn TrackService>>) -> Self {
        let order = services.iter().map(|s| s.kind()).collect();
        Self {
            services: services.into_iter().map(|s| (s.kind(), s)).collect(),
            order,
            tags: None,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_order(mut self, order: Vec<ServiceKind>) -> Self {
        self.order = order;
        self
    }

    pub fn with_tag_check(mut self, reader: Arc<dyn TagReader>) -> Self {
        self.tags = Some(reader);
        self
    }

    pub fn with_tolerance(mut self, secs: u32) -> Self {
        self.tolerance_secs = secs;
        self
    }

    pub fn default_order(&self) -> &[ServiceKind] {
        &self.order
    }

    /// Obtain a verified file for `query` at `dest`.
    ///
    /// `order` overrides the default priority for this call. Cancellation is
    /// checked before each service; a transfer already running is allowed to
    /// finish. On failure no file is left at `dest`.
    pub async fn resolve(
        &self,
        query: &TrackQuery,
        dest: &Path,
        order: Option<&[ServiceKind]>,
        cancel: &CancelFlag,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<Resolved, ResolveError> {
        let order = order.unwrap_or(&self.order);
        let mut attempts = Vec::with_capacity(order.len());

        for kind in order {
            if cancel.is_cancelled() {
                info!(target: "resolver", isrc = %query.isrc, "Cancelled before trying {}", kind);
                return Err(ResolveError::Cancelled);
            }

            let Some(service) = self.services.get(kind) else {
                warn!(target: "resolver", service = %kind, "Service not configured, skipping");
                continue;
            };

            let (attempt, result) = self.attempt(service.as_ref(), query, dest, progress).await;
            match result {
                Ok(bytes) => {
                    info!(
                        target: "resolver",
                        isrc = %query.isrc,
                        service = %kind,
                        bytes,
                        "Resolved"
                    );
                    attempts.push(attempt);
                    return Ok(Resolved {
                        service: *kind,
                        path: dest.to_path_buf(),
                        bytes,
                        attempts,
                    });
                }
                Err(e) => {
                    remove_partial(dest).await;
                    debug!(
                        target: "resolver",
                        isrc = %query.isrc,
                        service = %kind,
                        verification = ?attempt.verification,
                        "Attempt failed: {}",
                        e
                    );
                    attempts.push(attempt);
                }
            }
        }

        let attempted: Vec<ServiceKind> = attempts.iter().map(|a| a.service).collect();
        warn!(
            target: "resolver",
            isrc = %query.isrc,
            "All services exhausted: {:?}",
            attempts
                .iter()
                .map(|a| format!(
                    "{}: {}",
                    a.service,
                    a.error.as_ref().map(|e| e.to_string()).unwrap_or_default()
                ))
                .collect::<Vec<_>>()
        );
        Err(ResolveError::AggregateFailure {
            isrc: query.isrc.clone(),
            attempted,
        })
    }

    /// One service: direct URL if known, else search, verify and fetch.
    async fn attempt(
        &self,
        service: &dyn TrackService,
        query: &TrackQuery,
        dest: &Path,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> (ServiceAttempt, Result<u64, ServiceError>) {
        let kind = service.kind();
        let mut attempt = ServiceAttempt {
            service: kind,
            source_url: query.service_urls.get(&kind).cloned(),
            verification: Verification::Unknown,
            error: None,
        };

        let source = match attempt.source_url.clone() {
            Some(url) => url,
            None => match self.pick_candidate(service, query).await {
                Ok(source) => {
                    attempt.verification = Verification::Matched;
                    source
                }
                Err((verification, e)) => {
                    attempt.verification = verification;
                    attempt.error = Some(e.clone());
                    return (attempt, Err(e));
                }
            },
        };

        let result = match service.fetch(&source, dest, progress).await {
            Ok(bytes) => self.check_written(query, dest).map(|()| bytes),
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => attempt.verification = Verification::Matched,
            Err(ServiceError::VerificationMismatch) => {
                attempt.verification = Verification::Unmatched
            }
            Err(_) => {}
        }
        attempt.error = result.as_ref().err().cloned();
        (attempt, result)
    }

    /// Search and return the source of the first verified candidate.
    async fn pick_candidate(
        &self,
        service: &dyn TrackService,
        query: &TrackQuery,
    ) -> Result<String, (Verification, ServiceError)> {
        let candidates = service
            .search(query)
            .await
            .map_err(|e| (Verification::Unknown, e))?;

        if candidates.is_empty() {
            return Err((Verification::Unknown, ServiceError::NotFound));
        }

        candidates
            .into_iter()
            .find(|c| verify_candidate(query, c, self.tolerance_secs) == Verification::Matched)
            .map(|c| c.source)
            .ok_or((Verification::Unmatched, ServiceError::VerificationMismatch))
    }

    /// Compare the written file's ISRC with the requested one, if both exist.
    fn check_written(&self, query: &TrackQuery, dest: &Path) -> Result<(), ServiceError> {
        let Some(reader) = &self.tags else {
            return Ok(());
        };
        if query.isrc.is_empty() {
            return Ok(());
        }
        match reader.read_identifier(dest) {
            Ok(Some(found)) if !found.eq_ignore_ascii_case(&query.isrc) => {
                warn!(
                    target: "resolver",
                    expected = %query.isrc,
                    found = %found,
                    "Downloaded file carries a different ISRC"
                );
                Err(ServiceError::VerificationMismatch)
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("order", &self.order)
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

/// Delete `dest` and its `.part` sibling, ignoring files that don't exist.
async fn remove_partial(dest: &Path) {
    for path in [dest.to_path_buf(), part_path(dest)] {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(target: "resolver", path = %path.display(), "Removed partial file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                target: "resolver",
                path = %path.display(),
                "Failed to remove partial file: {}",
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::mocks::MockService;
    use crate::test_utils::MockTagReader;

    const ISRC: &str = "USUM71703861";

    fn query() -> TrackQuery {
        TrackQuery::new(ISRC).with_names("Mock Title", "Mock Artist")
    }

    fn resolver(services: &[Arc<MockService>]) -> Resolver {
        Resolver::new(
            services
                .iter()
                .map(|s| Arc::clone(s) as Arc<dyn TrackService>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_first_verified_match_short_circuits() {
        let a = Arc::new(MockService::matching(ServiceKind::Tidal, ISRC));
        let b = Arc::new(MockService::matching(ServiceKind::Qobuz, ISRC));
        let c = Arc::new(MockService::matching(ServiceKind::Amazon, ISRC));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("track.flac");

        let resolved = resolver(&[a.clone(), b.clone(), c.clone()])
            .resolve(&query(), &dest, None, &CancelFlag::new(), &|_: u64| {})
            .await
            .unwrap();

        assert_eq!(resolved.service, ServiceKind::Tidal);
        assert_eq!(resolved.attempts.len(), 1);
        assert!(dest.exists());
        assert_eq!(a.fetch_calls(), 1);
        assert_eq!(b.calls(), 0);
        assert_eq!(c.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_services_fail_leaves_no_partial_file() {
        let a = Arc::new(MockService::not_found(ServiceKind::Tidal));
        let b = Arc::new(MockService::mismatched(ServiceKind::Qobuz));
        let c = Arc::new(MockService::broken_transfer(ServiceKind::Amazon, ISRC));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("track.flac");

        let err = resolver(&[a.clone(), b.clone(), c.clone()])
            .resolve(&query(), &dest, None, &CancelFlag::new(), &|_: u64| {})
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ResolveError::AggregateFailure {
                isrc: ISRC.to_string(),
                attempted: ServiceKind::ALL.to_vec(),
            }
        );
        assert_eq!(b.fetch_calls(), 0, "mismatched candidate must not be fetched");
        assert_eq!(c.fetch_calls(), 1);
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_falls_through_to_next_service() {
        let a = Arc::new(MockService::broken_transfer(ServiceKind::Tidal, ISRC));
        let b = Arc::new(MockService::matching(ServiceKind::Qobuz, ISRC));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("track.flac");

        let resolved = resolver(&[a.clone(), b.clone()])
            .resolve(&query(), &dest, None, &CancelFlag::new(), &|_: u64| {})
            .await
            .unwrap();

        assert_eq!(resolved.service, ServiceKind::Qobuz);
        assert_eq!(resolved.attempts.len(), 2);
        assert!(resolved.attempts[0].error.is_some());
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_direct_url_skips_search() {
        let a = Arc::new(MockService::not_found(ServiceKind::Tidal));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("track.flac");
        let q = query().with_url(ServiceKind::Tidal, "https://tidal.example/track/1");

        let resolved = resolver(&[a.clone()])
            .resolve(&q, &dest, None, &CancelFlag::new(), &|_: u64| {})
            .await
            .unwrap();

        assert_eq!(a.search_calls(), 0);
        assert_eq!(a.fetch_calls(), 1);
        assert_eq!(
            resolved.attempts[0].source_url.as_deref(),
            Some("https://tidal.example/track/1")
        );
    }

    #[tokio::test]
    async fn test_order_override() {
        let a = Arc::new(MockService::matching(ServiceKind::Tidal, ISRC));
        let b = Arc::new(MockService::matching(ServiceKind::Qobuz, ISRC));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("track.flac");

        let resolved = resolver(&[a.clone(), b.clone()])
            .resolve(
                &query(),
                &dest,
                Some(&[ServiceKind::Qobuz, ServiceKind::Tidal]),
                &CancelFlag::new(),
                &|_: u64| {},
            )
            .await
            .unwrap();

        assert_eq!(resolved.service, ServiceKind::Qobuz);
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_service() {
        let a = Arc::new(MockService::matching(ServiceKind::Tidal, ISRC));
        let cancel = CancelFlag::new();
        cancel.cancel();
        let dir = tempfile::tempdir().unwrap();

        let err = resolver(&[a.clone()])
            .resolve(&query(), &dir.path().join("t.flac"), None, &cancel, &|_: u64| {})
            .await
            .unwrap_err();

        assert_eq!(err, ResolveError::Cancelled);
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn test_written_file_with_wrong_isrc_is_rejected() {
        let a = Arc::new(MockService::matching(ServiceKind::Tidal, ISRC));
        let b = Arc::new(MockService::matching(ServiceKind::Qobuz, ISRC));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("track.flac");

        // Every file reads back with the wrong ISRC
        let tags = Arc::new(MockTagReader::with_default_isrc("GBAYE0601498"));
        let err = resolver(&[a.clone(), b.clone()])
            .with_tag_check(tags)
            .resolve(&query(), &dest, None, &CancelFlag::new(), &|_: u64| {})
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::AggregateFailure { .. }));
        assert_eq!(a.fetch_calls(), 1);
        assert_eq!(b.fetch_calls(), 1);
        assert!(!dest.exists());
    }
}
