//! Backend service trait.
//!
//! Production code uses [`super::GatewayService`]; tests substitute the
//! mocks below.

use std::path::Path;

use async_trait::async_trait;

use super::{Candidate, ServiceError, ServiceKind, TrackQuery};

/// A streaming backend the resolver can search and download from.
#[async_trait]
pub trait TrackService: Send + Sync {
    fn kind(&self) -> ServiceKind;

    /// Search by identity fields. Results are in the service's own ranking.
    async fn search(&self, query: &TrackQuery) -> Result<Vec<Candidate>, ServiceError>;

    /// Download `source` (a candidate's source, or a direct service URL)
    /// to `dest`, reporting bytes written so far. Returns the final size.
    ///
    /// Implementations may leave a partial file behind on error; the
    /// resolver cleans up.
    async fn fetch(
        &self,
        source: &str,
        dest: &Path,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64, ServiceError>;
}
