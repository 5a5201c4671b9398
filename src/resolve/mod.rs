//! Multi-service track resolution with identity verification.
//!
//! A [`Resolver`] tries each configured [`TrackService`] in priority order
//! until one yields a verified file:
//!
//! 1. A direct service URL, when supplied, is fetched without searching.
//! 2. Otherwise the service is searched and candidates are verified by ISRC,
//!    or by title/artist plus duration when the service exposes no ISRC.
//! 3. The first verified fetch wins; later services are never contacted.
//!
//! Per-service failures ([`ServiceError`]) stay inside this module. Callers
//! only ever see [`ResolveError`].

mod engine;
mod gateway;
mod service;
mod transfer;
mod verify;

pub use engine::{DEFAULT_TOLERANCE_SECS, Resolved, Resolver};
pub use gateway::GatewayService;
pub use service::TrackService;
pub use transfer::{HttpTransfer, part_path};
pub use verify::{normalize, verify_candidate};

#[cfg(test)]
pub use service::mocks;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Backend streaming services, in default priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Tidal,
    Qobuz,
    Amazon,
}

impl ServiceKind {
    /// Default fallback order.
    pub const ALL: [ServiceKind; 3] = [Self::Tidal, Self::Qobuz, Self::Amazon];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tidal => "tidal",
            Self::Qobuz => "qobuz",
            Self::Amazon => "amazon",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tidal" => Ok(Self::Tidal),
            "qobuz" => Ok(Self::Qobuz),
            "amazon" => Ok(Self::Amazon),
            other => Err(format!("Unknown service: {other}")),
        }
    }
}

/// What the resolver knows about the requested track.
#[derive(Debug, Clone, Default)]
pub struct TrackQuery {
    pub isrc: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Expected duration, used for fuzzy verification
    pub duration_secs: Option<u32>,
    pub spotify_id: Option<String>,
    /// Pre-resolved per-service URLs (e.g. from a link lookup)
    pub service_urls: HashMap<ServiceKind, String>,
}

impl TrackQuery {
    pub fn new(isrc: impl Into<String>) -> Self {
        Self {
            isrc: isrc.into(),
            ..Default::default()
        }
    }

    pub fn with_names(mut self, title: impl Into<String>, artist: impl Into<String>) -> Self {
        self.title = title.into();
        self.artist = artist.into();
        self
    }

    pub fn with_url(mut self, service: ServiceKind, url: impl Into<String>) -> Self {
        self.service_urls.insert(service, url.into());
        self
    }
}

/// One search hit from a service.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Candidate {
    pub title: String,
    pub artist: String,
    /// Present when the service exposes ISRCs
    pub isrc: Option<String>,
    pub duration_secs: Option<u32>,
    /// Service-specific track id or stream URL handed back to `fetch`
    pub source: String,
}

/// Identity verification outcome for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verification {
    Matched,
    Unmatched,
    /// Nothing to compare (direct URL, or the search found no candidates)
    Unknown,
}

/// One fallback try. Transient; only logged.
#[derive(Debug, Clone)]
pub struct ServiceAttempt {
    pub service: ServiceKind,
    pub source_url: Option<String>,
    pub verification: Verification,
    pub error: Option<ServiceError>,
}

/// Failure of a single service. Absorbed by the resolver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("No results")]
    NotFound,

    #[error("Candidate did not match the requested identity")]
    VerificationMismatch,

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Rate limited - try again later")]
    RateLimited,
}

/// The only failures a resolution reports to its caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("{isrc}: no verified source found (tried {})", list(.attempted))]
    AggregateFailure {
        isrc: String,
        attempted: Vec<ServiceKind>,
    },

    #[error("Resolution cancelled")]
    Cancelled,
}

fn list(services: &[ServiceKind]) -> String {
    if services.is_empty() {
        return "no services".to_string();
    }
    services
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_kind_parse() {
        assert_eq!("Tidal".parse::<ServiceKind>(), Ok(ServiceKind::Tidal));
        assert_eq!(" qobuz ".parse::<ServiceKind>(), Ok(ServiceKind::Qobuz));
        assert!("deezer".parse::<ServiceKind>().is_err());
    }

    #[test]
    fn test_aggregate_failure_message() {
        let err = ResolveError::AggregateFailure {
            isrc: "USUM71703861".to_string(),
            attempted: ServiceKind::ALL.to_vec(),
        };
        assert_eq!(
            err.to_string(),
            "USUM71703861: no verified source found (tried tidal, qobuz, amazon)"
        );
    }

    #[test]
    fn test_service_kind_serde() {
        let json = serde_json::to_string(&ServiceKind::Amazon).unwrap();
        assert_eq!(json, "\"amazon\"");
        let back: ServiceKind = serde_json::from_str("\"qobuz\"").unwrap();
        assert_eq!(back, ServiceKind::Qobuz);
    }
}
