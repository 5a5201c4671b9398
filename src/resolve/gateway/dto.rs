//! Gateway API Data Transfer Objects
//!
//! A gateway fronts one streaming backend behind a small JSON contract:
//!
//! - `GET {base}/search?isrc=..&title=..&artist=..` → [`SearchResponse`]
//! - `GET {base}/track/{id}` → [`StreamResponse`]

use serde::{Deserialize, Serialize};

/// Search results, best match first
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub tracks: Vec<TrackHit>,
}

/// One search hit
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TrackHit {
    /// Service-specific track id
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    pub isrc: Option<String>,
    /// Duration in seconds
    pub duration: Option<u32>,
}

/// Resolved stream location for a track id
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamResponse {
    pub url: String,
}
