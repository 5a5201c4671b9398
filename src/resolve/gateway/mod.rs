//! JSON gateway adapter for a streaming backend.
//!
//! Each backend (Tidal, Qobuz, Amazon) is reached through a configurable
//! gateway URL that speaks the contract described in [`dto`]. The wire
//! protocols of the services themselves live behind the gateway.

pub mod dto;

use std::path::Path;

use async_trait::async_trait;

use super::transfer::HttpTransfer;
use super::{Candidate, ServiceError, ServiceKind, TrackQuery, TrackService};
use crate::catalog::IdentitySource;

/// User agent sent to gateways
const USER_AGENT: &str = concat!("flac-harvest/", env!("CARGO_PKG_VERSION"));

/// [`TrackService`] backed by an HTTP gateway.
#[derive(Debug, Clone)]
pub struct GatewayService {
    kind: ServiceKind,
    http_client: reqwest::Client,
    base_url: String,
    transfer: HttpTransfer,
}

impl GatewayService {
    pub fn new(kind: ServiceKind, base_url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            kind,
            transfer: HttpTransfer::new(http_client.clone()),
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, query: &TrackQuery) -> String {
        let mut url = format!(
            "{}/search?isrc={}",
            self.base_url,
            urlencoding::encode(&query.isrc)
        );
        if !query.title.is_empty() {
            url.push_str(&format!("&title={}", urlencoding::encode(&query.title)));
        }
        if !query.artist.is_empty() {
            url.push_str(&format!("&artist={}", urlencoding::encode(&query.artist)));
        }
        if let Some(id) = &query.spotify_id {
            url.push_str(&format!("&spotify_id={}", urlencoding::encode(id)));
        }
        url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ServiceError> {
        let response = self
            .http_client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ServiceError::RateLimited);
        }

        if !status.is_success() {
            return Err(ServiceError::Network(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl TrackService for GatewayService {
    fn kind(&self) -> ServiceKind {
        self.kind
    }

    async fn search(&self, query: &TrackQuery) -> Result<Vec<Candidate>, ServiceError> {
        let response: dto::SearchResponse = self.get_json(&self.search_url(query)).await?;
        tracing::debug!(
            target: "resolver",
            service = %self.kind,
            hits = response.tracks.len(),
            "Gateway search"
        );

        Ok(response
            .tracks
            .into_iter()
            .map(|hit| Candidate {
                title: hit.title,
                artist: hit.artist,
                isrc: hit.isrc.filter(|s| !s.is_empty()),
                duration_secs: hit.duration,
                source: hit.id,
            })
            .collect())
    }

    async fn fetch(
        &self,
        source: &str,
        dest: &Path,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<u64, ServiceError> {
        let url = if source.starts_with("http://") || source.starts_with("https://") {
            source.to_string()
        } else {
            let stream: dto::StreamResponse = self
                .get_json(&format!(
                    "{}/track/{}",
                    self.base_url,
                    urlencoding::encode(source)
                ))
                .await?;
            stream.url
        };

        self.transfer.download(&url, dest, progress).await
    }
}

/// Gateways accept a bare Spotify id and return the matching track, which
/// makes them usable as a remote ISRC source.
#[async_trait]
impl IdentitySource for GatewayService {
    fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    async fn isrc_for_spotify_id(&self, spotify_id: &str) -> anyhow::Result<Option<String>> {
        let query = TrackQuery {
            spotify_id: Some(spotify_id.to_string()),
            ..Default::default()
        };
        match self.search(&query).await {
            Ok(hits) => Ok(hits.into_iter().find_map(|hit| hit.isrc)),
            Err(ServiceError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
