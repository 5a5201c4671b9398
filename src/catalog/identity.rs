//! ISRC lookup for a Spotify track id: local catalog first, then a remote
//! source.

use async_trait::async_trait;
use serde::Serialize;

use super::Catalog;

/// A remote service that can resolve a Spotify id to an ISRC.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn isrc_for_spotify_id(&self, spotify_id: &str) -> anyhow::Result<Option<String>>;
}

/// Where an ISRC was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityOrigin {
    Catalog,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityLookup {
    pub isrc: String,
    pub origin: IdentityOrigin,
}

/// Look up the ISRC for `spotify_id`.
///
/// Catalog errors are logged and treated as a miss. Remote errors are
/// returned to the caller.
pub async fn lookup_identity(
    catalog: Option<&Catalog>,
    remote: Option<&dyn IdentitySource>,
    spotify_id: &str,
) -> anyhow::Result<Option<IdentityLookup>> {
    if let Some(catalog) = catalog {
        match catalog.isrc_for_spotify_id(spotify_id).await {
            Ok(Some(isrc)) => {
                tracing::debug!("ISRC for {} found in catalog", spotify_id);
                return Ok(Some(IdentityLookup {
                    isrc,
                    origin: IdentityOrigin::Catalog,
                }));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Catalog lookup for {} failed: {}", spotify_id, e),
        }
    }

    let Some(remote) = remote else {
        return Ok(None);
    };

    let isrc = remote.isrc_for_spotify_id(spotify_id).await?;
    Ok(isrc.filter(|s| !s.is_empty()).map(|isrc| {
        tracing::debug!("ISRC for {} found via {}", spotify_id, remote.name());
        IdentityLookup {
            isrc,
            origin: IdentityOrigin::Remote,
        }
    }))
}
