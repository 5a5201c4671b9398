//! Priority chain over the catalog and remote cover services.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{CoverArtSource, CoverCatalog};
use crate::metadata::TrackTags;

/// A resolved cover URL and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundCover {
    pub url: String,
    /// `catalog-album`, `catalog-track`, or a service name
    pub source: String,
}

/// Resolves a cover URL, stopping at the first source that has one.
#[derive(Clone, Default)]
pub struct CoverFinder {
    catalog: Option<Arc<dyn CoverCatalog>>,
    sources: Vec<Arc<dyn CoverArtSource>>,
}

impl CoverFinder {
    pub fn new(sources: Vec<Arc<dyn CoverArtSource>>) -> Self {
        Self {
            catalog: None,
            sources,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CoverCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Remote service names in priority order.
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Walk the chain for `tags`. Errors from any single source are logged
    /// and treated as a miss.
    pub async fn find(&self, tags: &TrackTags) -> Option<FoundCover> {
        if let Some(found) = self.find_in_catalog(tags).await {
            return Some(found);
        }

        if tags.title.is_empty() || tags.artist.is_empty() {
            debug!(target: "verifier", "Title or artist missing, skipping remote cover services");
            return None;
        }

        for source in &self.sources {
            match source.find_cover(&tags.title, &tags.artist).await {
                Ok(Some(url)) => {
                    debug!(target: "verifier", source = source.name(), %url, "Found cover");
                    return Some(FoundCover {
                        url,
                        source: source.name().to_string(),
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(target: "verifier", source = source.name(), "Cover lookup failed: {}", e),
            }
        }
        None
    }

    async fn find_in_catalog(&self, tags: &TrackTags) -> Option<FoundCover> {
        let catalog = self.catalog.as_ref()?;

        if !tags.album.is_empty() {
            match catalog.cover_for_album(&tags.album).await {
                Ok(Some(url)) => {
                    return Some(FoundCover {
                        url,
                        source: "catalog-album".to_string(),
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(target: "verifier", "Catalog album lookup failed: {}", e),
            }
        }

        if !tags.title.is_empty() && !tags.artist.is_empty() {
            match catalog.cover_for_track(&tags.title, &tags.artist).await {
                Ok(Some(url)) => {
                    return Some(FoundCover {
                        url,
                        source: "catalog-track".to_string(),
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(target: "verifier", "Catalog track lookup failed: {}", e),
            }
        }
        None
    }
}

impl std::fmt::Debug for CoverFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverFinder")
            .field("catalog", &self.catalog.is_some())
            .field("sources", &self.source_names())
            .finish()
    }
}
