//! Existence, identity and configuration commands.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::runtime::Runtime;

use super::{gateway_services, open_catalog};
use crate::catalog::{Catalog, IdentitySource, lookup_identity};
use crate::config::{self, Config};
use crate::dedup::{Deduplicator, ExistenceQuery, FilenameFormat};
use crate::metadata::LoftyTags;
use std::sync::Arc;

/// Check which tracks in a JSON file are already in `dir`
pub fn cmd_exists(
    config: &Config,
    file: &Path,
    dir: &Path,
    format: &FilenameFormat,
) -> anyhow::Result<()> {
    let contents =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let queries: Vec<ExistenceQuery> =
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", file.display()))?;

    let dedup = Deduplicator::new(Arc::new(LoftyTags)).with_min_bytes(config.download.min_existing_bytes);
    let results = dedup.check_files_exist(dir, &queries, format);

    println!("{}", serde_json::to_string_pretty(&results)?);
    let found = results.iter().filter(|r| r.exists).count();
    eprintln!("{} of {} already present in {}", found, results.len(), dir.display());
    Ok(())
}

/// Look up the ISRC for a Spotify id
pub fn cmd_isrc(
    rt: &Runtime,
    config: &Config,
    spotify_id: &str,
    catalog: Option<&PathBuf>,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let catalog = open_catalog(catalog).await;
        let gateways = gateway_services(config);
        let remote = gateways.first().map(|g| g as &dyn IdentitySource);

        match lookup_identity(catalog.as_ref(), remote, spotify_id).await? {
            Some(found) => {
                println!("{}", serde_json::to_string_pretty(&found)?);
                Ok(())
            }
            None => anyhow::bail!("No ISRC found for {}", spotify_id),
        }
    })
}

/// Verify a metadata cache database
pub fn cmd_test_catalog(rt: &Runtime, path: &Path) -> anyhow::Result<()> {
    let count = rt.block_on(async {
        let catalog = Catalog::open(path).await?;
        catalog.test_connection().await
    })?;
    println!("Catalog OK: {} tracks", count);
    Ok(())
}

/// Print the effective configuration, optionally saving it
pub fn cmd_config(path: Option<&Path>, config: &Config, save: bool) -> anyhow::Result<()> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(config::config_path)
        .context("Could not determine config path")?;

    if save {
        config::save_to(config, &path)?;
    }

    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
