//! flac-harvest - batch acquisition of lossless tracks by ISRC.
//!
//! Tracks identified by streaming metadata are resolved against several
//! backend services in priority order, verified by ISRC, and written to a
//! local library that is checked for existing copies first. A separate
//! verifier audits a library for missing cover art and lyrics.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod cover;
pub mod dedup;
pub mod downloader;
pub mod error;
pub mod library;
pub mod lyrics;
pub mod metadata;
pub mod pool;
pub mod queue;
pub mod resolve;
pub mod scanner;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging. Hot paths log under short targets.
    let mut filter = EnvFilter::from_default_env();
    for directive in ["flac_harvest=info", "queue=info", "resolver=info", "verifier=info"] {
        filter = filter.add_directive(directive.parse()?);
    }
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run_command(&args)
}
