//! Command-line interface for flac-harvest.
//!
//! This module provides CLI commands for downloading tracks, checking what
//! is already on disk, and verifying an existing library.

mod commands;

pub use commands::{Cli, Commands, run_command};
