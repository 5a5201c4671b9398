//! Audio file discovery.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::metadata::is_audio_file;

/// How far below the root to look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// Only files directly inside the root
    Shallow,
    Recursive,
}

/// Find audio files under `root`, sorted by path.
///
/// Supported extensions: flac, mp3, m4a (case-insensitive). Unreadable
/// entries are skipped; a missing root yields nothing.
pub fn audio_files(root: &Path, depth: Depth) -> Vec<PathBuf> {
    let walker = match depth {
        Depth::Shallow => WalkDir::new(root).max_depth(1),
        Depth::Recursive => WalkDir::new(root),
    };

    let mut paths: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    paths.sort();
    paths
}
