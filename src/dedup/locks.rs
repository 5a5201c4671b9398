//! Per-destination serialization.
//!
//! Two queue items can resolve to the same expected path. Holding the lock
//! for that path across the existence check and the download keeps them
//! from writing the same file concurrently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

/// Registry of async locks keyed by path.
///
/// Entries are held weakly and pruned once nobody holds or waits on them.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Weak<tokio::sync::Mutex<()>>>>,
}

/// Held while working on one destination path.
pub type PathGuard = OwnedMutexGuard<()>;

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `path`.
    pub async fn lock(&self, path: &Path) -> PathGuard {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|_, weak| weak.strong_count() > 0);
            match locks.get(path).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(tokio::sync::Mutex::new(()));
                    locks.insert(path.to_path_buf(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Paths with a live lock.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
