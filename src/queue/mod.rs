//! Download queue state.
//!
//! Every requested track gets one [`QueueItem`] whose lifecycle is
//!
//! ```text
//! Queued -> Downloading -> { Completed | Skipped | Failed }
//! ```
//!
//! Terminal states are final. All mutation goes through [`QueueStore`],
//! which is shared between download workers and whatever polls for
//! progress (the CLI progress printer, a UI, tests).

mod store;

pub use store::{CANCELLED_MESSAGE, QueueStore};

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque queue item key.
pub type ItemId = String;

/// Content fingerprint plus display fields for a requested track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackIdentity {
    pub isrc: String,
    pub title: String,
    pub artist: String,
    pub album: String,
}

impl TrackIdentity {
    pub fn new(
        isrc: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
    ) -> Self {
        Self {
            isrc: isrc.into(),
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
        }
    }
}

/// Lifecycle state of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Queued,
    Downloading,
    Completed,
    Skipped,
    Failed,
}

impl ItemState {
    /// No transition is permitted out of a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested logical track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub identity: TrackIdentity,
    pub state: ItemState,
    /// Set only on `Completed` or `Skipped`
    pub result_path: Option<PathBuf>,
    /// Set only on `Failed`
    pub error: Option<String>,
    /// Final file size, set on `Completed`
    pub size_bytes: Option<u64>,
    /// Bytes received so far while `Downloading`
    pub progress_bytes: u64,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    fn new(id: ItemId, identity: TrackIdentity) -> Self {
        Self {
            id,
            identity,
            state: ItemState::Queued,
            result_path: None,
            error: None,
            size_bytes: None,
            progress_bytes: 0,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Human-readable label for progress output.
    pub fn display_name(&self) -> String {
        match (self.identity.title.is_empty(), self.identity.artist.is_empty()) {
            (false, false) => format!("{} - {}", self.identity.title, self.identity.artist),
            (false, true) => self.identity.title.clone(),
            _ => self.identity.isrc.clone(),
        }
    }
}

/// Per-state item counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub queued: usize,
    pub downloading: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StateCounts {
    pub fn total(&self) -> usize {
        self.queued + self.downloading + self.completed + self.skipped + self.failed
    }

    pub fn terminal(&self) -> usize {
        self.completed + self.skipped + self.failed
    }

    fn bump(&mut self, state: ItemState) {
        match state {
            ItemState::Queued => self.queued += 1,
            ItemState::Downloading => self.downloading += 1,
            ItemState::Completed => self.completed += 1,
            ItemState::Skipped => self.skipped += 1,
            ItemState::Failed => self.failed += 1,
        }
    }
}

/// Read-only, point-in-time view of the queue.
///
/// Always derived from the item set on read; never stored.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    /// Items in enqueue order
    pub items: Vec<QueueItem>,
    pub counts: StateCounts,
    /// True while any item is `Downloading`
    pub is_downloading: bool,
    /// First `Downloading` item in enqueue order
    pub current: Option<ItemId>,
    /// Bytes written by completed downloads since the session started
    pub session_bytes: u64,
    pub session_started: DateTime<Utc>,
}

impl QueueSnapshot {
    pub fn item(&self, id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.id == id)
    }
}

/// Queue contract violations.
///
/// These are programmer errors at the call site and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Queue item {0} already exists")]
    DuplicateId(ItemId),

    #[error("Invalid transition for {id}: {} -> {to}", describe(.found))]
    InvalidTransition {
        id: ItemId,
        /// Current state, `None` if the item does not exist
        found: Option<ItemState>,
        to: ItemState,
    },
}

fn describe(state: &Option<ItemState>) -> &'static str {
    state.map(ItemState::as_str).unwrap_or("missing")
}
