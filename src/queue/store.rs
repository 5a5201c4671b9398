//! Thread-safe owner of every [`QueueItem`].

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{ItemId, ItemState, QueueError, QueueItem, QueueSnapshot, StateCounts, TrackIdentity};

/// Reported for work that was cancelled before or while it ran.
pub const CANCELLED_MESSAGE: &str = "cancelled";

/// Authoritative record of requested items and their lifecycle.
///
/// Writers take the lock only for the duration of a single transition.
/// Readers clone what they need under a shared lock, so a snapshot never
/// holds up a worker for longer than one copy of the item list.
#[derive(Debug)]
pub struct QueueStore {
    inner: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    items: HashMap<ItemId, QueueItem>,
    /// Enqueue order, for display stability
    order: Vec<ItemId>,
    session_bytes: u64,
    session_started: DateTime<Utc>,
}

impl Inner {
    fn new() -> Self {
        Self {
            items: HashMap::new(),
            order: Vec::new(),
            session_bytes: 0,
            session_started: Utc::now(),
        }
    }

    /// Fetch an item for a transition, checking its current state.
    fn expect_state(
        &mut self,
        id: &str,
        expected: ItemState,
        to: ItemState,
    ) -> Result<&mut QueueItem, QueueError> {
        match self.items.get_mut(id) {
            Some(item) if item.state == expected => Ok(item),
            other => Err(QueueError::InvalidTransition {
                id: id.to_string(),
                found: other.map(|item| item.state),
                to,
            }),
        }
    }

    fn retain(&mut self, keep: impl Fn(&QueueItem) -> bool) -> usize {
        let before = self.items.len();
        self.items.retain(|_, item| keep(item));
        let items = &self.items;
        self.order.retain(|id| items.contains_key(id));
        before - self.items.len()
    }
}

impl QueueStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::new()),
        }
    }

    /// Add a new item in the `Queued` state.
    pub fn enqueue(
        &self,
        id: impl Into<ItemId>,
        identity: TrackIdentity,
    ) -> Result<QueueItem, QueueError> {
        let id = id.into();
        let mut inner = self.inner.write();
        if inner.items.contains_key(&id) {
            return Err(QueueError::DuplicateId(id));
        }

        let item = QueueItem::new(id.clone(), identity);
        inner.items.insert(id.clone(), item.clone());
        inner.order.push(id);
        tracing::debug!(target: "queue", item = %item.id, "Enqueued");
        Ok(item)
    }

    /// Enqueue with an id derived from the ISRC and the current time.
    pub fn enqueue_generated(&self, identity: TrackIdentity) -> QueueItem {
        loop {
            let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
            let id = format!("{}-{}", identity.isrc, nanos);
            // Two calls within the same clock tick would collide; take the next tick.
            match self.enqueue(id, identity.clone()) {
                Ok(item) => return item,
                Err(_) => std::thread::yield_now(),
            }
        }
    }

    /// `Queued -> Downloading`. A second start on the same item is rejected.
    pub fn start(&self, id: &str) -> Result<(), QueueError> {
        let mut inner = self.inner.write();
        let item = inner.expect_state(id, ItemState::Queued, ItemState::Downloading)?;
        item.state = ItemState::Downloading;
        item.started_at = Some(Utc::now());
        tracing::debug!(target: "queue", item = id, "Started");
        Ok(())
    }

    /// Record bytes received so far for a `Downloading` item.
    pub fn update_progress(&self, id: &str, bytes: u64) -> Result<(), QueueError> {
        let mut inner = self.inner.write();
        let item = inner.expect_state(id, ItemState::Downloading, ItemState::Downloading)?;
        item.progress_bytes = bytes;
        Ok(())
    }

    /// `Downloading -> Completed`.
    pub fn complete(&self, id: &str, path: impl Into<PathBuf>, size: u64) -> Result<(), QueueError> {
        let mut inner = self.inner.write();
        let item = inner.expect_state(id, ItemState::Downloading, ItemState::Completed)?;
        item.state = ItemState::Completed;
        item.result_path = Some(path.into());
        item.size_bytes = Some(size);
        item.progress_bytes = size;
        item.finished_at = Some(Utc::now());
        inner.session_bytes += size;
        tracing::debug!(target: "queue", item = id, size, "Completed");
        Ok(())
    }

    /// `Downloading -> Skipped`, pointing at the file that already existed.
    pub fn skip(&self, id: &str, path: impl Into<PathBuf>) -> Result<(), QueueError> {
        let mut inner = self.inner.write();
        let item = inner.expect_state(id, ItemState::Downloading, ItemState::Skipped)?;
        item.state = ItemState::Skipped;
        item.result_path = Some(path.into());
        item.finished_at = Some(Utc::now());
        tracing::debug!(target: "queue", item = id, "Skipped");
        Ok(())
    }

    /// `Downloading -> Failed`.
    pub fn fail(&self, id: &str, message: impl Into<String>) -> Result<(), QueueError> {
        let mut inner = self.inner.write();
        let item = inner.expect_state(id, ItemState::Downloading, ItemState::Failed)?;
        let message = message.into();
        tracing::debug!(target: "queue", item = id, error = %message, "Failed");
        item.state = ItemState::Failed;
        item.error = Some(message);
        item.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Move every `Queued` item to `Skipped` without a result path.
    ///
    /// `Downloading` items are left alone to finish. Returns how many
    /// items were cancelled.
    pub fn cancel_pending(&self) -> usize {
        let mut inner = self.inner.write();
        let now = Utc::now();
        let mut cancelled = 0;
        for item in inner.items.values_mut() {
            if item.state == ItemState::Queued {
                item.state = ItemState::Skipped;
                item.error = None;
                item.finished_at = Some(now);
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::info!(target: "queue", cancelled, "Cancelled pending items");
        }
        cancelled
    }

    /// Point-in-time copy of the queue.
    pub fn snapshot(&self) -> QueueSnapshot {
        let inner = self.inner.read();
        let mut counts = StateCounts::default();
        let mut current = None;
        let items: Vec<QueueItem> = inner
            .order
            .iter()
            .filter_map(|id| inner.items.get(id))
            .inspect(|item| {
                counts.bump(item.state);
                if current.is_none() && item.state == ItemState::Downloading {
                    current = Some(item.id.clone());
                }
            })
            .cloned()
            .collect();

        QueueSnapshot {
            items,
            is_downloading: counts.downloading > 0,
            counts,
            current,
            session_bytes: inner.session_bytes,
            session_started: inner.session_started,
        }
    }

    pub fn get(&self, id: &str) -> Option<QueueItem> {
        self.inner.read().items.get(id).cloned()
    }

    /// Derived from the item set: true while any item is `Downloading`.
    pub fn is_downloading(&self) -> bool {
        self.inner
            .read()
            .items
            .values()
            .any(|item| item.state == ItemState::Downloading)
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove completed, skipped and failed items.
    pub fn clear_terminal(&self) -> usize {
        let removed = self.inner.write().retain(|item| !item.state.is_terminal());
        tracing::debug!(target: "queue", removed, "Cleared terminal items");
        removed
    }

    /// Remove every item and reset session statistics.
    pub fn clear_all(&self) {
        *self.inner.write() = Inner::new();
        tracing::debug!(target: "queue", "Cleared queue");
    }
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn identity(isrc: &str) -> TrackIdentity {
        TrackIdentity::new(isrc, "Song", "Artist", "Album")
    }

    #[test]
    fn test_enqueue_and_duplicate() {
        let store = QueueStore::new();
        let item = store.enqueue("x", identity("ABC123")).unwrap();
        assert_eq!(item.state, ItemState::Queued);

        let err = store.enqueue("x", identity("ABC123")).unwrap_err();
        assert_eq!(err, QueueError::DuplicateId("x".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_complete_then_late_fail_is_rejected() {
        let store = QueueStore::new();
        store.enqueue("X", identity("ABC123")).unwrap();
        store.start("X").unwrap();
        store.complete("X", "/out/track.flac", 3_500_000).unwrap();

        let snapshot = store.snapshot();
        let item = snapshot.item("X").unwrap();
        assert_eq!(item.state, ItemState::Completed);
        assert_eq!(item.result_path, Some(PathBuf::from("/out/track.flac")));
        assert_eq!(item.size_bytes, Some(3_500_000));

        let err = store.fail("X", "late error").unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidTransition {
                found: Some(ItemState::Completed),
                to: ItemState::Failed,
                ..
            }
        ));
        assert_eq!(store.get("X").unwrap().state, ItemState::Completed);
        assert!(store.get("X").unwrap().error.is_none());
    }

    #[test]
    fn test_start_requires_queued() {
        let store = QueueStore::new();
        assert!(matches!(
            store.start("missing"),
            Err(QueueError::InvalidTransition { found: None, .. })
        ));

        store.enqueue("a", identity("A")).unwrap();
        store.start("a").unwrap();
        assert!(matches!(
            store.start("a"),
            Err(QueueError::InvalidTransition {
                found: Some(ItemState::Downloading),
                ..
            })
        ));
    }

    #[test]
    fn test_terminal_requires_downloading() {
        let store = QueueStore::new();
        store.enqueue("a", identity("A")).unwrap();
        assert!(store.complete("a", "/x.flac", 1).is_err());
        assert!(store.skip("a", "/x.flac").is_err());
        assert!(store.fail("a", "nope").is_err());
        assert_eq!(store.get("a").unwrap().state, ItemState::Queued);
    }

    #[test]
    fn test_concurrent_start_only_one_wins() {
        let store = Arc::new(QueueStore::new());
        store.enqueue("race", identity("R")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.start("race").is_ok())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_snapshot_preserves_enqueue_order_and_counts() {
        let store = QueueStore::new();
        for id in ["c", "a", "b"] {
            store.enqueue(id, identity(id)).unwrap();
        }
        store.start("a").unwrap();
        store.start("b").unwrap();
        store.skip("b", "/existing.flac").unwrap();

        let snapshot = store.snapshot();
        let ids: Vec<_> = snapshot.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(snapshot.counts.queued, 1);
        assert_eq!(snapshot.counts.downloading, 1);
        assert_eq!(snapshot.counts.skipped, 1);
        assert!(snapshot.is_downloading);
        assert_eq!(snapshot.current.as_deref(), Some("a"));
    }

    #[test]
    fn test_is_downloading_is_derived() {
        let store = QueueStore::new();
        store.enqueue("a", identity("A")).unwrap();
        assert!(!store.is_downloading());
        store.start("a").unwrap();
        assert!(store.is_downloading());
        store.fail("a", "boom").unwrap();
        assert!(!store.is_downloading());
    }

    #[test]
    fn test_clear_terminal_keeps_active_items() {
        let store = QueueStore::new();
        for id in ["q", "d", "c", "s", "f"] {
            store.enqueue(id, identity(id)).unwrap();
        }
        for id in ["d", "c", "s", "f"] {
            store.start(id).unwrap();
        }
        store.complete("c", "/c.flac", 10).unwrap();
        store.skip("s", "/s.flac").unwrap();
        store.fail("f", "nope").unwrap();

        assert_eq!(store.clear_terminal(), 3);
        let snapshot = store.snapshot();
        let ids: Vec<_> = snapshot.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["q", "d"]);

        store.clear_all();
        assert!(store.is_empty());
        assert_eq!(store.snapshot().session_bytes, 0);
    }

    #[test]
    fn test_session_bytes_accumulate() {
        let store = QueueStore::new();
        for id in ["a", "b"] {
            store.enqueue(id, identity(id)).unwrap();
            store.start(id).unwrap();
        }
        store.update_progress("a", 500).unwrap();
        assert_eq!(store.get("a").unwrap().progress_bytes, 500);
        store.complete("a", "/a.flac", 1_000).unwrap();
        store.complete("b", "/b.flac", 2_000).unwrap();
        assert_eq!(store.snapshot().session_bytes, 3_000);
        assert!(store.update_progress("a", 10).is_err());
    }

    #[test]
    fn test_cancel_pending_leaves_downloading() {
        let store = QueueStore::new();
        for id in ["a", "b", "c"] {
            store.enqueue(id, identity(id)).unwrap();
        }
        store.start("a").unwrap();

        assert_eq!(store.cancel_pending(), 2);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.counts.downloading, 1);
        assert_eq!(snapshot.counts.skipped, 2);
        assert!(snapshot.item("b").unwrap().result_path.is_none());
        assert!(store.start("b").is_err());
    }

    #[test]
    fn test_enqueue_generated_ids_are_unique() {
        let store = QueueStore::new();
        let a = store.enqueue_generated(identity("USRC1"));
        let b = store.enqueue_generated(identity("USRC1"));
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("USRC1-"));
    }
}

/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Start,
        Complete,
        Skip,
        Fail,
        Cancel,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Start),
            Just(Op::Complete),
            Just(Op::Skip),
            Just(Op::Fail),
            Just(Op::Cancel),
        ]
    }

    proptest! {
        /// Once terminal, an item never changes state again
        #[test]
        fn terminal_states_never_regress(ops in prop::collection::vec(op(), 1..30)) {
            let store = QueueStore::new();
            store.enqueue("item", TrackIdentity::new("ISRC", "t", "a", "b")).unwrap();
            let mut terminal: Option<ItemState> = None;

            for op in ops {
                let before = store.get("item").unwrap().state;
                let result = match op {
                    Op::Start => store.start("item").is_ok(),
                    Op::Complete => store.complete("item", "/x.flac", 1).is_ok(),
                    Op::Skip => store.skip("item", "/x.flac").is_ok(),
                    Op::Fail => store.fail("item", "err").is_ok(),
                    Op::Cancel => store.cancel_pending() > 0,
                };
                let after = store.get("item").unwrap().state;

                if let Some(locked) = terminal {
                    prop_assert_eq!(after, locked);
                    prop_assert!(!result);
                }
                if matches!(op, Op::Start) && before != ItemState::Queued {
                    prop_assert!(!result, "start succeeded from {:?}", before);
                }
                if after.is_terminal() {
                    terminal = Some(after);
                }
            }
        }
    }
}
