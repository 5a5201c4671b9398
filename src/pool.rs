//! Bounded-concurrency task execution.
//!
//! [`WorkerPool`] runs an ordered list of tasks with at most `limit` in
//! flight, admitting the next task as soon as any running one finishes
//! (a sliding window, not fixed batches). It is generic over the task and
//! result types so track, cover and lyrics work all share it.
//!
//! [`BackgroundTasks`] is the follow-up work registry: jobs spawned after a
//! download finishes (lyrics embedding) are tracked there and can be awaited
//! with [`BackgroundTasks::drain`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default number of concurrent workers.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Cooperative cancellation signal shared between a caller and its workers.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What happened to a single task submitted to [`WorkerPool::run`].
#[derive(Debug)]
pub enum TaskOutcome<R> {
    /// The task ran to completion (its own result may still be an error)
    Finished(R),
    /// The task panicked; siblings were unaffected
    Panicked(String),
    /// Cancellation was raised before the task started
    NotStarted,
}

impl<R> TaskOutcome<R> {
    pub fn finished(self) -> Option<R> {
        match self {
            Self::Finished(r) => Some(r),
            _ => None,
        }
    }
}

/// Sliding-window worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    limit: usize,
    cancel: CancelFlag,
}

impl WorkerPool {
    /// Create a pool with its own cancel flag. A limit of 0 is treated as 1.
    pub fn new(limit: usize) -> Self {
        Self::with_cancel(limit, CancelFlag::new())
    }

    pub fn with_cancel(limit: usize, cancel: CancelFlag) -> Self {
        Self {
            limit: limit.max(1),
            cancel,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Run every task through `work`, keeping at most `limit` in flight.
    ///
    /// Outcomes are returned in input order. On cancellation no further
    /// tasks are admitted and the call returns once in-flight tasks have
    /// drained; unadmitted tasks report [`TaskOutcome::NotStarted`].
    pub async fn run<T, R, F, Fut>(&self, tasks: Vec<T>, work: F) -> Vec<TaskOutcome<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let total = tasks.len();
        let mut outcomes: Vec<TaskOutcome<R>> = (0..total).map(|_| TaskOutcome::NotStarted).collect();
        let work = Arc::new(work);
        let mut pending = tasks.into_iter().enumerate();
        let mut active: JoinSet<(usize, Option<Result<R, String>>)> = JoinSet::new();

        loop {
            while active.len() < self.limit && !self.cancel.is_cancelled() {
                let Some((index, task)) = pending.next() else {
                    break;
                };
                let work = Arc::clone(&work);
                let cancel = self.cancel.clone();
                active.spawn(async move {
                    if cancel.is_cancelled() {
                        return (index, None);
                    }
                    let result = AssertUnwindSafe((*work)(task))
                        .catch_unwind()
                        .await
                        .map_err(panic_message);
                    (index, Some(result))
                });
            }

            match active.join_next().await {
                Some(Ok((index, Some(Ok(result))))) => outcomes[index] = TaskOutcome::Finished(result),
                Some(Ok((index, Some(Err(message))))) => {
                    tracing::error!(task = index, panic = %message, "Worker task panicked");
                    outcomes[index] = TaskOutcome::Panicked(message);
                }
                Some(Ok((_, None))) => {}
                Some(Err(e)) => tracing::error!("Worker task aborted: {}", e),
                None => break,
            }
        }

        if self.cancel.is_cancelled() {
            let skipped = outcomes
                .iter()
                .filter(|o| matches!(o, TaskOutcome::NotStarted))
                .count();
            tracing::info!(total, skipped, "Worker pool cancelled");
        }
        outcomes
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Tracked, bounded set of follow-up jobs.
///
/// Jobs are spawned onto the runtime immediately but at most `limit` run at
/// once. Nothing is detached: [`drain`](Self::drain) waits for all of them.
pub struct BackgroundTasks {
    name: &'static str,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl BackgroundTasks {
    pub fn new(name: &'static str, limit: usize) -> Self {
        Self {
            name,
            permits: Arc::new(Semaphore::new(limit.max(1))),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Register a job. Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tasks.lock().spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            job.await;
        });
    }

    /// Jobs registered and not yet reaped by [`drain`](Self::drain).
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Wait for every registered job, including ones spawned while draining.
    ///
    /// Returns the number of jobs reaped.
    pub async fn drain(&self) -> usize {
        let mut reaped = 0;
        loop {
            let mut batch = std::mem::take(&mut *self.tasks.lock());
            if batch.is_empty() {
                break;
            }
            while let Some(result) = batch.join_next().await {
                reaped += 1;
                if let Err(e) = result {
                    tracing::warn!(pool = self.name, "Background job failed: {}", e);
                }
            }
        }
        reaped
    }
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTasks")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Tracks current and peak concurrency across tasks.
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_exceeds_limit() {
        let gauge = Arc::new(Gauge::default());
        let pool = WorkerPool::new(3);
        let tasks: Vec<u64> = (0..20).map(|i| (i % 5) * 3 + 1).collect();

        let g = Arc::clone(&gauge);
        let outcomes = pool
            .run(tasks, move |ms| {
                let g = Arc::clone(&g);
                async move {
                    g.enter();
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    g.exit();
                    ms
                }
            })
            .await;

        assert_eq!(outcomes.len(), 20);
        assert!(outcomes.iter().all(|o| matches!(o, TaskOutcome::Finished(_))));
        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {peak}");
        assert!(peak >= 2, "pool never ran tasks in parallel");
    }

    #[tokio::test]
    async fn test_outcomes_keep_input_order() {
        let pool = WorkerPool::new(4);
        let outcomes = pool
            .run(vec![30u64, 1, 20, 5], |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                ms * 2
            })
            .await;
        let values: Vec<_> = outcomes.into_iter().filter_map(TaskOutcome::finished).collect();
        assert_eq!(values, vec![60, 2, 40, 10]);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let pool = WorkerPool::new(2);
        let outcomes = pool
            .run(vec![1, 2, 3, 4], |n| async move {
                if n == 2 {
                    panic!("task two exploded");
                }
                if n == 3 {
                    return Err("soft failure");
                }
                Ok(n)
            })
            .await;

        assert!(matches!(outcomes[0], TaskOutcome::Finished(Ok(1))));
        assert!(matches!(&outcomes[1], TaskOutcome::Panicked(m) if m.contains("exploded")));
        assert!(matches!(outcomes[2], TaskOutcome::Finished(Err(_))));
        assert!(matches!(outcomes[3], TaskOutcome::Finished(Ok(4))));
    }

    #[tokio::test]
    async fn test_cancel_stops_admission_and_drains() {
        let cancel = CancelFlag::new();
        let pool = WorkerPool::with_cancel(2, cancel.clone());
        let started = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&started);
        let c = cancel.clone();
        let outcomes = pool
            .run((0..10).collect::<Vec<usize>>(), move |i| {
                let s = Arc::clone(&s);
                let c = c.clone();
                async move {
                    s.fetch_add(1, Ordering::SeqCst);
                    if i == 1 {
                        c.cancel();
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    i
                }
            })
            .await;

        let finished = outcomes
            .iter()
            .filter(|o| matches!(o, TaskOutcome::Finished(_)))
            .count();
        assert_eq!(finished, started.load(Ordering::SeqCst));
        assert!(finished <= 3);
        assert!(matches!(outcomes[9], TaskOutcome::NotStarted));
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let pool = WorkerPool::default();
        let outcomes = pool.run(Vec::<u8>::new(), |n| async move { n }).await;
        assert!(outcomes.is_empty());
        assert_eq!(pool.limit(), DEFAULT_CONCURRENCY);
    }

    #[tokio::test]
    async fn test_background_drain_waits_for_all() {
        let tasks = BackgroundTasks::new("test", 2);
        let done = Arc::new(AtomicUsize::new(0));
        for i in 0..5u64 {
            let done = Arc::clone(&done);
            tasks.spawn(async move {
                tokio::time::sleep(Duration::from_millis(5 * i)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(tasks.drain().await, 5);
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(tasks.pending(), 0);
    }
}
