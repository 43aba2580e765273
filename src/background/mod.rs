//! Background loader: a priority-queued, bounded-concurrency worker pool.
//!
//! Sources are admitted with a priority class (duplicates already queued
//! or in flight are ignored), pulled by a dispatcher thread in batches,
//! and loaded by [`LoadWorker`]s on a bounded executor. Consumers observe
//! the pool through a [`PoolEvent`] channel: per-source outcomes plus a
//! `BatchProgress` tick after every completion.
//!
//! Retry is two-tier: each worker retries transient failures internally
//! with exponential backoff; when a worker gives up, the pool re-enqueues
//! the source at `Low` priority until the pool-level retry cap is reached.
//!
//! Cancellation is cooperative. `cancel_all` sets the stop signal, trips
//! the shared cancel token (in-flight workers observe it between chunks)
//! and drains the queue; `stop` blocks until the dispatcher and all
//! workers have returned. Locks here are never nested; each of the queue,
//! the pending set and the batch counters is locked on its own.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{ErrorCode, LoadError};
use crate::exec::{CancelToken, WorkerPool};
use crate::loader::LoaderRegistry;
use crate::model::{LoadResult, SourceId};

mod worker;

pub use self::worker::{LoadWorker, WorkerOutcome};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_workers: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            batch_size: 50,
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
        }
    }
}

/// Admission priority. Lower rank dispatches first; FIFO within a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    fn rank(self) -> u8 {
        match self {
            Priority::High => 1,
            Priority::Normal => 5,
            Priority::Low => 10,
        }
    }
}

/// Events emitted on the pool's channel, in completion order.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    Started,
    FileLoaded {
        source: SourceId,
        result: LoadResult,
    },
    FileFailed {
        source: SourceId,
        error: LoadError,
    },
    FileCancelled {
        source: SourceId,
    },
    BatchProgress {
        completed: usize,
        total: usize,
    },
    Finished,
}

/// Queue/progress counters exposed for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub queued: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub total: usize,
}

#[derive(PartialEq, Eq)]
struct Task {
    rank: u8,
    seq: u64,
    source: SourceId,
}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.rank, self.seq).cmp(&(other.rank, other.seq))
    }
}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct BatchState {
    completed: usize,
    total: usize,
}

struct PoolShared {
    config: PoolConfig,
    registry: Arc<LoaderRegistry>,
    queue: Mutex<BinaryHeap<Reverse<Task>>>,
    pending: Mutex<HashSet<SourceId>>,
    batch: Mutex<BatchState>,
    retries: Mutex<HashMap<SourceId, u32>>,
    seq: AtomicU64,
    stop: AtomicBool,
    cancel: CancelToken,
    events: Sender<PoolEvent>,
}

impl PoolShared {
    /// Admission with dedup: a source already queued or in flight is
    /// silently ignored.
    fn admit(&self, source: SourceId, priority: Priority) -> bool {
        if self.stop.load(Ordering::SeqCst) {
            return false;
        }
        if !self.pending.lock().insert(source.clone()) {
            return false;
        }
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.queue.lock().push(Reverse(Task {
            rank: priority.rank(),
            seq,
            source,
        }));
        self.batch.lock().total += 1;
        true
    }

    fn emit(&self, event: PoolEvent) {
        let _ = self.events.send(event);
    }

    /// Bumps the completion counter and publishes batch progress.
    fn complete_one(&self) {
        let (completed, total) = {
            let mut batch = self.batch.lock();
            batch.completed += 1;
            (batch.completed, batch.total)
        };
        self.emit(PoolEvent::BatchProgress { completed, total });
    }

    fn finish_cancelled(&self, source: SourceId) {
        self.pending.lock().remove(&source);
        self.emit(PoolEvent::FileCancelled { source });
        self.complete_one();
    }

    fn run_task(&self, source: SourceId) {
        if self.cancel.is_cancelled() {
            self.finish_cancelled(source);
            return;
        }
        let outcome = match self.registry.get_loader(&source) {
            None => WorkerOutcome::Failed(LoadError::new(
                ErrorCode::NoLoader,
                source.clone(),
                format!("no loader available for: {source}"),
            )),
            Some(loader) => LoadWorker::new(
                source.clone(),
                loader,
                self.config.max_retries,
                self.config.backoff_base,
                self.cancel.clone(),
            )
            .run(),
        };

        // Drop the in-flight marker before a potential re-admission.
        self.pending.lock().remove(&source);
        match outcome {
            WorkerOutcome::Loaded(result) => {
                self.retries.lock().remove(&source);
                self.emit(PoolEvent::FileLoaded { source, result });
                self.complete_one();
            }
            WorkerOutcome::Cancelled => {
                self.emit(PoolEvent::FileCancelled { source });
                self.complete_one();
            }
            WorkerOutcome::Failed(error) => self.escalate(source, error),
        }
    }

    /// Pool-level retry: re-enqueue at `Low` until the cap, then give up.
    fn escalate(&self, source: SourceId, error: LoadError) {
        let attempts = {
            let mut retries = self.retries.lock();
            let count = retries.entry(source.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let eligible = error.code.is_retryable()
            && attempts <= self.config.max_retries
            && !self.stop.load(Ordering::SeqCst);
        if eligible && self.admit(source.clone(), Priority::Low) {
            debug!(source = %source, attempts, "re-enqueued at low priority");
            self.complete_one();
            return;
        }
        self.retries.lock().remove(&source);
        warn!(source = %source, code = %error.code, "giving up on source");
        self.emit(PoolEvent::FileFailed { source, error });
        self.complete_one();
    }
}

/// Priority-driven bulk loader over a bounded worker pool.
pub struct BackgroundLoader {
    shared: Arc<PoolShared>,
    events_rx: Receiver<PoolEvent>,
    workers: Mutex<Option<Arc<WorkerPool>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundLoader {
    pub fn new(registry: Arc<LoaderRegistry>, config: PoolConfig) -> Self {
        let (events, events_rx) = unbounded();
        Self {
            shared: Arc::new(PoolShared {
                config,
                registry,
                queue: Mutex::new(BinaryHeap::new()),
                pending: Mutex::new(HashSet::new()),
                batch: Mutex::new(BatchState::default()),
                retries: Mutex::new(HashMap::new()),
                seq: AtomicU64::new(0),
                stop: AtomicBool::new(false),
                cancel: CancelToken::new(),
                events,
            }),
            events_rx,
            workers: Mutex::new(None),
            dispatcher: Mutex::new(None),
        }
    }

    /// The pool's event channel. Events arrive in completion order;
    /// completion order across sources is unspecified.
    pub fn events(&self) -> Receiver<PoolEvent> {
        self.events_rx.clone()
    }

    /// Queues one source. Duplicates (already queued or in flight) are
    /// ignored.
    pub fn add(&self, source: &str, priority: Priority) {
        self.shared.admit(SourceId::canonical(source), priority);
    }

    pub fn add_batch(&self, sources: &[&str], priority: Priority) {
        for source in sources {
            self.add(source, priority);
        }
    }

    /// Visible files jump the queue.
    pub fn add_visible(&self, sources: &[&str]) {
        self.add_batch(sources, Priority::High);
    }

    /// Acquires the executor and starts the dispatcher. Idempotent.
    pub fn start(&self) {
        let mut dispatcher = self.dispatcher.lock();
        if dispatcher.is_some() {
            return;
        }
        let workers = Arc::new(WorkerPool::new(
            self.shared.config.max_workers,
            "bg-loader",
        ));
        *self.workers.lock() = Some(Arc::clone(&workers));

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("bg-dispatch".into())
            .spawn(move || dispatch_loop(shared, workers))
            .expect("spawn dispatcher thread");
        *dispatcher = Some(handle);
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher.lock().is_some()
    }

    /// Sets the stop signal, cancels in-flight workers and drains the
    /// queue; every pending task is reported as cancelled.
    pub fn cancel_all(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.cancel.cancel();
        let drained: Vec<Task> = {
            let mut queue = self.shared.queue.lock();
            queue.drain().map(|Reverse(task)| task).collect()
        };
        for task in drained {
            self.shared.finish_cancelled(task.source);
        }
    }

    /// Stops the dispatcher and blocks until in-flight workers have
    /// returned, releasing the executor.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.dispatcher.lock().take() {
            let _ = handle.join();
        }
        if let Some(workers) = self.workers.lock().take() {
            workers.shutdown();
        }
    }

    pub fn stats(&self) -> PoolStats {
        let (completed, total) = {
            let batch = self.shared.batch.lock();
            (batch.completed, batch.total)
        };
        PoolStats {
            queued: self.shared.queue.lock().len(),
            in_flight: self.shared.pending.lock().len(),
            completed,
            total,
        }
    }

    /// Resets the batch counters and per-source retry bookkeeping.
    pub fn reset_progress(&self) {
        {
            let mut batch = self.shared.batch.lock();
            batch.completed = 0;
            batch.total = 0;
        }
        self.shared.retries.lock().clear();
    }
}

impl Drop for BackgroundLoader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop(shared: Arc<PoolShared>, workers: Arc<WorkerPool>) {
    shared.emit(PoolEvent::Started);
    loop {
        let stopping = shared.stop.load(Ordering::SeqCst);
        let batch: Vec<Task> = {
            let mut queue = shared.queue.lock();
            if stopping && queue.is_empty() {
                break;
            }
            let take = shared.config.batch_size.min(queue.len());
            (0..take).filter_map(|_| queue.pop()).map(|Reverse(t)| t).collect()
        };
        if batch.is_empty() {
            std::thread::sleep(Duration::from_millis(10));
            continue;
        }
        for task in batch {
            if shared.cancel.is_cancelled() {
                shared.finish_cancelled(task.source);
                continue;
            }
            let shared_task = Arc::clone(&shared);
            let source = task.source;
            if workers.execute(move || shared_task.run_task(source)).is_err() {
                // Executor already released; nothing can run anymore.
                break;
            }
        }
    }
    shared.emit(PoolEvent::Finished);
}
