//! Worker-thread plumbing shared by the service and the background pool.
//!
//! [`WorkerPool`] is a fixed-size pool of named threads draining a job
//! channel; dropping the sender drains and joins the workers. Jobs are
//! isolated from each other: a panicking job is logged and the worker
//! keeps running. [`CancelToken`] is the cooperative cancellation flag
//! checked by workers before each attempt and between chunk reads.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use tracing::error;

use crate::error::CoreError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Bounded-concurrency executor: `size` threads pulling jobs off a shared
/// channel.
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `size.max(1)` worker threads named `{name}-{index}`.
    pub fn new(size: usize, name: &str) -> Self {
        let (tx, rx) = unbounded::<Job>();
        let workers = (0..size.max(1))
            .map(|i| {
                let rx = rx.clone();
                std::thread::Builder::new()
                    .name(format!("{name}-{i}"))
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                                error!("worker job panicked");
                            }
                        }
                    })
                    .expect("spawn worker thread")
            })
            .collect();
        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Queues a job. Fails with [`CoreError::ShutDown`] once the pool has
    /// been shut down.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) -> Result<(), CoreError> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) => tx.send(Box::new(job)).map_err(|_| CoreError::ShutDown),
            None => Err(CoreError::ShutDown),
        }
    }

    /// Closes the job channel and blocks until all queued jobs have run
    /// and every worker has exited. Idempotent.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
