//! Single-task load worker: retry with exponential backoff, cooperative
//! cancellation.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{ErrorCode, LoadError};
use crate::exec::CancelToken;
use crate::loader::{load_complete, DocumentLoader, StreamOptions};
use crate::model::{LoadResult, SourceId};

/// Outcome of one worker run.
#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    Loaded(LoadResult),
    Failed(LoadError),
    Cancelled,
}

/// Loads one source, retrying transient failures with exponential backoff
/// (`backoff_base * 2^attempt`). Non-retryable codes (`FILE_NOT_FOUND`,
/// `PERMISSION_DENIED`, `UNSUPPORTED_SOURCE`, `NO_LOADER`) fail
/// immediately; cancellation is checked before each attempt and between
/// chunk reads via the stream's token.
pub struct LoadWorker {
    source: SourceId,
    loader: Arc<dyn DocumentLoader>,
    max_retries: u32,
    backoff_base: Duration,
    cancel: CancelToken,
}

impl LoadWorker {
    pub fn new(
        source: SourceId,
        loader: Arc<dyn DocumentLoader>,
        max_retries: u32,
        backoff_base: Duration,
        cancel: CancelToken,
    ) -> Self {
        Self {
            source,
            loader,
            max_retries,
            backoff_base,
            cancel,
        }
    }

    pub fn run(&self) -> WorkerOutcome {
        let attempts = self.max_retries.max(1);
        let mut last_error: Option<LoadError> = None;

        for attempt in 0..attempts {
            if self.cancel.is_cancelled() {
                return WorkerOutcome::Cancelled;
            }
            let options = StreamOptions {
                cancel: Some(self.cancel.clone()),
                ..StreamOptions::default()
            };
            let result = load_complete(self.loader.as_ref(), &self.source, options);
            if result.ok {
                return WorkerOutcome::Loaded(result);
            }
            if result.is_cancelled() {
                return WorkerOutcome::Cancelled;
            }

            let error = result
                .errors
                .into_iter()
                .next()
                .unwrap_or_else(|| {
                    LoadError::new(
                        ErrorCode::LoadException,
                        self.source.clone(),
                        "load failed without a reported error",
                    )
                })
                .with_retry_count(attempt);
            if !error.code.is_retryable() {
                return WorkerOutcome::Failed(error);
            }
            debug!(
                source = %self.source,
                attempt,
                code = %error.code,
                "load attempt failed"
            );
            last_error = Some(error);

            if attempt + 1 < attempts {
                self.backoff(self.backoff_base * 2u32.pow(attempt));
            }
        }

        WorkerOutcome::Failed(last_error.unwrap_or_else(|| {
            LoadError::new(
                ErrorCode::LoadException,
                self.source.clone(),
                "retries exhausted",
            )
        }))
    }

    /// Sleeps in small slices so cancellation cuts the backoff short.
    fn backoff(&self, total: Duration) {
        let slice = Duration::from_millis(10);
        let mut remaining = total;
        while !remaining.is_zero() {
            if self.cancel.is_cancelled() {
                return;
            }
            let step = remaining.min(slice);
            std::thread::sleep(step);
            remaining -= step;
        }
    }
}
