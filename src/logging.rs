//! Log initialization for embedding applications.
//!
//! The ingestion core emits `tracing` events from its worker threads
//! (eviction, staleness drops, retry/backoff, swallowed put failures), so
//! the subscriber installed here shows thread *names*: the pools label
//! their workers (`doc-loader-0`, `bg-loader-2`, `bg-dispatch`), which is
//! usually the fastest way to tell a service load from a background sweep
//! in interleaved output.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::CoreError;

/// Filter applied when the caller passes an empty directive string:
/// this crate at `info`, everything else at `warn`.
pub const DEFAULT_LOG_DIRECTIVES: &str = "warn,folio=info";

/// Installs the global fmt subscriber for the ingestion core.
///
/// `directives` uses the `EnvFilter` syntax (`"folio=debug"`,
/// `"warn,folio::cache=trace"`, ...); an empty string selects
/// [`DEFAULT_LOG_DIRECTIVES`]. Fails if the directives do not parse or if
/// a global subscriber is already installed.
pub fn init_logging(directives: &str) -> Result<(), CoreError> {
    let directives = if directives.is_empty() {
        DEFAULT_LOG_DIRECTIVES
    } else {
        directives
    };
    let filter = EnvFilter::try_new(directives)
        .map_err(|e| CoreError::InvalidArgument(format!("bad log directives: {e}")))?;
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .map_err(|_| CoreError::AlreadyInitialized)
}
