//! Error types for the ingestion core.
//!
//! Two layers: [`CoreError`] covers infrastructure faults (I/O plumbing,
//! invalid configuration, lifecycle misuse) and [`LoadError`] is the single
//! error value produced by loaders, the cache and the background pool.
//! Severities partition recovery policy: warnings accumulate without
//! terminating a stream, errors fail the current source, fatal errors halt
//! the driving pool.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;

use crate::model::SourceId;

/// Crate-wide result alias. Defaults to [`LoadError`]; infrastructure
/// paths use `Result<T, CoreError>` explicitly.
pub type Result<T, E = LoadError> = std::result::Result<T, E>;

/// Infrastructure faults outside the load/cache data path.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("already initialized")]
    AlreadyInitialized,
    #[error("shut down")]
    ShutDown,
}

/// How bad a [`LoadError`] is.
///
/// `Warning` is recoverable and never terminates a stream; `Error` fails the
/// current source; `Fatal` is reserved for unrecoverable infrastructure
/// faults that halt the driving pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Warning,
    Error,
    Fatal,
}

/// Closed set of machine-readable failure codes consumers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    UnsupportedSource,
    FileNotFound,
    PermissionDenied,
    FileOpenFailed,
    ReadFailed,
    EncodingFallback,
    LossyDecoding,
    DecodeFailed,
    HashMismatch,
    NoLoader,
    LoadException,
    CacheOversize,
    Cancelled,
}

impl ErrorCode {
    /// Wire name of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::UnsupportedSource => "UNSUPPORTED_SOURCE",
            ErrorCode::FileNotFound => "FILE_NOT_FOUND",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::FileOpenFailed => "FILE_OPEN_FAILED",
            ErrorCode::ReadFailed => "READ_FAILED",
            ErrorCode::EncodingFallback => "ENCODING_FALLBACK",
            ErrorCode::LossyDecoding => "LOSSY_DECODING",
            ErrorCode::DecodeFailed => "DECODE_FAILED",
            ErrorCode::HashMismatch => "HASH_MISMATCH",
            ErrorCode::NoLoader => "NO_LOADER",
            ErrorCode::LoadException => "LOAD_EXCEPTION",
            ErrorCode::CacheOversize => "CACHE_OVERSIZE",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }

    /// Whether a failure with this code may be retried by a worker.
    ///
    /// Missing files, permission problems and unsupported sources fail the
    /// same way on every attempt; cancellation is final by definition.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ErrorCode::UnsupportedSource
                | ErrorCode::FileNotFound
                | ErrorCode::PermissionDenied
                | ErrorCode::NoLoader
                | ErrorCode::Cancelled
        )
    }

    /// Codes that are reported as warnings rather than failures.
    pub fn is_warning(self) -> bool {
        matches!(self, ErrorCode::EncodingFallback | ErrorCode::LossyDecoding)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error value flowing through load results, callbacks and pool
/// events.
///
/// Note: the `source` field names the *document source* the error belongs
/// to, not an error chain; the underlying cause (if any) is reachable via
/// [`LoadError::cause`] and `std::error::Error::source`. For that reason
/// `Display`/`Error` are implemented by hand instead of derived.
#[derive(Debug, Clone)]
pub struct LoadError {
    pub severity: ErrorSeverity,
    pub code: ErrorCode,
    pub message: String,
    pub source: SourceId,
    pub timestamp: SystemTime,
    pub recoverable: bool,
    pub retry_count: u32,
    pub context: BTreeMap<String, String>,
    cause: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl LoadError {
    /// An error-severity failure; `recoverable` follows the code's retry
    /// classification.
    pub fn new(code: ErrorCode, source: SourceId, message: impl Into<String>) -> Self {
        Self {
            severity: ErrorSeverity::Error,
            code,
            message: message.into(),
            source,
            timestamp: SystemTime::now(),
            recoverable: code.is_retryable(),
            retry_count: 0,
            context: BTreeMap::new(),
            cause: None,
        }
    }

    /// A warning: recoverable, never terminates the stream.
    pub fn warning(code: ErrorCode, source: SourceId, message: impl Into<String>) -> Self {
        let mut err = Self::new(code, source, message);
        err.severity = ErrorSeverity::Warning;
        err.recoverable = true;
        err
    }

    /// A fatal fault that should halt the driving pool.
    pub fn fatal(code: ErrorCode, source: SourceId, message: impl Into<String>) -> Self {
        let mut err = Self::new(code, source, message);
        err.severity = ErrorSeverity::Fatal;
        err.recoverable = false;
        err
    }

    /// The synthetic error delivered to cancelled operations.
    pub fn cancelled(source: SourceId) -> Self {
        Self::new(ErrorCode::Cancelled, source, "load cancelled")
    }

    /// Classifies an `io::Error` from an open attempt into the matching
    /// code.
    pub fn from_open(source: SourceId, err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::NotFound => ErrorCode::FileNotFound,
            io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            _ => ErrorCode::FileOpenFailed,
        };
        Self::new(code, source, err.to_string()).with_cause(err)
    }

    /// Classifies an `io::Error` raised mid-stream.
    pub fn from_read(source: SourceId, err: io::Error) -> Self {
        Self::new(ErrorCode::ReadFailed, source, err.to_string()).with_cause(err)
    }

    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.code, self.message, self.source)
    }
}

impl StdError for LoadError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn StdError + 'static))
    }
}
