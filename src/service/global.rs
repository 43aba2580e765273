//! Process-wide service handle.
//!
//! A single shared [`DocumentService`] with an explicit lifecycle instead
//! of ambient global state: [`init`] installs a configured instance (at
//! most once), [`global`] hands out the shared handle (installing defaults
//! on first use), [`shutdown`] tears it down, and [`reset`] is the
//! test-support hook that shuts down and clears the slot.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::CoreError;
use crate::service::{DocumentService, ServiceConfig};

static SLOT: Mutex<Option<Arc<DocumentService>>> = Mutex::new(None);

/// Installs the process-wide service with the given configuration.
/// Fails if one is already installed.
pub fn init(config: ServiceConfig) -> Result<Arc<DocumentService>, CoreError> {
    let mut slot = SLOT.lock();
    if slot.is_some() {
        return Err(CoreError::AlreadyInitialized);
    }
    let service = Arc::new(DocumentService::new(config));
    *slot = Some(Arc::clone(&service));
    Ok(service)
}

/// The shared service handle. Installs a default-configured instance on
/// first use.
pub fn global() -> Arc<DocumentService> {
    let mut slot = SLOT.lock();
    match slot.as_ref() {
        Some(service) => Arc::clone(service),
        None => {
            let service = Arc::new(DocumentService::new(ServiceConfig::default()));
            *slot = Some(Arc::clone(&service));
            service
        }
    }
}

/// Shuts down and removes the installed service. Returns whether one was
/// installed.
pub fn shutdown() -> bool {
    let service = SLOT.lock().take();
    match service {
        Some(service) => {
            service.shutdown();
            true
        }
        None => false,
    }
}

/// Test-support reset: shutdown plus slot clear.
pub fn reset() {
    shutdown();
}
