//! Per-call sync context.

use crate::error::{SyncError, SyncResult};
use objsync_protocol::Credentials;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Who is syncing, against which tenant, and whether the caller gave up.
///
/// Passed explicitly into every engine call. Clones share the cancel flag,
/// so a clone handed to another task can cancel a sync in flight.
#[derive(Debug, Clone)]
pub struct SyncContext {
    tenant: String,
    credentials: Credentials,
    cancelled: Arc<AtomicBool>,
}

impl SyncContext {
    /// Creates a context.
    pub fn new(tenant: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            tenant: tenant.into(),
            credentials,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Tenant (application id).
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Caller credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Requests cancellation of every sync using this context.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clears the cancel flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Returns true once [`SyncContext::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`SyncError::Cancelled`] if cancelled.
    pub fn check_cancelled(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}
