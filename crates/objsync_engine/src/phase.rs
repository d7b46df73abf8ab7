//! Shared state of one sync run and its guarded remote round-trips.

use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::registry::{SyncScope, SyncScopeRegistry};
use crate::store::{LocalStore, RemoteStore};
use objsync_protocol::{BatchOp, ObjectId, ReasonCode, ResultCode};
use std::future::Future;
use tracing::{debug, warn};

/// Which half of a sync an item failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Remote to local.
    Pull,
    /// Local to remote.
    Push,
}

/// One object that could not be reconciled.
///
/// The local record is left as it was; the next sync retries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    /// Bucket name.
    pub bucket: String,
    /// Object id.
    pub object_id: ObjectId,
    /// Phase the failure happened in.
    pub phase: SyncPhase,
    /// Batch operation that failed, for push failures.
    pub operation: Option<BatchOp>,
    /// Outcome class.
    pub result: ResultCode,
    /// Detail.
    pub reason: ReasonCode,
}

/// Everything a pull or push needs, snapshotted at the start of a sync.
pub(crate) struct Phase<'a, R: ?Sized, L: ?Sized> {
    pub config: &'a SyncConfig,
    pub ctx: &'a SyncContext,
    pub remote: &'a R,
    pub local: &'a L,
    pub registry: &'a SyncScopeRegistry,
    pub scope: SyncScope,
    pub retries: u64,
}

impl<'a, R: RemoteStore + ?Sized, L: LocalStore + ?Sized> Phase<'a, R, L> {
    pub fn bucket(&self) -> &str {
        &self.scope.bucket
    }

    /// Fails if the caller cancelled or the scope moved on.
    pub fn check_live(&self) -> SyncResult<()> {
        self.ctx.check_cancelled()?;
        let current = self
            .registry
            .get_sync_scope(self.bucket())
            .map(|s| s.generation);
        if current != Some(self.scope.generation) {
            return Err(SyncError::ScopeChanged {
                bucket: self.bucket().to_string(),
            });
        }
        Ok(())
    }

    /// Runs one remote round-trip with timeout and retry.
    ///
    /// `call` is invoked once per attempt and must resend the same request,
    /// so a batch keeps its token across retries.
    pub async fn round_trip<T, F, Fut>(&mut self, what: &str, mut call: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let retry = &self.config.retry;
        let attempts = retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            self.check_live()?;
            let outcome = match tokio::time::timeout(self.config.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Timeout),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    attempt += 1;
                    self.retries += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(bucket = %self.scope.bucket, what, attempt, error = %e, ?delay, "retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!(bucket = %self.scope.bucket, what, error = %e, "round-trip failed");
                    return Err(e);
                }
            }
        }
    }

    pub fn failure(
        &self,
        object_id: ObjectId,
        phase: SyncPhase,
        operation: Option<BatchOp>,
        result: ResultCode,
        reason: ReasonCode,
    ) -> SyncFailure {
        SyncFailure {
            bucket: self.scope.bucket.clone(),
            object_id,
            phase,
            operation,
            result,
            reason,
        }
    }
}
