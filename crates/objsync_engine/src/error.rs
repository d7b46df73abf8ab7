//! Error types for the sync engine.

use objsync_codec::CodecError;
use objsync_protocol::{ObjectId, ProtocolError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for local store operations.
pub type LocalStoreResult<T> = Result<T, LocalStoreError>;

/// Errors that can occur during sync operations.
///
/// Per-item outcomes (a rejected insert, a stale etag) are not errors; they
/// come back as failures in the sync report.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A round-trip did not complete in time.
    #[error("operation timed out")]
    Timeout,

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// The bucket's scope was replaced or removed while the sync ran.
    #[error("sync scope of bucket {bucket} changed during sync")]
    ScopeChanged {
        /// Bucket name.
        bucket: String,
    },

    /// Credentials or tenant rejected by the remote.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The remote refused the whole request for this bucket.
    #[error("access to bucket {bucket} forbidden")]
    Forbidden {
        /// Bucket name.
        bucket: String,
    },

    /// Caller passed an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No sync scope is configured for the bucket.
    #[error("no sync scope configured for bucket {bucket}")]
    NoSyncScope {
        /// Bucket name.
        bucket: String,
    },

    /// A conflict resolver returned neither of its candidates.
    #[error("conflict resolver returned neither candidate for object {object_id}")]
    InvalidConflictResolution {
        /// Object being resolved.
        object_id: ObjectId,
    },

    /// Local store error.
    #[error("local store error: {0}")]
    LocalStore(#[from] LocalStoreError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error (malformed message or response).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            _ => false,
        }
    }

    /// Returns true for caller mistakes detected without any I/O.
    pub fn is_usage_fault(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidArgument(_)
                | SyncError::NoSyncScope { .. }
                | SyncError::InvalidConflictResolution { .. }
        )
    }
}

impl From<ProtocolError> for SyncError {
    fn from(e: ProtocolError) -> Self {
        SyncError::InvalidArgument(e.to_string())
    }
}

/// Errors raised by a [`LocalStore`](crate::LocalStore).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocalStoreError {
    /// A compare-and-swap write found a different revision.
    #[error("record {id} in {bucket} changed: expected revision {expected:?}, found {actual:?}")]
    RevisionMismatch {
        /// Bucket name.
        bucket: String,
        /// Record id.
        id: ObjectId,
        /// Revision the writer read (`None` for "absent").
        expected: Option<u64>,
        /// Revision actually stored (`None` for "absent").
        actual: Option<u64>,
    },

    /// The record does not exist or is soft-deleted.
    #[error("record {id} not found in {bucket}")]
    NotFound {
        /// Bucket name.
        bucket: String,
        /// Record id.
        id: ObjectId,
    },

    /// Query evaluation failed.
    #[error("query error: {0}")]
    Query(#[from] ProtocolError),

    /// Backend failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl LocalStoreError {
    /// Returns true for a lost compare-and-swap race.
    pub fn is_revision_mismatch(&self) -> bool {
        matches!(self, LocalStoreError::RevisionMismatch { .. })
    }
}
