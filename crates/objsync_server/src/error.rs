//! Error types for the document server.

use objsync_protocol::{ObjectId, ProtocolError, ReasonCode, ResultCode};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the document server.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Caller presented the wrong tenant.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// An ACL denied the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Target object is missing or soft-deleted.
    #[error("object {id} not found in bucket {bucket}")]
    NotFound {
        /// Bucket name.
        bucket: String,
        /// Object id.
        id: ObjectId,
    },

    /// An insert used an id that is already taken.
    #[error("object {id} already exists in bucket {bucket}")]
    DuplicateId {
        /// Bucket name.
        bucket: String,
        /// Object id.
        id: ObjectId,
    },

    /// The supplied etag is not the current version.
    #[error("etag mismatch for object {id}")]
    EtagMismatch {
        /// Object id.
        id: ObjectId,
    },

    /// Query could not be evaluated.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Internal(_))
    }

    /// Batch outcome class for this error.
    pub fn result_code(&self) -> ResultCode {
        match self {
            ServerError::InvalidRequest(_) | ServerError::Protocol(_) => ResultCode::BadRequest,
            ServerError::Unauthorized(_) | ServerError::Forbidden(_) => ResultCode::Forbidden,
            ServerError::NotFound { .. } => ResultCode::NotFound,
            ServerError::DuplicateId { .. } | ServerError::EtagMismatch { .. } => {
                ResultCode::Conflict
            }
            ServerError::Internal(_) => ResultCode::ServerError,
        }
    }

    /// Batch reason for this error.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            ServerError::InvalidRequest(_) | ServerError::Protocol(_) => ReasonCode::InvalidPayload,
            ServerError::Unauthorized(_) | ServerError::Forbidden(_) => {
                ReasonCode::PermissionDenied
            }
            ServerError::NotFound { .. } => ReasonCode::ObjectNotFound,
            ServerError::DuplicateId { .. } => ReasonCode::DuplicateId,
            ServerError::EtagMismatch { .. } => ReasonCode::EtagMismatch,
            ServerError::Internal(_) => ReasonCode::Unknown,
        }
    }
}
