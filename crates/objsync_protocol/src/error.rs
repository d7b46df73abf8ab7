//! Error types for protocol values.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or evaluating protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A regex predicate has a pattern that does not compile.
    #[error("invalid regex `{pattern}`: {message}")]
    InvalidRegex {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        message: String,
    },

    /// A query is structurally invalid.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] objsync_codec::CodecError),
}
