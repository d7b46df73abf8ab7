//! # objsync Protocol
//!
//! Object model and wire types for objsync.
//!
//! This crate provides:
//! - [`Object`], [`Acl`] and [`Credentials`], with the four permission
//!   predicates (`can_read`, `can_update`, `can_delete`, `can_admin`)
//! - [`Query`], the predicate language sync scopes are written in, and
//!   [`FindOptions`] for paging, ordering and projection
//! - Batch protocol messages ([`BatchRequest`], [`BatchItemResult`])
//! - [`ConflictResolver`] and the stock resolution policies
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod conflict;
mod error;
mod object;
mod options;
mod query;

pub use batch::{
    BatchItemResult, BatchOp, BatchOperation, BatchRequest, BatchResponse, ReasonCode, ResultCode,
};
pub use conflict::{
    decide, resolver_fn, ConflictResolver, FnResolver, PreferClient, PreferLatest, PreferServer,
    Winner,
};
pub use error::{ProtocolError, ProtocolResult};
pub use object::{Acl, Credentials, ETag, Object, ObjectId, ANYONE, AUTHENTICATED, GROUP_PREFIX};
pub use options::{FindOptions, Projection, SortDirection, SortKey};
pub use query::{Query, RegexFlags};

pub use objsync_codec::{Fields, Value};
