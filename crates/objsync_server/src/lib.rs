//! # objsync Server
//!
//! Reference in-memory document store for objsync.
//!
//! This crate provides:
//! - Bucket and object ACL enforcement
//! - Etag issue and optimistic concurrency checks
//! - Soft deletion, visible to queries that ask for it
//! - Batch handling with one result per operation
//! - Token-keyed replay of batch responses
//!
//! # Architecture
//!
//! [`DocumentServer`] is a thin facade over a [`RequestHandler`], which
//! checks the caller's tenant and bucket permissions before delegating to
//! the shared [`DocumentStore`]. There is no network layer; a transport
//! adapter calls the `handle_*` methods directly.
//!
//! # Versioning
//!
//! Every write issues a fresh etag and an `updated_at` strictly greater
//! than any earlier one, so clients can pull incrementally by
//! `_updatedAt` and detect stale writes by etag.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;
mod store;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{Caller, HandlerContext, RequestHandler};
pub use server::DocumentServer;
pub use store::{BucketAcl, DocumentStore};
