//! # objsync Engine
//!
//! Offline-first object sync engine.
//!
//! This crate provides:
//! - Sync scope registry (per-bucket query and last sync time, persisted)
//! - Pull: paginated incremental fetch of remote changes
//! - Push: batched upload of locally dirty records
//! - Conflict resolution through a pluggable resolver
//! - Retry with exponential backoff and per-round-trip timeouts
//! - An in-memory local store and a user-facing bucket handle
//! - A loopback remote that talks to the reference server in-process
//!
//! ## Architecture
//!
//! The engine implements a **pull-then-push** model per bucket:
//! 1. Pull objects changed in the window `[last sync - offset, now]`
//! 2. Merge them into the local replica, resolving conflicts with
//!    unpushed local edits
//! 3. Push every dirty record in scope, one batch per
//!    `push_divide_number` records
//! 4. Record the window end, only if nothing failed
//!
//! ## Key Invariants
//!
//! - A local record changes sync state only on an acknowledgment for it
//! - Local writes by the engine are compare-and-swap on the record revision
//! - A cancelled, timed out or superseded sync never records its window
//! - Retried batches reuse their token, so replays are applied once
//!
//! ## Usage
//!
//! ```no_run
//! use objsync_engine::{
//!     MemoryLocalStore, RemoteStore, SyncConfig, SyncContext, SyncEngine, SyncScopeRegistry,
//! };
//! use objsync_protocol::{Acl, Credentials, Fields, PreferServer};
//! use std::sync::Arc;
//!
//! async fn run<R: RemoteStore>(remote: Arc<R>) -> objsync_engine::SyncResult<()> {
//!     let engine = SyncEngine::new(
//!         SyncConfig::default(),
//!         remote,
//!         Arc::new(MemoryLocalStore::new()),
//!         Arc::new(SyncScopeRegistry::open("scopes.cbor")?),
//!     );
//!     engine.set_sync_scope("notes", None)?;
//!     engine
//!         .bucket("notes")
//!         .insert(Fields::new().with("title", "Groceries"), Acl::default())?;
//!
//!     let ctx = SyncContext::new("app", Credentials::user("alice"));
//!     let report = engine.sync_bucket(&ctx, "notes", &PreferServer).await?;
//!     assert!(report.is_success());
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod config;
mod context;
mod engine;
mod error;
mod loopback;
mod memory;
mod phase;
mod pull;
mod push;
mod registry;
mod replica;
mod store;

#[cfg(test)]
mod testing;

pub use config::{RetryConfig, SyncConfig};
pub use context::SyncContext;
pub use engine::{SyncEngine, SyncReport, SyncStats};
pub use error::{LocalStoreError, LocalStoreResult, SyncError, SyncResult};
pub use loopback::LoopbackRemote;
pub use memory::MemoryLocalStore;
pub use phase::{SyncFailure, SyncPhase};
pub use registry::{SyncScope, SyncScopeRegistry};
pub use replica::LocalBucket;
pub use store::{LocalRecord, LocalStore, RemoteStore, SyncStatus};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
