//! Store contracts consumed by the engine.

use crate::context::SyncContext;
use crate::error::{LocalStoreResult, SyncResult};
use async_trait::async_trait;
use objsync_protocol::{BatchRequest, BatchResponse, FindOptions, Object, ObjectId, Query};

/// Sync state of a local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Matches the last known server version.
    Synced,
    /// Has a local change the remote has not acknowledged.
    Dirty,
}

/// An object as held by the local replica.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRecord {
    /// The object. `etag` names the last server version seen, if any.
    pub object: Object,
    /// Sync state.
    pub status: SyncStatus,
    /// Store-assigned revision, bumped on every write.
    pub revision: u64,
}

impl LocalRecord {
    /// Record id.
    pub fn id(&self) -> &ObjectId {
        &self.object.id
    }

    /// Returns true if the record has unpushed changes.
    pub fn is_dirty(&self) -> bool {
        self.status == SyncStatus::Dirty
    }
}

/// The remote document store.
///
/// Network round-trips are the only suspension points of a sync, so this is
/// the only async seam.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Runs a query. Must honor `options`, including `include_deleted`.
    async fn query(
        &self,
        ctx: &SyncContext,
        bucket: &str,
        query: &Query,
        options: &FindOptions,
    ) -> SyncResult<Vec<Object>>;

    /// Submits a batch. The response holds one result per operation, in
    /// request order.
    async fn batch(
        &self,
        ctx: &SyncContext,
        bucket: &str,
        request: &BatchRequest,
    ) -> SyncResult<BatchResponse>;
}

/// The local replica store.
///
/// Writes are compare-and-swap on the record revision, which is how a sync
/// phase avoids clobbering a local edit made after it read the record.
pub trait LocalStore: Send + Sync {
    /// Fetches a record, soft-deleted or not.
    fn get(&self, bucket: &str, id: &ObjectId) -> LocalStoreResult<Option<LocalRecord>>;

    /// Queries records. Soft-deleted ones only with `include_deleted`.
    fn find(
        &self,
        bucket: &str,
        query: &Query,
        options: &FindOptions,
    ) -> LocalStoreResult<Vec<LocalRecord>>;

    /// Dirty records matching `query`, soft-deleted included, in id order.
    fn find_dirty(&self, bucket: &str, query: &Query) -> LocalStoreResult<Vec<LocalRecord>>;

    /// Writes a record and returns its new revision.
    ///
    /// `expected_revision` is the revision the caller read, or `None` if it
    /// expects no record; anything else fails with `RevisionMismatch`.
    fn put(
        &self,
        bucket: &str,
        object: Object,
        status: SyncStatus,
        expected_revision: Option<u64>,
    ) -> LocalStoreResult<u64>;

    /// Removes a record if it is still at `expected_revision`.
    fn remove(&self, bucket: &str, id: &ObjectId, expected_revision: u64) -> LocalStoreResult<()>;

    /// Drops every record of one bucket, or of all buckets. Returns how
    /// many were removed.
    fn purge(&self, bucket: Option<&str>) -> LocalStoreResult<usize>;
}
