//! User-side view of a locally replicated bucket.

use crate::error::{LocalStoreError, SyncResult};
use crate::store::{LocalRecord, LocalStore, SyncStatus};
use chrono::Utc;
use objsync_codec::Fields;
use objsync_protocol::{Acl, FindOptions, Object, ObjectId, Query};
use std::sync::Arc;
use tracing::debug;

/// Local reads and writes on one bucket.
///
/// Every write marks the record dirty so the next sync pushes it. Writes
/// never touch the etag, which keeps naming the last server version seen.
pub struct LocalBucket<L: LocalStore> {
    store: Arc<L>,
    bucket: String,
}

impl<L: LocalStore> Clone for LocalBucket<L> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            bucket: self.bucket.clone(),
        }
    }
}

impl<L: LocalStore> LocalBucket<L> {
    /// Creates a handle on `bucket`.
    pub fn new(store: Arc<L>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Bucket name.
    pub fn name(&self) -> &str {
        &self.bucket
    }

    /// Creates an object under a fresh id.
    pub fn insert(&self, fields: Fields, acl: Acl) -> SyncResult<Object> {
        self.insert_with_id(ObjectId::generate(), fields, acl)
    }

    /// Creates an object under a caller-chosen id.
    ///
    /// Fails with a revision mismatch if the id is already taken locally.
    pub fn insert_with_id(&self, id: ObjectId, fields: Fields, acl: Acl) -> SyncResult<Object> {
        let object = Object::new(self.bucket.clone(), id, fields).with_acl(acl);
        self.store
            .put(&self.bucket, object.clone(), SyncStatus::Dirty, None)?;
        Ok(object)
    }

    /// Replaces the body of a live object.
    pub fn update(&self, id: &ObjectId, fields: Fields) -> SyncResult<Object> {
        let record = self.live(id)?;
        let mut object = record.object;
        object.fields = fields;
        object.updated_at = Utc::now();
        self.store.put(
            &self.bucket,
            object.clone(),
            SyncStatus::Dirty,
            Some(record.revision),
        )?;
        Ok(object)
    }

    /// Deletes an object. Returns false if there was nothing to delete.
    ///
    /// A record the server has never seen is dropped on the spot; anything
    /// else is soft-deleted and left dirty for the next push.
    pub fn delete(&self, id: &ObjectId) -> SyncResult<bool> {
        let record = match self.store.get(&self.bucket, id)? {
            Some(r) if !r.object.deleted => r,
            _ => return Ok(false),
        };
        if record.object.etag.is_none() {
            self.store.remove(&self.bucket, id, record.revision)?;
            return Ok(true);
        }

        let mut object = record.object;
        object.deleted = true;
        object.updated_at = Utc::now();
        self.store
            .put(&self.bucket, object, SyncStatus::Dirty, Some(record.revision))?;
        Ok(true)
    }

    /// Drops the local record, dirty or not, without telling the server.
    /// Returns false if there was no record.
    ///
    /// This is the way out for an unpushed change the server keeps
    /// rejecting, such as an update to an object that was removed
    /// remotely. The server's copy, if it still has one, comes back on a
    /// later pull whose window covers it.
    pub fn discard(&self, id: &ObjectId) -> SyncResult<bool> {
        let Some(record) = self.store.get(&self.bucket, id)? else {
            return Ok(false);
        };
        self.store.remove(&self.bucket, id, record.revision)?;
        debug!(bucket = %self.bucket, id = %id, dirty = record.is_dirty(), "record discarded");
        Ok(true)
    }

    /// Fetches a live object.
    pub fn get(&self, id: &ObjectId) -> SyncResult<Option<Object>> {
        Ok(self
            .store
            .get(&self.bucket, id)?
            .filter(|r| !r.object.deleted)
            .map(|r| r.object))
    }

    /// Fetches the raw record, sync state and soft-deleted rows included.
    pub fn record(&self, id: &ObjectId) -> SyncResult<Option<LocalRecord>> {
        Ok(self.store.get(&self.bucket, id)?)
    }

    /// Queries objects.
    pub fn find(&self, query: &Query, options: &FindOptions) -> SyncResult<Vec<Object>> {
        Ok(self
            .store
            .find(&self.bucket, query, options)?
            .into_iter()
            .map(|r| r.object)
            .collect())
    }

    /// Number of records waiting to be pushed, whatever the scope.
    pub fn dirty_count(&self) -> SyncResult<usize> {
        Ok(self.store.find_dirty(&self.bucket, &Query::MatchAll)?.len())
    }

    fn live(&self, id: &ObjectId) -> SyncResult<LocalRecord> {
        match self.store.get(&self.bucket, id)? {
            Some(r) if !r.object.deleted => Ok(r),
            _ => Err(LocalStoreError::NotFound {
                bucket: self.bucket.clone(),
                id: id.clone(),
            }
            .into()),
        }
    }
}
