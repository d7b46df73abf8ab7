//! In-memory local store.

use crate::error::{LocalStoreError, LocalStoreResult};
use crate::store::{LocalRecord, LocalStore, SyncStatus};
use objsync_protocol::{FindOptions, Object, ObjectId, Query};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

type Bucket = BTreeMap<ObjectId, LocalRecord>;

/// A [`LocalStore`] kept in process memory.
///
/// Revisions come from one store-wide counter, so a record that is removed
/// and re-created never reuses a revision a stale writer might hold.
#[derive(Default)]
pub struct MemoryLocalStore {
    buckets: RwLock<HashMap<String, Bucket>>,
    next_revision: AtomicU64,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a bucket, soft-deleted included.
    pub fn len(&self, bucket: &str) -> usize {
        self.buckets.read().get(bucket).map_or(0, BTreeMap::len)
    }

    /// Returns true if the bucket holds no records.
    pub fn is_empty(&self, bucket: &str) -> bool {
        self.len(bucket) == 0
    }

    fn bump(&self) -> u64 {
        self.next_revision.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn mismatch(bucket: &str, id: &ObjectId, expected: Option<u64>, actual: Option<u64>) -> LocalStoreError {
    LocalStoreError::RevisionMismatch {
        bucket: bucket.to_string(),
        id: id.clone(),
        expected,
        actual,
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, bucket: &str, id: &ObjectId) -> LocalStoreResult<Option<LocalRecord>> {
        Ok(self
            .buckets
            .read()
            .get(bucket)
            .and_then(|b| b.get(id).cloned()))
    }

    fn find(
        &self,
        bucket: &str,
        query: &Query,
        options: &FindOptions,
    ) -> LocalStoreResult<Vec<LocalRecord>> {
        query.validate()?;
        let buckets = self.buckets.read();
        let Some(b) = buckets.get(bucket) else {
            return Ok(Vec::new());
        };

        let mut matched = Vec::new();
        for record in b.values() {
            if record.object.deleted && !options.include_deleted {
                continue;
            }
            if query.matches(&record.object)? {
                matched.push(record.clone());
            }
        }
        if !options.order.is_empty() {
            matched.sort_by(|a, b| options.compare(&a.object, &b.object));
        }
        let iter = matched.into_iter().skip(options.skip);
        Ok(match options.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        })
    }

    fn find_dirty(&self, bucket: &str, query: &Query) -> LocalStoreResult<Vec<LocalRecord>> {
        query.validate()?;
        let buckets = self.buckets.read();
        let Some(b) = buckets.get(bucket) else {
            return Ok(Vec::new());
        };

        let mut dirty = Vec::new();
        for record in b.values().filter(|r| r.is_dirty()) {
            if query.matches(&record.object)? {
                dirty.push(record.clone());
            }
        }
        Ok(dirty)
    }

    fn put(
        &self,
        bucket: &str,
        object: Object,
        status: SyncStatus,
        expected_revision: Option<u64>,
    ) -> LocalStoreResult<u64> {
        let mut buckets = self.buckets.write();
        let b = buckets.entry(bucket.to_string()).or_default();
        let actual = b.get(&object.id).map(|r| r.revision);
        if actual != expected_revision {
            return Err(mismatch(bucket, &object.id, expected_revision, actual));
        }

        let revision = self.bump();
        b.insert(
            object.id.clone(),
            LocalRecord {
                object,
                status,
                revision,
            },
        );
        Ok(revision)
    }

    fn remove(&self, bucket: &str, id: &ObjectId, expected_revision: u64) -> LocalStoreResult<()> {
        let mut buckets = self.buckets.write();
        let b = buckets.entry(bucket.to_string()).or_default();
        let actual = b.get(id).map(|r| r.revision);
        if actual != Some(expected_revision) {
            return Err(mismatch(bucket, id, Some(expected_revision), actual));
        }
        b.remove(id);
        Ok(())
    }

    fn purge(&self, bucket: Option<&str>) -> LocalStoreResult<usize> {
        let mut buckets = self.buckets.write();
        let removed = match bucket {
            Some(name) => buckets.remove(name).map_or(0, |b| b.len()),
            None => buckets.drain().map(|(_, b)| b.len()).sum(),
        };
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objsync_codec::Fields;
    use objsync_protocol::SortKey;

    fn object(id: &str, n: i64) -> Object {
        Object::new("notes", ObjectId::new(id), Fields::new().with("n", n))
    }

    #[test]
    fn put_requires_expected_revision() {
        let store = MemoryLocalStore::new();
        let rev = store
            .put("notes", object("a", 1), SyncStatus::Dirty, None)
            .unwrap();

        // Creating again over an existing record fails.
        let err = store
            .put("notes", object("a", 2), SyncStatus::Dirty, None)
            .unwrap_err();
        assert!(err.is_revision_mismatch());

        let rev2 = store
            .put("notes", object("a", 2), SyncStatus::Synced, Some(rev))
            .unwrap();
        assert!(rev2 > rev);

        // The first revision is stale now.
        let err = store
            .put("notes", object("a", 3), SyncStatus::Dirty, Some(rev))
            .unwrap_err();
        assert!(err.is_revision_mismatch());

        let record = store.get("notes", &ObjectId::new("a")).unwrap().unwrap();
        assert_eq!(record.object.fields.get_i64("n").unwrap(), 2);
        assert_eq!(record.status, SyncStatus::Synced);
    }

    #[test]
    fn remove_is_compare_and_swap() {
        let store = MemoryLocalStore::new();
        let id = ObjectId::new("a");
        let rev = store
            .put("notes", object("a", 1), SyncStatus::Dirty, None)
            .unwrap();
        assert!(store.remove("notes", &id, rev + 100).is_err());
        store.remove("notes", &id, rev).unwrap();
        assert!(store.get("notes", &id).unwrap().is_none());
        assert!(store.remove("notes", &id, rev).is_err());
    }

    #[test]
    fn revisions_not_reused_after_remove() {
        let store = MemoryLocalStore::new();
        let id = ObjectId::new("a");
        let first = store
            .put("notes", object("a", 1), SyncStatus::Dirty, None)
            .unwrap();
        store.remove("notes", &id, first).unwrap();
        let second = store
            .put("notes", object("a", 1), SyncStatus::Dirty, None)
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn find_hides_deleted_and_orders() {
        let store = MemoryLocalStore::new();
        store
            .put("notes", object("a", 3), SyncStatus::Synced, None)
            .unwrap();
        store
            .put("notes", object("b", 1), SyncStatus::Synced, None)
            .unwrap();
        let mut gone = object("c", 2);
        gone.deleted = true;
        store.put("notes", gone, SyncStatus::Dirty, None).unwrap();

        let live = store
            .find(
                "notes",
                &Query::MatchAll,
                &FindOptions::new().order_by(SortKey::asc("n")),
            )
            .unwrap();
        let ids: Vec<_> = live.iter().map(|r| r.id().as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let all = store
            .find("notes", &Query::MatchAll, &FindOptions::new().including_deleted())
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn find_dirty_filters_by_query() {
        let store = MemoryLocalStore::new();
        store
            .put("notes", object("a", 1), SyncStatus::Dirty, None)
            .unwrap();
        store
            .put("notes", object("b", 5), SyncStatus::Dirty, None)
            .unwrap();
        store
            .put("notes", object("c", 5), SyncStatus::Synced, None)
            .unwrap();

        let dirty = store.find_dirty("notes", &Query::gt("n", 2i64)).unwrap();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].id().as_str(), "b");
    }

    #[test]
    fn purge_one_or_all() {
        let store = MemoryLocalStore::new();
        store
            .put("notes", object("a", 1), SyncStatus::Dirty, None)
            .unwrap();
        store
            .put("tasks", object("b", 1), SyncStatus::Dirty, None)
            .unwrap();
        assert_eq!(store.purge(Some("notes")).unwrap(), 1);
        assert!(store.is_empty("notes"));
        assert_eq!(store.len("tasks"), 1);
        assert_eq!(store.purge(None).unwrap(), 1);
        assert!(store.is_empty("tasks"));
    }
}
