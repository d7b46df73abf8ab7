//! Server-side document storage.

use crate::error::{ServerError, ServerResult};
use chrono::{DateTime, Duration, Utc};
use objsync_codec::Fields;
use objsync_protocol::{Acl, Credentials, ETag, FindOptions, Object, ObjectId, Query, ANYONE};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Bucket-level permissions.
///
/// Gates operations that have no object to consult yet: querying the bucket
/// and creating new objects in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketAcl {
    /// Principals allowed to query.
    pub query: BTreeSet<String>,
    /// Principals allowed to create objects.
    pub create: BTreeSet<String>,
}

impl BucketAcl {
    /// A bucket nobody but the master key may query or create in.
    pub fn closed() -> Self {
        Self {
            query: BTreeSet::new(),
            create: BTreeSet::new(),
        }
    }

    /// Grants query access.
    pub fn allow_query(mut self, principal: impl Into<String>) -> Self {
        self.query.insert(principal.into());
        self
    }

    /// Grants create access.
    pub fn allow_create(mut self, principal: impl Into<String>) -> Self {
        self.create.insert(principal.into());
        self
    }

    /// Returns true if the caller may query the bucket.
    pub fn can_query(&self, credentials: &Credentials) -> bool {
        credentials.is_master() || matches_any(&self.query, credentials)
    }

    /// Returns true if the caller may create objects in the bucket.
    pub fn can_create(&self, credentials: &Credentials) -> bool {
        credentials.is_master() || matches_any(&self.create, credentials)
    }
}

impl Default for BucketAcl {
    fn default() -> Self {
        Self::closed().allow_query(ANYONE).allow_create(ANYONE)
    }
}

fn matches_any(set: &BTreeSet<String>, credentials: &Credentials) -> bool {
    credentials.principals().iter().any(|p| set.contains(p))
}

#[derive(Debug, Default)]
struct Bucket {
    acl: BucketAcl,
    objects: BTreeMap<ObjectId, Object>,
}

/// In-memory document store.
///
/// Every write stamps the object with a fresh etag and an `updated_at`
/// strictly greater than any timestamp issued before, so incremental
/// queries over `_updatedAt` never miss a change.
pub struct DocumentStore {
    buckets: RwLock<HashMap<String, Bucket>>,
    clock: Mutex<DateTime<Utc>>,
}

impl DocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            clock: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.clock.lock();
        let now = Utc::now();
        let next = if now > *last {
            now
        } else {
            *last + Duration::microseconds(1)
        };
        *last = next;
        next
    }

    /// Runs a query with read-ACL filtering.
    ///
    /// Objects the caller cannot read are left out silently. Soft-deleted
    /// objects appear only with `include_deleted`.
    pub fn query(
        &self,
        bucket: &str,
        credentials: &Credentials,
        query: &Query,
        options: &FindOptions,
    ) -> ServerResult<Vec<Object>> {
        query.validate()?;
        let buckets = self.buckets.read();
        let Some(b) = buckets.get(bucket) else {
            return Ok(Vec::new());
        };
        let mut matched = Vec::new();
        for object in b.objects.values() {
            if object.deleted && !options.include_deleted {
                continue;
            }
            if !object.acl.can_read(credentials) {
                continue;
            }
            if query.matches(object)? {
                matched.push(object.clone());
            }
        }
        Ok(options.apply(matched))
    }

    /// Creates an object.
    ///
    /// The caller becomes the owner when the ACL names none. An id held by
    /// a live object is rejected. A soft-deleted object may be re-created
    /// under its id by a caller allowed to update it.
    pub fn insert(
        &self,
        bucket: &str,
        credentials: &Credentials,
        id: Option<ObjectId>,
        fields: Fields,
        acl: Option<Acl>,
    ) -> ServerResult<Object> {
        let mut buckets = self.buckets.write();
        let b = buckets.entry(bucket.to_string()).or_default();
        if !b.acl.can_create(credentials) {
            return Err(ServerError::Forbidden(format!(
                "create denied in bucket {bucket}"
            )));
        }
        let id = id.unwrap_or_else(ObjectId::generate);
        if let Some(existing) = b.objects.get(&id) {
            if !existing.deleted || !existing.acl.can_update(credentials) {
                return Err(ServerError::DuplicateId {
                    bucket: bucket.to_string(),
                    id,
                });
            }
            debug!(bucket, id = %id, "re-creating soft-deleted object");
        }

        let mut acl = acl.unwrap_or_default();
        if acl.owner.is_none() {
            acl.owner = credentials.user_id().map(str::to_string);
        }
        let now = self.next_timestamp();
        let object = Object {
            id: id.clone(),
            bucket: bucket.to_string(),
            fields,
            acl,
            etag: Some(ETag::generate()),
            created_at: now,
            updated_at: now,
            deleted: false,
        };
        b.objects.insert(id, object.clone());
        Ok(object)
    }

    /// Replaces an object's body.
    pub fn update(
        &self,
        bucket: &str,
        credentials: &Credentials,
        id: &ObjectId,
        etag: Option<&ETag>,
        fields: Fields,
    ) -> ServerResult<Object> {
        let mut buckets = self.buckets.write();
        let object = live_object(&mut buckets, bucket, id)?;
        if !object.acl.can_update(credentials) {
            return Err(ServerError::Forbidden(format!("update denied on {id}")));
        }
        check_etag(object, etag)?;

        object.fields = fields;
        object.etag = Some(ETag::generate());
        object.updated_at = self.next_timestamp();
        Ok(object.clone())
    }

    /// Soft-deletes an object. The body is kept; only the marker flips.
    pub fn delete(
        &self,
        bucket: &str,
        credentials: &Credentials,
        id: &ObjectId,
        etag: Option<&ETag>,
    ) -> ServerResult<Object> {
        let mut buckets = self.buckets.write();
        let object = live_object(&mut buckets, bucket, id)?;
        if !object.acl.can_delete(credentials) {
            return Err(ServerError::Forbidden(format!("delete denied on {id}")));
        }
        check_etag(object, etag)?;

        object.deleted = true;
        object.etag = Some(ETag::generate());
        object.updated_at = self.next_timestamp();
        Ok(object.clone())
    }

    /// Returns the bucket's ACL.
    pub fn bucket_acl(&self, bucket: &str) -> BucketAcl {
        self.buckets
            .read()
            .get(bucket)
            .map(|b| b.acl.clone())
            .unwrap_or_default()
    }

    /// Replaces the bucket's ACL.
    pub fn set_bucket_acl(&self, bucket: &str, acl: BucketAcl) {
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .acl = acl;
    }

    /// Replaces an object's ACL without issuing a new version.
    pub fn set_object_acl(&self, bucket: &str, id: &ObjectId, acl: Acl) -> ServerResult<()> {
        let mut buckets = self.buckets.write();
        let object = live_object(&mut buckets, bucket, id)?;
        object.acl = acl;
        Ok(())
    }

    /// Removes an object outright, soft-deleted or not.
    pub fn hard_delete(&self, bucket: &str, id: &ObjectId) -> bool {
        self.buckets
            .write()
            .get_mut(bucket)
            .and_then(|b| b.objects.remove(id))
            .is_some()
    }

    /// Fetches an object regardless of ACLs and soft deletion.
    pub fn get(&self, bucket: &str, id: &ObjectId) -> Option<Object> {
        self.buckets
            .read()
            .get(bucket)
            .and_then(|b| b.objects.get(id).cloned())
    }

    /// Number of live (not soft-deleted) objects in a bucket.
    pub fn live_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .get(bucket)
            .map(|b| b.objects.values().filter(|o| !o.deleted).count())
            .unwrap_or(0)
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn live_object<'a>(
    buckets: &'a mut HashMap<String, Bucket>,
    bucket: &str,
    id: &ObjectId,
) -> ServerResult<&'a mut Object> {
    buckets
        .get_mut(bucket)
        .and_then(|b| b.objects.get_mut(id))
        .filter(|o| !o.deleted)
        .ok_or_else(|| ServerError::NotFound {
            bucket: bucket.to_string(),
            id: id.clone(),
        })
}

fn check_etag(object: &Object, expected: Option<&ETag>) -> ServerResult<()> {
    match expected {
        Some(tag) if object.etag.as_ref() != Some(tag) => Err(ServerError::EtagMismatch {
            id: object.id.clone(),
        }),
        _ => Ok(()),
    }
}
