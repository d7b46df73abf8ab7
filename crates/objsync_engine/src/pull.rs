//! Pull: remote changes in the sync window into the local replica.

use crate::error::{LocalStoreResult, SyncError, SyncResult};
use crate::phase::{Phase, SyncFailure, SyncPhase};
use crate::store::{LocalRecord, LocalStore, RemoteStore, SyncStatus};
use chrono::{DateTime, Duration, Utc};
use objsync_protocol::{
    decide, ConflictResolver, FindOptions, Object, ObjectId, Query, ReasonCode, ResultCode,
    SortKey, Winner,
};
use tracing::{debug, info, warn};

const UPDATED_AT: &str = "_updatedAt";
const ID: &str = "_id";

/// What a pull did.
#[derive(Debug)]
pub(crate) struct PullOutcome {
    /// Remote objects received.
    pub fetched: u64,
    /// Local writes made.
    pub applied: u64,
    /// Conflicts handed to the resolver.
    pub conflicts_resolved: u64,
    /// Objects that could not be merged.
    pub failures: Vec<SyncFailure>,
    /// Upper bound of the window pulled.
    pub window_end: DateTime<Utc>,
}

/// The window query: scope, bounded by `[last sync - offset, window_end]`.
pub(crate) fn window_query(
    scope_query: &Query,
    last_sync: Option<DateTime<Utc>>,
    offset: std::time::Duration,
    window_end: DateTime<Utc>,
) -> Query {
    let mut query = scope_query
        .clone()
        .and(Query::lte(UPDATED_AT, window_end.timestamp_millis()));
    if let Some(last) = last_sync {
        let offset = Duration::from_std(offset).unwrap_or(Duration::zero());
        let start = last.checked_sub_signed(offset).unwrap_or(last);
        query = query.and(Query::gte(UPDATED_AT, start.timestamp_millis()));
    }
    query
}

/// Objects strictly after `(updated_ms, id)` in `_updatedAt`, `_id` order.
fn after(updated_ms: i64, id: &ObjectId) -> Query {
    Query::gt(UPDATED_AT, updated_ms).or(Query::eq(UPDATED_AT, updated_ms)
        .and(Query::gt(ID, id.as_str())))
}

/// Fetches the window page by page and merges each object.
///
/// Pages are keyed on the last `(_updatedAt, _id)` seen rather than an
/// offset, so objects that leave the window mid-pull do not shift later
/// pages. The pull ends on the first empty page.
pub(crate) async fn pull<R, L>(
    phase: &mut Phase<'_, R, L>,
    resolver: &dyn ConflictResolver,
) -> SyncResult<PullOutcome>
where
    R: RemoteStore + ?Sized,
    L: LocalStore + ?Sized,
{
    let window_end = Utc::now();
    let window = window_query(
        &phase.scope.query,
        phase.scope.last_sync_time,
        phase.config.pull_time_offset,
        window_end,
    );
    let page_size = phase.config.pull_divide_number.max(1);
    let options = FindOptions::new()
        .order_by(SortKey::asc(UPDATED_AT))
        .order_by(SortKey::asc(ID))
        .with_limit(page_size)
        .including_deleted();

    let mut outcome = PullOutcome {
        fetched: 0,
        applied: 0,
        conflicts_resolved: 0,
        failures: Vec::new(),
        window_end,
    };
    let remote = phase.remote;
    let ctx = phase.ctx;
    let bucket = phase.bucket().to_string();
    let mut cursor: Option<(i64, ObjectId)> = None;

    loop {
        let query = match &cursor {
            None => window.clone(),
            Some((updated_ms, id)) => window.clone().and(after(*updated_ms, id)),
        };
        let page = phase
            .round_trip("query", || remote.query(ctx, &bucket, &query, &options))
            .await?;
        debug!(bucket = %bucket, received = page.len(), "pulled page");

        // A remote may cap pages below `page_size`, so only an empty page
        // proves the window is exhausted.
        let Some(last) = page.last() else {
            break;
        };
        cursor = Some((last.updated_at.timestamp_millis(), last.id.clone()));
        for object in page {
            outcome.fetched += 1;
            merge(phase, resolver, object, &mut outcome)?;
        }
    }

    info!(
        bucket = %bucket,
        fetched = outcome.fetched,
        applied = outcome.applied,
        conflicts = outcome.conflicts_resolved,
        failures = outcome.failures.len(),
        "pull finished"
    );
    Ok(outcome)
}

/// Reconciles one remote object with the local replica.
fn merge<R, L>(
    phase: &Phase<'_, R, L>,
    resolver: &dyn ConflictResolver,
    remote: Object,
    outcome: &mut PullOutcome,
) -> SyncResult<()>
where
    R: RemoteStore + ?Sized,
    L: LocalStore + ?Sized,
{
    let local = phase.local;
    let bucket = phase.bucket();
    let id = remote.id.clone();

    let Some(record) = local.get(bucket, &id)? else {
        if remote.deleted {
            return Ok(());
        }
        let write = local
            .put(bucket, remote, SyncStatus::Synced, None)
            .map(|_| ());
        return settle(phase, id, write, outcome);
    };

    if record.object.etag == remote.etag {
        return Ok(());
    }

    let write = match record.status {
        SyncStatus::Synced => adopt(local, bucket, remote, &record),
        SyncStatus::Dirty => {
            let winner = decide(resolver, &remote, &record.object)
                .ok_or_else(|| SyncError::InvalidConflictResolution {
                    object_id: id.clone(),
                })?;
            outcome.conflicts_resolved += 1;
            debug!(bucket, id = %id, ?winner, "conflict resolved");
            match winner {
                Winner::Server => adopt(local, bucket, remote, &record),
                Winner::Client => {
                    // Keep local content, versioned against the server's
                    // latest so the next push overwrites it cleanly. A
                    // tombstone cannot be updated; dropping the etag makes
                    // the next push re-create the object instead.
                    let mut kept = record.object;
                    kept.etag = if remote.deleted { None } else { remote.etag };
                    local
                        .put(bucket, kept, SyncStatus::Dirty, Some(record.revision))
                        .map(|_| ())
                }
            }
        }
    };
    settle(phase, id, write, outcome)
}

/// Replaces the local record with the remote version. A remote deletion
/// removes the record outright.
fn adopt<L: LocalStore + ?Sized>(
    local: &L,
    bucket: &str,
    remote: Object,
    record: &LocalRecord,
) -> LocalStoreResult<()> {
    if remote.deleted {
        local.remove(bucket, &remote.id, record.revision)
    } else {
        local
            .put(bucket, remote, SyncStatus::Synced, Some(record.revision))
            .map(|_| ())
    }
}

/// Counts a local write, turning a lost race into a per-item failure.
fn settle<R, L>(
    phase: &Phase<'_, R, L>,
    id: ObjectId,
    write: LocalStoreResult<()>,
    outcome: &mut PullOutcome,
) -> SyncResult<()>
where
    R: RemoteStore + ?Sized,
    L: LocalStore + ?Sized,
{
    match write {
        Ok(()) => {
            outcome.applied += 1;
            Ok(())
        }
        Err(e) if e.is_revision_mismatch() => {
            warn!(bucket = phase.bucket(), id = %id, "local record changed during pull");
            outcome.failures.push(phase.failure(
                id,
                SyncPhase::Pull,
                None,
                ResultCode::Conflict,
                ReasonCode::LocalModified,
            ));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::context::SyncContext;
    use crate::memory::MemoryLocalStore;
    use crate::registry::SyncScopeRegistry;
    use crate::testing::{caller, ServerRemote, TENANT};
    use objsync_codec::Fields;
    use objsync_protocol::{Acl, Credentials, ETag, PreferClient, PreferServer};
    use std::sync::atomic::Ordering;

    struct Fixture {
        config: SyncConfig,
        ctx: SyncContext,
        remote: ServerRemote,
        local: MemoryLocalStore,
        registry: SyncScopeRegistry,
    }

    impl Fixture {
        fn new(page: usize) -> Self {
            let registry = SyncScopeRegistry::in_memory();
            registry.set_sync_scope("notes", None).unwrap();
            Self {
                config: SyncConfig::new().with_pull_divide_number(page),
                ctx: SyncContext::new(TENANT, Credentials::user("alice")),
                remote: ServerRemote::new(),
                local: MemoryLocalStore::new(),
                registry,
            }
        }

        fn phase(&self) -> Phase<'_, ServerRemote, MemoryLocalStore> {
            Phase {
                config: &self.config,
                ctx: &self.ctx,
                remote: &self.remote,
                local: &self.local,
                registry: &self.registry,
                scope: self.registry.get_sync_scope("notes").unwrap(),
                retries: 0,
            }
        }

        fn create_remote(&self, id: &str, n: i64) -> Object {
            self.remote
                .server
                .handle_create(
                    &caller(&self.ctx),
                    "notes",
                    Some(ObjectId::new(id)),
                    Fields::new().with("n", n),
                    Some(Acl::public()),
                )
                .unwrap()
        }
    }

    #[test]
    fn window_without_baseline_has_no_lower_bound() {
        let end = Utc::now();
        let q = window_query(&Query::MatchAll, None, std::time::Duration::from_secs(60), end);
        assert_eq!(q, Query::lte(UPDATED_AT, end.timestamp_millis()));
    }

    #[test]
    fn window_lower_bound_subtracts_offset() {
        let end = Utc::now();
        let last = end - Duration::seconds(300);
        let q = window_query(
            &Query::eq("kind", "todo"),
            Some(last),
            std::time::Duration::from_secs(60),
            end,
        );
        let expected = Query::eq("kind", "todo")
            .and(Query::lte(UPDATED_AT, end.timestamp_millis()))
            .and(Query::gte(
                UPDATED_AT,
                (last - Duration::seconds(60)).timestamp_millis(),
            ));
        assert_eq!(q, expected);
    }

    #[tokio::test]
    async fn pages_until_empty_page() {
        let fx = Fixture::new(3);
        for i in 0..7 {
            fx.create_remote(&format!("o{i}"), i);
        }
        let mut phase = fx.phase();
        let outcome = pull(&mut phase, &PreferServer).await.unwrap();
        assert_eq!(outcome.fetched, 7);
        assert_eq!(outcome.applied, 7);
        assert!(outcome.failures.is_empty());
        // 3 + 3 + 1 + 0
        assert_eq!(fx.remote.queries.load(Ordering::SeqCst), 4);
        assert_eq!(fx.local.len("notes"), 7);
    }

    #[tokio::test]
    async fn exact_multiple_ends_on_empty_page() {
        let fx = Fixture::new(2);
        for i in 0..4 {
            fx.create_remote(&format!("o{i}"), i);
        }
        let mut phase = fx.phase();
        pull(&mut phase, &PreferServer).await.unwrap();
        assert_eq!(fx.remote.queries.load(Ordering::SeqCst), 3);
        assert_eq!(fx.local.len("notes"), 4);
    }

    #[tokio::test]
    async fn second_pull_changes_nothing() {
        let fx = Fixture::new(10);
        fx.create_remote("a", 1);
        pull(&mut fx.phase(), &PreferServer).await.unwrap();
        let before = fx.local.get("notes", &ObjectId::new("a")).unwrap().unwrap();

        let again = pull(&mut fx.phase(), &PreferServer).await.unwrap();
        assert_eq!(again.fetched, 1);
        assert_eq!(again.applied, 0);
        let after = fx.local.get("notes", &ObjectId::new("a")).unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn remote_delete_removes_synced_record() {
        let fx = Fixture::new(10);
        let created = fx.create_remote("a", 1);
        pull(&mut fx.phase(), &PreferServer).await.unwrap();

        fx.remote
            .server
            .handle_delete(&caller(&fx.ctx), "notes", &created.id, None)
            .unwrap();
        pull(&mut fx.phase(), &PreferServer).await.unwrap();
        assert!(fx.local.get("notes", &created.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn deleted_unknown_object_is_ignored() {
        let fx = Fixture::new(10);
        let created = fx.create_remote("a", 1);
        fx.remote
            .server
            .handle_delete(&caller(&fx.ctx), "notes", &created.id, None)
            .unwrap();
        let outcome = pull(&mut fx.phase(), &PreferServer).await.unwrap();
        assert_eq!(outcome.fetched, 1);
        assert_eq!(outcome.applied, 0);
        assert!(fx.local.is_empty("notes"));
    }

    #[tokio::test]
    async fn dirty_with_matching_etag_is_left_alone() {
        let fx = Fixture::new(10);
        let created = fx.create_remote("a", 1);
        let mut edited = created.clone();
        edited.fields.set("n", 99i64);
        fx.local
            .put("notes", edited.clone(), SyncStatus::Dirty, None)
            .unwrap();

        let outcome = pull(&mut fx.phase(), &PreferServer).await.unwrap();
        assert_eq!(outcome.conflicts_resolved, 0);
        let record = fx.local.get("notes", &created.id).unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Dirty);
        assert_eq!(record.object.fields.get_i64("n").unwrap(), 99);
    }

    #[tokio::test]
    async fn client_win_rebases_etag() {
        let fx = Fixture::new(10);
        let created = fx.create_remote("a", 1);
        let mut edited = created.clone();
        edited.etag = Some(ETag::new("old"));
        edited.fields.set("n", 42i64);
        fx.local
            .put("notes", edited, SyncStatus::Dirty, None)
            .unwrap();

        let outcome = pull(&mut fx.phase(), &PreferClient).await.unwrap();
        assert_eq!(outcome.conflicts_resolved, 1);
        let record = fx.local.get("notes", &created.id).unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Dirty);
        assert_eq!(record.object.etag, created.etag);
        assert_eq!(record.object.fields.get_i64("n").unwrap(), 42);
    }

    /// Syncs `a`, edits it locally, then deletes it on the server.
    async fn edited_then_deleted_remotely(fx: &Fixture) -> ObjectId {
        let created = fx.create_remote("a", 1);
        pull(&mut fx.phase(), &PreferServer).await.unwrap();
        let record = fx.local.get("notes", &created.id).unwrap().unwrap();
        let mut edited = record.object;
        edited.fields.set("n", 7i64);
        fx.local
            .put("notes", edited, SyncStatus::Dirty, Some(record.revision))
            .unwrap();
        fx.remote
            .server
            .handle_delete(&caller(&fx.ctx), "notes", &created.id, None)
            .unwrap();
        created.id
    }

    #[tokio::test]
    async fn server_tombstone_wins_removes_record() {
        let fx = Fixture::new(10);
        let id = edited_then_deleted_remotely(&fx).await;

        let outcome = pull(&mut fx.phase(), &PreferServer).await.unwrap();
        assert_eq!(outcome.conflicts_resolved, 1);
        assert!(outcome.failures.is_empty());
        assert!(fx.local.get("notes", &id).unwrap().is_none());
    }

    #[tokio::test]
    async fn client_win_over_tombstone_becomes_insert() {
        let fx = Fixture::new(10);
        let id = edited_then_deleted_remotely(&fx).await;

        let outcome = pull(&mut fx.phase(), &PreferClient).await.unwrap();
        assert_eq!(outcome.conflicts_resolved, 1);
        let record = fx.local.get("notes", &id).unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Dirty);
        assert!(record.object.etag.is_none());
        assert!(!record.object.deleted);
        assert_eq!(record.object.fields.get_i64("n").unwrap(), 7);
    }

    #[tokio::test]
    async fn resolver_returning_neither_is_rejected() {
        struct Rogue(Object);

        impl ConflictResolver for Rogue {
            fn resolve<'a>(&self, _server: &'a Object, _client: &'a Object) -> &'a Object {
                // Leaks a copy so the reference outlives both candidates.
                Box::leak(Box::new(self.0.clone()))
            }
        }

        let fx = Fixture::new(10);
        let created = fx.create_remote("a", 1);
        let mut edited = created.clone();
        edited.etag = Some(ETag::new("old"));
        fx.local
            .put("notes", edited, SyncStatus::Dirty, None)
            .unwrap();

        let err = pull(&mut fx.phase(), &Rogue(created)).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidConflictResolution { .. }));
        assert!(err.is_usage_fault());
    }

    #[tokio::test]
    async fn forbidden_bucket_aborts() {
        let fx = Fixture::new(10);
        fx.remote
            .server
            .set_bucket_acl("notes", objsync_server::BucketAcl::closed());
        let err = pull(&mut fx.phase(), &PreferServer).await.unwrap_err();
        assert!(matches!(err, SyncError::Forbidden { .. }));
    }
}
