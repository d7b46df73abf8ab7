//! Push: dirty local records up to the remote.

use crate::batch::{build_request, match_results, plan, PlannedOp};
use crate::error::{SyncError, SyncResult};
use crate::phase::{Phase, SyncFailure, SyncPhase};
use crate::store::{LocalStore, RemoteStore, SyncStatus};
use chrono::{DateTime, Utc};
use objsync_protocol::{BatchItemResult, BatchOp, ETag, ObjectId, ReasonCode, ResultCode};
use tracing::{debug, info, warn};

/// What a push did.
#[derive(Debug, Default)]
pub(crate) struct PushOutcome {
    /// Operations the remote acknowledged.
    pub pushed: u64,
    /// Never-pushed deletions dropped without a request.
    pub dropped: u64,
    /// Operations the remote rejected.
    pub failures: Vec<SyncFailure>,
}

/// Sends every dirty record in scope, in batches.
///
/// A record only changes state on an acknowledgment for that record; a
/// rejected one stays dirty with its etag untouched.
pub(crate) async fn push<R, L>(phase: &mut Phase<'_, R, L>) -> SyncResult<PushOutcome>
where
    R: RemoteStore + ?Sized,
    L: LocalStore + ?Sized,
{
    let local = phase.local;
    let remote = phase.remote;
    let ctx = phase.ctx;
    let bucket = phase.bucket().to_string();
    let mut outcome = PushOutcome::default();

    let dirty = local.find_dirty(&bucket, &phase.scope.query)?;
    if dirty.is_empty() {
        debug!(bucket = %bucket, "nothing to push");
        return Ok(outcome);
    }
    let plan = plan(dirty);

    for record in plan.local_only {
        match local.remove(&bucket, record.id(), record.revision) {
            Ok(()) => outcome.dropped += 1,
            Err(e) if e.is_revision_mismatch() => {
                debug!(bucket = %bucket, id = %record.id(), "unpushed record changed, kept");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let batch_size = phase.config.push_divide_number.max(1);
    for chunk in plan.operations.chunks(batch_size) {
        let request = build_request(chunk);
        debug!(bucket = %bucket, token = %request.token, ops = request.len(), "pushing batch");
        let response = phase
            .round_trip("batch", || remote.batch(ctx, &bucket, &request))
            .await?;
        let results = match_results(&request, response)?;
        for (planned, result) in chunk.iter().zip(results) {
            acknowledge(phase, planned, result, &mut outcome)?;
        }
    }

    info!(
        bucket = %bucket,
        pushed = outcome.pushed,
        dropped = outcome.dropped,
        failures = outcome.failures.len(),
        "push finished"
    );
    Ok(outcome)
}

fn acknowledge<R, L>(
    phase: &Phase<'_, R, L>,
    planned: &PlannedOp,
    result: BatchItemResult,
    outcome: &mut PushOutcome,
) -> SyncResult<()>
where
    R: RemoteStore + ?Sized,
    L: LocalStore + ?Sized,
{
    let local = phase.local;
    let bucket = phase.bucket();
    let id = planned.record.id().clone();

    if !result.is_ok() {
        warn!(
            bucket,
            id = %id,
            op = %planned.op,
            result = ?result.result,
            reason = ?result.reason,
            "push rejected"
        );
        outcome.failures.push(phase.failure(
            id,
            SyncPhase::Push,
            Some(planned.op),
            result.result,
            result.reason,
        ));
        return Ok(());
    }

    let etag = result
        .etag
        .ok_or_else(|| SyncError::Protocol(format!("acknowledgment for {id} has no etag")))?;
    outcome.pushed += 1;

    let write = match planned.op {
        BatchOp::Delete => local.remove(bucket, &id, planned.record.revision),
        BatchOp::Insert | BatchOp::Update => {
            let mut object = planned.record.object.clone();
            object.etag = Some(etag.clone());
            if let Some(updated_at) = result.updated_at {
                object.updated_at = updated_at;
            }
            if planned.op == BatchOp::Insert {
                if let Some(created_at) = result.created_at {
                    object.created_at = created_at;
                }
                // The server makes the creator the owner of an unowned object.
                if object.acl.owner.is_none() {
                    object.acl.owner = phase.ctx.credentials().user_id().map(str::to_string);
                }
            }
            local
                .put(bucket, object, SyncStatus::Synced, Some(planned.record.revision))
                .map(|_| ())
        }
    };

    match write {
        Ok(()) => Ok(()),
        Err(e) if e.is_revision_mismatch() => rebase(phase, id, etag, result.updated_at, outcome),
        Err(e) => Err(e.into()),
    }
}

/// The record was edited while its push was in flight: take the new server
/// version but keep it dirty so the edit goes out next time.
fn rebase<R, L>(
    phase: &Phase<'_, R, L>,
    id: ObjectId,
    etag: ETag,
    updated_at: Option<DateTime<Utc>>,
    outcome: &mut PushOutcome,
) -> SyncResult<()>
where
    R: RemoteStore + ?Sized,
    L: LocalStore + ?Sized,
{
    let local = phase.local;
    let bucket = phase.bucket();
    let Some(current) = local.get(bucket, &id)? else {
        return Ok(());
    };

    debug!(bucket, id = %id, "record changed during push, keeping it dirty");
    let mut object = current.object;
    object.etag = Some(etag);
    if let Some(ts) = updated_at {
        object.updated_at = object.updated_at.max(ts);
    }
    match local.put(bucket, object, SyncStatus::Dirty, Some(current.revision)) {
        Ok(_) => Ok(()),
        Err(e) if e.is_revision_mismatch() => {
            outcome.failures.push(phase.failure(
                id,
                SyncPhase::Push,
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
    use crate::replica::LocalBucket;
    use crate::testing::{caller, ServerRemote, TENANT};
    use objsync_codec::Fields;
    use objsync_protocol::{Acl, Credentials, Query};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    struct Fixture {
        config: SyncConfig,
        ctx: SyncContext,
        remote: ServerRemote,
        local: Arc<MemoryLocalStore>,
        registry: SyncScopeRegistry,
    }

    impl Fixture {
        fn new(batch: usize, scope: Option<Query>) -> Self {
            let registry = SyncScopeRegistry::in_memory();
            registry.set_sync_scope("notes", scope).unwrap();
            Self {
                config: SyncConfig::new().with_push_divide_number(batch),
                ctx: SyncContext::new(TENANT, Credentials::user("alice")),
                remote: ServerRemote::new(),
                local: Arc::new(MemoryLocalStore::new()),
                registry,
            }
        }

        fn phase(&self) -> Phase<'_, ServerRemote, MemoryLocalStore> {
            Phase {
                config: &self.config,
                ctx: &self.ctx,
                remote: &self.remote,
                local: &*self.local,
                registry: &self.registry,
                scope: self.registry.get_sync_scope("notes").unwrap(),
                retries: 0,
            }
        }

        fn notes(&self) -> LocalBucket<MemoryLocalStore> {
            LocalBucket::new(Arc::clone(&self.local), "notes")
        }
    }

    #[tokio::test]
    async fn inserts_are_batched() {
        let fx = Fixture::new(2, None);
        for i in 0..5i64 {
            fx.notes()
                .insert(Fields::new().with("n", i), Acl::default())
                .unwrap();
        }
        let outcome = push(&mut fx.phase()).await.unwrap();
        assert_eq!(outcome.pushed, 5);
        assert!(outcome.failures.is_empty());
        assert_eq!(fx.remote.batches.load(Ordering::SeqCst), 3);
        assert_eq!(fx.remote.server.object_count("notes"), 5);
        assert_eq!(fx.notes().dirty_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn ack_adopts_server_version_and_owner() {
        let fx = Fixture::new(10, None);
        let created = fx.notes().insert(Fields::new(), Acl::default()).unwrap();
        push(&mut fx.phase()).await.unwrap();

        let record = fx.notes().record(&created.id).unwrap().unwrap();
        let server = fx.remote.server.get("notes", &created.id).unwrap();
        assert_eq!(record.status, SyncStatus::Synced);
        assert_eq!(record.object.etag, server.etag);
        assert_eq!(record.object.updated_at, server.updated_at);
        assert_eq!(record.object.acl.owner.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn nothing_dirty_sends_nothing() {
        let fx = Fixture::new(10, None);
        let outcome = push(&mut fx.phase()).await.unwrap();
        assert_eq!(outcome.pushed, 0);
        assert_eq!(fx.remote.batches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn out_of_scope_records_stay_local() {
        let fx = Fixture::new(10, Some(Query::eq("shared", true)));
        fx.notes()
            .insert(Fields::new().with("shared", true), Acl::default())
            .unwrap();
        let private = fx
            .notes()
            .insert(Fields::new().with("shared", false), Acl::default())
            .unwrap();

        let outcome = push(&mut fx.phase()).await.unwrap();
        assert_eq!(outcome.pushed, 1);
        assert!(fx.remote.server.get("notes", &private.id).is_none());
        assert!(fx.notes().record(&private.id).unwrap().unwrap().is_dirty());
    }

    #[tokio::test]
    async fn deleting_unpushed_record_needs_no_request() {
        let fx = Fixture::new(10, None);
        let created = fx.notes().insert(Fields::new(), Acl::default()).unwrap();
        // Mark deleted without going through LocalBucket::delete, which
        // would drop it straight away.
        let record = fx.notes().record(&created.id).unwrap().unwrap();
        let mut object = record.object;
        object.deleted = true;
        fx.local
            .put("notes", object, SyncStatus::Dirty, Some(record.revision))
            .unwrap();

        let outcome = push(&mut fx.phase()).await.unwrap();
        assert_eq!(outcome.dropped, 1);
        assert_eq!(fx.remote.batches.load(Ordering::SeqCst), 0);
        assert!(fx.notes().record(&created.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn acknowledged_delete_removes_record() {
        let fx = Fixture::new(10, None);
        let created = fx.notes().insert(Fields::new(), Acl::default()).unwrap();
        push(&mut fx.phase()).await.unwrap();

        assert!(fx.notes().delete(&created.id).unwrap());
        let outcome = push(&mut fx.phase()).await.unwrap();
        assert_eq!(outcome.pushed, 1);
        assert!(fx.notes().record(&created.id).unwrap().is_none());
        assert!(fx.remote.server.get("notes", &created.id).unwrap().deleted);
    }

    #[tokio::test]
    async fn duplicate_id_is_reported_not_resolved() {
        let fx = Fixture::new(10, None);
        fx.remote
            .server
            .handle_create(
                &caller(&fx.ctx),
                "notes",
                Some(ObjectId::new("taken")),
                Fields::new(),
                None,
            )
            .unwrap();
        fx.notes()
            .insert_with_id(ObjectId::new("taken"), Fields::new(), Acl::default())
            .unwrap();

        let outcome = push(&mut fx.phase()).await.unwrap();
        assert_eq!(outcome.pushed, 0);
        assert_eq!(outcome.failures.len(), 1);
        let failure = &outcome.failures[0];
        assert_eq!(failure.operation, Some(BatchOp::Insert));
        assert_eq!(failure.result, ResultCode::Conflict);
        assert_eq!(failure.reason, ReasonCode::DuplicateId);

        let record = fx.notes().record(&ObjectId::new("taken")).unwrap().unwrap();
        assert!(record.is_dirty());
        assert!(record.object.etag.is_none());
    }

    #[tokio::test]
    async fn vanished_object_is_a_failure() {
        let fx = Fixture::new(10, None);
        let created = fx.notes().insert(Fields::new(), Acl::default()).unwrap();
        push(&mut fx.phase()).await.unwrap();
        let pushed_etag = fx.notes().record(&created.id).unwrap().unwrap().object.etag;

        fx.remote.server.hard_delete("notes", &created.id);
        fx.notes()
            .update(&created.id, Fields::new().with("late", true))
            .unwrap();

        let outcome = push(&mut fx.phase()).await.unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].result, ResultCode::NotFound);
        let record = fx.notes().record(&created.id).unwrap().unwrap();
        assert!(record.is_dirty());
        assert_eq!(record.object.etag, pushed_etag);

        // Discarding the stuck edit clears the failure.
        assert!(fx.notes().discard(&created.id).unwrap());
        let outcome = push(&mut fx.phase()).await.unwrap();
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.pushed, 0);
    }
}
