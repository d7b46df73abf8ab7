//! The sync engine.

use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::phase::{Phase, SyncFailure};
use crate::pull::pull;
use crate::push::push;
use crate::registry::{SyncScope, SyncScopeRegistry};
use crate::replica::LocalBucket;
use crate::store::{LocalStore, RemoteStore};
use chrono::{DateTime, Utc};
use objsync_protocol::{ConflictResolver, Query};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Running totals across syncs.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Syncs that ran to completion, failures or not.
    pub cycles_completed: u64,
    /// Local writes made by pulls.
    pub objects_pulled: u64,
    /// Operations acknowledged by the remote.
    pub objects_pushed: u64,
    /// Conflicts handed to a resolver.
    pub conflicts_resolved: u64,
    /// Per-item failures reported.
    pub failures: u64,
    /// Remote round-trips retried.
    pub retries: u64,
    /// Last committed sync window end.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of one `sync_bucket` call.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Bucket synced.
    pub bucket: String,
    /// Remote objects received.
    pub fetched: u64,
    /// Local writes made by the pull.
    pub pulled: u64,
    /// Operations acknowledged by the remote.
    pub pushed: u64,
    /// Conflicts handed to the resolver.
    pub conflicts_resolved: u64,
    /// Objects that could not be reconciled. Empty means full success.
    pub failures: Vec<SyncFailure>,
    /// New last sync time, set only if the window was committed.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Wall time spent.
    pub duration: Duration,
}

impl SyncReport {
    /// Returns true if every object was reconciled.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Keeps local buckets in step with a remote store.
///
/// Each [`SyncEngine::sync_bucket`] call pulls the bucket's window, pushes
/// its dirty records, and records the window only if nothing failed. The
/// engine holds no lock across a sync; overlapping syncs and local edits
/// are reconciled through etags on the remote and revisions locally.
pub struct SyncEngine<R: RemoteStore, L: LocalStore> {
    config: SyncConfig,
    remote: Arc<R>,
    local: Arc<L>,
    registry: Arc<SyncScopeRegistry>,
    stats: RwLock<SyncStats>,
}

impl<R: RemoteStore, L: LocalStore> SyncEngine<R, L> {
    /// Creates a new sync engine.
    pub fn new(
        config: SyncConfig,
        remote: Arc<R>,
        local: Arc<L>,
        registry: Arc<SyncScopeRegistry>,
    ) -> Self {
        Self {
            config,
            remote,
            local,
            registry,
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// The remote store.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// The local store.
    pub fn local(&self) -> &Arc<L> {
        &self.local
    }

    /// The scope registry.
    pub fn registry(&self) -> &Arc<SyncScopeRegistry> {
        &self.registry
    }

    /// Local read/write handle on a bucket.
    pub fn bucket(&self, name: impl Into<String>) -> LocalBucket<L> {
        LocalBucket::new(Arc::clone(&self.local), name)
    }

    /// Sets a bucket's sync scope. See [`SyncScopeRegistry::set_sync_scope`].
    pub fn set_sync_scope(&self, bucket: &str, query: Option<Query>) -> SyncResult<SyncScope> {
        self.registry.set_sync_scope(bucket, query)
    }

    /// Gets a bucket's sync scope.
    pub fn get_sync_scope(&self, bucket: &str) -> Option<SyncScope> {
        self.registry.get_sync_scope(bucket)
    }

    /// Removes a bucket's sync scope.
    pub fn remove_sync_scope(&self, bucket: &str) -> SyncResult<Option<SyncScope>> {
        self.registry.remove_sync_scope(bucket)
    }

    /// All sync scopes.
    pub fn all_sync_scopes(&self) -> Vec<SyncScope> {
        self.registry.all_sync_scopes()
    }

    /// Last committed sync time of a bucket.
    pub fn last_sync_time(&self, bucket: &str) -> Option<DateTime<Utc>> {
        self.registry.last_sync_time(bucket)
    }

    /// Drops the local copy of one bucket, or of everything, along with
    /// the matching scopes. Unpushed changes are lost. Returns the number
    /// of records removed.
    pub fn purge_local_cache(&self, bucket: Option<&str>) -> SyncResult<usize> {
        let removed = self.local.purge(bucket)?;
        match bucket {
            Some(name) => {
                self.registry.remove_sync_scope(name)?;
            }
            None => {
                self.registry.purge()?;
            }
        }
        info!(bucket = bucket.unwrap_or("*"), removed, "local cache purged");
        Ok(removed)
    }

    /// Snapshots the bucket's scope for a sync, failing fast on usage
    /// faults.
    fn begin<'s>(&'s self, ctx: &'s SyncContext, bucket: &str) -> SyncResult<Phase<'s, R, L>> {
        if bucket.is_empty() {
            return Err(SyncError::InvalidArgument("bucket name is empty".into()));
        }
        let scope = self
            .registry
            .get_sync_scope(bucket)
            .ok_or_else(|| SyncError::NoSyncScope {
                bucket: bucket.to_string(),
            })?;
        Ok(Phase {
            config: &self.config,
            ctx,
            remote: &*self.remote,
            local: &*self.local,
            registry: &self.registry,
            scope,
            retries: 0,
        })
    }

    fn record_stats(&self, bucket: &str, retries: u64, result: &SyncResult<SyncReport>, full: bool) {
        let mut stats = self.stats.write();
        stats.retries += retries;
        match result {
            Ok(report) => {
                if full {
                    stats.cycles_completed += 1;
                }
                stats.objects_pulled += report.pulled;
                stats.objects_pushed += report.pushed;
                stats.conflicts_resolved += report.conflicts_resolved;
                stats.failures += report.failures.len() as u64;
                if report.last_sync_time.is_some() {
                    stats.last_sync_time = report.last_sync_time;
                }
            }
            Err(e) => {
                warn!(bucket, error = %e, "sync failed");
                stats.last_error = Some(e.to_string());
            }
        }
    }

    /// Pulls then pushes one bucket.
    ///
    /// Usage faults (empty bucket name, no scope) fail before any I/O.
    /// Transport faults and a whole-bucket denial abort the sync. Per-object
    /// problems are collected in [`SyncReport::failures`]; the window is
    /// recorded only when that list is empty.
    pub async fn sync_bucket(
        &self,
        ctx: &SyncContext,
        bucket: &str,
        resolver: &dyn ConflictResolver,
    ) -> SyncResult<SyncReport> {
        let mut phase = self.begin(ctx, bucket)?;
        info!(bucket, generation = phase.scope.generation, "sync started");
        let result = self.run(&mut phase, resolver).await;
        self.record_stats(bucket, phase.retries, &result, true);
        result
    }

    /// Runs only the pull half of a sync. The window is never recorded.
    pub async fn pull_bucket(
        &self,
        ctx: &SyncContext,
        bucket: &str,
        resolver: &dyn ConflictResolver,
    ) -> SyncResult<SyncReport> {
        let mut phase = self.begin(ctx, bucket)?;
        let start = Instant::now();
        let result = pull(&mut phase, resolver).await.map(|p| SyncReport {
            bucket: bucket.to_string(),
            fetched: p.fetched,
            pulled: p.applied,
            pushed: 0,
            conflicts_resolved: p.conflicts_resolved,
            failures: p.failures,
            last_sync_time: None,
            duration: start.elapsed(),
        });
        self.record_stats(bucket, phase.retries, &result, false);
        result
    }

    /// Runs only the push half of a sync. The window is never recorded.
    pub async fn push_bucket(&self, ctx: &SyncContext, bucket: &str) -> SyncResult<SyncReport> {
        let mut phase = self.begin(ctx, bucket)?;
        let start = Instant::now();
        let result = push(&mut phase).await.map(|p| SyncReport {
            bucket: bucket.to_string(),
            fetched: 0,
            pulled: 0,
            pushed: p.pushed,
            conflicts_resolved: 0,
            failures: p.failures,
            last_sync_time: None,
            duration: start.elapsed(),
        });
        self.record_stats(bucket, phase.retries, &result, false);
        result
    }

    async fn run(
        &self,
        phase: &mut Phase<'_, R, L>,
        resolver: &dyn ConflictResolver,
    ) -> SyncResult<SyncReport> {
        let start = Instant::now();
        let pulled = pull(phase, resolver).await?;
        let pushed = push(phase).await?;

        let mut failures = pulled.failures;
        failures.extend(pushed.failures);

        let bucket = phase.bucket().to_string();
        let mut last_sync_time = None;
        if failures.is_empty() {
            phase.check_live()?;
            let committed =
                self.registry
                    .commit_sync(&bucket, phase.scope.generation, pulled.window_end)?;
            if !committed {
                return Err(SyncError::ScopeChanged { bucket });
            }
            last_sync_time = Some(pulled.window_end);
        } else {
            warn!(bucket = %bucket, failures = failures.len(), "sync window kept for retry");
        }

        info!(
            bucket = %bucket,
            pulled = pulled.applied,
            pushed = pushed.pushed,
            committed = last_sync_time.is_some(),
            "sync finished"
        );
        Ok(SyncReport {
            bucket,
            fetched: pulled.fetched,
            pulled: pulled.applied,
            pushed: pushed.pushed,
            conflicts_resolved: pulled.conflicts_resolved,
            failures,
            last_sync_time,
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLocalStore;
    use crate::testing::{ServerRemote, TENANT};
    use objsync_codec::Fields;
    use objsync_protocol::{Acl, Credentials, PreferServer};
    use std::sync::atomic::Ordering;

    fn engine() -> SyncEngine<ServerRemote, MemoryLocalStore> {
        SyncEngine::new(
            SyncConfig::new(),
            Arc::new(ServerRemote::new()),
            Arc::new(MemoryLocalStore::new()),
            Arc::new(SyncScopeRegistry::in_memory()),
        )
    }

    fn ctx() -> SyncContext {
        SyncContext::new(TENANT, Credentials::user("alice"))
    }

    #[tokio::test]
    async fn usage_faults_before_io() {
        let engine = engine();

        let err = engine.sync_bucket(&ctx(), "", &PreferServer).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));

        let err = engine
            .sync_bucket(&ctx(), "notes", &PreferServer)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NoSyncScope { .. }));

        assert_eq!(engine.remote().queries.load(Ordering::SeqCst), 0);
        assert!(engine.stats().last_error.is_some());
    }

    #[tokio::test]
    async fn successful_sync_commits_window() {
        let engine = engine();
        engine.set_sync_scope("notes", None).unwrap();
        engine
            .bucket("notes")
            .insert(Fields::new().with("t", "x"), Acl::default())
            .unwrap();

        let report = engine
            .sync_bucket(&ctx(), "notes", &PreferServer)
            .await
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.pushed, 1);
        assert!(report.last_sync_time.is_some());
        assert_eq!(engine.last_sync_time("notes"), report.last_sync_time);

        let stats = engine.stats();
        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.objects_pushed, 1);
    }

    #[tokio::test]
    async fn cancelled_context_does_nothing() {
        let engine = engine();
        engine.set_sync_scope("notes", None).unwrap();
        let ctx = ctx();
        ctx.cancel();

        let err = engine
            .sync_bucket(&ctx, "notes", &PreferServer)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert!(engine.last_sync_time("notes").is_none());
    }

    #[tokio::test]
    async fn wrong_tenant_is_unauthorized() {
        let engine = engine();
        engine.set_sync_scope("notes", None).unwrap();
        let stranger = SyncContext::new("elsewhere", Credentials::user("alice"));

        let err = engine
            .sync_bucket(&stranger, "notes", &PreferServer)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Unauthorized(_)));
        assert!(engine.last_sync_time("notes").is_none());
    }

    #[tokio::test]
    async fn purge_drops_records_and_scope() {
        let engine = engine();
        engine.set_sync_scope("notes", None).unwrap();
        engine.set_sync_scope("tasks", None).unwrap();
        engine
            .bucket("notes")
            .insert(Fields::new(), Acl::default())
            .unwrap();

        assert_eq!(engine.purge_local_cache(Some("notes")).unwrap(), 1);
        assert!(engine.get_sync_scope("notes").is_none());
        assert!(engine.get_sync_scope("tasks").is_some());

        engine.purge_local_cache(None).unwrap();
        assert!(engine.all_sync_scopes().is_empty());
    }

    #[tokio::test]
    async fn half_syncs_never_commit() {
        let engine = engine();
        engine.set_sync_scope("notes", None).unwrap();
        engine
            .bucket("notes")
            .insert(Fields::new(), Acl::default())
            .unwrap();

        let pushed = engine.push_bucket(&ctx(), "notes").await.unwrap();
        assert_eq!(pushed.pushed, 1);
        let pulled = engine
            .pull_bucket(&ctx(), "notes", &PreferServer)
            .await
            .unwrap();
        assert_eq!(pulled.fetched, 1);
        assert_eq!(pulled.pulled, 0);

        assert!(engine.last_sync_time("notes").is_none());
        assert_eq!(engine.stats().cycles_completed, 0);
        assert_eq!(engine.stats().objects_pushed, 1);
    }
}
