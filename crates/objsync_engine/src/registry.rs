//! Sync scope registry.
//!
//! One scope per bucket: the query that selects which objects take part in
//! sync, and the upper bound of the last fully successful pull window.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use objsync_codec::{from_cbor, to_cbor};
use objsync_protocol::Query;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sync configuration of one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncScope {
    /// Bucket name.
    pub bucket: String,
    /// Objects taking part in sync.
    pub query: Query,
    /// End of the last fully successful sync window.
    #[serde(default)]
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Changes every time the scope is set. A sync that started under an
    /// older generation may not record its window.
    pub generation: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryState {
    next_generation: u64,
    scopes: BTreeMap<String, SyncScope>,
}

/// Per-bucket sync scopes, optionally persisted to a file.
///
/// Mutations are last-writer-wins per bucket. A persisted registry rewrites
/// its file on every mutation by writing a sibling temp file and renaming
/// it over the original, so a crash leaves either the old or the new state.
pub struct SyncScopeRegistry {
    path: Option<PathBuf>,
    state: RwLock<RegistryState>,
}

impl SyncScopeRegistry {
    /// Creates a registry that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Opens a registry backed by `path`, loading it if the file exists.
    pub fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let bytes = fs::read(&path)?;
            let state: RegistryState = from_cbor(&bytes)?;
            debug!(path = %path.display(), scopes = state.scopes.len(), "loaded sync scopes");
            state
        } else {
            RegistryState::default()
        };
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    /// Backing file, if persisted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Applies `change` to a copy of the state, persists it, then publishes.
    fn mutate<T>(&self, change: impl FnOnce(&mut RegistryState) -> T) -> SyncResult<T> {
        let mut state = self.state.write();
        let mut next = state.clone();
        let out = change(&mut next);
        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        *state = next;
        Ok(out)
    }

    /// Sets the scope of `bucket`, defaulting to match-all.
    ///
    /// Always clears the last sync time, so the next sync starts from a
    /// full pull.
    pub fn set_sync_scope(&self, bucket: &str, query: Option<Query>) -> SyncResult<SyncScope> {
        if bucket.is_empty() {
            return Err(SyncError::InvalidArgument("bucket name is empty".into()));
        }
        let query = query.unwrap_or_default();
        query.validate()?;

        let scope = self.mutate(|state| {
            state.next_generation += 1;
            let scope = SyncScope {
                bucket: bucket.to_string(),
                query,
                last_sync_time: None,
                generation: state.next_generation,
            };
            state.scopes.insert(bucket.to_string(), scope.clone());
            scope
        })?;
        info!(bucket, generation = scope.generation, "sync scope set");
        Ok(scope)
    }

    /// Returns the scope of `bucket`.
    pub fn get_sync_scope(&self, bucket: &str) -> Option<SyncScope> {
        self.state.read().scopes.get(bucket).cloned()
    }

    /// Removes the scope of `bucket`, returning it if there was one.
    pub fn remove_sync_scope(&self, bucket: &str) -> SyncResult<Option<SyncScope>> {
        if !self.state.read().scopes.contains_key(bucket) {
            return Ok(None);
        }
        let removed = self.mutate(|state| state.scopes.remove(bucket))?;
        if removed.is_some() {
            info!(bucket, "sync scope removed");
        }
        Ok(removed)
    }

    /// All scopes, in bucket-name order.
    pub fn all_sync_scopes(&self) -> Vec<SyncScope> {
        self.state.read().scopes.values().cloned().collect()
    }

    /// Last sync time of `bucket`, if a scope exists and a sync has
    /// completed since it was set.
    pub fn last_sync_time(&self, bucket: &str) -> Option<DateTime<Utc>> {
        self.state
            .read()
            .scopes
            .get(bucket)
            .and_then(|s| s.last_sync_time)
    }

    /// Removes every scope. Returns how many there were.
    pub fn purge(&self) -> SyncResult<usize> {
        let removed = self.mutate(|state| {
            let n = state.scopes.len();
            state.scopes.clear();
            n
        })?;
        info!(removed, "sync scopes purged");
        Ok(removed)
    }

    /// Records a completed sync window.
    ///
    /// Only takes effect if the scope still exists with the generation the
    /// sync started under; returns whether it did.
    pub fn commit_sync(
        &self,
        bucket: &str,
        generation: u64,
        timestamp: DateTime<Utc>,
    ) -> SyncResult<bool> {
        let current = self.state.read().scopes.get(bucket).map(|s| s.generation);
        if current != Some(generation) {
            debug!(bucket, generation, ?current, "stale sync not committed");
            return Ok(false);
        }
        self.mutate(|state| match state.scopes.get_mut(bucket) {
            Some(scope) if scope.generation == generation => {
                scope.last_sync_time = Some(timestamp);
                true
            }
            _ => false,
        })
    }
}

fn persist(path: &Path, state: &RegistryState) -> SyncResult<()> {
    let bytes = to_cbor(state)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use objsync_protocol::RegexFlags;

    #[test]
    fn set_defaults_to_match_all() {
        let registry = SyncScopeRegistry::in_memory();
        let scope = registry.set_sync_scope("notes", None).unwrap();
        assert_eq!(scope.query, Query::MatchAll);
        assert_eq!(scope.last_sync_time, None);
        assert_eq!(registry.get_sync_scope("notes"), Some(scope));
    }

    #[test]
    fn empty_bucket_rejected() {
        let registry = SyncScopeRegistry::in_memory();
        let err = registry.set_sync_scope("", None).unwrap_err();
        assert!(err.is_usage_fault());
    }

    #[test]
    fn invalid_regex_rejected() {
        let registry = SyncScopeRegistry::in_memory();
        let query = Query::regex("title", "(", RegexFlags::default());
        let err = registry.set_sync_scope("notes", Some(query)).unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
        assert!(registry.get_sync_scope("notes").is_none());
    }

    #[test]
    fn absent_bucket_is_not_an_error() {
        let registry = SyncScopeRegistry::in_memory();
        assert!(registry.get_sync_scope("nope").is_none());
        assert!(registry.remove_sync_scope("nope").unwrap().is_none());
        assert!(registry.last_sync_time("nope").is_none());
    }

    #[test]
    fn reset_clears_last_sync_time() {
        let registry = SyncScopeRegistry::in_memory();
        let scope = registry.set_sync_scope("notes", None).unwrap();
        let now = Utc::now();
        assert!(registry.commit_sync("notes", scope.generation, now).unwrap());
        assert_eq!(registry.last_sync_time("notes"), Some(now));

        // Even the same query resets the baseline.
        registry.set_sync_scope("notes", None).unwrap();
        assert_eq!(registry.last_sync_time("notes"), None);
    }

    #[test]
    fn stale_generation_not_committed() {
        let registry = SyncScopeRegistry::in_memory();
        let old = registry.set_sync_scope("notes", None).unwrap();
        let new = registry
            .set_sync_scope("notes", Some(Query::eq("kind", "todo")))
            .unwrap();
        assert!(new.generation > old.generation);

        assert!(!registry
            .commit_sync("notes", old.generation, Utc::now())
            .unwrap());
        assert_eq!(registry.last_sync_time("notes"), None);

        registry.remove_sync_scope("notes").unwrap();
        assert!(!registry
            .commit_sync("notes", new.generation, Utc::now())
            .unwrap());
    }

    #[test]
    fn generation_not_reused_after_remove() {
        let registry = SyncScopeRegistry::in_memory();
        let first = registry.set_sync_scope("notes", None).unwrap();
        registry.remove_sync_scope("notes").unwrap();
        let second = registry.set_sync_scope("notes", None).unwrap();
        assert_ne!(first.generation, second.generation);
    }

    #[test]
    fn all_scopes_and_purge() {
        let registry = SyncScopeRegistry::in_memory();
        registry.set_sync_scope("tasks", None).unwrap();
        registry.set_sync_scope("notes", None).unwrap();
        let buckets: Vec<_> = registry
            .all_sync_scopes()
            .into_iter()
            .map(|s| s.bucket)
            .collect();
        assert_eq!(buckets, vec!["notes", "tasks"]);

        assert_eq!(registry.purge().unwrap(), 2);
        assert!(registry.all_sync_scopes().is_empty());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scopes.cbor");

        let synced_at = Utc::now();
        {
            let registry = SyncScopeRegistry::open(&path).unwrap();
            let scope = registry
                .set_sync_scope("notes", Some(Query::gte("priority", 2i64)))
                .unwrap();
            registry.set_sync_scope("tasks", None).unwrap();
            registry
                .commit_sync("notes", scope.generation, synced_at)
                .unwrap();
        }

        let reopened = SyncScopeRegistry::open(&path).unwrap();
        let notes = reopened.get_sync_scope("notes").unwrap();
        assert_eq!(notes.query, Query::gte("priority", 2i64));
        assert_eq!(notes.last_sync_time, Some(synced_at));
        assert_eq!(reopened.all_sync_scopes().len(), 2);

        // Generations keep increasing after a reopen.
        let tasks = reopened.set_sync_scope("tasks", None).unwrap();
        assert!(tasks.generation > notes.generation);
    }

    #[test]
    fn corrupt_file_is_a_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scopes.cbor");
        fs::write(&path, b"not cbor at all").unwrap();
        let err = SyncScopeRegistry::open(&path).err().unwrap();
        assert!(matches!(err, SyncError::Codec(_)));
    }
}
