//! Scope registry commands.

use objsync_engine::{SyncScope, SyncScopeRegistry};
use objsync_protocol::Query;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// One scope as printed by the CLI.
#[derive(Debug, Serialize)]
pub struct ScopeSummary {
    /// Bucket name.
    pub bucket: String,
    /// Scope query, as stored.
    pub query: Query,
    /// Last committed sync time, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<String>,
    /// Scope generation.
    pub generation: u64,
}

impl From<SyncScope> for ScopeSummary {
    fn from(scope: SyncScope) -> Self {
        Self {
            bucket: scope.bucket,
            query: scope.query,
            last_sync_time: scope.last_sync_time.map(|t| t.to_rfc3339()),
            generation: scope.generation,
        }
    }
}

/// Parses a scope query given as JSON.
pub fn parse_query(json: &str) -> Result<Query, Box<dyn std::error::Error>> {
    let query: Query = serde_json::from_str(json)?;
    query.validate()?;
    Ok(query)
}

fn open(path: &Path) -> Result<SyncScopeRegistry, Box<dyn std::error::Error>> {
    debug!(path = %path.display(), "opening scope registry");
    Ok(SyncScopeRegistry::open(path)?)
}

/// Runs the list command.
pub fn list(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scopes: Vec<ScopeSummary> = open(path)?
        .all_sync_scopes()
        .into_iter()
        .map(ScopeSummary::from)
        .collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&scopes)?),
        _ => {
            if scopes.is_empty() {
                println!("No sync scopes in {}", path.display());
            }
            for scope in &scopes {
                print_text(scope);
            }
        }
    }
    Ok(())
}

/// Runs the show command.
pub fn show(path: &Path, bucket: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scope = open(path)?
        .get_sync_scope(bucket)
        .ok_or_else(|| format!("No sync scope for bucket {bucket}"))?;
    let summary = ScopeSummary::from(scope);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_text(&summary),
    }
    Ok(())
}

/// Runs the set command.
pub fn set(
    path: &Path,
    bucket: &str,
    query: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let query = query.map(parse_query).transpose()?;
    let scope = open(path)?.set_sync_scope(bucket, query)?;
    println!(
        "Scope for {} set (generation {})",
        scope.bucket, scope.generation
    );
    Ok(())
}

/// Runs the reset command.
pub fn reset(path: &Path, bucket: &str) -> Result<(), Box<dyn std::error::Error>> {
    let registry = open(path)?;
    let current = registry
        .get_sync_scope(bucket)
        .ok_or_else(|| format!("No sync scope for bucket {bucket}"))?;
    registry.set_sync_scope(bucket, Some(current.query))?;
    println!("Scope for {bucket} reset; next sync pulls everything");
    Ok(())
}

/// Runs the remove command.
pub fn remove(path: &Path, bucket: &str) -> Result<(), Box<dyn std::error::Error>> {
    match open(path)?.remove_sync_scope(bucket)? {
        Some(_) => println!("Scope for {bucket} removed"),
        None => println!("No sync scope for bucket {bucket}"),
    }
    Ok(())
}

/// Runs the purge command.
pub fn purge(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let registry = open(path)?;
    if dry_run {
        for scope in registry.all_sync_scopes() {
            println!("Would remove scope for {}", scope.bucket);
        }
        return Ok(());
    }
    let removed = registry.purge()?;
    println!("Removed {removed} scope(s)");
    Ok(())
}

fn print_text(scope: &ScopeSummary) {
    println!("Bucket: {}", scope.bucket);
    println!("  Generation:     {}", scope.generation);
    println!(
        "  Last sync time: {}",
        scope.last_sync_time.as_deref().unwrap_or("never")
    );
    match serde_json::to_string(&scope.query) {
        Ok(query) => println!("  Query:          {query}"),
        Err(_) => println!("  Query:          {:?}", scope.query),
    }
}
