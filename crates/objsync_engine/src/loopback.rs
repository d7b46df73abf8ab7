//! In-process remote backed by the reference document server.

use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::store::RemoteStore;
use async_trait::async_trait;
use objsync_protocol::{BatchRequest, BatchResponse, FindOptions, Object, Query};
use objsync_server::{Caller, DocumentServer, ServerError};
use std::sync::Arc;

/// A [`RemoteStore`] that calls a [`DocumentServer`] directly.
///
/// Useful for tests and single-process setups. Server errors map onto the
/// engine's fault classes: a wrong tenant is `Unauthorized`, a denied
/// bucket is `Forbidden`, and anything else is a fatal transport error.
pub struct LoopbackRemote {
    server: Arc<DocumentServer>,
}

impl LoopbackRemote {
    /// Wraps a server.
    pub fn new(server: Arc<DocumentServer>) -> Self {
        Self { server }
    }

    /// The wrapped server.
    pub fn server(&self) -> &Arc<DocumentServer> {
        &self.server
    }

    /// The server-side caller a sync context speaks as.
    pub fn caller(ctx: &SyncContext) -> Caller {
        Caller::new(ctx.tenant(), ctx.credentials().clone())
    }
}

fn sync_error(bucket: &str, err: ServerError) -> SyncError {
    match err {
        ServerError::Unauthorized(message) => SyncError::Unauthorized(message),
        ServerError::Forbidden(_) => SyncError::Forbidden {
            bucket: bucket.to_string(),
        },
        other => SyncError::transport_fatal(other.to_string()),
    }
}

#[async_trait]
impl RemoteStore for LoopbackRemote {
    async fn query(
        &self,
        ctx: &SyncContext,
        bucket: &str,
        query: &Query,
        options: &FindOptions,
    ) -> SyncResult<Vec<Object>> {
        self.server
            .handle_query(&Self::caller(ctx), bucket, query, options)
            .map_err(|e| sync_error(bucket, e))
    }

    async fn batch(
        &self,
        ctx: &SyncContext,
        bucket: &str,
        request: &BatchRequest,
    ) -> SyncResult<BatchResponse> {
        self.server
            .handle_batch(&Self::caller(ctx), bucket, request)
            .map_err(|e| sync_error(bucket, e))
    }
}
