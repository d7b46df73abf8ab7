//! Counting [`RemoteStore`] over the reference server for unit tests.

use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::loopback::LoopbackRemote;
use crate::store::RemoteStore;
use async_trait::async_trait;
use objsync_protocol::{BatchRequest, BatchResponse, FindOptions, Object, Query};
use objsync_server::{Caller, DocumentServer, ServerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) const TENANT: &str = "app";

pub(crate) struct ServerRemote {
    pub server: Arc<DocumentServer>,
    pub queries: AtomicUsize,
    pub batches: AtomicUsize,
    inner: LoopbackRemote,
}

impl ServerRemote {
    pub fn new() -> Self {
        let server = Arc::new(DocumentServer::new(ServerConfig::new(TENANT)));
        Self {
            inner: LoopbackRemote::new(Arc::clone(&server)),
            server,
            queries: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
        }
    }
}

pub(crate) fn caller(ctx: &SyncContext) -> Caller {
    LoopbackRemote::caller(ctx)
}

#[async_trait]
impl RemoteStore for ServerRemote {
    async fn query(
        &self,
        ctx: &SyncContext,
        bucket: &str,
        query: &Query,
        options: &FindOptions,
    ) -> SyncResult<Vec<Object>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(ctx, bucket, query, options).await
    }

    async fn batch(
        &self,
        ctx: &SyncContext,
        bucket: &str,
        request: &BatchRequest,
    ) -> SyncResult<BatchResponse> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.inner.batch(ctx, bucket, request).await
    }
}
