//! Document server facade.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{Caller, HandlerContext, RequestHandler};
use crate::store::{BucketAcl, DocumentStore};
use objsync_codec::Fields;
use objsync_protocol::{
    Acl, BatchRequest, BatchResponse, ETag, FindOptions, Object, ObjectId, Query,
};
use std::sync::Arc;

/// The reference document server.
///
/// Holds buckets of objects in memory and answers queries and batch writes
/// with the same ACL, etag and soft-delete rules a hosted backend applies.
///
/// # Example
///
/// ```
/// use objsync_server::{Caller, DocumentServer, ServerConfig};
/// use objsync_protocol::{Credentials, FindOptions, Fields, Query};
///
/// let server = DocumentServer::new(ServerConfig::new("app"));
/// let caller = Caller::new("app", Credentials::user("alice"));
///
/// server
///     .handle_create(&caller, "notes", None, Fields::new().with("title", "hi"), None)
///     .unwrap();
/// let found = server
///     .handle_query(&caller, "notes", &Query::MatchAll, &FindOptions::new())
///     .unwrap();
/// assert_eq!(found.len(), 1);
/// ```
pub struct DocumentServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl DocumentServer {
    /// Creates a new server with an empty store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(DocumentStore::new()))
    }

    /// Creates a server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<DocumentStore>) -> Self {
        let context = Arc::new(HandlerContext::new(config, store));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Handles a query.
    pub fn handle_query(
        &self,
        caller: &Caller,
        bucket: &str,
        query: &Query,
        options: &FindOptions,
    ) -> ServerResult<Vec<Object>> {
        self.handler.handle_query(caller, bucket, query, options)
    }

    /// Handles a batch request.
    pub fn handle_batch(
        &self,
        caller: &Caller,
        bucket: &str,
        request: &BatchRequest,
    ) -> ServerResult<BatchResponse> {
        self.handler.handle_batch(caller, bucket, request)
    }

    /// Creates one object.
    pub fn handle_create(
        &self,
        caller: &Caller,
        bucket: &str,
        id: Option<ObjectId>,
        fields: Fields,
        acl: Option<Acl>,
    ) -> ServerResult<Object> {
        self.handler.handle_create(caller, bucket, id, fields, acl)
    }

    /// Replaces one object's body.
    pub fn handle_update(
        &self,
        caller: &Caller,
        bucket: &str,
        id: &ObjectId,
        etag: Option<&ETag>,
        fields: Fields,
    ) -> ServerResult<Object> {
        self.handler.handle_update(caller, bucket, id, etag, fields)
    }

    /// Soft-deletes one object.
    pub fn handle_delete(
        &self,
        caller: &Caller,
        bucket: &str,
        id: &ObjectId,
        etag: Option<&ETag>,
    ) -> ServerResult<Object> {
        self.handler.handle_delete(caller, bucket, id, etag)
    }

    /// Sets the bucket-level ACL.
    pub fn set_bucket_acl(&self, bucket: &str, acl: BucketAcl) {
        self.context.store.set_bucket_acl(bucket, acl);
    }

    /// Sets an object's ACL. The object keeps its etag.
    pub fn set_object_acl(&self, bucket: &str, id: &ObjectId, acl: Acl) -> ServerResult<()> {
        self.context.store.set_object_acl(bucket, id, acl)
    }

    /// Removes an object outright, bypassing soft deletion.
    pub fn hard_delete(&self, bucket: &str, id: &ObjectId) -> bool {
        self.context.store.hard_delete(bucket, id)
    }

    /// Fetches an object regardless of ACLs and soft deletion.
    pub fn get(&self, bucket: &str, id: &ObjectId) -> Option<Object> {
        self.context.store.get(bucket, id)
    }

    /// Number of live objects in a bucket.
    pub fn object_count(&self, bucket: &str) -> usize {
        self.context.store.live_count(bucket)
    }
}
