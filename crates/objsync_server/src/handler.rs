//! Request handlers for the document endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::DocumentStore;
use objsync_codec::Fields;
use objsync_protocol::{
    Acl, BatchItemResult, BatchOp, BatchOperation, BatchRequest, BatchResponse, Credentials,
    ETag, FindOptions, Object, ObjectId, Query,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Who is calling, as established by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Tenant (application id) the request was sent to.
    pub tenant: String,
    /// Caller credentials.
    pub credentials: Credentials,
}

impl Caller {
    /// Creates a caller.
    pub fn new(tenant: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            tenant: tenant.into(),
            credentials,
        }
    }
}

/// Batch responses remembered by request token.
struct ResponseCache {
    capacity: usize,
    order: VecDeque<String>,
    responses: HashMap<String, BatchResponse>,
}

impl ResponseCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            responses: HashMap::new(),
        }
    }

    fn get(&self, token: &str) -> Option<BatchResponse> {
        self.responses.get(token).cloned()
    }

    fn insert(&mut self, token: String, response: BatchResponse) {
        if self.capacity == 0 {
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.responses.remove(&oldest);
            }
        }
        self.order.push_back(token.clone());
        self.responses.insert(token, response);
    }
}

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Document storage (shared across all handlers).
    pub store: Arc<DocumentStore>,
    responses: Mutex<ResponseCache>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, store: Arc<DocumentStore>) -> Self {
        let responses = Mutex::new(ResponseCache::new(config.response_cache_size));
        Self {
            config,
            store,
            responses,
        }
    }
}

/// Handler for document requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    fn authorize(&self, caller: &Caller) -> ServerResult<()> {
        if caller.tenant != self.context.config.tenant {
            return Err(ServerError::Unauthorized(format!(
                "unknown tenant {}",
                caller.tenant
            )));
        }
        Ok(())
    }

    /// Handles a query.
    ///
    /// A bucket the caller may not query fails as a whole; objects the
    /// caller may not read are silently left out.
    pub fn handle_query(
        &self,
        caller: &Caller,
        bucket: &str,
        query: &Query,
        options: &FindOptions,
    ) -> ServerResult<Vec<Object>> {
        self.authorize(caller)?;
        let store = &self.context.store;
        if !store.bucket_acl(bucket).can_query(&caller.credentials) {
            return Err(ServerError::Forbidden(format!("query denied on {bucket}")));
        }

        let max = self.context.config.max_query_limit;
        let mut options = options.clone();
        options.limit = Some(options.limit.map_or(max, |l| l.min(max)));
        store.query(bucket, &caller.credentials, query, &options)
    }

    /// Handles a batch request.
    ///
    /// Each operation is applied independently and gets exactly one result,
    /// in request order. A token seen before replays the earlier response
    /// without touching the store.
    pub fn handle_batch(
        &self,
        caller: &Caller,
        bucket: &str,
        request: &BatchRequest,
    ) -> ServerResult<BatchResponse> {
        self.authorize(caller)?;
        if request.len() > self.context.config.max_batch_size {
            return Err(ServerError::InvalidRequest(format!(
                "too many operations: {} > {}",
                request.len(),
                self.context.config.max_batch_size
            )));
        }

        let mut cache = self.context.responses.lock();
        if let Some(response) = cache.get(&request.token) {
            debug!(token = %request.token, "replaying batch response");
            return Ok(response);
        }

        let results = request
            .operations
            .iter()
            .map(|op| match self.apply(caller, bucket, op) {
                Ok(object) => BatchItemResult::ok(
                    object.id,
                    object.etag.unwrap_or_else(ETag::generate),
                    object.created_at,
                    object.updated_at,
                ),
                Err(e) => {
                    debug!(op = %op.op, error = %e, "batch item failed");
                    BatchItemResult::failed(op.id.clone(), e.result_code(), e.reason_code())
                }
            })
            .collect();
        let response = BatchResponse::new(results);
        cache.insert(request.token.clone(), response.clone());
        Ok(response)
    }

    fn apply(&self, caller: &Caller, bucket: &str, op: &BatchOperation) -> ServerResult<Object> {
        let store = &self.context.store;
        let credentials = &caller.credentials;
        match op.op {
            BatchOp::Insert => {
                let fields = op.data.clone().ok_or_else(|| missing("data"))?;
                store.insert(bucket, credentials, op.id.clone(), fields, op.acl.clone())
            }
            BatchOp::Update => {
                let id = op.id.as_ref().ok_or_else(|| missing("_id"))?;
                let fields = op
                    .full_update
                    .clone()
                    .ok_or_else(|| missing("$full_update"))?;
                store.update(bucket, credentials, id, op.etag.as_ref(), fields)
            }
            BatchOp::Delete => {
                let id = op.id.as_ref().ok_or_else(|| missing("_id"))?;
                store.delete(bucket, credentials, id, op.etag.as_ref())
            }
        }
    }

    /// Handles a single create.
    pub fn handle_create(
        &self,
        caller: &Caller,
        bucket: &str,
        id: Option<ObjectId>,
        fields: Fields,
        acl: Option<Acl>,
    ) -> ServerResult<Object> {
        self.authorize(caller)?;
        self.context
            .store
            .insert(bucket, &caller.credentials, id, fields, acl)
            .inspect_err(|e| warn!(bucket, error = %e, "create rejected"))
    }

    /// Handles a single full-body update.
    pub fn handle_update(
        &self,
        caller: &Caller,
        bucket: &str,
        id: &ObjectId,
        etag: Option<&ETag>,
        fields: Fields,
    ) -> ServerResult<Object> {
        self.authorize(caller)?;
        self.context
            .store
            .update(bucket, &caller.credentials, id, etag, fields)
    }

    /// Handles a single soft delete.
    pub fn handle_delete(
        &self,
        caller: &Caller,
        bucket: &str,
        id: &ObjectId,
        etag: Option<&ETag>,
    ) -> ServerResult<Object> {
        self.authorize(caller)?;
        self.context
            .store
            .delete(bucket, &caller.credentials, id, etag)
    }
}

fn missing(part: &str) -> ServerError {
    ServerError::InvalidRequest(format!("operation is missing `{part}`"))
}
