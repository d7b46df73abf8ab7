//! Turning dirty records into batch requests and reading the results back.

use crate::error::{SyncError, SyncResult};
use crate::store::LocalRecord;
use objsync_protocol::{BatchItemResult, BatchOp, BatchOperation, BatchRequest, BatchResponse};

/// A dirty record paired with the operation that pushes it.
#[derive(Debug, Clone)]
pub(crate) struct PlannedOp {
    pub record: LocalRecord,
    pub op: BatchOp,
}

/// Push plan for one bucket.
#[derive(Debug, Default)]
pub(crate) struct PushPlan {
    /// Operations to send, in id order.
    pub operations: Vec<PlannedOp>,
    /// Deleted records the server never saw. They need no request.
    pub local_only: Vec<LocalRecord>,
}

/// Classifies dirty records by what the server knows about them.
pub(crate) fn plan(mut records: Vec<LocalRecord>) -> PushPlan {
    records.sort_by(|a, b| a.id().cmp(b.id()));

    let mut plan = PushPlan::default();
    for record in records {
        let op = match (record.object.etag.is_some(), record.object.deleted) {
            (false, true) => {
                plan.local_only.push(record);
                continue;
            }
            (false, false) => BatchOp::Insert,
            (true, false) => BatchOp::Update,
            (true, true) => BatchOp::Delete,
        };
        plan.operations.push(PlannedOp { record, op });
    }
    plan
}

/// Builds one request, with a fresh token, for a slice of the plan.
pub(crate) fn build_request(ops: &[PlannedOp]) -> BatchRequest {
    let operations = ops
        .iter()
        .map(|planned| {
            let object = &planned.record.object;
            match planned.op {
                BatchOp::Insert => BatchOperation::insert(
                    object.id.clone(),
                    object.fields.clone(),
                    object.acl.clone(),
                ),
                BatchOp::Update => BatchOperation::update(
                    object.id.clone(),
                    object.etag.clone(),
                    object.fields.clone(),
                ),
                BatchOp::Delete => BatchOperation::delete(object.id.clone(), object.etag.clone()),
            }
        })
        .collect();
    BatchRequest::new(operations)
}

/// Checks a response lines up with its request and returns the results in
/// request order.
pub(crate) fn match_results(
    request: &BatchRequest,
    response: BatchResponse,
) -> SyncResult<Vec<BatchItemResult>> {
    if response.results.len() != request.len() {
        return Err(SyncError::Protocol(format!(
            "batch {} sent {} operations but got {} results",
            request.token,
            request.len(),
            response.results.len()
        )));
    }
    for (op, result) in request.operations.iter().zip(&response.results) {
        if let (Some(sent), Some(got)) = (&op.id, &result.object_id) {
            if sent != got {
                return Err(SyncError::Protocol(format!(
                    "batch {} result for {got} answers operation on {sent}",
                    request.token
                )));
            }
        }
    }
    Ok(response.results)
}
