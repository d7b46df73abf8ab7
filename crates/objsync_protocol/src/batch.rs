//! Multi-operation batch requests and their per-item results.

use crate::object::{Acl, ETag, ObjectId};
use chrono::{DateTime, Utc};
use objsync_codec::Fields;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOp {
    /// Create a new object.
    Insert,
    /// Replace an existing object's body.
    Update,
    /// Delete an existing object.
    Delete,
}

impl fmt::Display for BatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOp::Insert => f.write_str("insert"),
            BatchOp::Update => f.write_str("update"),
            BatchOp::Delete => f.write_str("delete"),
        }
    }
}

/// One entry of a batch request.
///
/// Inserts carry `data`; updates carry `$full_update` and replace the whole
/// body. An `etag` makes the server check the current version first; an
/// entry without one is applied unconditionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    /// Operation kind.
    pub op: BatchOp,
    /// Target id. Inserts without an id get a server-assigned one.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Expected current version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<ETag>,
    /// Body of a new object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Fields>,
    /// Replacement body for an update.
    #[serde(
        rename = "$full_update",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub full_update: Option<Fields>,
    /// ACL for a new object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<Acl>,
}

impl BatchOperation {
    /// An insert of `fields` under `id`.
    pub fn insert(id: ObjectId, fields: Fields, acl: Acl) -> Self {
        Self {
            op: BatchOp::Insert,
            id: Some(id),
            etag: None,
            data: Some(fields),
            full_update: None,
            acl: Some(acl),
        }
    }

    /// A full-body update of `id`, optionally version-checked.
    pub fn update(id: ObjectId, etag: Option<ETag>, fields: Fields) -> Self {
        Self {
            op: BatchOp::Update,
            id: Some(id),
            etag,
            data: None,
            full_update: Some(fields),
            acl: None,
        }
    }

    /// A delete of `id`, optionally version-checked.
    pub fn delete(id: ObjectId, etag: Option<ETag>) -> Self {
        Self {
            op: BatchOp::Delete,
            id: Some(id),
            etag,
            data: None,
            full_update: None,
            acl: None,
        }
    }

    /// The body carried by this entry, whichever key it travels under.
    pub fn payload(&self) -> Option<&Fields> {
        self.data.as_ref().or(self.full_update.as_ref())
    }
}

/// A batch request.
///
/// The token identifies the request: resubmitting the same request (same
/// token) must not apply its operations twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Idempotency token.
    pub token: String,
    /// Operations, applied in order.
    pub operations: Vec<BatchOperation>,
}

impl BatchRequest {
    /// Creates a request with a fresh token.
    pub fn new(operations: Vec<BatchOperation>) -> Self {
        Self {
            token: uuid::Uuid::new_v4().to_string(),
            operations,
        }
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if there are no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Outcome class of one batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    /// Applied.
    Ok,
    /// Malformed entry.
    BadRequest,
    /// Caller lacks permission.
    Forbidden,
    /// Target object does not exist.
    NotFound,
    /// Version or identity conflict.
    Conflict,
    /// Server-side failure.
    ServerError,
}

impl ResultCode {
    /// Returns true for [`ResultCode::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, ResultCode::Ok)
    }

    /// The HTTP status this outcome corresponds to.
    pub fn http_status(&self) -> u16 {
        match self {
            ResultCode::Ok => 200,
            ResultCode::BadRequest => 400,
            ResultCode::Forbidden => 403,
            ResultCode::NotFound => 404,
            ResultCode::Conflict => 409,
            ResultCode::ServerError => 500,
        }
    }

    /// Maps an HTTP status back to an outcome.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            200..=299 => ResultCode::Ok,
            403 | 401 => ResultCode::Forbidden,
            404 => ResultCode::NotFound,
            409 | 412 => ResultCode::Conflict,
            400..=499 => ResultCode::BadRequest,
            _ => ResultCode::ServerError,
        }
    }
}

/// Finer-grained reason attached to a result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// No further detail.
    #[default]
    Unknown,
    /// An insert used an id that already exists.
    DuplicateId,
    /// The supplied etag is not the current version.
    EtagMismatch,
    /// An ACL denied the operation.
    PermissionDenied,
    /// The target object is gone.
    ObjectNotFound,
    /// The entry lacks a required part.
    InvalidPayload,
    /// The local record changed while the sync was working on it.
    LocalModified,
}

/// Result of one batch item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    /// Id of the object the item addressed (or was assigned).
    pub object_id: Option<ObjectId>,
    /// Outcome.
    pub result: ResultCode,
    /// Detail.
    #[serde(default)]
    pub reason: ReasonCode,
    /// New version token on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<ETag>,
    /// Creation time on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Modification time on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BatchItemResult {
    /// A successful item.
    pub fn ok(
        object_id: ObjectId,
        etag: ETag,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            object_id: Some(object_id),
            result: ResultCode::Ok,
            reason: ReasonCode::Unknown,
            etag: Some(etag),
            created_at: Some(created_at),
            updated_at: Some(updated_at),
        }
    }

    /// A failed item.
    pub fn failed(object_id: Option<ObjectId>, result: ResultCode, reason: ReasonCode) -> Self {
        Self {
            object_id,
            result,
            reason,
            etag: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Returns true if the item was applied.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// A batch response: one result per request entry, in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Per-item results.
    pub results: Vec<BatchItemResult>,
}

impl BatchResponse {
    /// Wraps a result list.
    pub fn new(results: Vec<BatchItemResult>) -> Self {
        Self { results }
    }
}
