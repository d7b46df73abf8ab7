//! Replicated objects, access-control lists and caller credentials.

use chrono::{DateTime, Utc};
use objsync_codec::{Fields, Value};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

/// Principal that matches every caller, including anonymous ones.
pub const ANYONE: &str = "*";

/// Principal that matches every signed-in user.
pub const AUTHENTICATED: &str = "authenticated";

/// Prefix that marks a principal as a group name.
pub const GROUP_PREFIX: &str = "group:";

/// Opaque object identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wraps an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque version token used for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Wraps a token string.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Generates a fresh random token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    /// No signed-in user.
    #[default]
    Anonymous,
    /// A signed-in user and the groups they belong to.
    User {
        /// User identifier.
        user_id: String,
        /// Group names (without the `group:` prefix).
        groups: Vec<String>,
    },
    /// Administrative credential. Bypasses every ACL check.
    MasterKey,
}

impl Credentials {
    /// Creates user credentials without group membership.
    pub fn user(user_id: impl Into<String>) -> Self {
        Credentials::User {
            user_id: user_id.into(),
            groups: Vec::new(),
        }
    }

    /// Adds group membership to user credentials. No-op for other kinds.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        if let Credentials::User { groups, .. } = &mut self {
            groups.push(group.into());
        }
        self
    }

    /// Returns true for the master key.
    pub fn is_master(&self) -> bool {
        matches!(self, Credentials::MasterKey)
    }

    /// Returns the signed-in user id, if any.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Credentials::User { user_id, .. } => Some(user_id),
            _ => None,
        }
    }

    /// All principal names this caller answers to.
    pub fn principals(&self) -> Vec<String> {
        match self {
            Credentials::Anonymous | Credentials::MasterKey => vec![ANYONE.to_string()],
            Credentials::User { user_id, groups } => {
                let mut principals = vec![
                    ANYONE.to_string(),
                    AUTHENTICATED.to_string(),
                    user_id.clone(),
                ];
                principals.extend(groups.iter().map(|g| format!("{GROUP_PREFIX}{g}")));
                principals
            }
        }
    }
}

/// Per-object access-control list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    /// Owning user. The owner holds every permission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Principals allowed to read.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub read: BTreeSet<String>,
    /// Principals allowed to read, update and delete.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub write: BTreeSet<String>,
    /// Principals allowed to update.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub update: BTreeSet<String>,
    /// Principals allowed to delete.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub delete: BTreeSet<String>,
    /// Principals allowed everything, including changing this list.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub admin: BTreeSet<String>,
}

impl Acl {
    /// An ACL owned by `user_id` with no other grants.
    pub fn owned_by(user_id: impl Into<String>) -> Self {
        Self {
            owner: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// An ACL that lets anyone read and write.
    pub fn public() -> Self {
        Self::default().grant_read(ANYONE).grant_write(ANYONE)
    }

    /// Grants read access.
    #[must_use]
    pub fn grant_read(mut self, principal: impl Into<String>) -> Self {
        self.read.insert(principal.into());
        self
    }

    /// Grants write access (read, update and delete).
    #[must_use]
    pub fn grant_write(mut self, principal: impl Into<String>) -> Self {
        self.write.insert(principal.into());
        self
    }

    /// Grants update access.
    #[must_use]
    pub fn grant_update(mut self, principal: impl Into<String>) -> Self {
        self.update.insert(principal.into());
        self
    }

    /// Grants delete access.
    #[must_use]
    pub fn grant_delete(mut self, principal: impl Into<String>) -> Self {
        self.delete.insert(principal.into());
        self
    }

    /// Grants admin access.
    #[must_use]
    pub fn grant_admin(mut self, principal: impl Into<String>) -> Self {
        self.admin.insert(principal.into());
        self
    }

    /// Removes a principal from every grant set. The owner is kept.
    pub fn revoke(&mut self, principal: &str) {
        for set in [
            &mut self.read,
            &mut self.write,
            &mut self.update,
            &mut self.delete,
            &mut self.admin,
        ] {
            set.remove(principal);
        }
    }

    /// Returns true if the caller may read the object.
    pub fn can_read(&self, credentials: &Credentials) -> bool {
        self.allows(credentials, [&self.read, &self.write, &self.admin])
    }

    /// Returns true if the caller may update the object.
    pub fn can_update(&self, credentials: &Credentials) -> bool {
        self.allows(credentials, [&self.write, &self.update, &self.admin])
    }

    /// Returns true if the caller may delete the object.
    pub fn can_delete(&self, credentials: &Credentials) -> bool {
        self.allows(credentials, [&self.write, &self.delete, &self.admin])
    }

    /// Returns true if the caller may change the ACL itself.
    pub fn can_admin(&self, credentials: &Credentials) -> bool {
        self.allows(credentials, [&self.admin])
    }

    fn allows<const N: usize>(&self, credentials: &Credentials, sets: [&BTreeSet<String>; N]) -> bool {
        if credentials.is_master() {
            return true;
        }
        if let (Some(owner), Some(user)) = (&self.owner, credentials.user_id()) {
            if owner == user {
                return true;
            }
        }
        let principals = credentials.principals();
        sets.iter()
            .any(|set| principals.iter().any(|p| set.contains(p)))
    }
}

/// A replicated JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Object {
    /// Identifier, unique within the bucket.
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Owning bucket.
    pub bucket: String,
    /// Document body.
    pub fields: Fields,
    /// Access-control list.
    #[serde(default)]
    pub acl: Acl,
    /// Server version token. Absent for objects never stored remotely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<ETag>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    #[serde(default)]
    pub deleted: bool,
}

impl Object {
    /// Creates a new, never-stored object timestamped now.
    pub fn new(bucket: impl Into<String>, id: ObjectId, fields: Fields) -> Self {
        let now = Utc::now();
        Self {
            id,
            bucket: bucket.into(),
            fields,
            acl: Acl::default(),
            etag: None,
            created_at: now,
            updated_at: now,
            deleted: false,
        }
    }

    /// Sets the ACL.
    #[must_use]
    pub fn with_acl(mut self, acl: Acl) -> Self {
        self.acl = acl;
        self
    }

    /// Resolves a field path for predicate evaluation and sorting.
    ///
    /// Reserved paths expose metadata: `_id`, `_createdAt` and `_updatedAt`
    /// (epoch milliseconds), `_deleted`, `_owner`. Anything else is looked
    /// up in the document body, with dots descending into nested objects.
    pub fn field_value(&self, path: &str) -> Option<Cow<'_, Value>> {
        match path {
            "_id" => Some(Cow::Owned(Value::String(self.id.to_string()))),
            "_createdAt" => Some(Cow::Owned(Value::Integer(
                self.created_at.timestamp_millis(),
            ))),
            "_updatedAt" => Some(Cow::Owned(Value::Integer(
                self.updated_at.timestamp_millis(),
            ))),
            "_deleted" => Some(Cow::Owned(Value::Bool(self.deleted))),
            "_owner" => self
                .acl
                .owner
                .as_ref()
                .map(|o| Cow::Owned(Value::String(o.clone()))),
            _ => self.fields.get_path(path).map(Cow::Borrowed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_holds_every_permission() {
        let acl = Acl::owned_by("alice");
        let alice = Credentials::user("alice");
        let bob = Credentials::user("bob");

        assert!(acl.can_read(&alice));
        assert!(acl.can_update(&alice));
        assert!(acl.can_delete(&alice));
        assert!(acl.can_admin(&alice));

        assert!(!acl.can_read(&bob));
        assert!(!acl.can_update(&bob));
    }

    #[test]
    fn write_implies_update_and_delete() {
        let acl = Acl::owned_by("alice").grant_write("bob");
        let bob = Credentials::user("bob");
        assert!(acl.can_read(&bob));
        assert!(acl.can_update(&bob));
        assert!(acl.can_delete(&bob));
        assert!(!acl.can_admin(&bob));
    }

    #[test]
    fn group_and_wildcard_principals() {
        let acl = Acl::default()
            .grant_read(AUTHENTICATED)
            .grant_update("group:editors");

        let carol = Credentials::user("carol").with_group("editors");
        assert!(acl.can_read(&carol));
        assert!(acl.can_update(&carol));

        assert!(!acl.can_read(&Credentials::Anonymous));

        let public = Acl::public();
        assert!(public.can_read(&Credentials::Anonymous));
        assert!(public.can_delete(&Credentials::Anonymous));
    }

    #[test]
    fn master_key_bypasses_acl() {
        let acl = Acl::owned_by("alice");
        assert!(acl.can_read(&Credentials::MasterKey));
        assert!(acl.can_update(&Credentials::MasterKey));
        assert!(acl.can_delete(&Credentials::MasterKey));
        assert!(acl.can_admin(&Credentials::MasterKey));
    }

    #[test]
    fn revoke_keeps_owner() {
        let mut acl = Acl::owned_by("alice").grant_write("bob");
        acl.revoke("bob");
        assert!(!acl.can_update(&Credentials::user("bob")));
        assert!(acl.can_update(&Credentials::user("alice")));
    }

    #[test]
    fn metadata_paths() {
        let mut object = Object::new(
            "notes",
            ObjectId::new("n1"),
            Fields::new().with("title", "hi"),
        )
        .with_acl(Acl::owned_by("alice"));
        object.deleted = true;

        assert_eq!(
            object.field_value("_id").unwrap().into_owned(),
            Value::from("n1")
        );
        assert_eq!(
            object.field_value("_updatedAt").unwrap().into_owned(),
            Value::Integer(object.updated_at.timestamp_millis())
        );
        assert_eq!(
            object.field_value("_deleted").unwrap().into_owned(),
            Value::Bool(true)
        );
        assert_eq!(
            object.field_value("_owner").unwrap().into_owned(),
            Value::from("alice")
        );
        assert_eq!(
            object.field_value("title").unwrap().into_owned(),
            Value::from("hi")
        );
        assert!(object.field_value("missing").is_none());
    }

    #[test]
    fn object_json_shape() {
        let object = Object::new("notes", ObjectId::new("n1"), Fields::new().with("a", 1i64));
        let json = serde_json::to_value(&object).unwrap();
        assert_eq!(json["_id"], "n1");
        assert_eq!(json["fields"]["a"], 1);
        assert!(json.get("etag").is_none());
        assert!(json.get("createdAt").is_some());

        let back: Object = serde_json::from_value(json).unwrap();
        assert_eq!(back, object);
    }
}
