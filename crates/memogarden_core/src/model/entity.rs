//! Entity records.

use crate::hash::ChainRecord;
use crate::model::{EntityKind, EntityUuid};
use crate::types::{ContentHash, LockToken, Timestamp, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current state of an entity in the Core store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Immutable identifier.
    pub uuid: EntityUuid,
    /// Type tag.
    #[serde(rename = "type")]
    pub kind: EntityKind,
    /// Schema-flexible payload; always a JSON object.
    pub data: Value,
    /// Monotonic version counter, starting at 1.
    pub version: Version,
    /// `digest(canonical(data) ++ previous_hash)`.
    pub hash: ContentHash,
    /// Hash of the version this one follows; `None` only for version 1.
    pub previous_hash: Option<ContentHash>,
    /// False once the entity has been forgotten.
    pub active: bool,
    /// Replacement entity, if this one was superseded.
    pub superseded_by: Option<EntityUuid>,
    /// When the entity was superseded.
    pub superseded_at: Option<Timestamp>,
    /// When version 1 was written.
    pub created_at: Timestamp,
    /// When the latest change was written.
    pub updated_at: Timestamp,
}

impl Entity {
    /// Returns a lock token for editing the entity as currently read.
    #[must_use]
    pub fn lock_token(&self) -> LockToken {
        LockToken::Hash(self.hash)
    }

    /// Returns true if the entity was superseded.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.superseded_by.is_some()
    }
}

/// One historical version of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityVersion {
    /// Entity the version belongs to.
    pub uuid: EntityUuid,
    /// Version number.
    pub version: Version,
    /// Payload at this version.
    pub data: Value,
    /// Hash of this version.
    pub hash: ContentHash,
    /// Hash of the preceding version.
    pub previous_hash: Option<ContentHash>,
    /// When the version was written.
    pub recorded_at: Timestamp,
}

impl ChainRecord for EntityVersion {
    fn hash(&self) -> &ContentHash {
        &self.hash
    }

    fn previous_hash(&self) -> Option<&ContentHash> {
        self.previous_hash.as_ref()
    }

    fn data(&self) -> &Value {
        &self.data
    }
}

/// An entity to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    /// Identifier to use; generated when `None`.
    pub uuid: Option<EntityUuid>,
    /// Type tag.
    pub kind: EntityKind,
    /// Initial payload; must be a JSON object.
    pub data: Value,
}

impl NewEntity {
    /// Creates an entity description with a generated identifier.
    pub fn new(kind: impl Into<EntityKind>, data: Value) -> Self {
        Self {
            uuid: None,
            kind: kind.into(),
            data,
        }
    }

    /// Uses a caller-chosen identifier.
    #[must_use]
    pub fn with_uuid(mut self, uuid: EntityUuid) -> Self {
        self.uuid = Some(uuid);
        self
    }
}
