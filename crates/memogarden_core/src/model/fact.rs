//! Fact records.

use crate::error::CoreResult;
use crate::model::{Entity, EntityKind, EntityUuid, FactKind, FactUuid};
use crate::types::{ContentHash, Timestamp, Version};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Metadata key through which a fact declares its owning entity.
pub const OWNER_KEY: &str = "entity_uuid";

/// An immutable observation in the Soil store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Immutable identifier.
    pub uuid: FactUuid,
    /// Type tag.
    #[serde(rename = "type")]
    pub kind: FactKind,
    /// Observation payload.
    pub data: Value,
    /// Optional metadata, including the owning entity reference.
    pub metadata: Option<Value>,
    /// When the system recorded the fact.
    pub realized_at: Timestamp,
    /// User/domain time the fact refers to.
    pub canonical_at: Timestamp,
    /// Earlier fact this one corrects.
    pub supersedes: Option<FactUuid>,
}

impl Fact {
    /// Returns the raw owner reference declared in metadata, if any.
    ///
    /// Any non-null value counts as declared. Strings are returned as is;
    /// other values as compact JSON, so `42` reads `"42"`.
    #[must_use]
    pub fn owner_reference(&self) -> Option<Cow<'_, str>> {
        match self.metadata.as_ref()?.get(OWNER_KEY)? {
            Value::Null => None,
            Value::String(s) => Some(Cow::Borrowed(s)),
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    /// Returns the owning entity, if declared and well-formed.
    #[must_use]
    pub fn owner(&self) -> Option<EntityUuid> {
        self.owner_reference()
            .and_then(|s| EntityUuid::parse(&s).ok())
    }
}

/// A fact to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFact {
    /// Identifier to use; generated when `None`.
    pub uuid: Option<FactUuid>,
    /// Type tag.
    pub kind: FactKind,
    /// Observation payload.
    pub data: Value,
    /// Optional metadata object.
    pub metadata: Option<Value>,
    /// Domain time; defaults to the realization time.
    pub canonical_at: Option<Timestamp>,
    /// Earlier fact this one corrects.
    pub supersedes: Option<FactUuid>,
}

impl NewFact {
    /// Creates a fact description with a generated identifier.
    pub fn new(kind: impl Into<FactKind>, data: Value) -> Self {
        Self {
            uuid: None,
            kind: kind.into(),
            data,
            metadata: None,
            canonical_at: None,
            supersedes: None,
        }
    }

    /// Uses a caller-chosen identifier.
    #[must_use]
    pub fn with_uuid(mut self, uuid: FactUuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    /// Declares the entity this fact belongs to.
    ///
    /// Merges `entity_uuid` into existing object metadata.
    #[must_use]
    pub fn owned_by(mut self, entity: EntityUuid) -> Self {
        let mut map = match self.metadata.take() {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        map.insert(OWNER_KEY.to_string(), Value::String(entity.to_string()));
        self.metadata = Some(Value::Object(map));
        self
    }

    /// Sets metadata, replacing any existing value.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the domain time.
    #[must_use]
    pub fn canonical_at(mut self, at: Timestamp) -> Self {
        self.canonical_at = Some(at);
        self
    }

    /// Marks this fact as a correction of `earlier`.
    #[must_use]
    pub fn supersedes(mut self, earlier: FactUuid) -> Self {
        self.supersedes = Some(earlier);
        self
    }
}

/// What happened to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaOperation {
    /// Version 1 was written.
    Create,
    /// A new version was written.
    Edit,
    /// The entity was soft-deleted.
    Forget,
    /// The entity was replaced by another.
    Supersede,
}

/// Payload of an [`FactKind::EntityDelta`] fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDelta {
    /// The changed entity.
    pub entity_uuid: EntityUuid,
    /// Its type tag.
    pub entity_type: EntityKind,
    /// The change.
    pub operation: DeltaOperation,
    /// Version after the change.
    pub version: Version,
    /// Hash after the change.
    pub hash: ContentHash,
    /// Hash before the change.
    pub previous_hash: Option<ContentHash>,
    /// Payload after the change, for creates and edits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Replacement entity, for supersedes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<EntityUuid>,
}

impl EntityDelta {
    /// Describes `operation` as applied to `entity`.
    #[must_use]
    pub fn describe(operation: DeltaOperation, entity: &Entity) -> Self {
        let data = matches!(operation, DeltaOperation::Create | DeltaOperation::Edit)
            .then(|| entity.data.clone());
        Self {
            entity_uuid: entity.uuid,
            entity_type: entity.kind.clone(),
            operation,
            version: entity.version,
            hash: entity.hash,
            previous_hash: entity.previous_hash,
            data,
            superseded_by: entity.superseded_by,
        }
    }

    /// Builds the change-record fact, owned by the changed entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the delta cannot be serialized.
    pub fn into_fact(self) -> CoreResult<NewFact> {
        let owner = self.entity_uuid;
        let data = serde_json::to_value(&self)?;
        Ok(NewFact::new(FactKind::EntityDelta, data).owned_by(owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn owned_by_merges_metadata() {
        let entity = EntityUuid::new();
        let fact = NewFact::new(FactKind::Note, json!({"text": "hi"}))
            .with_metadata(json!({"source": "import"}))
            .owned_by(entity);
        let metadata = fact.metadata.unwrap();
        assert_eq!(metadata["source"], "import");
        assert_eq!(metadata[OWNER_KEY], entity.to_string());
    }

    #[test]
    fn owner_parses_prefixed_reference() {
        let entity = EntityUuid::new();
        let fact = Fact {
            uuid: FactUuid::new(),
            kind: FactKind::Note,
            data: json!({}),
            metadata: Some(json!({ OWNER_KEY: entity.prefixed() })),
            realized_at: Timestamp::from_millis(1),
            canonical_at: Timestamp::from_millis(1),
            supersedes: None,
        };
        assert_eq!(fact.owner(), Some(entity));
    }

    #[test]
    fn owner_absent_without_metadata() {
        let fact = Fact {
            uuid: FactUuid::new(),
            kind: FactKind::Email,
            data: json!({}),
            metadata: None,
            realized_at: Timestamp::from_millis(1),
            canonical_at: Timestamp::from_millis(1),
            supersedes: None,
        };
        assert!(fact.owner_reference().is_none());
    }
}
