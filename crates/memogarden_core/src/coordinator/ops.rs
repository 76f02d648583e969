//! Entity operations that record their own change facts.

use super::Coordinator;
use crate::error::CoreResult;
use crate::model::{DeltaOperation, Entity, EntityDelta, EntityKind, EntityUuid, NewEntity};
use crate::transaction::CrossStoreTransaction;
use crate::types::LockToken;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Outcome of [`Coordinator::supersede_entity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supersession {
    /// The replaced entity, now pointing at `replacement`.
    pub superseded: Entity,
    /// The newly created entity.
    pub replacement: Entity,
}

fn record(
    tx: &mut CrossStoreTransaction<'_>,
    operation: DeltaOperation,
    entity: &Entity,
) -> CoreResult<()> {
    let fact = EntityDelta::describe(operation, entity).into_fact()?;
    tx.insert_fact(fact)?;
    Ok(())
}

impl Coordinator {
    /// Creates an entity and records its creation.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot open, the payload is not
    /// an object, or the commit fails.
    pub fn create_entity(&self, new: NewEntity) -> CoreResult<Entity> {
        self.transaction(|tx| {
            let entity = tx.insert_entity(new)?;
            record(tx, DeltaOperation::Create, &entity)?;
            Ok(entity)
        })
    }

    /// Writes a new version of an entity and records the edit.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::OptimisticLockConflict`] if `based_on` is
    /// stale; nothing is written to either store.
    pub fn edit_entity(
        &self,
        uuid: EntityUuid,
        data: Value,
        based_on: LockToken,
    ) -> CoreResult<Entity> {
        self.transaction(|tx| {
            let entity = tx.update_entity(uuid, data, &based_on)?;
            record(tx, DeltaOperation::Edit, &entity)?;
            Ok(entity)
        })
    }

    /// Soft-deletes an entity and records it.
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::edit_entity`].
    pub fn forget_entity(&self, uuid: EntityUuid, based_on: LockToken) -> CoreResult<Entity> {
        self.transaction(|tx| {
            let entity = tx.forget_entity(uuid, &based_on)?;
            record(tx, DeltaOperation::Forget, &entity)?;
            Ok(entity)
        })
    }

    /// Replaces an entity with a new one.
    ///
    /// Both the creation of `replacement` and the supersession are recorded.
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::edit_entity`].
    pub fn supersede_entity(
        &self,
        uuid: EntityUuid,
        replacement: NewEntity,
        based_on: LockToken,
    ) -> CoreResult<Supersession> {
        self.transaction(|tx| {
            let replacement = tx.insert_entity(replacement)?;
            record(tx, DeltaOperation::Create, &replacement)?;
            let superseded = tx.supersede_entity(uuid, replacement.uuid, &based_on)?;
            record(tx, DeltaOperation::Supersede, &superseded)?;
            Ok(Supersession {
                superseded,
                replacement,
            })
        })
    }

    /// Deletes an entity by superseding it with a tombstone.
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::edit_entity`].
    pub fn delete_entity(&self, uuid: EntityUuid, based_on: LockToken) -> CoreResult<Supersession> {
        let tombstone = NewEntity::new(EntityKind::Tombstone, json!({ "replaces": uuid }));
        self.supersede_entity(uuid, tombstone, based_on)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::CoreError;
    use crate::model::{EntityDelta, EntityKind, FactKind, NewEntity};
    use crate::types::{LockToken, Version};
    use crate::Coordinator;
    use serde_json::json;

    fn coordinator() -> Coordinator {
        Coordinator::open(Config::default()).unwrap()
    }

    fn deltas(coord: &Coordinator, entity: &crate::model::Entity) -> Vec<EntityDelta> {
        coord
            .facts_for_entity(entity.uuid)
            .unwrap()
            .into_iter()
            .filter(|f| f.kind == FactKind::EntityDelta)
            .map(|f| serde_json::from_value(f.data).unwrap())
            .collect()
    }

    #[test]
    fn create_records_a_delta() {
        let coord = coordinator();
        let entity = coord
            .create_entity(NewEntity::new(EntityKind::Transaction, json!({"amount": 12.5})))
            .unwrap();
        let deltas = deltas(&coord, &entity);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].hash, entity.hash);
        assert_eq!(deltas[0].data, Some(json!({"amount": 12.5})));
    }

    #[test]
    fn edit_chains_and_records() {
        let coord = coordinator();
        let v1 = coord
            .create_entity(NewEntity::new("Note", json!({"text": "a"})))
            .unwrap();
        let v2 = coord
            .edit_entity(v1.uuid, json!({"text": "b"}), v1.lock_token())
            .unwrap();
        assert_eq!(v2.previous_hash, Some(v1.hash));
        assert_eq!(v2.version, Version::new(2));
        assert_eq!(deltas(&coord, &v1).len(), 2);
        assert!(coord.verify_entity_chain(v1.uuid).unwrap());
    }

    #[test]
    fn stale_edit_writes_nothing() {
        let coord = coordinator();
        let v1 = coord.create_entity(NewEntity::new("Note", json!({"n": 1}))).unwrap();
        coord
            .edit_entity(v1.uuid, json!({"n": 2}), v1.lock_token())
            .unwrap();

        let err = coord
            .edit_entity(v1.uuid, json!({"n": 3}), v1.lock_token())
            .unwrap_err();
        assert!(matches!(err, CoreError::OptimisticLockConflict { .. }));
        assert_eq!(deltas(&coord, &v1).len(), 2);
        assert_eq!(coord.get_entity(v1.uuid).unwrap().unwrap().data, json!({"n": 2}));
    }

    #[test]
    fn forget_keeps_history() {
        let coord = coordinator();
        let v1 = coord.create_entity(NewEntity::new("Note", json!({}))).unwrap();
        let forgotten = coord
            .forget_entity(v1.uuid, LockToken::Version(v1.version))
            .unwrap();
        assert!(!forgotten.active);
        assert_eq!(forgotten.hash, v1.hash);
        assert_eq!(coord.entity_history(v1.uuid).unwrap().len(), 1);
    }

    #[test]
    fn delete_supersedes_with_tombstone() {
        let coord = coordinator();
        let original = coord.create_entity(NewEntity::new("Recurrence", json!({}))).unwrap();
        let outcome = coord.delete_entity(original.uuid, original.lock_token()).unwrap();

        assert_eq!(outcome.replacement.kind, EntityKind::Tombstone);
        assert_eq!(outcome.superseded.superseded_by, Some(outcome.replacement.uuid));
        assert!(coord.get_entity(original.uuid).unwrap().unwrap().is_superseded());
        assert!(coord.check_consistency().unwrap().is_clean());

        let err = coord
            .edit_entity(original.uuid, json!({}), outcome.superseded.lock_token())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }
}
