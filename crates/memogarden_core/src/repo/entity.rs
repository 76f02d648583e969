//! Entity repository.

use super::codec::{decode_hash, decode_json, encode_json, from_sql_version, to_sql_version};
use crate::error::{CoreError, CoreResult};
use crate::hash::compute_hash;
use crate::model::payload::ensure_object;
use crate::model::{Entity, EntityUuid, EntityVersion, NewEntity};
use crate::types::{LockToken, Timestamp, Version};
use memogarden_storage::rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::collections::HashSet;

const ENTITY_COLUMNS: &str = "uuid, type, data, version, hash, previous_hash, active, \
                              superseded_by, superseded_at, created_at, updated_at";

/// Raw `entities` row.
struct EntityRow {
    uuid: String,
    kind: String,
    data: String,
    version: i64,
    hash: String,
    previous_hash: Option<String>,
    active: bool,
    superseded_by: Option<String>,
    superseded_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl EntityRow {
    fn from_row(row: &Row<'_>) -> memogarden_storage::rusqlite::Result<Self> {
        Ok(Self {
            uuid: row.get(0)?,
            kind: row.get(1)?,
            data: row.get(2)?,
            version: row.get(3)?,
            hash: row.get(4)?,
            previous_hash: row.get(5)?,
            active: row.get::<_, i64>(6)? != 0,
            superseded_by: row.get(7)?,
            superseded_at: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_entity(self) -> CoreResult<Entity> {
        Ok(Entity {
            uuid: EntityUuid::parse(&self.uuid)?,
            kind: self.kind.into(),
            data: decode_json(&self.data)?,
            version: from_sql_version(self.version)?,
            hash: decode_hash(&self.hash)?,
            previous_hash: self.previous_hash.as_deref().map(decode_hash).transpose()?,
            active: self.active,
            superseded_by: self
                .superseded_by
                .as_deref()
                .map(EntityUuid::parse)
                .transpose()?,
            superseded_at: self.superseded_at.map(Timestamp::from_millis),
            created_at: Timestamp::from_millis(self.created_at),
            updated_at: Timestamp::from_millis(self.updated_at),
        })
    }
}

/// Raw `entity_versions` row.
struct VersionRow {
    uuid: String,
    version: i64,
    data: String,
    hash: String,
    previous_hash: Option<String>,
    recorded_at: i64,
}

impl VersionRow {
    fn from_row(row: &Row<'_>) -> memogarden_storage::rusqlite::Result<Self> {
        Ok(Self {
            uuid: row.get(0)?,
            version: row.get(1)?,
            data: row.get(2)?,
            hash: row.get(3)?,
            previous_hash: row.get(4)?,
            recorded_at: row.get(5)?,
        })
    }

    fn into_version(self) -> CoreResult<EntityVersion> {
        Ok(EntityVersion {
            uuid: EntityUuid::parse(&self.uuid)?,
            version: from_sql_version(self.version)?,
            data: decode_json(&self.data)?,
            hash: decode_hash(&self.hash)?,
            previous_hash: self.previous_hash.as_deref().map(decode_hash).transpose()?,
            recorded_at: Timestamp::from_millis(self.recorded_at),
        })
    }
}

/// Entity reads and writes against a Core store connection.
///
/// Writes assume the caller holds an exclusive transaction on the
/// connection; the repository never begins or ends one itself.
pub struct EntityRepo<'c> {
    conn: &'c Connection,
}

impl<'c> EntityRepo<'c> {
    /// Wraps a Core store connection.
    #[must_use]
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Reads the current state of an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the row is malformed.
    pub fn get(&self, uuid: EntityUuid) -> CoreResult<Option<Entity>> {
        let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE uuid = ?1");
        self.conn
            .query_row(&sql, params![uuid.to_string()], EntityRow::from_row)
            .optional()?
            .map(EntityRow::into_entity)
            .transpose()
    }

    /// Reads an entity that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntityNotFound`] if it does not.
    pub fn require(&self, uuid: EntityUuid) -> CoreResult<Entity> {
        self.get(uuid)?.ok_or(CoreError::EntityNotFound { uuid })
    }

    /// Returns which of `uuids` exist, in a single query.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn exists_many(&self, uuids: &[EntityUuid]) -> CoreResult<HashSet<EntityUuid>> {
        if uuids.is_empty() {
            return Ok(HashSet::new());
        }
        let placeholders = vec!["?"; uuids.len()].join(", ");
        let sql = format!("SELECT uuid FROM entities WHERE uuid IN ({placeholders})");
        let mut stmt = self.conn.prepare(&sql)?;
        let found = stmt
            .query_map(params_from_iter(uuids.iter().map(ToString::to_string)), |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        found.iter().map(|s| EntityUuid::parse(s)).collect()
    }

    /// Writes version 1 of a new entity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if the payload is not an object,
    /// or [`CoreError::InvalidOperation`] if the UUID is already taken.
    pub fn insert(&self, new: NewEntity, now: Timestamp) -> CoreResult<Entity> {
        ensure_object(&new.data)?;
        let uuid = new.uuid.unwrap_or_default();
        if self.get(uuid)?.is_some() {
            return Err(CoreError::invalid_operation(format!(
                "entity {uuid} already exists"
            )));
        }

        let entity = Entity {
            uuid,
            kind: new.kind,
            hash: compute_hash(&new.data, None),
            data: new.data,
            version: Version::FIRST,
            previous_hash: None,
            active: true,
            superseded_by: None,
            superseded_at: None,
            created_at: now,
            updated_at: now,
        };

        let data = encode_json(&entity.data)?;
        self.conn.execute(
            &format!(
                "INSERT INTO entities ({ENTITY_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, 1, NULL, NULL, ?6, ?6)"
            ),
            params![
                uuid.to_string(),
                entity.kind.as_str(),
                data,
                to_sql_version(entity.version),
                entity.hash.to_hex(),
                now.as_millis(),
            ],
        )?;
        self.record_version(&entity, &data)?;
        Ok(entity)
    }

    /// Writes a new version of an entity.
    ///
    /// The current hash and version are re-read here, inside the caller's
    /// transaction; a stale `based_on` is rejected without writing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OptimisticLockConflict`] on a stale token,
    /// [`CoreError::EntityNotFound`] for an unknown UUID, and
    /// [`CoreError::InvalidOperation`] for forgotten or superseded entities.
    pub fn update(
        &self,
        uuid: EntityUuid,
        data: Value,
        based_on: &LockToken,
        now: Timestamp,
    ) -> CoreResult<Entity> {
        ensure_object(&data)?;
        let current = self.require_writable(uuid, based_on)?;

        let previous_hash = current.hash;
        let hash = compute_hash(&data, Some(&previous_hash));
        let version = current.version.next();
        let encoded = encode_json(&data)?;

        let changed = self.conn.execute(
            "UPDATE entities
             SET data = ?1, version = ?2, hash = ?3, previous_hash = ?4, updated_at = ?5
             WHERE uuid = ?6 AND hash = ?7",
            params![
                encoded,
                to_sql_version(version),
                hash.to_hex(),
                previous_hash.to_hex(),
                now.as_millis(),
                uuid.to_string(),
                previous_hash.to_hex(),
            ],
        )?;
        if changed != 1 {
            return Err(CoreError::transaction_aborted(format!(
                "entity {uuid} changed underneath an exclusive transaction"
            )));
        }

        let entity = Entity {
            data,
            version,
            hash,
            previous_hash: Some(previous_hash),
            updated_at: now,
            ..current
        };
        self.record_version(&entity, &encoded)?;
        Ok(entity)
    }

    /// Soft-deletes an entity.
    ///
    /// The hash and history are left untouched.
    ///
    /// # Errors
    ///
    /// Same as [`EntityRepo::update`].
    pub fn forget(
        &self,
        uuid: EntityUuid,
        based_on: &LockToken,
        now: Timestamp,
    ) -> CoreResult<Entity> {
        let current = self.require_writable(uuid, based_on)?;
        self.conn.execute(
            "UPDATE entities SET active = 0, updated_at = ?1 WHERE uuid = ?2",
            params![now.as_millis(), uuid.to_string()],
        )?;
        Ok(Entity {
            active: false,
            updated_at: now,
            ..current
        })
    }

    /// Marks an entity as replaced by `by`.
    ///
    /// # Errors
    ///
    /// Same as [`EntityRepo::update`]; `by` must also exist.
    pub fn supersede(
        &self,
        uuid: EntityUuid,
        by: EntityUuid,
        based_on: &LockToken,
        now: Timestamp,
    ) -> CoreResult<Entity> {
        if uuid == by {
            return Err(CoreError::invalid_operation(format!(
                "entity {uuid} cannot supersede itself"
            )));
        }
        let current = self.require_writable(uuid, based_on)?;
        self.require(by)?;
        self.conn.execute(
            "UPDATE entities SET superseded_by = ?1, superseded_at = ?2, updated_at = ?2
             WHERE uuid = ?3",
            params![by.to_string(), now.as_millis(), uuid.to_string()],
        )?;
        Ok(Entity {
            superseded_by: Some(by),
            superseded_at: Some(now),
            updated_at: now,
            ..current
        })
    }

    /// Returns every recorded version of an entity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or a row is malformed.
    pub fn history(&self, uuid: EntityUuid) -> CoreResult<Vec<EntityVersion>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, version, data, hash, previous_hash, recorded_at
             FROM entity_versions WHERE uuid = ?1 ORDER BY version ASC",
        )?;
        let rows = stmt
            .query_map(params![uuid.to_string()], VersionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(VersionRow::into_version).collect()
    }

    /// Returns every entity UUID, in storage order.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn all_uuids(&self) -> CoreResult<Vec<EntityUuid>> {
        let mut stmt = self.conn.prepare("SELECT uuid FROM entities ORDER BY uuid")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter().map(|s| EntityUuid::parse(s)).collect()
    }

    /// Counts entities.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn count(&self) -> CoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    fn require_writable(&self, uuid: EntityUuid, based_on: &LockToken) -> CoreResult<Entity> {
        let current = self.require(uuid)?;
        if !current.active {
            return Err(CoreError::invalid_operation(format!(
                "entity {uuid} has been forgotten"
            )));
        }
        if let Some(by) = current.superseded_by {
            return Err(CoreError::invalid_operation(format!(
                "entity {uuid} was superseded by {by}"
            )));
        }
        if !based_on.matches(&current.hash, current.version) {
            return Err(CoreError::OptimisticLockConflict {
                uuid,
                based_on: *based_on,
                current_hash: current.hash,
                current_version: current.version,
            });
        }
        Ok(current)
    }

    fn record_version(&self, entity: &Entity, encoded: &str) -> CoreResult<()> {
        self.conn.execute(
            "INSERT INTO entity_versions (uuid, version, data, hash, previous_hash, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entity.uuid.to_string(),
                to_sql_version(entity.version),
                encoded,
                entity.hash.to_hex(),
                entity.previous_hash.map(|h| h.to_hex()),
                entity.updated_at.as_millis(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::verify_chain;
    use crate::model::EntityKind;
    use crate::repo::schema::CORE_SCHEMA;
    use serde_json::json;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CORE_SCHEMA).unwrap();
        conn
    }

    fn now() -> Timestamp {
        Timestamp::from_millis(1_700_000_000_000)
    }

    #[test]
    fn insert_starts_chain() {
        let conn = conn();
        let repo = EntityRepo::new(&conn);
        let entity = repo
            .insert(NewEntity::new(EntityKind::Transaction, json!({"amount": 5})), now())
            .unwrap();
        assert_eq!(entity.version, Version::FIRST);
        assert!(entity.previous_hash.is_none());
        assert_eq!(repo.get(entity.uuid).unwrap(), Some(entity.clone()));
        assert_eq!(repo.history(entity.uuid).unwrap().len(), 1);
    }

    #[test]
    fn insert_rejects_non_object_and_duplicates() {
        let conn = conn();
        let repo = EntityRepo::new(&conn);
        assert!(matches!(
            repo.insert(NewEntity::new("Note", json!("text")), now()),
            Err(CoreError::InvalidInput { .. })
        ));
        let first = repo.insert(NewEntity::new("Note", json!({})), now()).unwrap();
        let again = NewEntity::new("Note", json!({})).with_uuid(first.uuid);
        assert!(matches!(
            repo.insert(again, now()),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn update_links_to_previous_hash() {
        let conn = conn();
        let repo = EntityRepo::new(&conn);
        let v1 = repo.insert(NewEntity::new("Note", json!({"n": 1})), now()).unwrap();
        let v2 = repo
            .update(v1.uuid, json!({"n": 2}), &v1.lock_token(), now())
            .unwrap();
        assert_eq!(v2.version.as_u64(), 2);
        assert_eq!(v2.previous_hash, Some(v1.hash));
        assert_eq!(repo.get(v1.uuid).unwrap(), Some(v2));
        assert!(verify_chain(&repo.history(v1.uuid).unwrap()));
    }

    #[test]
    fn stale_hash_conflicts_without_writing() {
        let conn = conn();
        let repo = EntityRepo::new(&conn);
        let v1 = repo.insert(NewEntity::new("Note", json!({"n": 1})), now()).unwrap();
        let v2 = repo
            .update(v1.uuid, json!({"n": 2}), &v1.lock_token(), now())
            .unwrap();
        let err = repo
            .update(v1.uuid, json!({"n": 3}), &v1.lock_token(), now())
            .unwrap_err();
        match err {
            CoreError::OptimisticLockConflict {
                current_hash,
                current_version,
                ..
            } => {
                assert_eq!(current_hash, v2.hash);
                assert_eq!(current_version.as_u64(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(repo.get(v1.uuid).unwrap(), Some(v2));
        assert_eq!(repo.history(v1.uuid).unwrap().len(), 2);
    }

    #[test]
    fn version_token_is_accepted() {
        let conn = conn();
        let repo = EntityRepo::new(&conn);
        let v1 = repo.insert(NewEntity::new("Note", json!({})), now()).unwrap();
        let token = LockToken::Version(Version::FIRST);
        assert!(repo.update(v1.uuid, json!({"a": 1}), &token, now()).is_ok());
        assert!(repo.update(v1.uuid, json!({"a": 2}), &token, now()).is_err());
    }

    #[test]
    fn forgotten_entities_reject_edits() {
        let conn = conn();
        let repo = EntityRepo::new(&conn);
        let v1 = repo.insert(NewEntity::new("Note", json!({})), now()).unwrap();
        let forgotten = repo.forget(v1.uuid, &v1.lock_token(), now()).unwrap();
        assert!(!forgotten.active);
        assert_eq!(forgotten.hash, v1.hash);
        assert!(matches!(
            repo.update(v1.uuid, json!({"a": 1}), &v1.lock_token(), now()),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn supersede_records_replacement() {
        let conn = conn();
        let repo = EntityRepo::new(&conn);
        let old = repo.insert(NewEntity::new("Note", json!({})), now()).unwrap();
        let new = repo.insert(NewEntity::new("Tombstone", json!({})), now()).unwrap();
        let superseded = repo
            .supersede(old.uuid, new.uuid, &old.lock_token(), now())
            .unwrap();
        assert_eq!(superseded.superseded_by, Some(new.uuid));
        assert!(repo.get(old.uuid).unwrap().unwrap().is_superseded());
        assert!(repo
            .supersede(old.uuid, new.uuid, &old.lock_token(), now())
            .is_err());
    }

    #[test]
    fn exists_many_returns_present_subset() {
        let conn = conn();
        let repo = EntityRepo::new(&conn);
        let a = repo.insert(NewEntity::new("Note", json!({})), now()).unwrap();
        let missing = EntityUuid::new();
        let found = repo.exists_many(&[a.uuid, missing]).unwrap();
        assert!(found.contains(&a.uuid));
        assert!(!found.contains(&missing));
        assert!(repo.exists_many(&[]).unwrap().is_empty());
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn missing_entity_is_not_found() {
        let conn = conn();
        let repo = EntityRepo::new(&conn);
        let uuid = EntityUuid::new();
        assert!(matches!(
            repo.update(uuid, json!({}), &LockToken::Version(Version::FIRST), now()),
            Err(CoreError::EntityNotFound { .. })
        ));
    }
}
