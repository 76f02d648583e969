//! Fact repository.

use super::codec::{decode_json, encode_json};
use crate::error::{CoreError, CoreResult};
use crate::model::payload::ensure_object;
use crate::model::{EntityUuid, Fact, FactUuid, NewFact, OWNER_KEY};
use crate::types::Timestamp;
use memogarden_storage::rusqlite::{params, Connection, OptionalExtension, Row};

const FACT_COLUMNS: &str = "uuid, type, data, metadata, realized_at, canonical_at, supersedes";

struct FactRow {
    uuid: String,
    kind: String,
    data: String,
    metadata: Option<String>,
    realized_at: i64,
    canonical_at: i64,
    supersedes: Option<String>,
}

impl FactRow {
    fn from_row(row: &Row<'_>) -> memogarden_storage::rusqlite::Result<Self> {
        Ok(Self {
            uuid: row.get(0)?,
            kind: row.get(1)?,
            data: row.get(2)?,
            metadata: row.get(3)?,
            realized_at: row.get(4)?,
            canonical_at: row.get(5)?,
            supersedes: row.get(6)?,
        })
    }

    fn into_fact(self) -> CoreResult<Fact> {
        Ok(Fact {
            uuid: FactUuid::parse(&self.uuid)?,
            kind: self.kind.into(),
            data: decode_json(&self.data)?,
            metadata: self.metadata.as_deref().map(decode_json).transpose()?,
            realized_at: Timestamp::from_millis(self.realized_at),
            canonical_at: Timestamp::from_millis(self.canonical_at),
            supersedes: self.supersedes.as_deref().map(FactUuid::parse).transpose()?,
        })
    }
}

/// A fact's declared owner, as stored.
///
/// The reference is kept raw so malformed values can still be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerReference {
    /// The declaring fact.
    pub fact_uuid: FactUuid,
    /// The `entity_uuid` metadata value.
    pub entity_reference: String,
}

/// Append-only fact access against a Soil store connection.
pub struct FactRepo<'c> {
    conn: &'c Connection,
}

impl<'c> FactRepo<'c> {
    /// Wraps a Soil store connection.
    #[must_use]
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Appends a fact.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for non-object data or metadata,
    /// [`CoreError::FactNotFound`] if `supersedes` names an unknown fact, and
    /// [`CoreError::InvalidOperation`] if the UUID is already taken.
    pub fn insert(&self, new: NewFact, now: Timestamp) -> CoreResult<Fact> {
        ensure_object(&new.data)?;
        if let Some(metadata) = &new.metadata {
            ensure_object(metadata)?;
        }
        let uuid = new.uuid.unwrap_or_default();
        if self.get(uuid)?.is_some() {
            return Err(CoreError::invalid_operation(format!("fact {uuid} already exists")));
        }
        if let Some(earlier) = new.supersedes {
            if self.get(earlier)?.is_none() {
                return Err(CoreError::FactNotFound { uuid: earlier });
            }
        }

        let fact = Fact {
            uuid,
            kind: new.kind,
            data: new.data,
            metadata: new.metadata,
            realized_at: now,
            canonical_at: new.canonical_at.unwrap_or(now),
            supersedes: new.supersedes,
        };
        self.conn.execute(
            &format!("INSERT INTO facts ({FACT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                uuid.to_string(),
                fact.kind.as_str(),
                encode_json(&fact.data)?,
                fact.metadata.as_ref().map(encode_json).transpose()?,
                fact.realized_at.as_millis(),
                fact.canonical_at.as_millis(),
                fact.supersedes.map(|s| s.to_string()),
            ],
        )?;
        Ok(fact)
    }

    /// Reads a fact.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the row is malformed.
    pub fn get(&self, uuid: FactUuid) -> CoreResult<Option<Fact>> {
        let sql = format!("SELECT {FACT_COLUMNS} FROM facts WHERE uuid = ?1");
        self.conn
            .query_row(&sql, params![uuid.to_string()], FactRow::from_row)
            .optional()?
            .map(FactRow::into_fact)
            .transpose()
    }

    /// Returns every fact declaring `entity` as its owner, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn owned_by(&self, entity: EntityUuid) -> CoreResult<Vec<Fact>> {
        let sql = format!(
            "SELECT {FACT_COLUMNS} FROM facts
             WHERE json_extract(metadata, '$.{OWNER_KEY}') IN (?1, ?2)
             ORDER BY realized_at ASC, rowid ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![entity.to_string(), entity.prefixed()],
                FactRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(FactRow::into_fact).collect()
    }

    /// Returns every fact that declares an owner, with the raw reference.
    ///
    /// Follows [`Fact::owner_reference`]: any non-null value is declared,
    /// and non-string values are reported as their JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn owner_references(&self) -> CoreResult<Vec<OwnerReference>> {
        let sql = format!(
            "SELECT uuid,
                    CASE json_type(metadata, '$.{OWNER_KEY}')
                        WHEN 'true' THEN 'true'
                        WHEN 'false' THEN 'false'
                        ELSE CAST(json_extract(metadata, '$.{OWNER_KEY}') AS TEXT)
                    END
             FROM facts
             WHERE json_type(metadata, '$.{OWNER_KEY}') <> 'null'
             ORDER BY rowid ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(fact, reference)| {
                Ok(OwnerReference {
                    fact_uuid: FactUuid::parse(&fact)?,
                    entity_reference: reference,
                })
            })
            .collect()
    }

    /// Returns the highest rowid in the facts table, or 0 when empty.
    ///
    /// Facts cannot be deleted, so every later append lands above it.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn high_water_mark(&self) -> CoreResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COALESCE(MAX(rowid), 0) FROM facts", [], |row| row.get(0))?)
    }

    /// Returns the facts appended after `mark`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn appended_since(&self, mark: i64) -> CoreResult<Vec<FactUuid>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid FROM facts WHERE rowid > ?1 ORDER BY rowid ASC")?;
        let rows = stmt
            .query_map(params![mark], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter().map(|uuid| FactUuid::parse(uuid)).collect()
    }

    /// Counts facts.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn count(&self) -> CoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM facts", [], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}
