//! Store schemas.

use crate::error::CoreResult;
use memogarden_storage::{Store, StoreKind};

/// Schema of the Soil (facts) store.
///
/// Facts are append-only: triggers abort every UPDATE and DELETE.
pub const SOIL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS facts (
    uuid         TEXT PRIMARY KEY NOT NULL,
    type         TEXT NOT NULL,
    data         TEXT NOT NULL,
    metadata     TEXT,
    realized_at  INTEGER NOT NULL,
    canonical_at INTEGER NOT NULL,
    supersedes   TEXT
);

CREATE INDEX IF NOT EXISTS idx_facts_owner
    ON facts (json_extract(metadata, '$.entity_uuid'));

CREATE INDEX IF NOT EXISTS idx_facts_type ON facts (type);

CREATE TRIGGER IF NOT EXISTS facts_no_update
BEFORE UPDATE ON facts
BEGIN
    SELECT RAISE(ABORT, 'facts are immutable');
END;

CREATE TRIGGER IF NOT EXISTS facts_no_delete
BEFORE DELETE ON facts
BEGIN
    SELECT RAISE(ABORT, 'facts are immutable');
END;
"#;

/// Schema of the Core (entities) store.
///
/// `entities` holds the current state; `entity_versions` holds every
/// version ever written and is what the chain scan walks.
pub const CORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    uuid          TEXT PRIMARY KEY NOT NULL,
    type          TEXT NOT NULL,
    data          TEXT NOT NULL,
    version       INTEGER NOT NULL CHECK (version >= 1),
    hash          TEXT NOT NULL,
    previous_hash TEXT,
    active        INTEGER NOT NULL DEFAULT 1,
    superseded_by TEXT,
    superseded_at INTEGER,
    created_at    INTEGER NOT NULL,
    updated_at    INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entities_type ON entities (type);

CREATE TABLE IF NOT EXISTS entity_versions (
    uuid          TEXT NOT NULL,
    version       INTEGER NOT NULL,
    data          TEXT NOT NULL,
    hash          TEXT NOT NULL,
    previous_hash TEXT,
    recorded_at   INTEGER NOT NULL,
    PRIMARY KEY (uuid, version)
);
"#;

/// Returns the schema for a store kind.
#[must_use]
pub fn schema_for(kind: StoreKind) -> &'static str {
    match kind {
        StoreKind::Soil => SOIL_SCHEMA,
        StoreKind::Core => CORE_SCHEMA,
    }
}

/// Creates any missing tables, indexes and triggers.
///
/// # Errors
///
/// Returns an error if the schema cannot be applied.
pub fn ensure_schema(store: &Store) -> CoreResult<()> {
    store.apply_schema(schema_for(store.kind()))?;
    tracing::debug!(store = %store.kind(), "schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use memogarden_storage::StoreOptions;

    #[test]
    fn schema_is_idempotent() {
        for kind in [StoreKind::Soil, StoreKind::Core] {
            let store = Store::open_in_memory(kind, StoreOptions::default()).unwrap();
            ensure_schema(&store).unwrap();
            ensure_schema(&store).unwrap();
        }
    }

    #[test]
    fn facts_reject_update_and_delete() {
        let store = Store::open_in_memory(StoreKind::Soil, StoreOptions::default()).unwrap();
        ensure_schema(&store).unwrap();
        store
            .read(|conn| -> CoreResult<()> {
                conn.execute(
                    "INSERT INTO facts (uuid, type, data, realized_at, canonical_at)
                     VALUES ('f', 'Note', '{}', 1, 1)",
                    [],
                )?;
                let update = conn.execute("UPDATE facts SET type = 'Email'", []);
                assert!(update.unwrap_err().to_string().contains("immutable"));
                let delete = conn.execute("DELETE FROM facts", []);
                assert!(delete.is_err());
                Ok(())
            })
            .unwrap();
    }
}
