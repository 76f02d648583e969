//! Store damage for checker tests.
//!
//! These helpers bypass the coordinator and write to one store directly,
//! producing the states a crash between commits or an out-of-band edit
//! would leave behind.

use memogarden_core::hash::to_canonical_json;
use memogarden_core::model::OWNER_KEY;
use memogarden_core::repo::FactRepo;
use memogarden_core::{
    ContentHash, Coordinator, CoreResult, EntityUuid, FactKind, FactUuid, NewFact, Timestamp,
    Version,
};
use memogarden_storage::rusqlite::{params, ToSql};
use serde_json::{json, Value};

/// Appends a fact owned by `entity_reference` without touching Core.
///
/// The reference is stored verbatim, so it may name a missing entity or not
/// be a UUID at all.
pub fn plant_orphan(garden: &Coordinator, entity_reference: &str) -> FactUuid {
    let fact = NewFact::new(FactKind::Note, json!({ "planted": true }))
        .with_metadata(json!({ OWNER_KEY: entity_reference }));
    garden
        .soil()
        .read(|conn| FactRepo::new(conn).insert(fact, Timestamp::now()))
        .expect("Failed to plant fact")
        .uuid
}

/// Overwrites the stored payload of one version without rehashing it.
pub fn rewrite_version_data(
    garden: &Coordinator,
    uuid: EntityUuid,
    version: Version,
    data: &Value,
) {
    let text = String::from_utf8(to_canonical_json(data)).expect("canonical JSON is UTF-8");
    let changed = execute(
        garden,
        "UPDATE entity_versions SET data = ?1 WHERE uuid = ?2 AND version = ?3",
        params![text, uuid.to_string(), sql_version(version)],
    );
    assert_eq!(changed, 1, "no version {version} for {uuid}");
}

/// Overwrites the `previous_hash` link of one version.
pub fn relink_version(
    garden: &Coordinator,
    uuid: EntityUuid,
    version: Version,
    previous: Option<ContentHash>,
) {
    let changed = execute(
        garden,
        "UPDATE entity_versions SET previous_hash = ?1 WHERE uuid = ?2 AND version = ?3",
        params![previous.map(|h| h.to_hex()), uuid.to_string(), sql_version(version)],
    );
    assert_eq!(changed, 1, "no version {version} for {uuid}");
}

/// Removes an entity and its history from Core, leaving its facts behind.
pub fn erase_entity(garden: &Coordinator, uuid: EntityUuid) {
    execute(
        garden,
        "DELETE FROM entity_versions WHERE uuid = ?1",
        params![uuid.to_string()],
    );
    execute(
        garden,
        "DELETE FROM entities WHERE uuid = ?1",
        params![uuid.to_string()],
    );
}

fn execute(garden: &Coordinator, sql: &str, params: &[&dyn ToSql]) -> usize {
    garden
        .core()
        .read(|conn| -> CoreResult<usize> { Ok(conn.execute(sql, params)?) })
        .expect("Failed to damage core store")
}

fn sql_version(version: Version) -> i64 {
    i64::try_from(version.as_u64()).expect("version fits in i64")
}
