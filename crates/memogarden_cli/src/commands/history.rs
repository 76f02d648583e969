//! History command implementation.

use super::{Format, StorePaths};
use memogarden_core::hash::find_chain_break;
use memogarden_core::{EntityUuid, EntityVersion};
use serde::Serialize;
use std::error::Error;
use std::fmt::Write as _;

/// An entity's history with its verification result.
#[derive(Debug, Serialize)]
pub struct HistoryResult {
    /// The entity.
    pub uuid: EntityUuid,
    /// Every version, oldest first.
    pub versions: Vec<EntityVersion>,
    /// Whether the chain verifies from version 1.
    pub verified: bool,
    /// Index of the first bad version, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_break: Option<usize>,
}

/// Runs the history command.
pub fn run(stores: &StorePaths, uuid: &str, format: Format) -> Result<(), Box<dyn Error>> {
    let uuid = EntityUuid::parse(uuid)?;
    let garden = stores.open(false)?;
    let versions = garden.entity_history(uuid)?;
    let verified = garden.verify_entity_chain(uuid)?;
    let result = HistoryResult {
        uuid,
        first_break: find_chain_break(&versions).map(|b| b.index),
        versions,
        verified,
    };

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print!("{}", render(&result)),
    }

    if result.verified {
        Ok(())
    } else {
        Err(format!("Hash chain of {} does not verify", result.uuid.prefixed()).into())
    }
}

/// Renders a history as text.
pub fn render(result: &HistoryResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Entity {}", result.uuid.prefixed());
    for (index, version) in result.versions.iter().enumerate() {
        let previous = version
            .previous_hash
            .as_ref()
            .map_or_else(|| "-".repeat(12), |h| h.short());
        let marker = if result.first_break == Some(index) { "  <- break" } else { "" };
        let _ = writeln!(
            out,
            "  v{:<4} {}  prev {}  at {}{marker}",
            version.version.as_u64(),
            version.hash.short(),
            previous,
            version.recorded_at.as_millis(),
        );
    }
    let _ = writeln!(
        out,
        "{}",
        if result.verified {
            "✓ Hash chain verified"
        } else {
            "✗ Hash chain broken"
        }
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use memogarden_core::NewEntity;
    use memogarden_testkit::{rewrite_version_data, TestGarden};
    use serde_json::json;

    fn history(garden: &TestGarden, uuid: EntityUuid) -> HistoryResult {
        let versions = garden.entity_history(uuid).unwrap();
        HistoryResult {
            uuid,
            first_break: find_chain_break(&versions).map(|b| b.index),
            verified: garden.verify_entity_chain(uuid).unwrap(),
            versions,
        }
    }

    #[test]
    fn lists_every_version() {
        let garden = TestGarden::memory();
        let v1 = garden
            .create_entity(NewEntity::new("Note", json!({"n": 1})))
            .unwrap();
        garden
            .edit_entity(v1.uuid, json!({"n": 2}), v1.lock_token())
            .unwrap();

        let text = render(&history(&garden, v1.uuid));
        assert!(text.contains("v1"));
        assert!(text.contains("v2"));
        assert!(text.contains(&v1.hash.short()));
        assert!(text.contains("verified"));
    }

    #[test]
    fn marks_the_break() {
        let garden = TestGarden::memory();
        let v1 = garden
            .create_entity(NewEntity::new("Note", json!({"n": 1})))
            .unwrap();
        rewrite_version_data(&garden, v1.uuid, v1.version, &json!({"n": 9}));

        let result = history(&garden, v1.uuid);
        assert_eq!(result.first_break, Some(0));
        assert!(render(&result).contains("<- break"));
    }
}
