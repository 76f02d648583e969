//! Consistency checker.
//!
//! Scans both stores and reports problems as [`Finding`]s. Problems found
//! are data; only a scan that cannot run returns an error.

use crate::error::CoreResult;
use crate::hash::compute_hash;
use crate::model::{Entity, EntityUuid, EntityVersion, FactUuid};
use crate::repo::{EntityRepo, FactRepo, OwnerReference};
use crate::status::SystemStatus;
use crate::types::{ContentHash, Timestamp, Version};
use memogarden_storage::{Store, StoreKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One integrity violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// A fact declares an owner that does not exist in the Core store.
    OrphanedFact {
        /// The orphaned fact.
        fact_uuid: FactUuid,
        /// The owner reference as stored.
        entity_reference: String,
    },
    /// A version does not link to the version before it.
    BrokenChain {
        /// The entity.
        entity_uuid: EntityUuid,
        /// The version with the bad link.
        version: Version,
        /// Hash of the preceding version, `None` for version 1.
        expected_previous: Option<ContentHash>,
        /// Link as stored.
        actual_previous: Option<ContentHash>,
    },
    /// A stored hash does not match its recomputation.
    HashMismatch {
        /// The entity.
        entity_uuid: EntityUuid,
        /// The version with the bad hash.
        version: Version,
        /// Hash as stored.
        stored: ContentHash,
        /// Hash recomputed from stored data and link.
        computed: ContentHash,
    },
    /// SQLite reported structural damage.
    StorageCorruption {
        /// The damaged store.
        store: StoreKind,
        /// `quick_check` output.
        detail: String,
    },
}

impl Finding {
    /// Returns true for findings that put the system in SAFE_MODE.
    #[must_use]
    pub fn is_storage_level(&self) -> bool {
        matches!(self, Self::StorageCorruption { .. })
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrphanedFact {
                fact_uuid,
                entity_reference,
            } => write!(
                f,
                "orphaned fact {fact_uuid} references missing entity {entity_reference:?}"
            ),
            Self::BrokenChain {
                entity_uuid,
                version,
                expected_previous,
                actual_previous,
            } => write!(
                f,
                "broken chain at entity {entity_uuid} {version}: expected previous {}, found {}",
                short(expected_previous.as_ref()),
                short(actual_previous.as_ref())
            ),
            Self::HashMismatch {
                entity_uuid,
                version,
                stored,
                computed,
            } => write!(
                f,
                "hash mismatch at entity {entity_uuid} {version}: stored {}, computed {}",
                stored.short(),
                computed.short()
            ),
            Self::StorageCorruption { store, detail } => {
                write!(f, "{store} store corruption: {detail}")
            }
        }
    }
}

fn short(hash: Option<&ContentHash>) -> String {
    hash.map_or_else(|| "none".to_string(), ContentHash::short)
}

/// Result of one consistency check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// System status after the check was applied.
    pub status: SystemStatus,
    /// Everything found, in scan order.
    pub findings: Vec<Finding>,
    /// Facts in the Soil store.
    pub facts_scanned: u64,
    /// Entities in the Core store.
    pub entities_scanned: u64,
    /// When the check completed.
    pub checked_at: Timestamp,
}

impl ConsistencyReport {
    /// Returns true if nothing was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Iterates over orphan findings.
    pub fn orphans(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| matches!(f, Finding::OrphanedFact { .. }))
    }
}

/// Status a set of findings calls for, before operator modes are considered.
#[must_use]
pub fn classify(findings: &[Finding]) -> SystemStatus {
    if findings.iter().any(Finding::is_storage_level) {
        SystemStatus::SafeMode
    } else if findings.is_empty() {
        SystemStatus::Normal
    } else {
        SystemStatus::Inconsistent
    }
}

/// Scans the two stores for integrity violations.
///
/// Never holds both store locks at once: the orphan scan reads candidates
/// from Soil, releases it, then probes Core in batches.
#[derive(Debug, Clone)]
pub struct ConsistencyChecker {
    probe_batch: usize,
}

impl ConsistencyChecker {
    /// Creates a checker probing `probe_batch` entity UUIDs per query.
    #[must_use]
    pub fn new(probe_batch: usize) -> Self {
        Self {
            probe_batch: probe_batch.max(1),
        }
    }

    /// Runs every scan.
    ///
    /// The report's status is the classification of the findings alone.
    ///
    /// # Errors
    ///
    /// Returns an error only if a store cannot be read.
    pub fn run(&self, soil: &Store, core: &Store) -> CoreResult<ConsistencyReport> {
        let mut findings = Self::integrity_scan(soil)?;
        findings.extend(Self::integrity_scan(core)?);

        let (orphans, facts_scanned) = self.orphan_scan(soil, core)?;
        findings.extend(orphans);
        let (broken, entities_scanned) = Self::chain_scan(core)?;
        findings.extend(broken);

        let report = ConsistencyReport {
            status: classify(&findings),
            findings,
            facts_scanned,
            entities_scanned,
            checked_at: Timestamp::now(),
        };
        tracing::debug!(
            findings = report.findings.len(),
            facts = report.facts_scanned,
            entities = report.entities_scanned,
            "consistency check finished"
        );
        Ok(report)
    }

    /// Reports `quick_check` problems as findings.
    ///
    /// # Errors
    ///
    /// Returns an error if the check cannot run.
    pub fn integrity_scan(store: &Store) -> CoreResult<Vec<Finding>> {
        let problems = store.integrity_check()?;
        Ok(problems
            .into_iter()
            .map(|detail| Finding::StorageCorruption {
                store: store.kind(),
                detail,
            })
            .collect())
    }

    /// Finds facts whose declared owner is missing from the Core store.
    ///
    /// Returns the findings and the number of facts in the Soil store.
    ///
    /// # Errors
    ///
    /// Returns an error if either store cannot be read.
    pub fn orphan_scan(&self, soil: &Store, core: &Store) -> CoreResult<(Vec<Finding>, u64)> {
        let (references, facts) = soil.read(|conn| -> CoreResult<_> {
            let repo = FactRepo::new(conn);
            Ok((repo.owner_references()?, repo.count()?))
        })?;

        let mut findings = Vec::new();
        let mut candidates: Vec<(EntityUuid, OwnerReference)> = Vec::new();
        for reference in references {
            match EntityUuid::parse(&reference.entity_reference) {
                Ok(uuid) => candidates.push((uuid, reference)),
                Err(_) => findings.push(orphan(reference)),
            }
        }

        for batch in candidates.chunks(self.probe_batch) {
            let uuids: Vec<EntityUuid> = batch.iter().map(|(uuid, _)| *uuid).collect();
            let present = core.read(|conn| EntityRepo::new(conn).exists_many(&uuids))?;
            findings.extend(
                batch
                    .iter()
                    .filter(|(uuid, _)| !present.contains(uuid))
                    .map(|(_, reference)| orphan(reference.clone())),
            );
        }
        Ok((findings, facts))
    }

    /// Verifies every entity's version history and current row.
    ///
    /// Returns the findings and the number of entities.
    ///
    /// # Errors
    ///
    /// Returns an error if the Core store cannot be read.
    pub fn chain_scan(core: &Store) -> CoreResult<(Vec<Finding>, u64)> {
        core.read(|conn| -> CoreResult<_> {
            let repo = EntityRepo::new(conn);
            let uuids = repo.all_uuids()?;
            let mut findings = Vec::new();
            for uuid in &uuids {
                let Some(current) = repo.get(*uuid)? else {
                    continue;
                };
                let history = repo.history(*uuid)?;
                findings.extend(check_entity(&current, &history));
            }
            Ok((findings, uuids.len() as u64))
        })
    }
}

impl Default for ConsistencyChecker {
    fn default() -> Self {
        Self::new(256)
    }
}

fn orphan(reference: OwnerReference) -> Finding {
    Finding::OrphanedFact {
        fact_uuid: reference.fact_uuid,
        entity_reference: reference.entity_reference,
    }
}

/// Checks one entity's history, then its current row if that differs from
/// the newest history record.
fn check_entity(current: &Entity, history: &[EntityVersion]) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut predecessor: Option<&EntityVersion> = None;

    for record in history {
        let expected = predecessor.map(|p| p.hash);
        if record.previous_hash != expected {
            findings.push(Finding::BrokenChain {
                entity_uuid: current.uuid,
                version: record.version,
                expected_previous: expected,
                actual_previous: record.previous_hash,
            });
        }
        findings.extend(hash_finding(
            current.uuid,
            record.version,
            &record.data,
            record.hash,
            record.previous_hash,
        ));
        predecessor = Some(record);
    }

    let head_matches = history.last().is_some_and(|head| {
        head.version == current.version
            && head.hash == current.hash
            && head.previous_hash == current.previous_hash
    });
    if head_matches {
        return findings;
    }

    if let Some(previous) = current.previous_hash {
        let linked = history
            .iter()
            .any(|r| r.version < current.version && r.hash == previous);
        if !linked {
            let expected = history
                .iter()
                .find(|r| r.version.next() == current.version)
                .map(|r| r.hash);
            findings.push(Finding::BrokenChain {
                entity_uuid: current.uuid,
                version: current.version,
                expected_previous: expected,
                actual_previous: Some(previous),
            });
        }
    } else if !current.version.is_first() {
        findings.push(Finding::BrokenChain {
            entity_uuid: current.uuid,
            version: current.version,
            expected_previous: history
                .iter()
                .find(|r| r.version.next() == current.version)
                .map(|r| r.hash),
            actual_previous: None,
        });
    }
    findings.extend(hash_finding(
        current.uuid,
        current.version,
        &current.data,
        current.hash,
        current.previous_hash,
    ));
    findings
}

fn hash_finding(
    entity_uuid: EntityUuid,
    version: Version,
    data: &serde_json::Value,
    stored: ContentHash,
    previous: Option<ContentHash>,
) -> Option<Finding> {
    let computed = compute_hash(data, previous.as_ref());
    (computed != stored).then_some(Finding::HashMismatch {
        entity_uuid,
        version,
        stored,
        computed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FactKind, NewEntity, NewFact};
    use crate::repo::ensure_schema;
    use crate::types::LockToken;
    use memogarden_storage::StoreOptions;
    use serde_json::json;

    fn stores() -> (Store, Store) {
        let soil = Store::open_in_memory(StoreKind::Soil, StoreOptions::default()).unwrap();
        let core = Store::open_in_memory(StoreKind::Core, StoreOptions::default()).unwrap();
        ensure_schema(&soil).unwrap();
        ensure_schema(&core).unwrap();
        (soil, core)
    }

    fn add_entity(core: &Store, data: serde_json::Value) -> Entity {
        core.read(|conn| {
            EntityRepo::new(conn).insert(NewEntity::new("Note", data), Timestamp::now())
        })
        .unwrap()
    }

    fn add_fact(soil: &Store, fact: NewFact) {
        soil.read(|conn| FactRepo::new(conn).insert(fact, Timestamp::now()))
            .unwrap();
    }

    #[test]
    fn empty_stores_are_clean() {
        let (soil, core) = stores();
        let report = ConsistencyChecker::default().run(&soil, &core).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.status, SystemStatus::Normal);
    }

    #[test]
    fn orphans_are_found_across_batches() {
        let (soil, core) = stores();
        let mut owned = Vec::new();
        for i in 0..5 {
            let entity = add_entity(&core, json!({ "i": i }));
            add_fact(&soil, NewFact::new(FactKind::Note, json!({})).owned_by(entity.uuid));
            owned.push(entity);
        }
        let ghost = EntityUuid::new();
        add_fact(&soil, NewFact::new(FactKind::Note, json!({})).owned_by(ghost));

        let report = ConsistencyChecker::new(2).run(&soil, &core).unwrap();
        assert_eq!(report.orphans().count(), 1);
        assert_eq!(report.facts_scanned, 6);
        assert_eq!(report.entities_scanned, 5);
        assert_eq!(report.status, SystemStatus::Inconsistent);
    }

    #[test]
    fn malformed_reference_is_orphan() {
        let (soil, core) = stores();
        add_fact(
            &soil,
            NewFact::new("Note", json!({})).with_metadata(json!({"entity_uuid": "nope"})),
        );
        let (findings, _) = ConsistencyChecker::default().orphan_scan(&soil, &core).unwrap();
        assert!(matches!(
            findings.as_slice(),
            [Finding::OrphanedFact { entity_reference, .. }] if entity_reference == "nope"
        ));
    }

    #[test]
    fn edited_entities_have_intact_chains() {
        let (_, core) = stores();
        let v1 = add_entity(&core, json!({"n": 1}));
        core.read(|conn| {
            let token = LockToken::from(v1.hash);
            EntityRepo::new(conn).update(v1.uuid, json!({"n": 2}), &token, Timestamp::now())
        })
        .unwrap();
        let (findings, scanned) = ConsistencyChecker::chain_scan(&core).unwrap();
        assert!(findings.is_empty(), "{findings:?}");
        assert_eq!(scanned, 1);
    }

    #[test]
    fn tampered_history_is_a_hash_mismatch() {
        let (_, core) = stores();
        let v1 = add_entity(&core, json!({"n": 1}));
        core.read(|conn| -> CoreResult<()> {
            conn.execute(
                "UPDATE entity_versions SET data = '{\"n\":99}' WHERE uuid = ?1",
                [v1.uuid.to_string()],
            )?;
            Ok(())
        })
        .unwrap();
        let (findings, _) = ConsistencyChecker::chain_scan(&core).unwrap();
        assert!(matches!(
            findings.as_slice(),
            [Finding::HashMismatch { version, .. }] if version.is_first()
        ));
    }

    #[test]
    fn relinked_current_row_is_a_broken_chain() {
        let (_, core) = stores();
        let v1 = add_entity(&core, json!({"n": 1}));
        let v2 = core
            .read(|conn| {
                let token = v1.lock_token();
                EntityRepo::new(conn).update(v1.uuid, json!({"n": 2}), &token, Timestamp::now())
            })
            .unwrap();
        let bogus = ContentHash::from_bytes([7; 32]);
        core.read(|conn| -> CoreResult<()> {
            conn.execute(
                "UPDATE entities SET previous_hash = ?1 WHERE uuid = ?2",
                [bogus.to_hex(), v1.uuid.to_string()],
            )?;
            Ok(())
        })
        .unwrap();

        let (findings, _) = ConsistencyChecker::chain_scan(&core).unwrap();
        assert!(findings.contains(&Finding::BrokenChain {
            entity_uuid: v1.uuid,
            version: v2.version,
            expected_previous: Some(v1.hash),
            actual_previous: Some(bogus),
        }));
    }

    #[test]
    fn classification() {
        assert_eq!(classify(&[]), SystemStatus::Normal);
        let corruption = Finding::StorageCorruption {
            store: StoreKind::Core,
            detail: "page 3 never used".into(),
        };
        assert_eq!(classify(&[corruption]), SystemStatus::SafeMode);
    }

    #[test]
    fn corruption_finding_serializes_store_name() {
        let finding = Finding::StorageCorruption {
            store: StoreKind::Soil,
            detail: "row 4 missing from index".into(),
        };
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["kind"], "storage_corruption");
        assert_eq!(json["store"], StoreKind::Soil.as_str());

        let parsed: Finding = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, finding);
    }
}
