//! Chained content hashing.

use crate::hash::canonical::to_canonical_json;
use crate::types::ContentHash;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Computes the hash of one version.
///
/// `sha256(canonical(data) ++ previous_hash)`, where `previous_hash`
/// contributes its raw 32 bytes, or nothing for the first version.
#[must_use]
pub fn compute_hash(data: &Value, previous_hash: Option<&ContentHash>) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(to_canonical_json(data));
    if let Some(prev) = previous_hash {
        hasher.update(prev.as_bytes());
    }
    ContentHash::from_bytes(hasher.finalize().into())
}

/// A record that participates in a hash chain.
pub trait ChainRecord {
    /// The stored hash.
    fn hash(&self) -> &ContentHash;
    /// The stored link to the preceding record.
    fn previous_hash(&self) -> Option<&ContentHash>;
    /// The hashed payload.
    fn data(&self) -> &Value;
}

impl ChainRecord for (ContentHash, Option<ContentHash>, Value) {
    fn hash(&self) -> &ContentHash {
        &self.0
    }

    fn previous_hash(&self) -> Option<&ContentHash> {
        self.1.as_ref()
    }

    fn data(&self) -> &Value {
        &self.2
    }
}

/// How a chain is broken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakKind {
    /// The stored hash does not match the recomputed one.
    HashMismatch {
        /// Hash as stored.
        stored: ContentHash,
        /// Hash recomputed from data and link.
        computed: ContentHash,
    },
    /// The link does not point at the preceding record.
    LinkMismatch {
        /// Hash of the preceding record.
        expected: Option<ContentHash>,
        /// Link as stored.
        actual: Option<ContentHash>,
    },
}

/// The first place a chain fails to verify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    /// Position of the offending record in the checked sequence.
    pub index: usize,
    /// What is wrong with it.
    pub kind: BreakKind,
}

/// Finds the first record that breaks the chain.
///
/// Each record's stored hash must equal `compute_hash(data, previous_hash)`,
/// and every record after the first must link to its predecessor's hash. The
/// first record's link is not checked against anything, so a window cut from
/// the middle of a history verifies on its own.
#[must_use]
pub fn find_chain_break<R: ChainRecord>(records: &[R]) -> Option<ChainBreak> {
    let mut predecessor: Option<&ContentHash> = None;
    for (index, record) in records.iter().enumerate() {
        if index > 0 && record.previous_hash() != predecessor {
            return Some(ChainBreak {
                index,
                kind: BreakKind::LinkMismatch {
                    expected: predecessor.copied(),
                    actual: record.previous_hash().copied(),
                },
            });
        }
        let computed = compute_hash(record.data(), record.previous_hash());
        if &computed != record.hash() {
            return Some(ChainBreak {
                index,
                kind: BreakKind::HashMismatch {
                    stored: *record.hash(),
                    computed,
                },
            });
        }
        predecessor = Some(record.hash());
    }
    None
}

/// Returns true if every record verifies and links to its predecessor.
#[must_use]
pub fn verify_chain<R: ChainRecord>(records: &[R]) -> bool {
    find_chain_break(records).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    type Link = (ContentHash, Option<ContentHash>, Value);

    fn build_chain(payloads: &[Value]) -> Vec<Link> {
        let mut chain: Vec<Link> = Vec::new();
        for data in payloads {
            let prev = chain.last().map(|r| r.0);
            let hash = compute_hash(data, prev.as_ref());
            chain.push((hash, prev, data.clone()));
        }
        chain
    }

    fn payload_strategy() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..5)
            .prop_map(|m| json!(m))
    }

    #[test]
    fn hash_is_deterministic() {
        let data = json!({"amount": -15.5, "account": "Personal"});
        assert_eq!(compute_hash(&data, None), compute_hash(&data, None));
    }

    #[test]
    fn hash_depends_on_previous() {
        let data = json!({"a": 1});
        let first = compute_hash(&data, None);
        assert_ne!(compute_hash(&data, Some(&first)), first);
    }

    #[test]
    fn hash_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":2,"x":1}"#).unwrap();
        assert_eq!(compute_hash(&a, None), compute_hash(&b, None));
    }

    #[test]
    fn empty_chain_verifies() {
        assert!(verify_chain::<Link>(&[]));
    }

    #[test]
    fn relinked_record_is_detected() {
        let mut chain = build_chain(&[json!({"v": 1}), json!({"v": 2}), json!({"v": 3})]);
        chain[2].1 = Some(chain[0].0);
        let found = find_chain_break(&chain).unwrap();
        assert_eq!(found.index, 2);
        assert!(matches!(found.kind, BreakKind::LinkMismatch { .. }));
    }

    #[test]
    fn window_verifies_without_genesis() {
        let chain = build_chain(&[json!({"v": 1}), json!({"v": 2}), json!({"v": 3})]);
        assert!(verify_chain(&chain[1..]));
    }

    proptest! {
        #[test]
        fn sequential_edits_verify(payloads in prop::collection::vec(payload_strategy(), 1..12)) {
            let chain = build_chain(&payloads);
            prop_assert!(verify_chain(&chain));
            prop_assert!(chain[0].1.is_none());
        }

        #[test]
        fn tampered_data_breaks_at_that_record(
            payloads in prop::collection::vec(payload_strategy(), 1..12),
            pick in any::<prop::sample::Index>(),
        ) {
            let mut chain = build_chain(&payloads);
            let at = pick.index(chain.len());
            chain[at].2 = json!({"tampered": true, "original": chain[at].2.clone()});
            let found = find_chain_break(&chain);
            prop_assert_eq!(found.map(|b| b.index), Some(at));
        }
    }
}
