//! Property-based test generators using proptest.
//!
//! Provides strategies for entity payloads and edit sequences. Every
//! payload is a JSON object, as the stores require.

use memogarden_core::{EntityKind, TransactionData};
use proptest::prelude::*;
use serde_json::{Map, Number, Value};

/// Strategy for object keys, including ones that need escaping.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => prop::string::string_regex("[a-z_]{1,12}").expect("Invalid regex"),
        1 => prop::string::string_regex("[ -~]{0,8}").expect("Invalid regex"),
        1 => "\\PC{1,6}",
    ]
}

/// Strategy for JSON leaves.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        prop::num::f64::NORMAL
            .prop_filter_map("finite", |f| Number::from_f64(f).map(Value::Number)),
        "\\PC{0,16}".prop_map(Value::String),
    ]
}

/// Strategy for arbitrary JSON values up to a small depth.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(key_strategy(), inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Strategy for entity payloads.
pub fn payload_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(key_strategy(), value_strategy(), 0..8)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}

/// Strategy for a sequence of payloads: a create followed by edits.
pub fn edit_sequence_strategy(
    min_versions: usize,
    max_versions: usize,
) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(payload_strategy(), min_versions..max_versions)
}

/// Strategy for entity type tags.
pub fn entity_kind_strategy() -> impl Strategy<Value = EntityKind> {
    prop_oneof![
        Just(EntityKind::Transaction),
        Just(EntityKind::Recurrence),
        prop::string::string_regex("[A-Z][a-z]{2,10}")
            .expect("Invalid regex")
            .prop_map(EntityKind::from),
    ]
}

/// Strategy for valid transaction payloads.
pub fn transaction_data_strategy() -> impl Strategy<Value = TransactionData> {
    (
        -1_000_000i64..1_000_000,
        prop::sample::select(vec!["SGD", "USD", "EUR"]),
        (2000u32..2100, 1u32..=12, 1u32..=28),
        "[a-z ]{1,24}",
        prop::option::of("[A-Z][a-z]{2,8}"),
    )
        .prop_map(|(cents, currency, (y, m, d), description, category)| {
            TransactionData {
                amount: cents as f64 / 100.0,
                currency: currency.to_string(),
                transaction_date: format!("{y:04}-{m:02}-{d:02}"),
                description,
                account: "Household".to_string(),
                category,
                notes: None,
            }
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn payloads_are_objects(payload in payload_strategy()) {
            prop_assert!(payload.is_object());
        }

        #[test]
        fn transaction_data_validates(data in transaction_data_strategy()) {
            prop_assert!(data.validate().is_ok());
        }

        #[test]
        fn sequences_respect_bounds(seq in edit_sequence_strategy(2, 6)) {
            prop_assert!((2..6).contains(&seq.len()));
        }
    }
}
