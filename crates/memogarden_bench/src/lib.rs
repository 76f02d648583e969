//! Benchmark utilities.

use memogarden_core::{ContentHash, EntityVersion, EntityUuid, Timestamp, Version};
use serde_json::{json, Map, Value};

/// Builds an object payload with `fields` string fields of `width` bytes.
pub fn payload(fields: usize, width: usize) -> Value {
    let map: Map<String, Value> = (0..fields)
        .map(|i| (format!("field_{i:04}"), Value::String("x".repeat(width))))
        .collect();
    Value::Object(map)
}

/// Builds a transaction-shaped payload.
pub fn transaction_payload(i: usize) -> Value {
    json!({
        "amount": -(i as f64) / 100.0,
        "currency": "SGD",
        "transaction_date": "2026-01-15",
        "description": format!("purchase {i}"),
        "account": "Household",
        "category": "Groceries",
    })
}

/// Builds a valid hash chain of `len` versions in memory.
pub fn chain(len: usize) -> Vec<EntityVersion> {
    let uuid = EntityUuid::new();
    let mut previous: Option<ContentHash> = None;
    (1..=len)
        .map(|v| {
            let data = transaction_payload(v);
            let hash = memogarden_core::hash::compute_hash(&data, previous.as_ref());
            let record = EntityVersion {
                uuid,
                version: Version::new(v as u64),
                data,
                hash,
                previous_hash: previous,
                recorded_at: Timestamp::now(),
            };
            previous = Some(hash);
            record
        })
        .collect()
}
