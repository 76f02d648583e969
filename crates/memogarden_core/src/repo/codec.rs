//! Column encodings shared by the repositories.

use crate::error::{CoreError, CoreResult};
use crate::hash::to_canonical_json;
use crate::types::{ContentHash, Version};
use serde_json::Value;

/// Payloads are stored in canonical form so stored text hashes the same
/// way it was hashed on write.
pub(crate) fn encode_json(value: &Value) -> CoreResult<String> {
    String::from_utf8(to_canonical_json(value))
        .map_err(|e| CoreError::invalid_input(format!("payload is not UTF-8: {e}")))
}

pub(crate) fn decode_json(text: &str) -> CoreResult<Value> {
    Ok(serde_json::from_str(text)?)
}

pub(crate) fn decode_hash(text: &str) -> CoreResult<ContentHash> {
    text.parse()
}

pub(crate) fn to_sql_version(version: Version) -> i64 {
    i64::try_from(version.as_u64()).unwrap_or(i64::MAX)
}

pub(crate) fn from_sql_version(raw: i64) -> CoreResult<Version> {
    u64::try_from(raw)
        .ok()
        .filter(|&v| v >= 1)
        .map(Version::new)
        .ok_or_else(|| CoreError::invalid_input(format!("stored version {raw} is not positive")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stored_payload_is_canonical() {
        let text = encode_json(&json!({"b": 2, "a": 1.5})).unwrap();
        assert_eq!(text, r#"{"a":1.5,"b":2}"#);
        assert_eq!(decode_json(&text).unwrap(), json!({"a": 1.5, "b": 2}));
    }

    #[test]
    fn versions_must_be_positive() {
        assert_eq!(from_sql_version(3).unwrap(), Version::new(3));
        assert!(from_sql_version(0).is_err());
        assert!(from_sql_version(-1).is_err());
        assert_eq!(to_sql_version(Version::new(7)), 7);
    }
}
