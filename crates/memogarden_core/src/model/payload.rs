//! Payload validation and known payload schemas.
//!
//! Entity and fact payloads are stored as opaque JSON objects. Known entity
//! kinds get a typed schema here that callers validate against at the API
//! edge; the stores themselves only require an object.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rejects payloads that are not JSON objects.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] for any other JSON value.
pub fn ensure_object(data: &Value) -> CoreResult<()> {
    if data.is_object() {
        Ok(())
    } else {
        Err(CoreError::invalid_input(format!(
            "payload must be a JSON object, got {}",
            json_type(data)
        )))
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn default_currency() -> String {
    "SGD".to_string()
}

/// Payload of a [`crate::model::EntityKind::Transaction`] entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionData {
    /// Amount, negative for spending.
    pub amount: f64,
    /// ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Date of the transaction, `YYYY-MM-DD`.
    pub transaction_date: String,
    /// Short title.
    #[serde(default)]
    pub description: String,
    /// Account label.
    pub account: String,
    /// Category label.
    #[serde(default)]
    pub category: Option<String>,
    /// Longer free-form details.
    #[serde(default)]
    pub notes: Option<String>,
}

impl TransactionData {
    /// Validates field contents.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] describing the first bad field.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.amount.is_finite() {
            return Err(CoreError::invalid_input("amount must be finite"));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(CoreError::invalid_input(format!(
                "currency must be a three-letter code, got {:?}",
                self.currency
            )));
        }
        if !is_iso_date(&self.transaction_date) {
            return Err(CoreError::invalid_input(format!(
                "transaction_date must be YYYY-MM-DD, got {:?}",
                self.transaction_date
            )));
        }
        if self.account.trim().is_empty() {
            return Err(CoreError::invalid_input("account must not be empty"));
        }
        Ok(())
    }

    /// Validates and converts into a stored payload.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn into_payload(self) -> CoreResult<Value> {
        self.validate()?;
        Ok(serde_json::to_value(self)?)
    }

    /// Parses and validates a stored payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match the schema.
    pub fn from_payload(data: &Value) -> CoreResult<Self> {
        let parsed: Self = serde_json::from_value(data.clone())?;
        parsed.validate()?;
        Ok(parsed)
    }
}

fn is_iso_date(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    let [year, month, day] = parts.as_slice() else {
        return false;
    };
    let digits = |p: &str, len: usize| p.len() == len && p.chars().all(|c| c.is_ascii_digit());
    if !(digits(year, 4) && digits(month, 2) && digits(day, 2)) {
        return false;
    }
    matches!(month.parse::<u8>(), Ok(1..=12)) && matches!(day.parse::<u8>(), Ok(1..=31))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coffee() -> TransactionData {
        TransactionData {
            amount: -15.5,
            currency: "SGD".into(),
            transaction_date: "2025-12-23".into(),
            description: "Coffee".into(),
            account: "Personal".into(),
            category: Some("Food".into()),
            notes: None,
        }
    }

    #[test]
    fn objects_pass() {
        assert!(ensure_object(&json!({"a": 1})).is_ok());
    }

    #[test]
    fn non_objects_fail() {
        let err = ensure_object(&json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("an array"));
        assert!(ensure_object(&Value::Null).is_err());
    }

    #[test]
    fn transaction_payload_roundtrip() {
        let payload = coffee().into_payload().unwrap();
        assert_eq!(payload["account"], "Personal");
        assert_eq!(TransactionData::from_payload(&payload).unwrap(), coffee());
    }

    #[test]
    fn currency_defaults() {
        let data = json!({
            "amount": 3.0,
            "transaction_date": "2025-01-02",
            "account": "Household"
        });
        let parsed = TransactionData::from_payload(&data).unwrap();
        assert_eq!(parsed.currency, "SGD");
        assert_eq!(parsed.description, "");
    }

    #[test]
    fn rejects_bad_date() {
        let mut tx = coffee();
        tx.transaction_date = "23/12/2025".into();
        assert!(tx.validate().is_err());
        tx.transaction_date = "2025-13-01".into();
        assert!(tx.validate().is_err());
    }

    #[test]
    fn rejects_blank_account() {
        let mut tx = coffee();
        tx.account = "  ".into();
        assert!(tx.into_payload().is_err());
    }
}
