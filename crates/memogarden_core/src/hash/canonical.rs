//! Canonical JSON writer.

use serde_json::{Map, Number, Value};

/// Encode a value to canonical JSON bytes.
///
/// The output is deterministic for a given value regardless of how the
/// value was built:
/// - Object keys are sorted bytewise
/// - No insignificant whitespace
/// - Numbers use `serde_json`'s shortest round-trip formatting
/// - Strings are escaped exactly as `serde_json` escapes them
#[must_use]
pub fn to_canonical_json(value: &Value) -> Vec<u8> {
    let mut writer = CanonicalWriter::new();
    writer.write(value);
    writer.into_bytes()
}

/// A canonical JSON writer.
#[derive(Debug, Default)]
pub struct CanonicalWriter {
    buffer: Vec<u8>,
}

impl CanonicalWriter {
    /// Create a new writer.
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Write a value.
    pub fn write(&mut self, value: &Value) {
        match value {
            Value::Null => self.buffer.extend_from_slice(b"null"),
            Value::Bool(true) => self.buffer.extend_from_slice(b"true"),
            Value::Bool(false) => self.buffer.extend_from_slice(b"false"),
            Value::Number(n) => self.write_number(n),
            Value::String(s) => self.write_string(s),
            Value::Array(items) => {
                self.buffer.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.buffer.push(b',');
                    }
                    self.write(item);
                }
                self.buffer.push(b']');
            }
            Value::Object(map) => self.write_object(map),
        }
    }

    /// Consume this writer and return the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn write_number(&mut self, n: &Number) {
        self.buffer.extend_from_slice(n.to_string().as_bytes());
    }

    fn write_object(&mut self, map: &Map<String, Value>) {
        let mut entries: Vec<(&String, &Value)> = map.iter().collect();
        entries.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

        self.buffer.push(b'{');
        for (i, (key, value)) in entries.into_iter().enumerate() {
            if i > 0 {
                self.buffer.push(b',');
            }
            self.write_string(key);
            self.buffer.push(b':');
            self.write(value);
        }
        self.buffer.push(b'}');
    }

    fn write_string(&mut self, s: &str) {
        // Serializing a str into a Vec cannot fail.
        let _ = serde_json::to_writer(&mut self.buffer, s);
    }
}
