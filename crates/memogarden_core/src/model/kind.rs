//! Type tags for entities and facts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag of an entity.
///
/// Known kinds get their own variant; anything else round-trips through
/// [`EntityKind::Other`] so stores written by newer code stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityKind {
    /// A financial transaction.
    Transaction,
    /// A recurrence template for transactions.
    Recurrence,
    /// A placeholder left behind when an entity is superseded.
    Tombstone,
    /// Any other type tag.
    Other(String),
}

impl EntityKind {
    /// Returns the stored type tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Transaction => "Transaction",
            Self::Recurrence => "Recurrence",
            Self::Tombstone => "Tombstone",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for EntityKind {
    fn from(s: &str) -> Self {
        match s {
            "Transaction" => Self::Transaction,
            "Recurrence" => Self::Recurrence,
            "Tombstone" => Self::Tombstone,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EntityKind {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<EntityKind> for String {
    fn from(kind: EntityKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type tag of a fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FactKind {
    /// Change record for an entity.
    EntityDelta,
    /// An imported email.
    Email,
    /// A free-form note.
    Note,
    /// Any other type tag.
    Other(String),
}

impl FactKind {
    /// Returns the stored type tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::EntityDelta => "EntityDelta",
            Self::Email => "Email",
            Self::Note => "Note",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for FactKind {
    fn from(s: &str) -> Self {
        match s {
            "EntityDelta" => Self::EntityDelta,
            "Email" => Self::Email,
            "Note" => Self::Note,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for FactKind {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<FactKind> for String {
    fn from(kind: FactKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
