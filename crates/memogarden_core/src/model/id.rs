//! Entity and fact identifiers.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! prefixed_uuid {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Uuid);

        impl $name {
            /// API prefix distinguishing this identifier's store.
            pub const PREFIX: &'static str = $prefix;

            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Parses an identifier with or without its API prefix.
            ///
            /// # Errors
            ///
            /// Returns [`CoreError::InvalidInput`] if the remainder is not a UUID.
            pub fn parse(s: &str) -> CoreResult<Self> {
                let bare = s.strip_prefix(Self::PREFIX).unwrap_or(s);
                Uuid::parse_str(bare).map(Self).map_err(|_| {
                    CoreError::invalid_input(format!(
                        "not a valid {} identifier: {s:?}",
                        stringify!($name)
                    ))
                })
            }

            /// Returns the identifier in its prefixed API form.
            #[must_use]
            pub fn prefixed(&self) -> String {
                format!("{}{}", Self::PREFIX, self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(&s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_string()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self::from_uuid(uuid)
            }
        }
    };
}

prefixed_uuid!(
    /// Identifier of an entity in the Core store.
    ///
    /// Immutable once assigned and never reused. Stored bare; rendered with
    /// the `core_` prefix at the API boundary.
    EntityUuid,
    "core_"
);

prefixed_uuid!(
    /// Identifier of a fact in the Soil store.
    FactUuid,
    "soil_"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_unique() {
        assert_ne!(EntityUuid::new(), EntityUuid::new());
    }

    #[test]
    fn parse_accepts_prefixed_and_bare() {
        let id = EntityUuid::new();
        assert_eq!(EntityUuid::parse(&id.to_string()).unwrap(), id);
        assert_eq!(EntityUuid::parse(&id.prefixed()).unwrap(), id);
        assert!(id.prefixed().starts_with("core_"));
    }

    #[test]
    fn parse_rejects_foreign_prefix() {
        let fact = FactUuid::new();
        assert!(EntityUuid::parse(&fact.prefixed()).is_err());
        assert!(FactUuid::parse(&fact.prefixed()).is_ok());
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = FactUuid::parse("soil_nope").unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput { .. }));
    }

    #[test]
    fn serde_uses_bare_string() {
        let id = EntityUuid::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let prefixed: EntityUuid = serde_json::from_str(&format!("\"{}\"", id.prefixed())).unwrap();
        assert_eq!(prefixed, id);
    }
}
