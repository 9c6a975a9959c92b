//! Identifier newtypes.
//!
//! Both identifiers are opaque strings on the wire. Locally generated values
//! are UUID v4; identifiers received from peers are accepted as-is.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First eight characters, for log lines.
            pub fn short(&self) -> &str {
                match self.0.char_indices().nth(8) {
                    Some((idx, _)) => &self.0[..idx],
                    None => &self.0,
                }
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Globally unique identifier of one repository's data holdings.
    ///
    /// Immutable once assigned; used as the provenance ("home") marker on
    /// every instance.
    MetadataCollectionId
);

string_id!(
    /// Identifier of an entity, relationship, TypeDef or archive.
    Guid
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = MetadataCollectionId::generate();
        let b = MetadataCollectionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_short_truncates_to_eight_chars() {
        let id = Guid::new("0123456789abcdef");
        assert_eq!(id.short(), "01234567");
        assert_eq!(Guid::new("abc").short(), "abc");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = MetadataCollectionId::new("repo-a");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"repo-a\"");
        let back: MetadataCollectionId = serde_json::from_str("\"repo-a\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let mut ids = vec![MetadataCollectionId::new("b"), MetadataCollectionId::new("a")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "a");
    }
}
