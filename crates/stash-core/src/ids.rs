//! Strongly-typed identifiers for cache entries.

use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Name used when a caller does not pick a namespace.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Longest namespace accepted after sanitization.
pub const MAX_NAMESPACE_LEN: usize = 64;

/// Identifier of one stored cache entry.
///
/// Random (v4) rather than time-ordered so leading characters spread evenly
/// across shard directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct CacheId(Uuid);

impl CacheId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CacheId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for CacheId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| Error::InvalidIdentifier(format!("{s:?} is not a cache id: {e}")))
    }
}

macro_rules! define_str_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_str_id!(
    /// Truncated hex digest of an entry's canonical content.
    CacheHash
);
define_str_id!(
    /// Identifier of a child data file attached to an entry.
    DataFileId
);
define_str_id!(
    /// Folder grouping child data files under an entry.
    DataKey
);

impl DataFileId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }
}

/// Logical partition. Always the first segment of every stored path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Accept a namespace that is already in the safe character set.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::InvalidNamespace("namespace is empty".into()));
        }
        if value.len() > MAX_NAMESPACE_LEN {
            return Err(Error::InvalidNamespace(format!(
                "{value:?} is longer than {MAX_NAMESPACE_LEN} characters"
            )));
        }
        if let Some(c) = value.chars().find(|c| !is_namespace_char(*c)) {
            return Err(Error::InvalidNamespace(format!(
                "{value:?} contains {c:?}"
            )));
        }
        Ok(Self(value))
    }

    /// Boundary helper: map anything outside `[A-Za-z0-9_-]` to `_` and
    /// fall back to the default namespace when nothing usable remains.
    pub fn sanitize(raw: &str) -> Self {
        let cleaned: String = raw
            .trim()
            .chars()
            .map(|c| if is_namespace_char(c) { c } else { '_' })
            .take(MAX_NAMESPACE_LEN)
            .collect();
        if cleaned.chars().all(|c| c == '_') {
            Self::default()
        } else {
            Self(cleaned)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_namespace_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

impl Default for Namespace {
    fn default() -> Self {
        Self(DEFAULT_NAMESPACE.to_string())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_id_display_is_plain_uuid() {
        let id = CacheId::new();
        let s = id.to_string();
        assert_eq!(s.len(), 36);
        assert_eq!(s.matches('-').count(), 4);
    }

    #[test]
    fn test_cache_id_parse() {
        let id = CacheId::new();
        let parsed: CacheId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_cache_id_parse_rejects_garbage() {
        let err = "not-an-id".parse::<CacheId>().unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }

    #[test]
    fn test_namespace_sanitize() {
        assert_eq!(Namespace::sanitize("team a/b").as_str(), "team_a_b");
        assert_eq!(Namespace::sanitize("ok-name_1").as_str(), "ok-name_1");
        assert_eq!(Namespace::sanitize("").as_str(), DEFAULT_NAMESPACE);
        assert_eq!(Namespace::sanitize("///").as_str(), DEFAULT_NAMESPACE);
        assert_eq!(Namespace::sanitize(&"x".repeat(100)).as_str().len(), MAX_NAMESPACE_LEN);
    }

    #[test]
    fn test_namespace_new_is_strict() {
        assert!(Namespace::new("ns1").is_ok());
        assert!(Namespace::new("").is_err());
        assert!(Namespace::new("../etc").is_err());
        assert!(Namespace::new("a b").is_err());
    }
}
