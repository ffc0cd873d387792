//! Typed identifier for entries.
//!
//! Wraps UUIDv7 (time-ordered, globally unique). Opaque on the wire, displays
//! as standard UUID text for logging. The `short()` form (first 8 hex chars)
//! is for human-facing output — never used as a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An entry identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(uuid::Uuid);

impl EntryId {
    /// Create a new time-ordered ID (UUIDv7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// First 8 hex characters — for human display only, not lookup.
    pub fn short(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }

    /// Full 32-character hex string (no hyphens).
    pub fn to_hex(&self) -> String {
        self.0.as_simple().to_string()
    }

    /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        uuid::Uuid::parse_str(s).map(Self)
    }

    /// A nil / zero ID — for sentinel values only.
    pub fn nil() -> Self {
        Self(uuid::Uuid::nil())
    }

    /// Check if this is the nil ID.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<uuid::Uuid> for EntryId {
    fn from(u: uuid::Uuid) -> Self {
        Self(u)
    }
}

impl From<EntryId> for uuid::Uuid {
    fn from(id: EntryId) -> uuid::Uuid {
        id.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full UUID with hyphens for log readability
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unique() {
        let a = EntryId::new();
        let b = EntryId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_is_8_chars() {
        let id = EntryId::new();
        assert_eq!(id.short().len(), 8);
    }

    #[test]
    fn test_ordering_is_time_ordered() {
        let ids: Vec<EntryId> = (0..10).map(|_| EntryId::new()).collect();
        for i in 1..ids.len() {
            assert!(ids[i] >= ids[i - 1]);
        }
    }

    #[test]
    fn test_parse_roundtrip() {
        let id = EntryId::new();
        assert_eq!(EntryId::parse(&id.to_hex()).unwrap(), id);
        assert_eq!(EntryId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = EntryId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: EntryId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_nil() {
        assert!(EntryId::nil().is_nil());
        assert!(!EntryId::new().is_nil());
    }

    #[test]
    fn test_debug_shows_type_and_short() {
        let id = EntryId::new();
        let debug = format!("{:?}", id);
        assert!(debug.starts_with("EntryId("));
        assert!(debug.ends_with(')'));
    }
}
