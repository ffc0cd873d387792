//! Slot records — scanned asset markers.
//!
//! A slot is a marker embedded in a document that declares "an asset belongs
//! here, and here is what it should depict". The scanner normalizes the
//! marker's description into an intent key, so equivalent descriptions across
//! documents converge on one shared asset.

use serde::{Deserialize, Serialize};

/// One scanned slot: where it lives, what it asks for, which asset serves it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    /// Document the marker appears in.
    pub owner_path: String,
    /// Marker id, unique within the owner document.
    pub slot_id: String,
    /// Human description of the desired asset.
    pub desc: String,
    /// Normalized intent key — equal descriptions share one asset.
    pub intent_key: String,
    /// Synthetic path of the shared asset.
    pub asset_path: String,
    /// Owner document's revision when last scanned.
    pub owner_revision: String,
    /// When this record was last refreshed (Unix millis).
    pub updated_at: u64,
}

impl SlotRecord {
    /// Record a scanned slot, stamped now.
    pub fn new(
        owner_path: impl Into<String>,
        slot_id: impl Into<String>,
        desc: impl Into<String>,
        intent_key: impl Into<String>,
        asset_path: impl Into<String>,
        owner_revision: impl Into<String>,
    ) -> Self {
        Self {
            owner_path: owner_path.into(),
            slot_id: slot_id.into(),
            desc: desc.into(),
            intent_key: intent_key.into(),
            asset_path: asset_path.into(),
            owner_revision: owner_revision.into(),
            updated_at: crate::now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stamps_time() {
        let slot = SlotRecord::new("/docs/a.md", "hero", "a sunset", "k1", "/.assets/intent/k1.png", "r1");
        assert_eq!(slot.owner_path, "/docs/a.md");
        assert_eq!(slot.slot_id, "hero");
        assert!(slot.updated_at > 0);
    }

    #[test]
    fn test_serde_roundtrip() {
        let slot = SlotRecord::new("/a", "s1", "d", "k", "/p", "r");
        let json = serde_json::to_string(&slot).unwrap();
        let back: SlotRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(slot, back);
    }
}
