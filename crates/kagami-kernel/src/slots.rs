//! Slot/intent scanner.
//!
//! Documents can embed asset markers:
//!
//! ```text
//! <!-- slot id="hero" desc="A red fox at dawn" -->
//! <!-- slot id="map" key="world-map-v2" desc="A map of the region" -->
//! ```
//!
//! Attributes may appear in any order. `id` is required and must be unique
//! within the document; a marker without one is skipped. Each marker resolves
//! to an intent key — the explicit `key` if given, else a hash of the
//! normalized description — and intent keys resolve to one shared asset path,
//! so equivalent descriptions across documents converge on a single generated
//! asset.
//!
//! The scanner validates the whole document before touching the store: a
//! duplicate id rejects the scan with nothing written.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use kagami_types::{Dependency, SlotRecord, SourceMeta, View};

use crate::driver::DriverRegistry;
use crate::error::{AfsError, AfsResult};
use crate::revision::hash_hex;
use crate::store::MetaStore;

/// Namespace all intent assets live under, per mount.
pub const INTENT_ASSET_ROOT: &str = "/.assets/intent";

/// Kind tag recorded on synthetic intent sources.
pub const INTENT_SOURCE_KIND: &str = "image";

/// One parsed marker, before any store interaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotMarker {
    /// Marker id, unique within the document.
    pub id: String,
    /// Human description of the desired asset.
    pub desc: String,
    /// Explicit intent key, overriding description normalization.
    pub key: Option<String>,
}

/// What a scan did.
#[derive(Clone, Debug, Default)]
pub struct ScanOutcome {
    /// Slots now recorded for the owner document, in marker order.
    pub slots: Vec<SlotRecord>,
    /// Asset paths whose synthetic source was created by this scan.
    pub new_assets: Vec<String>,
}

/// Scans documents for slot markers and registers intent assets.
pub struct SlotScanner {
    store: Arc<dyn MetaStore>,
    drivers: Arc<DriverRegistry>,
    marker_re: Regex,
    attr_re: Regex,
}

impl fmt::Debug for SlotScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotScanner").finish_non_exhaustive()
    }
}

impl SlotScanner {
    /// Create a scanner over a store and driver registry.
    pub fn new(store: Arc<dyn MetaStore>, drivers: Arc<DriverRegistry>) -> Self {
        Self {
            store,
            drivers,
            marker_re: Regex::new(r"<!--\s*slot\b(.*?)-->").expect("static marker regex"),
            attr_re: Regex::new(r#"(\w+)\s*=\s*"([^"]*)""#).expect("static attribute regex"),
        }
    }

    /// Parse every marker in `content`. Markers without an `id` are skipped;
    /// a duplicate id within the document is an error.
    pub fn parse_markers(&self, owner_path: &str, content: &str) -> AfsResult<Vec<SlotMarker>> {
        let mut markers: Vec<SlotMarker> = Vec::new();
        for cap in self.marker_re.captures_iter(content) {
            let blob = &cap[1];
            let mut attrs: HashMap<&str, &str> = HashMap::new();
            for attr in self.attr_re.captures_iter(blob) {
                attrs.insert(
                    attr.get(1).expect("group 1 in attribute regex").as_str(),
                    attr.get(2).expect("group 2 in attribute regex").as_str(),
                );
            }

            let Some(id) = attrs.get("id").map(|s| s.trim()).filter(|s| !s.is_empty()) else {
                continue;
            };
            if markers.iter().any(|m| m.id == id) {
                return Err(AfsError::DuplicateSlotId {
                    owner: owner_path.to_string(),
                    slot_id: id.to_string(),
                });
            }

            markers.push(SlotMarker {
                id: id.to_string(),
                desc: attrs.get("desc").map(|s| s.to_string()).unwrap_or_default(),
                key: attrs
                    .get("key")
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            });
        }
        Ok(markers)
    }

    /// Scan a document and replace its recorded slot set.
    ///
    /// Validates first: a malformed document leaves the store untouched.
    /// For each marker this upserts the slot, creates the synthetic source
    /// for its asset when absent, and records the owner-context dependency.
    pub async fn scan(
        &self,
        mount: &str,
        owner_path: &str,
        content: &str,
        owner_revision: &str,
    ) -> AfsResult<ScanOutcome> {
        let markers = self.parse_markers(owner_path, content)?;

        // Replacing the whole set drops slots whose markers were removed.
        self.store.delete_slots(mount, owner_path).await?;

        let mut outcome = ScanOutcome::default();
        for marker in markers {
            let key = intent_key(&marker);
            let asset_path = asset_path_for(&key);

            let slot = SlotRecord::new(
                owner_path,
                &marker.id,
                &marker.desc,
                &key,
                &asset_path,
                owner_revision,
            );
            self.store.upsert_slot(mount, &slot).await?;

            if self.store.get_source(mount, &asset_path).await?.is_none() {
                let meta = SourceMeta::new(format!("intent:{}", key))
                    .with_kind(INTENT_SOURCE_KIND)
                    .with_drivers_hint(self.capable_drivers());
                self.store.put_source(mount, &asset_path, &meta).await?;
                debug!(
                    "Registered intent asset {} for slot '{}' in {}",
                    asset_path, slot.slot_id, owner_path
                );
                outcome.new_assets.push(asset_path.clone());
            }

            self.store
                .put_dependency(
                    mount,
                    &Dependency::owner_context(&asset_path, owner_path, owner_revision),
                )
                .await?;
            outcome.slots.push(slot);
        }
        Ok(outcome)
    }

    /// Drivers capable of producing the canonical asset view, for the
    /// advisory hint on synthetic sources.
    fn capable_drivers(&self) -> Vec<String> {
        let view = View::new().with_format("png");
        self.drivers
            .names()
            .into_iter()
            .filter(|name| {
                self.drivers
                    .get(name)
                    .is_some_and(|d| d.can_handle(&view))
            })
            .collect()
    }
}

/// Resolve a marker to its intent key: the explicit key when given, else a
/// hash of the trimmed, lowercased, whitespace-collapsed description.
pub fn intent_key(marker: &SlotMarker) -> String {
    if let Some(key) = &marker.key {
        return key.clone();
    }
    let normalized = marker
        .desc
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    hash_hex(normalized.as_bytes())[..32].to_string()
}

/// Deterministic asset path for an intent key.
pub fn asset_path_for(intent_key: &str) -> String {
    format!("{}/{}.png", INTENT_ASSET_ROOT, intent_key)
}
