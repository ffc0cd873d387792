//! In-memory metadata store.
//!
//! The default store for tests and short-lived embeddings. Sharded maps, no
//! durability; every operation is a straight map access, so this is also the
//! reference semantics the SQLite store must match.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use kagami_types::{Dependency, SlotRecord, SourceMeta, ViewMeta, ViewState};

use crate::error::AfsResult;
use crate::store::MetaStore;

type Key = (String, String);

/// Map-backed [`MetaStore`].
#[derive(Default)]
pub struct MemoryMetaStore {
    sources: DashMap<Key, SourceMeta>,
    /// (mount, path) -> view key -> record.
    views: DashMap<Key, HashMap<String, ViewMeta>>,
    /// (mount, artifact path) -> edges.
    deps: DashMap<Key, Vec<Dependency>>,
    /// (mount, owner path) -> slot id -> record.
    slots: DashMap<Key, HashMap<String, SlotRecord>>,
}

impl MemoryMetaStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(mount: &str, path: &str) -> Key {
        (mount.to_string(), path.to_string())
    }
}

impl std::fmt::Debug for MemoryMetaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMetaStore")
            .field("sources", &self.sources.len())
            .field("views", &self.views.len())
            .field("slots", &self.slots.len())
            .finish()
    }
}

#[async_trait]
impl MetaStore for MemoryMetaStore {
    async fn get_source(&self, mount: &str, path: &str) -> AfsResult<Option<SourceMeta>> {
        Ok(self.sources.get(&Self::key(mount, path)).map(|r| r.clone()))
    }

    async fn put_source(&self, mount: &str, path: &str, meta: &SourceMeta) -> AfsResult<()> {
        self.sources.insert(Self::key(mount, path), meta.clone());
        Ok(())
    }

    async fn delete_source(&self, mount: &str, path: &str) -> AfsResult<()> {
        self.sources.remove(&Self::key(mount, path));
        Ok(())
    }

    async fn get_view(
        &self,
        mount: &str,
        path: &str,
        view_key: &str,
    ) -> AfsResult<Option<ViewMeta>> {
        Ok(self
            .views
            .get(&Self::key(mount, path))
            .and_then(|m| m.get(view_key).cloned()))
    }

    async fn put_view(
        &self,
        mount: &str,
        path: &str,
        view_key: &str,
        meta: &ViewMeta,
    ) -> AfsResult<()> {
        self.views
            .entry(Self::key(mount, path))
            .or_default()
            .insert(view_key.to_string(), meta.clone());
        Ok(())
    }

    async fn list_views(&self, mount: &str, path: &str) -> AfsResult<Vec<(String, ViewMeta)>> {
        let mut views: Vec<(String, ViewMeta)> = self
            .views
            .get(&Self::key(mount, path))
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        views.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(views)
    }

    async fn delete_views(&self, mount: &str, path: &str) -> AfsResult<()> {
        self.views.remove(&Self::key(mount, path));
        Ok(())
    }

    async fn mark_views_stale(&self, mount: &str, path: &str) -> AfsResult<()> {
        if let Some(mut records) = self.views.get_mut(&Self::key(mount, path)) {
            for meta in records.values_mut() {
                meta.state = ViewState::Stale;
            }
        }
        Ok(())
    }

    async fn put_dependency(&self, mount: &str, dep: &Dependency) -> AfsResult<()> {
        let mut edges = self
            .deps
            .entry(Self::key(mount, &dep.path))
            .or_default();
        if let Some(existing) = edges.iter_mut().find(|e| {
            e.view_key == dep.view_key && e.input_path == dep.input_path && e.role == dep.role
        }) {
            *existing = dep.clone();
        } else {
            edges.push(dep.clone());
        }
        Ok(())
    }

    async fn dependencies_for(&self, mount: &str, path: &str) -> AfsResult<Vec<Dependency>> {
        Ok(self
            .deps
            .get(&Self::key(mount, path))
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn upsert_slot(&self, mount: &str, slot: &SlotRecord) -> AfsResult<()> {
        self.slots
            .entry(Self::key(mount, &slot.owner_path))
            .or_default()
            .insert(slot.slot_id.clone(), slot.clone());
        Ok(())
    }

    async fn get_slot(
        &self,
        mount: &str,
        owner_path: &str,
        slot_id: &str,
    ) -> AfsResult<Option<SlotRecord>> {
        Ok(self
            .slots
            .get(&Self::key(mount, owner_path))
            .and_then(|m| m.get(slot_id).cloned()))
    }

    async fn list_slots(&self, mount: &str, owner_path: &str) -> AfsResult<Vec<SlotRecord>> {
        let mut slots: Vec<SlotRecord> = self
            .slots
            .get(&Self::key(mount, owner_path))
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        slots.sort_by(|a, b| a.slot_id.cmp(&b.slot_id));
        Ok(slots)
    }

    async fn slot_by_asset(
        &self,
        mount: &str,
        asset_path: &str,
    ) -> AfsResult<Option<SlotRecord>> {
        for entry in self.slots.iter() {
            if entry.key().0 != mount {
                continue;
            }
            if let Some(slot) = entry.value().values().find(|s| s.asset_path == asset_path) {
                return Ok(Some(slot.clone()));
            }
        }
        Ok(None)
    }

    async fn delete_slots(&self, mount: &str, owner_path: &str) -> AfsResult<()> {
        self.slots.remove(&Self::key(mount, owner_path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_source_roundtrip() {
        let store = MemoryMetaStore::new();
        assert!(store.get_source("/docs", "/a.md").await.unwrap().is_none());

        let meta = SourceMeta::new("r1");
        store.put_source("/docs", "/a.md", &meta).await.unwrap();
        assert_eq!(
            store.get_source("/docs", "/a.md").await.unwrap().unwrap().revision,
            "r1"
        );

        // Mount scoping.
        assert!(store.get_source("/img", "/a.md").await.unwrap().is_none());

        store.delete_source("/docs", "/a.md").await.unwrap();
        assert!(store.get_source("/docs", "/a.md").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_view_roundtrip_and_stale_marking() {
        let store = MemoryMetaStore::new();
        store
            .put_view("/docs", "/a.md", "language=ja", &ViewMeta::ready("r1", "/.c/1"))
            .await
            .unwrap();
        store
            .put_view("/docs", "/a.md", "format=html", &ViewMeta::ready("r1", "/.c/2"))
            .await
            .unwrap();

        store.mark_views_stale("/docs", "/a.md").await.unwrap();
        for (_, meta) in store.list_views("/docs", "/a.md").await.unwrap() {
            assert_eq!(meta.state, ViewState::Stale);
            // Only the state flips; provenance stays.
            assert_eq!(meta.derived_from.as_deref(), Some("r1"));
        }

        store.delete_views("/docs", "/a.md").await.unwrap();
        assert!(store.list_views("/docs", "/a.md").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dependency_upsert_refreshes_revision() {
        let store = MemoryMetaStore::new();
        let dep = Dependency::source("/a.md", "language=ja", "/a.md", "r1");
        store.put_dependency("/docs", &dep).await.unwrap();

        let dep2 = Dependency::source("/a.md", "language=ja", "/a.md", "r2");
        store.put_dependency("/docs", &dep2).await.unwrap();

        let deps = store.dependencies_for("/docs", "/a.md").await.unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].input_revision, "r2");
    }

    #[tokio::test]
    async fn test_slot_roundtrip_and_asset_lookup() {
        let store = MemoryMetaStore::new();
        let slot = SlotRecord::new("/a.md", "hero", "a sunset", "k1", "/.assets/intent/k1.png", "r1");
        store.upsert_slot("/docs", &slot).await.unwrap();

        assert_eq!(
            store.get_slot("/docs", "/a.md", "hero").await.unwrap().unwrap().intent_key,
            "k1"
        );
        assert_eq!(store.list_slots("/docs", "/a.md").await.unwrap().len(), 1);

        let found = store
            .slot_by_asset("/docs", "/.assets/intent/k1.png")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.slot_id, "hero");
        assert!(store.slot_by_asset("/img", "/.assets/intent/k1.png").await.unwrap().is_none());

        store.delete_slots("/docs", "/a.md").await.unwrap();
        assert!(store.list_slots("/docs", "/a.md").await.unwrap().is_empty());
    }
}
