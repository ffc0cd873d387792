//! Metadata store contract and implementations.
//!
//! The store persists everything the view cache knows that isn't content:
//! source revisions, per-view lifecycle records, provenance edges, and slot
//! records. All writes are single-row upserts — correctness never depends on
//! multi-entity transactions, so any keyed store can implement this.
//!
//! Keys are (mount, path) pairs: the mount path scopes a module's namespace,
//! and paths are module-relative. View records add the canonical view key.

use async_trait::async_trait;

use kagami_types::{Dependency, SlotRecord, SourceMeta, ViewMeta};

use crate::error::AfsResult;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryMetaStore;
pub use sqlite::SqliteMetaStore;

/// Persistence for revision, view, dependency, and slot records.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Source revision record for (mount, path).
    async fn get_source(&self, mount: &str, path: &str) -> AfsResult<Option<SourceMeta>>;

    /// Upsert the source revision record.
    async fn put_source(&self, mount: &str, path: &str, meta: &SourceMeta) -> AfsResult<()>;

    /// Drop the source revision record.
    async fn delete_source(&self, mount: &str, path: &str) -> AfsResult<()>;

    /// View record for (mount, path, view key).
    async fn get_view(&self, mount: &str, path: &str, view_key: &str)
        -> AfsResult<Option<ViewMeta>>;

    /// Upsert a view record.
    async fn put_view(
        &self,
        mount: &str,
        path: &str,
        view_key: &str,
        meta: &ViewMeta,
    ) -> AfsResult<()>;

    /// All view records for (mount, path), as (view key, record) pairs.
    async fn list_views(&self, mount: &str, path: &str) -> AfsResult<Vec<(String, ViewMeta)>>;

    /// Drop every view record for (mount, path).
    async fn delete_views(&self, mount: &str, path: &str) -> AfsResult<()>;

    /// Blanket-mark every view record for (mount, path) stale.
    ///
    /// Generating records are marked too; the in-flight run will complete
    /// against the old revision and the next staleness comparison catches it.
    async fn mark_views_stale(&self, mount: &str, path: &str) -> AfsResult<()>;

    /// Upsert a provenance edge. Edges are identified by
    /// (path, view key, input path, role); the input revision refreshes.
    async fn put_dependency(&self, mount: &str, dep: &Dependency) -> AfsResult<()>;

    /// All provenance edges whose artifact is (mount, path).
    async fn dependencies_for(&self, mount: &str, path: &str) -> AfsResult<Vec<Dependency>>;

    /// Upsert a slot record, identified by (owner path, slot id).
    async fn upsert_slot(&self, mount: &str, slot: &SlotRecord) -> AfsResult<()>;

    /// Slot record by (owner path, slot id).
    async fn get_slot(
        &self,
        mount: &str,
        owner_path: &str,
        slot_id: &str,
    ) -> AfsResult<Option<SlotRecord>>;

    /// All slot records owned by a document.
    async fn list_slots(&self, mount: &str, owner_path: &str) -> AfsResult<Vec<SlotRecord>>;

    /// Any slot record whose asset path matches, across owners.
    async fn slot_by_asset(&self, mount: &str, asset_path: &str)
        -> AfsResult<Option<SlotRecord>>;

    /// Drop every slot record owned by a document.
    async fn delete_slots(&self, mount: &str, owner_path: &str) -> AfsResult<()>;
}
