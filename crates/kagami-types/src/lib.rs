//! Shared entry, view, and metadata types for Kagami.
//!
//! This crate is the data-model foundation: entries, views and their canonical
//! keys, source/view metadata records, dependency edges, slots, and call
//! context. It has **no internal kagami dependencies** — a pure leaf crate
//! that the kernel builds on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Entry (EntryId) ← one node in the mounted namespace
//!     └── addressed by logical path ("/docs/a.md")
//!     └── carries Content (text or binary)
//!     └── read through a View → materialized artifact
//!
//! View ← requested representation (language/format/variant/policy)
//!     └── canonicalizes to a ViewKey ("format=png;language=ja")
//!     └── tracked per (path, ViewKey) as ViewMeta
//!
//! SourceMeta ← revision fingerprint of the source entry
//!     └── ViewMeta.derived_from compares against it for staleness
//!     └── Dependency edges record which inputs produced which artifacts
//!
//! Slot ← content-embedded asset marker in a document
//!     └── normalizes to an intent key → synthetic asset path
//! ```
//!
//! # Key Types
//!
//! |----------------|---------------------------------------------------|
//! | Type           | Purpose                                           |
//! |----------------|---------------------------------------------------|
//! | [`Entry`]      | Filesystem node (path + content + metadata)       |
//! | [`Content`]    | Text or binary payload                            |
//! | [`View`]       | Requested representation (four dimensions)        |
//! | [`ViewKey`]    | Canonical cache key for a view                    |
//! | [`ViewState`]  | Artifact lifecycle (missing → ready → stale)      |
//! | [`SourceMeta`] | Source revision record                            |
//! | [`ViewMeta`]   | Per-(path, view) artifact record                  |
//! | [`Dependency`] | Artifact provenance edge                          |
//! | [`SlotRecord`] | Scanned asset marker (owner + intent + asset)     |
//! |----------------|---------------------------------------------------|

pub mod context;
pub mod entry;
pub mod ids;
pub mod meta;
pub mod slot;
pub mod view;

// Re-export primary types at crate root for convenience.
pub use context::CallContext;
pub use entry::{Content, Entry};
pub use ids::EntryId;
pub use meta::{Dependency, DependencyRole, SourceMeta, ViewMeta};
pub use slot::SlotRecord;
pub use view::{Dimension, View, ViewKey, ViewState};

/// Current time as Unix milliseconds. Used by constructors throughout the crate.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
