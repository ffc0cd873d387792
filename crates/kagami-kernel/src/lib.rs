//! # kagami-kernel
//!
//! Mounted-module filesystem engine with a materialized view cache.
//!
//! The engine owns `/` and routes every operation to the modules mounted
//! under it. An operation:
//! - Resolves its path against the mount table (depth-aware, multi-match
//!   for listings, exact for mutations)
//! - Fans out to the matched modules and reassembles results in the root
//!   namespace
//! - On read, consults the view cache: a requested view is served from its
//!   materialized artifact when fresh, regenerated through a driver when not
//! - On write, refreshes the source revision, marks derived views stale, and
//!   scans text for slot markers

pub mod afs;
pub mod backends;
pub mod config;
pub mod driver;
pub mod error;
pub mod module;
pub mod mount;
pub mod paths;
pub mod revision;
pub mod slots;
pub mod store;
pub mod views;

pub use afs::AgentFs;
pub use backends::MemoryModule;
pub use config::{AfsConfig, WaitMode};
pub use driver::{Driver, DriverRegistry, DriverResult, ProcessRequest};
pub use error::{AfsError, AfsResult};
pub use module::{
    Capability, DeleteOptions, DeleteResult, ListOptions, ListResult, Module, ReadOptions,
    ReadResult, RenameOptions, RenameResult, SearchOptions, WriteRequest, WriteResult,
};
pub use mount::{ModuleMatch, MountSet};
pub use slots::{ScanOutcome, SlotMarker, SlotScanner};
pub use store::{MemoryMetaStore, MetaStore, SqliteMetaStore};
pub use views::{PrefetchOptions, PrefetchReport, ViewProcessor, ViewTarget};

/// Current time as Unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
