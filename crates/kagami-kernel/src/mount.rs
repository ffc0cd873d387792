//! Mount set with depth-aware routing.
//!
//! Modules mount at single-segment paths (`/docs`, `/img`). Routing answers
//! two different questions:
//!
//! - **Exact**: which one module owns this path? Used by read, write, delete,
//!   rename, and exec.
//! - **Listing**: which modules are visible within a depth budget below this
//!   path? A mount sitting below the query appears as a virtual directory,
//!   and descending into it costs depth — a mount one level down consumes one
//!   level of budget before the module sees the rest.
//!
//! Mount paths are validated here, at configuration time, so operation-time
//! code never meets a malformed mount.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{AfsError, AfsResult};
use crate::module::Module;
use crate::paths;

/// One routing match.
#[derive(Clone)]
pub struct ModuleMatch {
    /// Where the module is mounted (`/docs`).
    pub mount_path: String,
    /// The matched module.
    pub module: Arc<dyn Module>,
    /// Query path relative to the mount — `/` when the query sits at or
    /// above the mount.
    pub subpath: String,
    /// Remaining depth budget to forward into the module.
    pub max_depth: usize,
    /// Virtual directory to synthesize below the query, when the mount sits
    /// below it. `None` for descend matches.
    pub remained_mount: Option<String>,
}

impl std::fmt::Debug for ModuleMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleMatch")
            .field("mount_path", &self.mount_path)
            .field("subpath", &self.subpath)
            .field("max_depth", &self.max_depth)
            .field("remained_mount", &self.remained_mount)
            .finish()
    }
}

/// The mounted namespace.
pub struct MountSet {
    /// Modules keyed by normalized mount path. Ordered, so fan-out is
    /// deterministic.
    mounts: RwLock<BTreeMap<String, Arc<dyn Module>>>,
}

impl std::fmt::Debug for MountSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountSet")
            .field("mounts", &"<locked>")
            .finish()
    }
}

impl Default for MountSet {
    fn default() -> Self {
        Self::new()
    }
}

impl MountSet {
    /// Create an empty mount set.
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Mount a module.
    ///
    /// The path must normalize to exactly one non-empty segment, and nothing
    /// may already be mounted there.
    pub async fn mount(&self, path: &str, module: Arc<dyn Module>) -> AfsResult<()> {
        let normalized = paths::normalize(path);
        if paths::segments(&normalized).len() != 1 {
            return Err(AfsError::invalid_mount(path));
        }
        let mut mounts = self.mounts.write().await;
        if mounts.contains_key(&normalized) {
            return Err(AfsError::DuplicateMount(normalized));
        }
        mounts.insert(normalized, module);
        Ok(())
    }

    /// Unmount the module at `path`.
    ///
    /// Returns `true` if a mount was removed, `false` if nothing was mounted
    /// there.
    pub async fn unmount(&self, path: &str) -> bool {
        let normalized = paths::normalize(path);
        self.mounts.write().await.remove(&normalized).is_some()
    }

    /// All mount paths, sorted.
    pub async fn mount_paths(&self) -> Vec<String> {
        self.mounts.read().await.keys().cloned().collect()
    }

    /// The module mounted at exactly `path`, if any.
    pub async fn get(&self, path: &str) -> Option<Arc<dyn Module>> {
        let normalized = paths::normalize(path);
        self.mounts.read().await.get(&normalized).cloned()
    }

    /// Match mounted modules against a query path.
    ///
    /// Descend matches (query at or inside a mount) keep the full budget and
    /// carry the module-relative subpath. Virtual-directory matches (mount
    /// below the query) spend one budget level per mount segment between
    /// query and mount; a mount deeper than the budget is excluded entirely.
    /// With `exact`, only descend matches are considered.
    pub async fn resolve(&self, path: &str, max_depth: usize, exact: bool) -> Vec<ModuleMatch> {
        let query = paths::normalize(path);
        let query_segs = paths::segments(&query);

        let mounts = self.mounts.read().await;
        let mut matches = Vec::new();

        for (mount_path, module) in mounts.iter() {
            let mount_segs = paths::segments(mount_path);

            if paths::starts_with(&query_segs, &mount_segs) {
                // Query sits at or inside this mount.
                let rest = &query_segs[mount_segs.len()..];
                let subpath = if rest.is_empty() {
                    "/".to_string()
                } else {
                    format!("/{}", rest.join("/"))
                };
                matches.push(ModuleMatch {
                    mount_path: mount_path.clone(),
                    module: Arc::clone(module),
                    subpath,
                    max_depth,
                    remained_mount: None,
                });
            } else if !exact && paths::starts_with(&mount_segs, &query_segs) {
                // Mount sits strictly below the query.
                let below = &mount_segs[query_segs.len()..];
                let diff = below.len();
                if max_depth < diff {
                    continue;
                }
                let visible = diff.min(max_depth);
                let remained = paths::join(&query, &below[..visible].join("/"));
                matches.push(ModuleMatch {
                    mount_path: mount_path.clone(),
                    module: Arc::clone(module),
                    subpath: "/".to_string(),
                    max_depth: max_depth - diff,
                    remained_mount: Some(remained),
                });
            }
        }

        matches
    }

    /// The one module owning `path`.
    pub async fn resolve_exact(&self, path: &str) -> AfsResult<ModuleMatch> {
        self.resolve(path, 0, true)
            .await
            .into_iter()
            .next()
            .ok_or_else(|| AfsError::no_module(path))
    }
}
