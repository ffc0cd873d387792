//! The filesystem facade.
//!
//! [`AgentFs`] is what embedders hold: mount management plus the seven
//! operations, routed through the mount table. Paths crossing the facade are
//! root-namespace; modules only ever see their own subtree. Reads with a view
//! hand off to the view cache engine; writes refresh revision bookkeeping and
//! run the slot scanner over text content.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use kagami_types::{CallContext, Entry, SlotRecord, View, ViewMeta};

use crate::config::AfsConfig;
use crate::driver::DriverRegistry;
use crate::error::{AfsError, AfsResult};
use crate::module::{
    Capability, DeleteOptions, DeleteResult, ListOptions, ListResult, Module, ReadOptions,
    ReadResult, RenameOptions, RenameResult, SearchOptions, WriteRequest, WriteResult,
};
use crate::mount::{ModuleMatch, MountSet};
use crate::paths;
use crate::slots::SlotScanner;
use crate::store::MetaStore;
use crate::views::{PrefetchOptions, PrefetchReport, ViewProcessor, ViewTarget};

/// Virtual filesystem over mounted modules.
pub struct AgentFs {
    mounts: MountSet,
    engine: ViewProcessor,
    scanner: SlotScanner,
    config: AfsConfig,
}

impl fmt::Debug for AgentFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentFs")
            .field("mounts", &self.mounts)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AgentFs {
    /// Create a filesystem with a fresh driver registry and default config.
    pub fn new(store: Arc<dyn MetaStore>) -> Self {
        Self::with_config(store, AfsConfig::default())
    }

    /// Create a filesystem with a fresh driver registry.
    pub fn with_config(store: Arc<dyn MetaStore>, config: AfsConfig) -> Self {
        Self::with_registry(store, Arc::new(DriverRegistry::new()), config)
    }

    /// Create a filesystem over an existing driver registry.
    pub fn with_registry(
        store: Arc<dyn MetaStore>,
        drivers: Arc<DriverRegistry>,
        config: AfsConfig,
    ) -> Self {
        let engine = ViewProcessor::new(
            Arc::clone(&store),
            Arc::clone(&drivers),
            config.clone(),
        );
        let scanner = SlotScanner::new(store, drivers);
        Self {
            mounts: MountSet::new(),
            engine,
            scanner,
            config,
        }
    }

    /// The driver registry reads dispatch through.
    pub fn drivers(&self) -> &Arc<DriverRegistry> {
        self.engine.drivers()
    }

    /// The metadata store backing revision and view records.
    pub fn store(&self) -> &Arc<dyn MetaStore> {
        self.engine.store()
    }

    /// Engine configuration.
    pub fn config(&self) -> &AfsConfig {
        &self.config
    }

    // ========================================================================
    // Mount management
    // ========================================================================

    /// Mount a module at a top-level path.
    pub async fn mount(&self, path: &str, module: Arc<dyn Module>) -> AfsResult<()> {
        self.mounts.mount(path, module).await
    }

    /// Unmount the module at `path`. Returns whether one was mounted.
    pub async fn unmount(&self, path: &str) -> bool {
        self.mounts.unmount(path).await
    }

    /// All mount paths, sorted.
    pub async fn mount_paths(&self) -> Vec<String> {
        self.mounts.mount_paths().await
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// List entries under `path` across every mounted module it touches.
    ///
    /// Mounts sitting below the path surface as synthesized directories. A
    /// module that fails or does not list is skipped with a note in the
    /// result message; the call itself still succeeds.
    #[tracing::instrument(skip(self, opts), name = "afs.list")]
    pub async fn list(&self, path: &str, opts: &ListOptions) -> AfsResult<ListResult> {
        let depth = if opts.recursive {
            usize::MAX
        } else {
            opts.max_depth.unwrap_or(self.config.default_max_depth)
        };
        let matches = self.mounts.resolve(path, depth, false).await;
        if matches.is_empty() {
            if paths::normalize(path) == "/" {
                return Ok(ListResult::default());
            }
            return Err(AfsError::no_module(path));
        }

        let mut entries: Vec<Entry> = Vec::new();
        let mut notes: Vec<String> = Vec::new();
        let mut seen_virtual: HashSet<String> = HashSet::new();

        for m in matches {
            if let Some(virt) = &m.remained_mount {
                let dir = Entry::dir(virt);
                let keep = opts
                    .filter
                    .as_ref()
                    .is_none_or(|f| dir.name().contains(f.as_str()));
                if keep && seen_virtual.insert(virt.clone()) {
                    entries.push(dir);
                }
                if m.max_depth == 0 {
                    continue;
                }
            }
            if !m.module.supports(Capability::List) {
                notes.push(format!("{}: list not supported", m.mount_path));
                continue;
            }
            match m.module.list(&m.subpath, m.max_depth, opts).await {
                Ok(children) => {
                    entries.extend(
                        children
                            .into_iter()
                            .map(|e| rebase(e, &m.mount_path)),
                    );
                }
                Err(err) => {
                    warn!("List fan-out skipping {}: {}", m.mount_path, err);
                    notes.push(format!("{}: {}", m.mount_path, err));
                }
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries.dedup_by(|a, b| a.path == b.path);
        if let Some(limit) = opts.limit {
            entries.truncate(limit);
        }

        let message = (!notes.is_empty()).then(|| notes.join("; "));
        Ok(ListResult { entries, message })
    }

    /// Read the entry at `path`, materializing the requested view if any.
    #[tracing::instrument(skip(self, opts), name = "afs.read")]
    pub async fn read(&self, path: &str, opts: &ReadOptions) -> AfsResult<ReadResult> {
        let m = self.mounts.resolve_exact(path).await?;
        require(&m, Capability::Read)?;

        if opts.view.is_empty() {
            let entry = m
                .module
                .read(&m.subpath)
                .await
                .map_err(|e| rescope_not_found(e, path))?;
            return Ok(ReadResult::entry(rebase(entry, &m.mount_path)));
        }

        let wait = opts.wait.unwrap_or(self.config.wait_mode);
        let target = ViewTarget::new(
            paths::normalize(path),
            m.mount_path,
            m.subpath,
            m.module,
        );
        self.engine
            .handle_read(&target, &opts.view, wait, &opts.ctx)
            .await
    }

    /// Create or overwrite the entry at `path`.
    ///
    /// Text content is scanned for slot markers; a malformed marker set
    /// (duplicate slot id) rejects the write before the module sees it.
    #[tracing::instrument(skip(self, req), name = "afs.write")]
    pub async fn write(&self, path: &str, req: WriteRequest) -> AfsResult<WriteResult> {
        let m = self.mounts.resolve_exact(path).await?;
        require(&m, Capability::Write)?;

        let scan_text = self
            .config
            .scan_slots_on_write
            .then(|| req.content.as_text().map(str::to_string))
            .flatten();
        if let Some(text) = &scan_text {
            self.scanner.parse_markers(&m.subpath, text)?;
        }

        let entry = m.module.write(&m.subpath, req).await?;
        let revision = self
            .engine
            .on_write(&m.mount_path, &m.subpath, &entry)
            .await?;

        let mut message = None;
        if let Some(text) = &scan_text {
            let outcome = self
                .scanner
                .scan(&m.mount_path, &m.subpath, text, &revision)
                .await?;
            if !outcome.slots.is_empty() {
                message = Some(format!(
                    "{} slot(s) registered, {} new asset(s)",
                    outcome.slots.len(),
                    outcome.new_assets.len()
                ));
            }
        }

        Ok(WriteResult {
            entry: rebase(entry, &m.mount_path),
            message,
        })
    }

    /// Delete the entry at `path` and drop its derived records.
    #[tracing::instrument(skip(self, opts), name = "afs.delete")]
    pub async fn delete(&self, path: &str, opts: &DeleteOptions) -> AfsResult<DeleteResult> {
        let m = self.mounts.resolve_exact(path).await?;
        require(&m, Capability::Delete)?;

        m.module
            .delete(&m.subpath, opts)
            .await
            .map_err(|e| rescope_not_found(e, path))?;
        self.engine.on_delete(&m.mount_path, &m.subpath).await?;
        Ok(DeleteResult::default())
    }

    /// Move `from` to `to`. Both must resolve into the same module.
    #[tracing::instrument(skip(self, opts), name = "afs.rename")]
    pub async fn rename(
        &self,
        from: &str,
        to: &str,
        opts: &RenameOptions,
    ) -> AfsResult<RenameResult> {
        let mf = self.mounts.resolve_exact(from).await?;
        let mt = self.mounts.resolve_exact(to).await?;
        if !Arc::ptr_eq(&mf.module, &mt.module) {
            return Err(AfsError::CrossModuleRename {
                from: paths::normalize(from),
                to: paths::normalize(to),
            });
        }
        require(&mf, Capability::Rename)?;

        mf.module
            .rename(&mf.subpath, &mt.subpath, opts)
            .await
            .map_err(|e| rescope_not_found(e, from))?;
        self.engine.on_rename(&mf.mount_path, &mf.subpath).await?;
        Ok(RenameResult::default())
    }

    /// Search content under `path` across every module it touches.
    #[tracing::instrument(skip(self, opts), name = "afs.search")]
    pub async fn search(
        &self,
        path: &str,
        query: &str,
        opts: &SearchOptions,
    ) -> AfsResult<ListResult> {
        let matches = self.mounts.resolve(path, usize::MAX, false).await;
        if matches.is_empty() {
            if paths::normalize(path) == "/" {
                return Ok(ListResult::default());
            }
            return Err(AfsError::no_module(path));
        }

        let mut entries: Vec<Entry> = Vec::new();
        let mut notes: Vec<String> = Vec::new();
        for m in matches {
            if !m.module.supports(Capability::Search) {
                notes.push(format!("{}: search not supported", m.mount_path));
                continue;
            }
            match m.module.search(&m.subpath, query, opts).await {
                Ok(hits) => {
                    entries.extend(hits.into_iter().map(|e| rebase(e, &m.mount_path)));
                }
                Err(err) => {
                    warn!("Search fan-out skipping {}: {}", m.mount_path, err);
                    notes.push(format!("{}: {}", m.mount_path, err));
                }
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries.dedup_by(|a, b| a.path == b.path);
        if let Some(limit) = opts.limit {
            entries.truncate(limit);
        }

        let message = (!notes.is_empty()).then(|| notes.join("; "));
        Ok(ListResult { entries, message })
    }

    /// Run a module-defined command against `path`.
    #[tracing::instrument(skip(self, args, ctx), name = "afs.exec")]
    pub async fn exec(
        &self,
        path: &str,
        command: &str,
        args: Value,
        ctx: &CallContext,
    ) -> AfsResult<Value> {
        let m = self.mounts.resolve_exact(path).await?;
        require(&m, Capability::Exec)?;
        m.module.exec(&m.subpath, command, args, ctx).await
    }

    /// Bring a batch of (path, view) artifacts current with bounded
    /// concurrency. Paths that don't resolve are reported as failures.
    #[tracing::instrument(skip_all, fields(targets = items.len()), name = "afs.prefetch")]
    pub async fn prefetch(
        &self,
        items: &[(String, View)],
        opts: &PrefetchOptions,
    ) -> PrefetchReport {
        let mut targets: Vec<(ViewTarget, View)> = Vec::new();
        let mut unroutable: Vec<(String, String)> = Vec::new();

        for (path, view) in items {
            match self.mounts.resolve_exact(path).await {
                Ok(m) => targets.push((
                    ViewTarget::new(paths::normalize(path), m.mount_path, m.subpath, m.module),
                    view.clone(),
                )),
                Err(err) => unroutable.push((
                    format!("{} [{}]", paths::normalize(path), view.key()),
                    err.to_string(),
                )),
            }
        }

        let mut report = self.engine.prefetch(targets, opts).await;
        report.failed.extend(unroutable);
        report
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// View records for the entry at `path`, sorted by view key.
    pub async fn views_of(&self, path: &str) -> AfsResult<Vec<(String, ViewMeta)>> {
        let m = self.mounts.resolve_exact(path).await?;
        self.engine.views_of(&m.mount_path, &m.subpath).await
    }

    /// Slot records scanned from the document at `path`.
    pub async fn slots_of(&self, path: &str) -> AfsResult<Vec<SlotRecord>> {
        let m = self.mounts.resolve_exact(path).await?;
        self.store().list_slots(&m.mount_path, &m.subpath).await
    }
}

fn require(m: &ModuleMatch, cap: Capability) -> AfsResult<()> {
    if m.module.supports(cap) {
        Ok(())
    } else {
        Err(AfsError::unsupported(m.module.name(), cap.as_str()))
    }
}

/// Rewrite a module-relative entry path into the root namespace.
fn rebase(mut entry: Entry, mount: &str) -> Entry {
    entry.path = paths::join(mount, &entry.path);
    entry
}

/// Module errors name module-relative paths; callers get root-namespace ones.
fn rescope_not_found(err: AfsError, path: &str) -> AfsError {
    match err {
        AfsError::NotFound(_) => AfsError::not_found(paths::normalize(path)),
        other => other,
    }
}
