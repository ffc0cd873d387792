//! View cache engine.
//!
//! Reads with a non-empty view land here. The engine decides whether the
//! recorded artifact is still current (see [`ViewMeta::stale_against`]),
//! serves it when it is, and otherwise runs the one capable driver to
//! regenerate it. Strict reads block on generation; fallback reads return the
//! source immediately and push generation to a background task.
//!
//! Concurrent generations of the same (mount, path, view key) are coalesced
//! through a per-key async mutex: the first caller generates, later callers
//! re-check freshness under the lock and serve the cached artifact. The lock
//! map entry is dropped once no waiter holds it.

pub mod prefetch;

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use kagami_types::{CallContext, Dependency, Entry, SourceMeta, View, ViewKey, ViewMeta, ViewState};

use crate::config::{AfsConfig, WaitMode};
use crate::driver::{DriverRegistry, ProcessRequest};
use crate::error::{AfsError, AfsResult};
use crate::module::{Module, ReadResult};
use crate::revision::revision_of;
use crate::store::MetaStore;

pub use prefetch::{PrefetchOptions, PrefetchReport};

type GenKey = (String, String, String);

/// A routed target for view work: where the source lives and how callers
/// name it.
#[derive(Clone)]
pub struct ViewTarget {
    /// Root-namespace path, used for returned entries and error messages.
    pub path: String,
    /// Mount path (metadata key namespace).
    pub mount: String,
    /// Module-relative path.
    pub subpath: String,
    /// The module that owns the source.
    pub module: Arc<dyn Module>,
}

impl ViewTarget {
    /// Build a target from router output.
    pub fn new(
        path: impl Into<String>,
        mount: impl Into<String>,
        subpath: impl Into<String>,
        module: Arc<dyn Module>,
    ) -> Self {
        Self {
            path: path.into(),
            mount: mount.into(),
            subpath: subpath.into(),
            module,
        }
    }
}

impl fmt::Debug for ViewTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewTarget")
            .field("path", &self.path)
            .field("mount", &self.mount)
            .field("subpath", &self.subpath)
            .field("module", &self.module.name())
            .finish()
    }
}

/// The view cache engine.
///
/// Cheap to clone; all state is shared. Cloning is how background generation
/// tasks take a handle.
#[derive(Clone)]
pub struct ViewProcessor {
    store: Arc<dyn MetaStore>,
    drivers: Arc<DriverRegistry>,
    config: AfsConfig,
    gen_locks: Arc<DashMap<GenKey, Arc<Mutex<()>>>>,
}

impl fmt::Debug for ViewProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewProcessor")
            .field("drivers", &self.drivers.names())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ViewProcessor {
    /// Create an engine over a metadata store and driver registry.
    pub fn new(store: Arc<dyn MetaStore>, drivers: Arc<DriverRegistry>, config: AfsConfig) -> Self {
        Self {
            store,
            drivers,
            config,
            gen_locks: Arc::new(DashMap::new()),
        }
    }

    /// The metadata store this engine records into.
    pub fn store(&self) -> &Arc<dyn MetaStore> {
        &self.store
    }

    /// The driver registry this engine dispatches through.
    pub fn drivers(&self) -> &Arc<DriverRegistry> {
        &self.drivers
    }

    /// Current revision of the source behind `target`, plus the entry itself
    /// when one exists.
    ///
    /// A missing entry is only tolerated for synthetic sources (a recorded
    /// revision with a kind tag and no entry behind it); anything else is
    /// [`AfsError::NotFound`].
    pub async fn current_revision(&self, target: &ViewTarget) -> AfsResult<(String, Option<Entry>)> {
        match target.module.read(&target.subpath).await {
            Ok(entry) => Ok((revision_of(&entry), Some(entry))),
            Err(AfsError::NotFound(_)) => {
                match self.store.get_source(&target.mount, &target.subpath).await? {
                    Some(meta) if meta.is_synthetic() => Ok((meta.revision, None)),
                    _ => Err(AfsError::not_found(&target.path)),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Serve a view read: cached artifact when current, otherwise generate
    /// according to the wait mode.
    #[tracing::instrument(
        skip(self, target, view, ctx),
        fields(path = %target.path, view = %view.key(), wait = %wait),
        name = "views.read"
    )]
    pub async fn handle_read(
        &self,
        target: &ViewTarget,
        view: &View,
        wait: WaitMode,
        ctx: &CallContext,
    ) -> AfsResult<ReadResult> {
        let key = view.key();
        let (revision, source) = self.current_revision(target).await?;

        let meta = self
            .store
            .get_view(&target.mount, &target.subpath, key.as_str())
            .await?
            .unwrap_or_default();

        if meta.state == ViewState::Ready && !meta.stale_against(&revision) {
            match self.read_artifact(target, &meta).await {
                Some(artifact) => {
                    debug!("Serving cached view {} for {}", key, target.path);
                    return Ok(ReadResult::entry(self.overlay(target, &key, artifact)));
                }
                None => {
                    warn!(
                        "Ready record for {} [{}] has no readable artifact, regenerating",
                        target.path, key
                    );
                }
            }
        }

        match wait {
            WaitMode::Strict => self.process_view(target, view, ctx.clone()).await,
            WaitMode::Fallback => {
                let this = self.clone();
                let bg_target = target.clone();
                let bg_view = view.clone();
                let bg_ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(err) = this.process_view(&bg_target, &bg_view, bg_ctx).await {
                        warn!(
                            "Background generation failed for {} [{}]: {}",
                            bg_target.path,
                            bg_view.key(),
                            err
                        );
                    }
                });

                let message = format!(
                    "view '{}' is generating in the background; source content returned",
                    key
                );
                let entry = source.map(|mut e| {
                    e.path = target.path.clone();
                    e
                });
                Ok(ReadResult::with_message(entry, message))
            }
        }
    }

    /// Generate the artifact for one (target, view), coalescing with any
    /// in-flight generation of the same key.
    ///
    /// Driver resolution happens before anything is recorded, so a view
    /// nobody can produce fails without leaving a `generating` record behind.
    #[tracing::instrument(
        skip(self, target, view, ctx),
        fields(path = %target.path, view = %view.key()),
        name = "views.generate"
    )]
    pub async fn process_view(
        &self,
        target: &ViewTarget,
        view: &View,
        ctx: CallContext,
    ) -> AfsResult<ReadResult> {
        let key = view.key();
        let driver = self.drivers.resolve(view)?;

        let gen_key: GenKey = (
            target.mount.clone(),
            target.subpath.clone(),
            key.as_str().to_string(),
        );
        let lock = self
            .config
            .coalesce_generation
            .then(|| self.gen_locks.entry(gen_key.clone()).or_default().clone());
        let guard = match &lock {
            Some(l) => Some(l.lock().await),
            None => None,
        };

        let result = self.generate_locked(target, view, &key, driver.as_ref(), ctx).await;

        drop(guard);
        if let Some(lock) = lock {
            drop(lock);
            // Only reap the entry when no other waiter still holds it.
            self.gen_locks
                .remove_if(&gen_key, |_, v| Arc::strong_count(v) == 1);
        }
        result
    }

    async fn generate_locked(
        &self,
        target: &ViewTarget,
        view: &View,
        key: &ViewKey,
        driver: &dyn crate::driver::Driver,
        ctx: CallContext,
    ) -> AfsResult<ReadResult> {
        // Freshness may have been restored while we waited for the lock.
        let (revision, source) = self.current_revision(target).await?;
        let meta = self
            .store
            .get_view(&target.mount, &target.subpath, key.as_str())
            .await?
            .unwrap_or_default();
        if meta.state == ViewState::Ready && !meta.stale_against(&revision) {
            if let Some(artifact) = self.read_artifact(target, &meta).await {
                debug!("Coalesced with prior generation of {} [{}]", target.path, key);
                return Ok(ReadResult::entry(self.overlay(target, key, artifact)));
            }
        }

        // Synthetic sources carry their slot so drivers see the description.
        let slot = if source.is_none() {
            self.store
                .slot_by_asset(&target.mount, &target.subpath)
                .await?
        } else {
            None
        };

        // A source first reached through a read gets its record here, the
        // same shape a write would have stored.
        if source.is_some()
            && self
                .store
                .get_source(&target.mount, &target.subpath)
                .await?
                .is_none()
        {
            let meta = SourceMeta::new(&revision).with_drivers_hint(self.drivers.names());
            self.store
                .put_source(&target.mount, &target.subpath, &meta)
                .await?;
        }

        self.store
            .put_view(
                &target.mount,
                &target.subpath,
                key.as_str(),
                &ViewMeta::generating(&revision),
            )
            .await?;

        debug!(
            "Generating {} [{}] with driver '{}' from revision {}",
            target.path,
            key,
            driver.name(),
            revision
        );

        let request = ProcessRequest {
            source,
            derived_from: revision.clone(),
            slot,
            ctx,
        };
        let outcome = driver
            .process(Arc::clone(&target.module), &target.subpath, view, request)
            .await;

        match outcome {
            Ok(produced) => {
                let Some(storage_path) = produced.entry.storage_path().map(str::to_string) else {
                    let message =
                        format!("driver '{}' returned no storage path", driver.name());
                    self.record_failure(target, key, &message).await;
                    return Err(AfsError::generation(&target.path, key.clone(), message));
                };

                self.store
                    .put_view(
                        &target.mount,
                        &target.subpath,
                        key.as_str(),
                        &ViewMeta::ready(&revision, &storage_path),
                    )
                    .await?;
                self.store
                    .put_dependency(
                        &target.mount,
                        &Dependency::source(
                            &target.subpath,
                            key.as_str(),
                            &target.subpath,
                            &revision,
                        ),
                    )
                    .await?;

                let entry = self.overlay(target, key, produced.entry);
                Ok(match produced.message {
                    Some(message) => ReadResult::with_message(Some(entry), message),
                    None => ReadResult::entry(entry),
                })
            }
            Err(err) => {
                let message = err.to_string();
                self.record_failure(target, key, &message).await;
                Err(AfsError::generation(&target.path, key.clone(), message))
            }
        }
    }

    /// Refresh the source record after a write. Views are marked stale only
    /// when the revision actually moved. Returns the new revision.
    pub async fn on_write(&self, mount: &str, subpath: &str, entry: &Entry) -> AfsResult<String> {
        let revision = revision_of(entry);
        let previous = self.store.get_source(mount, subpath).await?;
        let changed = previous.as_ref().is_none_or(|m| m.revision != revision);

        // A real write replaces any synthetic record outright.
        let meta = SourceMeta::new(&revision).with_drivers_hint(self.drivers.names());
        self.store.put_source(mount, subpath, &meta).await?;

        if changed {
            self.store.mark_views_stale(mount, subpath).await?;
            debug!("Revision of {}{} moved to {}", mount, subpath, revision);
        }
        Ok(revision)
    }

    /// Drop all derived records for a deleted entry.
    pub async fn on_delete(&self, mount: &str, subpath: &str) -> AfsResult<()> {
        self.store.delete_views(mount, subpath).await?;
        self.store.delete_source(mount, subpath).await?;
        self.store.delete_slots(mount, subpath).await?;
        Ok(())
    }

    /// Drop derived records at the old path of a rename. The new path starts
    /// cold and regenerates on demand.
    pub async fn on_rename(&self, mount: &str, from: &str) -> AfsResult<()> {
        self.on_delete(mount, from).await
    }

    /// View records for one entry, sorted by view key.
    pub async fn views_of(&self, mount: &str, subpath: &str) -> AfsResult<Vec<(String, ViewMeta)>> {
        self.store.list_views(mount, subpath).await
    }

    async fn read_artifact(&self, target: &ViewTarget, meta: &ViewMeta) -> Option<Entry> {
        let storage_path = meta.storage_path.as_deref()?;
        target.module.read(storage_path).await.ok()
    }

    /// Rewrite an artifact for the caller: logical path, view tag, no
    /// internal storage location.
    fn overlay(&self, target: &ViewTarget, key: &ViewKey, mut artifact: Entry) -> Entry {
        artifact.path = target.path.clone();
        artifact.set_view_tag(key.as_str());
        artifact.take_storage_path();
        artifact
    }

    async fn record_failure(&self, target: &ViewTarget, key: &ViewKey, message: &str) {
        warn!("Generation of {} [{}] failed: {}", target.path, key, message);
        if let Err(err) = self
            .store
            .put_view(
                &target.mount,
                &target.subpath,
                key.as_str(),
                &ViewMeta::failed(message),
            )
            .await
        {
            warn!("Could not record failed view for {}: {}", target.path, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use kagami_types::Dimension;

    use crate::backends::MemoryModule;
    use crate::driver::{Driver, DriverResult};
    use crate::module::{DeleteOptions, Module, WriteRequest};
    use crate::store::MemoryMetaStore;

    /// Uppercases text sources into `/.cache/<name>`.
    struct UpperDriver {
        calls: AtomicUsize,
        delay_ms: u64,
        fail: bool,
    }

    impl UpperDriver {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay_ms: 0,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Driver for UpperDriver {
        fn name(&self) -> &str {
            "upper"
        }

        fn can_handle(&self, view: &View) -> bool {
            view.normalized(Dimension::Variant).as_deref() == Some("upper")
        }

        async fn process(
            &self,
            module: Arc<dyn Module>,
            path: &str,
            _view: &View,
            req: ProcessRequest,
        ) -> anyhow::Result<DriverResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail {
                anyhow::bail!("upper driver exploded");
            }
            let body = req
                .source
                .as_ref()
                .and_then(|e| e.content.as_ref())
                .and_then(|c| c.as_text())
                .unwrap_or_default()
                .to_uppercase();
            let storage = format!("/.cache/upper{}", path);
            let mut entry = module
                .write(&storage, WriteRequest::text(body))
                .await
                .map_err(anyhow::Error::from)?;
            entry.set_storage_path(&storage);
            Ok(DriverResult::new(entry))
        }
    }

    struct Fixture {
        module: Arc<MemoryModule>,
        driver: Arc<UpperDriver>,
        engine: ViewProcessor,
    }

    async fn fixture(driver: UpperDriver) -> Fixture {
        let module = Arc::new(MemoryModule::new());
        module
            .write("/hello.md", WriteRequest::text("hello"))
            .await
            .unwrap();

        let driver = Arc::new(driver);
        let registry = Arc::new(DriverRegistry::new());
        registry.register(Arc::clone(&driver) as Arc<dyn Driver>);

        let engine = ViewProcessor::new(
            Arc::new(MemoryMetaStore::new()),
            registry,
            AfsConfig::default(),
        );
        Fixture {
            module,
            driver,
            engine,
        }
    }

    fn target(f: &Fixture) -> ViewTarget {
        ViewTarget::new(
            "/docs/hello.md",
            "/docs",
            "/hello.md",
            Arc::clone(&f.module) as Arc<dyn Module>,
        )
    }

    fn upper_view() -> View {
        View::new().with_variant("upper")
    }

    #[tokio::test]
    async fn test_strict_read_generates_then_caches() {
        let f = fixture(UpperDriver::new()).await;
        let t = target(&f);
        let view = upper_view();

        let result = f
            .engine
            .handle_read(&t, &view, WaitMode::Strict, &CallContext::new())
            .await
            .unwrap();
        let entry = result.entry.unwrap();
        assert_eq!(entry.path, "/docs/hello.md");
        assert_eq!(entry.content.as_ref().and_then(|c| c.as_text()), Some("HELLO"));
        assert_eq!(entry.view_tag(), Some("variant=upper"));
        assert!(entry.storage_path().is_none());
        assert_eq!(f.driver.calls.load(Ordering::SeqCst), 1);

        // First engine contact recorded the source, hint included.
        let source = f
            .engine
            .store()
            .get_source("/docs", "/hello.md")
            .await
            .unwrap()
            .unwrap();
        assert!(source.drivers_hint.contains(&"upper".to_string()));
        assert!(!source.is_synthetic());

        // Second read is a pure cache hit.
        let result = f
            .engine
            .handle_read(&t, &view, WaitMode::Strict, &CallContext::new())
            .await
            .unwrap();
        assert_eq!(
            result.entry.unwrap().content.as_ref().and_then(|c| c.as_text()),
            Some("HELLO")
        );
        assert_eq!(f.driver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_invalidates_and_regenerates() {
        let f = fixture(UpperDriver::new()).await;
        let t = target(&f);
        let view = upper_view();
        let ctx = CallContext::new();

        f.engine
            .handle_read(&t, &view, WaitMode::Strict, &ctx)
            .await
            .unwrap();

        let entry = f
            .module
            .write("/hello.md", WriteRequest::text("world"))
            .await
            .unwrap();
        f.engine.on_write("/docs", "/hello.md", &entry).await.unwrap();

        let result = f
            .engine
            .handle_read(&t, &view, WaitMode::Strict, &ctx)
            .await
            .unwrap();
        assert_eq!(
            result.entry.unwrap().content.as_ref().and_then(|c| c.as_text()),
            Some("WORLD")
        );
        assert_eq!(f.driver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unchanged_write_keeps_cache() {
        let f = fixture(UpperDriver::new()).await;
        let t = target(&f);
        let view = upper_view();
        let ctx = CallContext::new();

        f.engine
            .handle_read(&t, &view, WaitMode::Strict, &ctx)
            .await
            .unwrap();

        // Same bytes, same revision: no invalidation.
        let entry = f
            .module
            .write("/hello.md", WriteRequest::text("hello"))
            .await
            .unwrap();
        f.engine.on_write("/docs", "/hello.md", &entry).await.unwrap();

        f.engine
            .handle_read(&t, &view, WaitMode::Strict, &ctx)
            .await
            .unwrap();
        assert_eq!(f.driver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lost_artifact_regenerates() {
        let f = fixture(UpperDriver::new()).await;
        let t = target(&f);
        let view = upper_view();
        let ctx = CallContext::new();

        f.engine
            .handle_read(&t, &view, WaitMode::Strict, &ctx)
            .await
            .unwrap();
        assert_eq!(f.driver.calls.load(Ordering::SeqCst), 1);

        // A ready record whose artifact is gone must not be served stale.
        f.module
            .delete("/.cache/upper/hello.md", &DeleteOptions::default())
            .await
            .unwrap();

        let result = f
            .engine
            .handle_read(&t, &view, WaitMode::Strict, &ctx)
            .await
            .unwrap();
        assert_eq!(
            result.entry.unwrap().content.as_ref().and_then(|c| c.as_text()),
            Some("HELLO")
        );
        assert_eq!(f.driver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_recorded_and_surfaced() {
        let f = fixture(UpperDriver {
            calls: AtomicUsize::new(0),
            delay_ms: 0,
            fail: true,
        })
        .await;
        let t = target(&f);
        let view = upper_view();

        let err = f
            .engine
            .handle_read(&t, &view, WaitMode::Strict, &CallContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AfsError::Generation { .. }));

        let meta = f
            .engine
            .store()
            .get_view("/docs", "/hello.md", view.key().as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.state, ViewState::Failed);
        assert!(meta.error.as_deref().unwrap_or_default().contains("exploded"));
    }

    #[tokio::test]
    async fn test_no_driver_leaves_no_record() {
        let f = fixture(UpperDriver::new()).await;
        let t = target(&f);
        let view = View::new().with_format("pdf");

        let err = f
            .engine
            .handle_read(&t, &view, WaitMode::Strict, &CallContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AfsError::NoDriver(_)));

        let meta = f
            .engine
            .store()
            .get_view("/docs", "/hello.md", view.key().as_str())
            .await
            .unwrap();
        assert!(meta.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_strict_reads_coalesce() {
        let f = fixture(UpperDriver {
            calls: AtomicUsize::new(0),
            delay_ms: 50,
            fail: false,
        })
        .await;
        let t = target(&f);
        let view = upper_view();
        let ctx = CallContext::new();

        let (a, b) = tokio::join!(
            f.engine.handle_read(&t, &view, WaitMode::Strict, &ctx),
            f.engine.handle_read(&t, &view, WaitMode::Strict, &ctx),
        );
        assert_eq!(
            a.unwrap().entry.unwrap().content.as_ref().and_then(|c| c.as_text()),
            Some("HELLO")
        );
        assert_eq!(
            b.unwrap().entry.unwrap().content.as_ref().and_then(|c| c.as_text()),
            Some("HELLO")
        );
        assert_eq!(f.driver.calls.load(Ordering::SeqCst), 1);
        assert!(f.engine.gen_locks.is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_is_not_found() {
        let f = fixture(UpperDriver::new()).await;
        let t = ViewTarget::new(
            "/docs/absent.md",
            "/docs",
            "/absent.md",
            Arc::clone(&f.module) as Arc<dyn Module>,
        );

        let err = f
            .engine
            .handle_read(&t, &upper_view(), WaitMode::Strict, &CallContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AfsError::NotFound(p) if p == "/docs/absent.md"));
    }

    #[tokio::test]
    async fn test_delete_drops_records() {
        let f = fixture(UpperDriver::new()).await;
        let t = target(&f);
        let view = upper_view();

        f.engine
            .handle_read(&t, &view, WaitMode::Strict, &CallContext::new())
            .await
            .unwrap();
        assert_eq!(f.engine.views_of("/docs", "/hello.md").await.unwrap().len(), 1);

        f.engine.on_delete("/docs", "/hello.md").await.unwrap();
        assert!(f.engine.views_of("/docs", "/hello.md").await.unwrap().is_empty());
        assert!(
            f.engine
                .store()
                .get_source("/docs", "/hello.md")
                .await
                .unwrap()
                .is_none()
        );
    }
}
