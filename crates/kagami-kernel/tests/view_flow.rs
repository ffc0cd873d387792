//! End-to-end flows through the `AgentFs` facade.
//!
//! # Tiers
//!
//! - **Tier 1:** View lifecycle — write → strict read materializes →
//!   cached serve → edit invalidates → regenerate
//! - **Tier 2:** Wait modes — fallback returns source immediately, the
//!   artifact completes in the background
//! - **Tier 3:** Prefetch — batch warming with bounded concurrency and
//!   per-item failure reporting
//! - **Tier 4:** Slot markers — documents declaring intent slots register
//!   shared synthetic assets that materialize on first read
//! - **Tier 5:** Persistence — view records survive a SQLite store reopen

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use kagami_kernel::{
    AfsConfig, AgentFs, Driver, DriverResult, MemoryMetaStore, MemoryModule, MetaStore, Module,
    PrefetchOptions, ProcessRequest, ReadOptions, ReadResult, SqliteMetaStore, WaitMode,
    WriteRequest,
};
use kagami_types::{Dimension, View, ViewState};

// ============================================================================
// Shared test setup
// ============================================================================

/// Opt-in tracing output, driven by `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Driver for `variant=upper`: uppercases the source text and stores the
/// artifact back into the module under `/.cache/upper`.
struct UpperDriver {
    calls: AtomicUsize,
}

impl UpperDriver {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
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

/// Driver for `format=png` intent assets: no source entry exists, so the
/// slot record's description is the only input.
struct IntentPngDriver {
    calls: AtomicUsize,
}

impl IntentPngDriver {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Driver for IntentPngDriver {
    fn name(&self) -> &str {
        "intent-png"
    }

    fn can_handle(&self, view: &View) -> bool {
        view.normalized(Dimension::Format).as_deref() == Some("png")
    }

    async fn process(
        &self,
        module: Arc<dyn Module>,
        path: &str,
        _view: &View,
        req: ProcessRequest,
    ) -> anyhow::Result<DriverResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let desc = req
            .slot
            .as_ref()
            .map(|s| s.desc.as_str())
            .unwrap_or_default();
        let bytes = format!("PNG:{}", desc).into_bytes();
        let storage = format!("/.cache/png{}", path);
        let mut entry = module
            .write(&storage, WriteRequest::binary(bytes))
            .await
            .map_err(anyhow::Error::from)?;
        entry.set_storage_path(&storage);
        Ok(DriverResult::new(entry))
    }
}

/// Filesystem with a memory store, a memory module at `/docs`, and the
/// uppercase driver registered.
async fn setup() -> (AgentFs, Arc<UpperDriver>) {
    init_tracing();
    let fs = AgentFs::new(Arc::new(MemoryMetaStore::new()));
    let driver = Arc::new(UpperDriver::new());
    fs.drivers().register(driver.clone());
    fs.mount("/docs", Arc::new(MemoryModule::new()))
        .await
        .unwrap();
    (fs, driver)
}

fn upper_read() -> ReadOptions {
    ReadOptions::default().with_view(View::new().with_variant("upper"))
}

fn text_of(result: &ReadResult) -> String {
    result
        .entry
        .as_ref()
        .and_then(|e| e.content.as_ref())
        .and_then(|c| c.as_text())
        .unwrap_or_default()
        .to_string()
}

/// Poll until the view record at `path` reaches `Ready`.
async fn wait_for_ready(fs: &AgentFs, path: &str, key: &str) {
    for _ in 0..100 {
        let views = fs.views_of(path).await.unwrap();
        if views
            .iter()
            .any(|(k, m)| k == key && m.state == ViewState::Ready)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("view {} at {} never became ready", key, path);
}

// ============================================================================
// Tier 1: View lifecycle
// ============================================================================

#[tokio::test]
async fn strict_read_materializes_then_serves_cached() {
    let (fs, upper) = setup().await;
    fs.write("/docs/hello.md", WriteRequest::text("hello world"))
        .await
        .unwrap();

    let first = fs.read("/docs/hello.md", &upper_read()).await.unwrap();
    let entry = first.entry.expect("materialized entry");
    assert_eq!(entry.path, "/docs/hello.md");
    assert_eq!(
        entry.content.as_ref().and_then(|c| c.as_text()),
        Some("HELLO WORLD")
    );
    assert_eq!(entry.view_tag(), Some("variant=upper"));

    let second = fs.read("/docs/hello.md", &upper_read()).await.unwrap();
    assert_eq!(text_of(&second), "HELLO WORLD");
    assert_eq!(
        upper.calls.load(Ordering::SeqCst),
        1,
        "second read must hit the cache"
    );
}

#[tokio::test]
async fn edit_invalidates_and_regenerates() {
    let (fs, upper) = setup().await;
    fs.write("/docs/hello.md", WriteRequest::text("hello"))
        .await
        .unwrap();
    let first = fs.read("/docs/hello.md", &upper_read()).await.unwrap();
    assert_eq!(text_of(&first), "HELLO");

    fs.write("/docs/hello.md", WriteRequest::text("goodbye"))
        .await
        .unwrap();
    let second = fs.read("/docs/hello.md", &upper_read()).await.unwrap();
    assert_eq!(text_of(&second), "GOODBYE");
    assert_eq!(upper.calls.load(Ordering::SeqCst), 2);

    // Rewriting identical content keeps the cache warm.
    fs.write("/docs/hello.md", WriteRequest::text("goodbye"))
        .await
        .unwrap();
    let third = fs.read("/docs/hello.md", &upper_read()).await.unwrap();
    assert_eq!(text_of(&third), "GOODBYE");
    assert_eq!(upper.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn plain_read_never_touches_drivers() {
    let (fs, upper) = setup().await;
    fs.write("/docs/hello.md", WriteRequest::text("hello"))
        .await
        .unwrap();

    let read = fs
        .read("/docs/hello.md", &ReadOptions::default())
        .await
        .unwrap();
    assert_eq!(text_of(&read), "hello");
    assert_eq!(upper.calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Tier 2: Wait modes
// ============================================================================

#[tokio::test]
async fn fallback_serves_source_while_generating() {
    let (fs, upper) = setup().await;
    fs.write("/docs/hello.md", WriteRequest::text("hello world"))
        .await
        .unwrap();

    let opts = upper_read().with_wait(WaitMode::Fallback);
    let first = fs.read("/docs/hello.md", &opts).await.unwrap();
    assert_eq!(
        text_of(&first),
        "hello world",
        "fallback returns the source while the artifact generates"
    );
    assert!(
        first
            .message
            .unwrap_or_default()
            .contains("generating in the background")
    );

    wait_for_ready(&fs, "/docs/hello.md", "variant=upper").await;
    assert_eq!(upper.calls.load(Ordering::SeqCst), 1);

    // Once ready, even a fallback read serves the artifact.
    let second = fs.read("/docs/hello.md", &opts).await.unwrap();
    assert_eq!(text_of(&second), "HELLO WORLD");
    assert_eq!(upper.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn config_wait_mode_is_the_default() {
    init_tracing();
    let fs = AgentFs::with_config(
        Arc::new(MemoryMetaStore::new()),
        AfsConfig::default().with_wait_mode(WaitMode::Fallback),
    );
    let driver = Arc::new(UpperDriver::new());
    fs.drivers().register(driver.clone());
    fs.mount("/docs", Arc::new(MemoryModule::new()))
        .await
        .unwrap();
    fs.write("/docs/hello.md", WriteRequest::text("hi"))
        .await
        .unwrap();

    // No per-read wait override: the engine default applies.
    let read = fs.read("/docs/hello.md", &upper_read()).await.unwrap();
    assert_eq!(text_of(&read), "hi");
    assert!(
        read.message
            .unwrap_or_default()
            .contains("generating in the background")
    );
}

// ============================================================================
// Tier 3: Prefetch
// ============================================================================

#[tokio::test]
async fn prefetch_warms_batch_and_reports_failures() {
    let (fs, upper) = setup().await;
    fs.write("/docs/a.md", WriteRequest::text("alpha"))
        .await
        .unwrap();
    fs.write("/docs/b.md", WriteRequest::text("beta"))
        .await
        .unwrap();

    let view = View::new().with_variant("upper");
    let items = vec![
        ("/docs/a.md".to_string(), view.clone()),
        ("/docs/b.md".to_string(), view.clone()),
        ("/elsewhere/c.md".to_string(), view.clone()),
    ];
    let report = fs
        .prefetch(&items, &PrefetchOptions::default().with_concurrency(2))
        .await;
    assert_eq!(report.generated, 2);
    assert_eq!(report.failed.len(), 1);
    assert!(
        report.failed[0].0.contains("/elsewhere/c.md"),
        "unroutable path should be reported, got: {:?}",
        report.failed
    );

    // Reads now hit the warmed cache.
    let read = fs.read("/docs/a.md", &upper_read()).await.unwrap();
    assert_eq!(text_of(&read), "ALPHA");
    assert_eq!(upper.calls.load(Ordering::SeqCst), 2);

    // A second pass finds everything fresh.
    let report = fs.prefetch(&items[..2], &PrefetchOptions::default()).await;
    assert_eq!(report.skipped, 2);
    assert!(report.is_clean());
    assert_eq!(upper.calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Tier 4: Slot markers and intent assets
// ============================================================================

#[tokio::test]
async fn slot_markers_materialize_shared_intent_assets() {
    let (fs, _upper) = setup().await;
    let png = Arc::new(IntentPngDriver::new());
    fs.drivers().register(png.clone());

    fs.write(
        "/docs/a.md",
        WriteRequest::text(r#"Intro <!-- slot id="hero" desc="A crimson fox at dawn" -->"#),
    )
    .await
    .unwrap();
    fs.write(
        "/docs/b.md",
        WriteRequest::text(r#"Also <!-- slot id="cover" desc="a  CRIMSON fox at dawn" -->"#),
    )
    .await
    .unwrap();

    let a_slots = fs.slots_of("/docs/a.md").await.unwrap();
    let b_slots = fs.slots_of("/docs/b.md").await.unwrap();
    assert_eq!(a_slots.len(), 1);
    assert_eq!(b_slots.len(), 1);
    assert_eq!(
        a_slots[0].asset_path, b_slots[0].asset_path,
        "equivalent descriptions must share one asset"
    );

    let asset = format!("/docs{}", a_slots[0].asset_path);
    let opts = ReadOptions::default().with_view(View::new().with_format("png"));
    let read = fs.read(&asset, &opts).await.unwrap();
    let entry = read.entry.expect("materialized asset");
    assert_eq!(entry.path, asset);

    let body = String::from_utf8(
        entry
            .content
            .as_ref()
            .map(|c| c.as_bytes().to_vec())
            .unwrap_or_default(),
    )
    .unwrap();
    assert!(
        body.to_lowercase().contains("crimson fox"),
        "driver should see the slot description, got: {}",
        body
    );
    assert_eq!(png.calls.load(Ordering::SeqCst), 1);

    // The asset is cached like any other view.
    let again = fs.read(&asset, &opts).await.unwrap();
    assert!(again.entry.is_some());
    assert_eq!(png.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dropping_a_marker_drops_its_slot() {
    let (fs, _upper) = setup().await;
    fs.write(
        "/docs/a.md",
        WriteRequest::text(r#"<!-- slot id="hero" desc="sunrise" --> and <!-- slot id="side" desc="moon" -->"#),
    )
    .await
    .unwrap();
    assert_eq!(fs.slots_of("/docs/a.md").await.unwrap().len(), 2);

    fs.write(
        "/docs/a.md",
        WriteRequest::text(r#"<!-- slot id="hero" desc="sunrise" -->"#),
    )
    .await
    .unwrap();
    let slots = fs.slots_of("/docs/a.md").await.unwrap();
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].slot_id, "hero");
}

// ============================================================================
// Tier 5: SQLite persistence
// ============================================================================

#[tokio::test]
async fn sqlite_store_survives_reopen() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("meta.db");
    let module = Arc::new(MemoryModule::new());
    let driver = Arc::new(UpperDriver::new());

    {
        let store: Arc<dyn MetaStore> = Arc::new(SqliteMetaStore::open(&db).unwrap());
        let fs = AgentFs::new(store);
        fs.drivers().register(driver.clone());
        fs.mount("/docs", module.clone()).await.unwrap();
        fs.write("/docs/hello.md", WriteRequest::text("hello"))
            .await
            .unwrap();
        let read = fs.read("/docs/hello.md", &upper_read()).await.unwrap();
        assert_eq!(text_of(&read), "HELLO");
        assert_eq!(driver.calls.load(Ordering::SeqCst), 1);
    }

    // Fresh store handle over the same file; the module (and its cached
    // artifact) lives on.
    let store: Arc<dyn MetaStore> = Arc::new(SqliteMetaStore::open(&db).unwrap());
    let fs = AgentFs::new(store);
    fs.drivers().register(driver.clone());
    fs.mount("/docs", module).await.unwrap();

    let read = fs.read("/docs/hello.md", &upper_read()).await.unwrap();
    assert_eq!(text_of(&read), "HELLO");
    assert_eq!(
        driver.calls.load(Ordering::SeqCst),
        1,
        "persisted view record should serve without regeneration"
    );
}
