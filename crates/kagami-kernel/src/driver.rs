//! View drivers and their registry.
//!
//! A driver turns a source entry into a materialized artifact for some family
//! of views. Capability is self-declared through [`Driver::can_handle`] — a
//! pure predicate over the view, no I/O. Dispatch requires exactly one
//! capable driver: zero is a missing feature, two is a configuration bug, and
//! both fail closed rather than picking one arbitrarily.
//!
//! Drivers run at a plugin boundary, so `process` returns `anyhow::Result`;
//! the engine turns failures into recorded generation errors.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use kagami_types::{CallContext, Entry, SlotRecord, View};

use crate::error::{AfsError, AfsResult};
use crate::module::Module;

/// Input to a generation run.
#[derive(Clone, Debug)]
pub struct ProcessRequest {
    /// The source entry, freshly read. `None` only for synthetic sources
    /// (e.g. intent assets) that have no entry behind them.
    pub source: Option<Entry>,
    /// Source revision the artifact will be recorded against.
    pub derived_from: String,
    /// For intent assets: the slot whose description drives generation.
    pub slot: Option<SlotRecord>,
    /// Caller attribution.
    pub ctx: CallContext,
}

/// Output of a generation run.
#[derive(Clone, Debug)]
pub struct DriverResult {
    /// The produced artifact. Must carry a storage path in its metadata —
    /// a result without one is treated as a failed generation.
    pub entry: Entry,
    /// Advisory note surfaced to the reader.
    pub message: Option<String>,
}

impl DriverResult {
    /// Wrap a produced artifact.
    pub fn new(entry: Entry) -> Self {
        Self {
            entry,
            message: None,
        }
    }

    /// Attach an advisory note.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Produces artifacts for some family of views.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Driver name (unique registry key).
    fn name(&self) -> &str;

    /// Whether this driver can produce the given view. Pure — no I/O, no
    /// store access.
    fn can_handle(&self, view: &View) -> bool;

    /// Produce the artifact.
    ///
    /// The driver stores its output through `module` (typically under a
    /// cache prefix of its choosing) and reports the location via the
    /// returned entry's storage-path metadata.
    async fn process(
        &self,
        module: Arc<dyn Module>,
        path: &str,
        view: &View,
        req: ProcessRequest,
    ) -> anyhow::Result<DriverResult>;
}

/// Registry of view drivers.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}

impl DriverRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver, replacing any previous driver of the same name.
    pub fn register(&self, driver: Arc<dyn Driver>) {
        self.drivers
            .write()
            .insert(driver.name().to_string(), driver);
    }

    /// Remove a driver by name.
    pub fn unregister(&self, name: &str) -> bool {
        self.drivers.write().remove(name).is_some()
    }

    /// Get a driver by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.read().get(name).cloned()
    }

    /// All registered driver names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// The one driver capable of the view.
    ///
    /// Zero capable drivers is [`AfsError::NoDriver`]; more than one is
    /// [`AfsError::AmbiguousDriver`] with the candidates named.
    pub fn resolve(&self, view: &View) -> AfsResult<Arc<dyn Driver>> {
        let drivers = self.drivers.read();
        let mut capable: Vec<&Arc<dyn Driver>> =
            drivers.values().filter(|d| d.can_handle(view)).collect();

        match capable.len() {
            0 => Err(AfsError::NoDriver(view.key())),
            1 => Ok(Arc::clone(capable.remove(0))),
            _ => {
                let mut candidates: Vec<String> =
                    capable.iter().map(|d| d.name().to_string()).collect();
                candidates.sort();
                Err(AfsError::AmbiguousDriver {
                    view: view.key(),
                    candidates,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDriver {
        name: &'static str,
        format: &'static str,
    }

    #[async_trait]
    impl Driver for FixedDriver {
        fn name(&self) -> &str {
            self.name
        }

        fn can_handle(&self, view: &View) -> bool {
            view.normalized(kagami_types::Dimension::Format).as_deref() == Some(self.format)
        }

        async fn process(
            &self,
            _module: Arc<dyn Module>,
            _path: &str,
            _view: &View,
            _req: ProcessRequest,
        ) -> anyhow::Result<DriverResult> {
            anyhow::bail!("not used in these tests")
        }
    }

    #[test]
    fn test_resolve_single() {
        let reg = DriverRegistry::new();
        reg.register(Arc::new(FixedDriver {
            name: "png",
            format: "png",
        }));
        reg.register(Arc::new(FixedDriver {
            name: "html",
            format: "html",
        }));

        let view = View::new().with_format("png");
        assert_eq!(reg.resolve(&view).unwrap().name(), "png");
    }

    #[test]
    fn test_resolve_none() {
        let reg = DriverRegistry::new();
        let view = View::new().with_format("png");
        assert!(matches!(reg.resolve(&view), Err(AfsError::NoDriver(_))));
    }

    #[test]
    fn test_resolve_ambiguous_names_candidates() {
        let reg = DriverRegistry::new();
        reg.register(Arc::new(FixedDriver {
            name: "png-b",
            format: "png",
        }));
        reg.register(Arc::new(FixedDriver {
            name: "png-a",
            format: "png",
        }));

        let view = View::new().with_format("png");
        match reg.resolve(&view) {
            Err(AfsError::AmbiguousDriver { candidates, .. }) => {
                assert_eq!(candidates, vec!["png-a", "png-b"]);
            }
            other => panic!("expected ambiguity, got {:?}", other.map(|d| d.name().to_string())),
        }
    }

    #[test]
    fn test_register_replaces() {
        let reg = DriverRegistry::new();
        reg.register(Arc::new(FixedDriver {
            name: "png",
            format: "png",
        }));
        reg.register(Arc::new(FixedDriver {
            name: "png",
            format: "png",
        }));
        assert_eq!(reg.names(), vec!["png"]);
    }

    #[test]
    fn test_unregister() {
        let reg = DriverRegistry::new();
        reg.register(Arc::new(FixedDriver {
            name: "png",
            format: "png",
        }));
        assert!(reg.unregister("png"));
        assert!(!reg.unregister("png"));
        assert!(reg.names().is_empty());
    }
}
