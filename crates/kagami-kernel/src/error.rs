//! Engine error types.

use std::io;
use thiserror::Error;

use kagami_types::ViewKey;

/// Engine error type.
///
/// Configuration problems (bad mounts, conflicting drivers) surface at mount
/// or registration time, never at operation time. Fan-out operations do not
/// produce these — per-module failures there are logged and skipped.
#[derive(Debug, Error)]
pub enum AfsError {
    /// Mount path is not a single non-empty segment.
    #[error("invalid mount path: {0}")]
    InvalidMountPath(String),

    /// A module is already mounted at this path.
    #[error("duplicate mount: {0}")]
    DuplicateMount(String),

    /// No mounted module matches the path.
    #[error("no module for path: {0}")]
    NoModuleForPath(String),

    /// Entry not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Module does not implement the requested operation.
    #[error("module '{module}' does not support {capability}")]
    CapabilityNotSupported { module: String, capability: String },

    /// Rename endpoints resolve to different modules.
    #[error("cannot rename across modules: {from} -> {to}")]
    CrossModuleRename { from: String, to: String },

    /// No registered driver can produce the requested view.
    #[error("no driver for view '{0}'")]
    NoDriver(ViewKey),

    /// More than one registered driver claims the requested view.
    #[error("ambiguous drivers for view '{view}': {candidates:?}")]
    AmbiguousDriver {
        view: ViewKey,
        candidates: Vec<String>,
    },

    /// Two markers in one document share a slot id.
    #[error("duplicate slot id '{slot_id}' in {owner}")]
    DuplicateSlotId { owner: String, slot_id: String },

    /// View generation failed.
    #[error("generation failed for {path} view '{view}': {message}")]
    Generation {
        path: String,
        view: ViewKey,
        message: String,
    },

    /// Metadata store failure.
    #[error("metadata store: {0}")]
    Store(String),

    /// Module backend failure.
    #[error("module: {0}")]
    Module(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl AfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a NoModuleForPath error.
    pub fn no_module(path: impl Into<String>) -> Self {
        Self::NoModuleForPath(path.into())
    }

    /// Create an InvalidMountPath error.
    pub fn invalid_mount(path: impl Into<String>) -> Self {
        Self::InvalidMountPath(path.into())
    }

    /// Create a CapabilityNotSupported error.
    pub fn unsupported(module: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::CapabilityNotSupported {
            module: module.into(),
            capability: capability.into(),
        }
    }

    /// Create a Generation error.
    pub fn generation(path: impl Into<String>, view: ViewKey, message: impl Into<String>) -> Self {
        Self::Generation {
            path: path.into(),
            view,
            message: message.into(),
        }
    }

    /// Create a Store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a Module error.
    pub fn module(msg: impl Into<String>) -> Self {
        Self::Module(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

impl From<rusqlite::Error> for AfsError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

/// Engine result type.
pub type AfsResult<T> = Result<T, AfsError>;
