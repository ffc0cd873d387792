//! Source and view metadata records, plus artifact provenance edges.
//!
//! These are the rows the metadata store persists. `SourceMeta` fingerprints a
//! source entry; `ViewMeta` tracks one (path, view key) artifact through its
//! lifecycle; `Dependency` records which input revision produced which
//! artifact.
//!
//! The staleness contract: a view is current exactly when its `derived_from`
//! equals the source's current revision and its state is ready. Everything
//! else — missing record, stale or failed state, revision drift — means the
//! artifact must not be served as fresh. A `generating` record is deliberately
//! *not* stale so concurrent readers don't pile on extra generations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::view::ViewState;

/// Revision record for a source entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMeta {
    /// Content fingerprint (hash for text, mtime/size proxy for binary).
    pub revision: String,
    /// When this record was last refreshed (Unix millis).
    pub updated_at: u64,
    /// Driver names that may apply to this source. Advisory — prefetch and
    /// tooling hints only, never used for dispatch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drivers_hint: Vec<String>,
    /// Source kind tag. Set for synthetic sources (e.g. "image" for intent
    /// assets) that have no real entry behind them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl SourceMeta {
    /// Record a revision, stamped now.
    pub fn new(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            updated_at: crate::now_millis(),
            drivers_hint: Vec::new(),
            kind: None,
        }
    }

    /// Set the kind tag.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Set the advisory driver list.
    pub fn with_drivers_hint(mut self, drivers: Vec<String>) -> Self {
        self.drivers_hint = drivers;
        self
    }

    /// Whether this source is synthetic (no real entry behind it).
    pub fn is_synthetic(&self) -> bool {
        self.kind.is_some()
    }
}

/// Lifecycle record for one (path, view key) artifact.
///
/// `ViewMeta::default()` is the missing record — state [`ViewState::Missing`],
/// nothing else set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewMeta {
    /// Where the artifact is in its lifecycle.
    pub state: ViewState,
    /// Source revision the artifact was generated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<String>,
    /// Module-relative path where the artifact is stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    /// When generation completed (Unix millis).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<u64>,
    /// Failure message from the last attempt, if it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ViewMeta {
    /// A generation-in-flight record, tagged with the revision it derives
    /// from.
    pub fn generating(revision: impl Into<String>) -> Self {
        Self {
            state: ViewState::Generating,
            derived_from: Some(revision.into()),
            ..Self::default()
        }
    }

    /// A completed record: artifact at `storage_path`, derived from `revision`.
    pub fn ready(revision: impl Into<String>, storage_path: impl Into<String>) -> Self {
        Self {
            state: ViewState::Ready,
            derived_from: Some(revision.into()),
            storage_path: Some(storage_path.into()),
            generated_at: Some(crate::now_millis()),
            error: None,
        }
    }

    /// A failed-attempt record.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: ViewState::Failed,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Staleness of this record against the source's current revision.
    ///
    /// Missing, stale, and failed states are stale; generating is not (the
    /// in-flight attempt will produce a current artifact); ready is stale
    /// exactly when `derived_from` no longer matches.
    pub fn stale_against(&self, current_revision: &str) -> bool {
        match self.state {
            ViewState::Missing | ViewState::Stale | ViewState::Failed => true,
            ViewState::Generating => false,
            ViewState::Ready => self.derived_from.as_deref() != Some(current_revision),
        }
    }
}

/// Who/what a dependency edge makes an artifact depend on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(ascii_case_insensitive)]
pub enum DependencyRole {
    /// The artifact was generated from this input's content.
    Source,
    /// The input is the document whose slot marker owns this asset.
    #[strum(serialize = "owner-context", serialize = "owner_context")]
    OwnerContext,
}

impl DependencyRole {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyRole::Source => "source",
            DependencyRole::OwnerContext => "owner-context",
        }
    }
}

impl fmt::Display for DependencyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provenance edge: which input revision fed which (path, view key) artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Artifact's logical path.
    pub path: String,
    /// Artifact's canonical view key.
    pub view_key: String,
    /// Input's logical path.
    pub input_path: String,
    /// Input revision at generation time.
    pub input_revision: String,
    /// How the artifact depends on the input.
    pub role: DependencyRole,
}

impl Dependency {
    /// Edge from an artifact to the source content it was generated from.
    pub fn source(
        path: impl Into<String>,
        view_key: impl Into<String>,
        input_path: impl Into<String>,
        input_revision: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            view_key: view_key.into(),
            input_path: input_path.into(),
            input_revision: input_revision.into(),
            role: DependencyRole::Source,
        }
    }

    /// Edge from a slot asset to the document that declares the slot.
    pub fn owner_context(
        path: impl Into<String>,
        input_path: impl Into<String>,
        input_revision: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            view_key: String::new(),
            input_path: input_path.into(),
            input_revision: input_revision.into(),
            role: DependencyRole::OwnerContext,
        }
    }
}
