//! Module contract and operation vocabulary.
//!
//! A module is one mounted backend: it owns a subtree of the namespace and
//! answers some subset of the seven operations. Capabilities are declared up
//! front; the engine checks them before dispatch, and the default method
//! bodies refuse anything a module didn't implement, so an incomplete
//! implementation fails loudly instead of silently.
//!
//! Modules speak module-relative paths. Translating between the root
//! namespace and a module's subtree is the router's job, never the module's.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::EnumString;

use kagami_types::{CallContext, Content, Entry, View};

use crate::config::WaitMode;
use crate::error::{AfsError, AfsResult};

/// One of the seven operations a module may implement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Capability {
    List,
    Read,
    Write,
    Delete,
    Rename,
    Search,
    Exec,
}

impl Capability {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::List => "list",
            Capability::Read => "read",
            Capability::Write => "write",
            Capability::Delete => "delete",
            Capability::Rename => "rename",
            Capability::Search => "search",
            Capability::Exec => "exec",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Operation options
// ============================================================================

/// Options for `list`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListOptions {
    /// How many levels below the path to descend. Engine default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    /// Descend without a depth limit. Overrides `max_depth`.
    #[serde(default)]
    pub recursive: bool,
    /// Cap on returned entries, applied after merge and sort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Substring filter on entry names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl ListOptions {
    /// Set the depth budget.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Request an unbounded descent.
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    /// Set the entry cap.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the name filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Options for `read`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Requested representation. The empty view reads the source directly.
    #[serde(default)]
    pub view: View,
    /// Per-call wait behavior for stale views. Engine default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<WaitMode>,
    /// Caller attribution, forwarded to drivers.
    #[serde(default)]
    pub ctx: CallContext,
}

impl ReadOptions {
    /// Request a view.
    pub fn with_view(mut self, view: View) -> Self {
        self.view = view;
        self
    }

    /// Override the wait mode for this call.
    pub fn with_wait(mut self, wait: WaitMode) -> Self {
        self.wait = Some(wait);
        self
    }

    /// Set the call context.
    pub fn with_ctx(mut self, ctx: CallContext) -> Self {
        self.ctx = ctx;
        self
    }
}

/// A write payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Content to store.
    pub content: Content,
    /// Metadata merged onto the entry.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
    /// Writing principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Writing session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Alias target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_to: Option<String>,
}

impl WriteRequest {
    /// A text write.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            content: Content::Text(body.into()),
            metadata: serde_json::Map::new(),
            user_id: None,
            session_id: None,
            link_to: None,
        }
    }

    /// A binary write.
    pub fn binary(bytes: Vec<u8>) -> Self {
        Self {
            content: Content::Binary(bytes),
            metadata: serde_json::Map::new(),
            user_id: None,
            session_id: None,
            link_to: None,
        }
    }

    /// Attach one metadata key.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Set the writing principal.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the writing session.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the alias target.
    pub fn with_link_to(mut self, target: impl Into<String>) -> Self {
        self.link_to = Some(target.into());
        self
    }
}

/// Options for `delete`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeleteOptions {
    /// Delete a subtree instead of a single entry.
    #[serde(default)]
    pub recursive: bool,
}

impl DeleteOptions {
    /// Request subtree deletion.
    pub fn recursive() -> Self {
        Self { recursive: true }
    }
}

/// Options for `rename`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RenameOptions {
    /// Replace the destination if it exists.
    #[serde(default)]
    pub overwrite: bool,
}

/// Options for `search`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Cap on returned entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

// ============================================================================
// Operation results
// ============================================================================

/// Result of `list` and `search`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListResult {
    /// Matched entries, root-namespace paths, sorted by path.
    pub entries: Vec<Entry>,
    /// Advisory notes (partial fan-out failures, skipped modules).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of `read`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadResult {
    /// The entry — source or materialized artifact. `None` when a fallback
    /// read had nothing to return yet.
    pub entry: Option<Entry>,
    /// Advisory note (e.g. generation deferred to the background).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReadResult {
    /// A plain successful read.
    pub fn entry(entry: Entry) -> Self {
        Self {
            entry: Some(entry),
            message: None,
        }
    }

    /// A read answered with an advisory message.
    pub fn with_message(entry: Option<Entry>, message: impl Into<String>) -> Self {
        Self {
            entry,
            message: Some(message.into()),
        }
    }
}

/// Result of `write`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriteResult {
    /// The stored entry, root-namespace path.
    pub entry: Entry,
    /// Advisory note (e.g. slots registered).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of `delete`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeleteResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of `rename`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RenameResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Module trait
// ============================================================================

/// A mounted backend.
///
/// Paths handed to a module are module-relative and normalized (`/a.md`, not
/// `/docs/a.md`). Every default body refuses with
/// [`AfsError::CapabilityNotSupported`] — implement exactly what you declare
/// in [`Module::capabilities`].
#[async_trait]
pub trait Module: Send + Sync {
    /// Backend name, for logs and errors (not a routing key).
    fn name(&self) -> &str;

    /// Operations this module implements.
    fn capabilities(&self) -> &[Capability];

    /// Whether the module declares a capability.
    fn supports(&self, cap: Capability) -> bool {
        self.capabilities().contains(&cap)
    }

    /// List entries under `path`, descending at most `depth` levels.
    ///
    /// `depth` is the router-adjusted budget; `opts.max_depth` is the
    /// caller's raw request and is already folded in.
    async fn list(&self, path: &str, depth: usize, opts: &ListOptions) -> AfsResult<Vec<Entry>> {
        let _ = (path, depth, opts);
        Err(AfsError::unsupported(self.name(), Capability::List.as_str()))
    }

    /// Read the entry at `path`.
    async fn read(&self, path: &str) -> AfsResult<Entry> {
        let _ = path;
        Err(AfsError::unsupported(self.name(), Capability::Read.as_str()))
    }

    /// Create or overwrite the entry at `path`.
    async fn write(&self, path: &str, req: WriteRequest) -> AfsResult<Entry> {
        let _ = (path, req);
        Err(AfsError::unsupported(self.name(), Capability::Write.as_str()))
    }

    /// Delete the entry at `path`.
    async fn delete(&self, path: &str, opts: &DeleteOptions) -> AfsResult<()> {
        let _ = (path, opts);
        Err(AfsError::unsupported(self.name(), Capability::Delete.as_str()))
    }

    /// Move `from` to `to` within this module.
    async fn rename(&self, from: &str, to: &str, opts: &RenameOptions) -> AfsResult<()> {
        let _ = (from, to, opts);
        Err(AfsError::unsupported(self.name(), Capability::Rename.as_str()))
    }

    /// Search content under `path`.
    async fn search(&self, path: &str, query: &str, opts: &SearchOptions) -> AfsResult<Vec<Entry>> {
        let _ = (path, query, opts);
        Err(AfsError::unsupported(self.name(), Capability::Search.as_str()))
    }

    /// Run a module-defined command against `path`.
    async fn exec(
        &self,
        path: &str,
        command: &str,
        args: Value,
        ctx: &CallContext,
    ) -> AfsResult<Value> {
        let _ = (path, command, args, ctx);
        Err(AfsError::unsupported(self.name(), Capability::Exec.as_str()))
    }

    /// Whether an entry exists (convenience).
    async fn exists(&self, path: &str) -> bool {
        self.read(path).await.is_ok()
    }
}
