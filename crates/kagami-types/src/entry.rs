//! Filesystem entries and their content.
//!
//! An [`Entry`] is one node in the mounted namespace: a logical path, optional
//! content, timestamps, and a free-form metadata map. Entries are what modules
//! return and what the engine hands back to callers — there is no separate
//! inode/attr split.
//!
//! ## Metadata conventions
//!
//! Two well-known keys flow through the metadata map:
//!
//! - [`STORAGE_PATH_KEY`] — set by a driver to report where its artifact
//!   landed (module-relative path). Stripped before an entry reaches a caller.
//! - [`VIEW_TAG_KEY`] — set by the view engine on artifacts it returns, so a
//!   caller can tell a materialized view from the raw source.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::EntryId;

/// Metadata key a driver uses to report where its artifact landed.
pub const STORAGE_PATH_KEY: &str = "storage_path";

/// Metadata key carrying the canonical view key on returned artifacts.
pub const VIEW_TAG_KEY: &str = "view";

/// Metadata key marking an entry's kind ("directory" for synthesized dirs).
pub const KIND_KEY: &str = "kind";

/// Entry payload — text or raw bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Content {
    /// UTF-8 text content.
    Text(String),
    /// Raw binary content.
    Binary(Vec<u8>),
}

impl Content {
    /// Text body, if this is text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            Content::Binary(_) => None,
        }
    }

    /// Raw bytes of either variant (text as UTF-8).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Text(s) => s.as_bytes(),
            Content::Binary(b) => b,
        }
    }

    /// Byte length of the payload.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is text content.
    pub fn is_text(&self) -> bool {
        matches!(self, Content::Text(_))
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(b: Vec<u8>) -> Self {
        Content::Binary(b)
    }
}

/// One node in the mounted namespace.
///
/// ## Field groups
///
/// - **Core**: id, path, content, created_at, updated_at
/// - **Attribution**: user_id, session_id (who wrote it, in which session)
/// - **Linkage**: link_to (logical alias target), metadata (free-form map)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Stable identity, independent of path.
    pub id: EntryId,
    /// Logical path in the owning namespace (`/`-separated, absolute).
    pub path: String,
    /// Payload — `None` for directory entries and metadata-only listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    /// Timestamp when the entry was created (Unix millis).
    pub created_at: u64,
    /// Timestamp of the last content write (Unix millis).
    pub updated_at: u64,
    /// Free-form metadata. See module docs for well-known keys.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Principal that wrote the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Session the write happened in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Logical alias target, if this entry points at another path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_to: Option<String>,
}

impl Entry {
    /// Create a text entry at `path`, stamped now.
    pub fn text(path: impl Into<String>, body: impl Into<String>) -> Self {
        let now = crate::now_millis();
        Self {
            id: EntryId::new(),
            path: path.into(),
            content: Some(Content::Text(body.into())),
            created_at: now,
            updated_at: now,
            metadata: Map::new(),
            user_id: None,
            session_id: None,
            link_to: None,
        }
    }

    /// Create a binary entry at `path`, stamped now.
    pub fn binary(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        let now = crate::now_millis();
        Self {
            id: EntryId::new(),
            path: path.into(),
            content: Some(Content::Binary(bytes)),
            created_at: now,
            updated_at: now,
            metadata: Map::new(),
            user_id: None,
            session_id: None,
            link_to: None,
        }
    }

    /// Create a content-less directory entry at `path`.
    ///
    /// Used for synthesized mount-prefix directories in root listings and for
    /// intermediate parents in module listings.
    pub fn dir(path: impl Into<String>) -> Self {
        let now = crate::now_millis();
        let mut metadata = Map::new();
        metadata.insert(KIND_KEY.to_string(), Value::String("directory".to_string()));
        Self {
            id: EntryId::new(),
            path: path.into(),
            content: None,
            created_at: now,
            updated_at: now,
            metadata,
            user_id: None,
            session_id: None,
            link_to: None,
        }
    }

    /// Set the author principal.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the originating session.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the alias target.
    pub fn with_link_to(mut self, target: impl Into<String>) -> Self {
        self.link_to = Some(target.into());
        self
    }

    /// Insert one metadata key.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Whether this entry is marked as a directory.
    pub fn is_dir(&self) -> bool {
        self.metadata
            .get(KIND_KEY)
            .and_then(|v| v.as_str())
            .is_some_and(|k| k == "directory")
    }

    /// Where the artifact landed, if a driver reported it.
    pub fn storage_path(&self) -> Option<&str> {
        self.metadata.get(STORAGE_PATH_KEY).and_then(|v| v.as_str())
    }

    /// Record where the artifact landed (driver side).
    pub fn set_storage_path(&mut self, path: impl Into<String>) {
        self.metadata
            .insert(STORAGE_PATH_KEY.to_string(), Value::String(path.into()));
    }

    /// Remove and return the storage path. Called before an entry leaves the
    /// engine — storage locations are internal.
    pub fn take_storage_path(&mut self) -> Option<String> {
        match self.metadata.remove(STORAGE_PATH_KEY) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// The view key tag, if this entry is a materialized artifact.
    pub fn view_tag(&self) -> Option<&str> {
        self.metadata.get(VIEW_TAG_KEY).and_then(|v| v.as_str())
    }

    /// Tag this entry with the view key it materializes.
    pub fn set_view_tag(&mut self, key: impl Into<String>) {
        self.metadata
            .insert(VIEW_TAG_KEY.to_string(), Value::String(key.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_entry() {
        let e = Entry::text("/docs/a.md", "hello");
        assert_eq!(e.path, "/docs/a.md");
        assert_eq!(e.content.as_ref().unwrap().as_text(), Some("hello"));
        assert_eq!(e.created_at, e.updated_at);
        assert!(!e.is_dir());
    }

    #[test]
    fn test_binary_entry() {
        let e = Entry::binary("/img/x.png", vec![0x89, 0x50]);
        let content = e.content.as_ref().unwrap();
        assert!(!content.is_text());
        assert_eq!(content.as_bytes(), &[0x89, 0x50]);
        assert_eq!(content.len(), 2);
    }

    #[test]
    fn test_dir_entry() {
        let e = Entry::dir("/docs");
        assert!(e.is_dir());
        assert!(e.content.is_none());
    }

    #[test]
    fn test_name() {
        assert_eq!(Entry::text("/docs/a.md", "x").name(), "a.md");
        assert_eq!(Entry::dir("/docs").name(), "docs");
    }

    #[test]
    fn test_storage_path_roundtrip() {
        let mut e = Entry::binary("/docs/a.md", vec![1]);
        assert_eq!(e.storage_path(), None);
        e.set_storage_path("/.cache/abc.png");
        assert_eq!(e.storage_path(), Some("/.cache/abc.png"));
        assert_eq!(e.take_storage_path().as_deref(), Some("/.cache/abc.png"));
        assert_eq!(e.storage_path(), None);
    }

    #[test]
    fn test_view_tag() {
        let mut e = Entry::text("/docs/a.md", "x");
        assert_eq!(e.view_tag(), None);
        e.set_view_tag("language=ja");
        assert_eq!(e.view_tag(), Some("language=ja"));
    }

    #[test]
    fn test_builders() {
        let e = Entry::text("/a", "x")
            .with_user_id("u1")
            .with_session_id("s1")
            .with_link_to("/b");
        assert_eq!(e.user_id.as_deref(), Some("u1"));
        assert_eq!(e.session_id.as_deref(), Some("s1"));
        assert_eq!(e.link_to.as_deref(), Some("/b"));
    }

    #[test]
    fn test_serde_roundtrip() {
        let e = Entry::text("/docs/a.md", "hello").with_user_id("u1");
        let json = serde_json::to_string(&e).unwrap();
        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(e, back);
    }

    #[test]
    fn test_serde_skips_empty_fields() {
        let e = Entry::text("/a", "x");
        let json = serde_json::to_string(&e).unwrap();
        assert!(!json.contains("user_id"));
        assert!(!json.contains("metadata"));
        assert!(!json.contains("link_to"));
    }
}
