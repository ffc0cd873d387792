//! In-memory backend module.
//!
//! Used for scratch mounts and testing. All data is ephemeral. Directories
//! are implicit: any entry below a path makes that path listable, and
//! intermediate levels are synthesized as directory entries on the way out.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use kagami_types::{Content, Entry};

use crate::error::{AfsError, AfsResult};
use crate::module::{
    Capability, DeleteOptions, ListOptions, Module, RenameOptions, SearchOptions, WriteRequest,
};
use crate::paths;

const CAPS: &[Capability] = &[
    Capability::List,
    Capability::Read,
    Capability::Write,
    Capability::Delete,
    Capability::Rename,
    Capability::Search,
];

/// In-memory [`Module`] keyed by normalized module-relative path.
#[derive(Debug)]
pub struct MemoryModule {
    name: String,
    entries: RwLock<HashMap<String, Entry>>,
}

impl Default for MemoryModule {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryModule {
    /// Create an empty module named `memory`.
    pub fn new() -> Self {
        Self::with_name("memory")
    }

    /// Create an empty module with a custom name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the module holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn has_children(entries: &HashMap<String, Entry>, path: &str) -> bool {
        entries
            .keys()
            .any(|k| matches!(paths::depth_below(path, k), Some(d) if d >= 1))
    }
}

#[async_trait]
impl Module for MemoryModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        CAPS
    }

    async fn list(&self, path: &str, depth: usize, opts: &ListOptions) -> AfsResult<Vec<Entry>> {
        let base = paths::normalize(path);
        let depth = if opts.recursive { usize::MAX } else { depth };
        let entries = self.entries.read();

        if base != "/" && !entries.contains_key(&base) && !Self::has_children(&entries, &base) {
            return Err(AfsError::not_found(&base));
        }
        if depth == 0 {
            return Ok(Vec::new());
        }

        // Real entries within the budget win over synthesized directories.
        let mut out: BTreeMap<String, Entry> = BTreeMap::new();
        for (key, entry) in entries.iter() {
            if let Some(d) = paths::depth_below(&base, key)
                && d >= 1
                && d <= depth
            {
                out.insert(key.clone(), entry.clone());
            }
        }

        // Implicit intermediate directories, including the horizon level when
        // a descendant sits deeper than the budget.
        for key in entries.keys() {
            let Some(d) = paths::depth_below(&base, key) else {
                continue;
            };
            if d < 2 {
                continue;
            }
            let segs = paths::segments(key);
            let base_len = segs.len() - d;
            for level in 1..d.min(depth.saturating_add(1)) {
                let prefix = format!("/{}", segs[..base_len + level].join("/"));
                out.entry(prefix.clone()).or_insert_with(|| Entry::dir(&prefix));
            }
        }

        let mut result: Vec<Entry> = out.into_values().collect();
        if let Some(filter) = &opts.filter {
            result.retain(|e| e.name().contains(filter.as_str()));
        }
        if let Some(limit) = opts.limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn read(&self, path: &str) -> AfsResult<Entry> {
        let path = paths::normalize(path);
        let entries = self.entries.read();
        if let Some(entry) = entries.get(&path) {
            return Ok(entry.clone());
        }
        // Implicit directory.
        if Self::has_children(&entries, &path) {
            return Ok(Entry::dir(&path));
        }
        Err(AfsError::not_found(path))
    }

    async fn write(&self, path: &str, req: WriteRequest) -> AfsResult<Entry> {
        let path = paths::normalize(path);
        let mut entries = self.entries.write();

        if entries.get(&path).is_some_and(|e| e.is_dir()) {
            return Err(AfsError::module(format!("is a directory: {}", path)));
        }

        let entry = match entries.get(&path) {
            Some(existing) => {
                // Overwrite keeps identity and creation time.
                let mut e = existing.clone();
                e.content = Some(req.content);
                e.updated_at = crate::now_millis();
                for (k, v) in req.metadata {
                    e.metadata.insert(k, v);
                }
                if req.user_id.is_some() {
                    e.user_id = req.user_id;
                }
                if req.session_id.is_some() {
                    e.session_id = req.session_id;
                }
                if req.link_to.is_some() {
                    e.link_to = req.link_to;
                }
                e
            }
            None => {
                let mut e = match req.content {
                    Content::Text(body) => Entry::text(&path, body),
                    Content::Binary(bytes) => Entry::binary(&path, bytes),
                };
                e.metadata = req.metadata;
                e.user_id = req.user_id;
                e.session_id = req.session_id;
                e.link_to = req.link_to;
                e
            }
        };
        entries.insert(path, entry.clone());
        Ok(entry)
    }

    async fn delete(&self, path: &str, opts: &DeleteOptions) -> AfsResult<()> {
        let path = paths::normalize(path);
        let mut entries = self.entries.write();

        if !opts.recursive && Self::has_children(&entries, &path) {
            return Err(AfsError::module(format!(
                "not empty (use recursive): {}",
                path
            )));
        }

        let existed = entries.remove(&path).is_some();
        if opts.recursive {
            let before = entries.len();
            entries.retain(|k, _| !matches!(paths::depth_below(&path, k), Some(d) if d >= 1));
            if !existed && entries.len() == before {
                return Err(AfsError::not_found(&path));
            }
        } else if !existed {
            return Err(AfsError::not_found(&path));
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str, opts: &RenameOptions) -> AfsResult<()> {
        let from = paths::normalize(from);
        let to = paths::normalize(to);
        if from == to {
            return Ok(());
        }
        let mut entries = self.entries.write();

        if !opts.overwrite && entries.contains_key(&to) {
            return Err(AfsError::module(format!("destination exists: {}", to)));
        }

        let moved: Vec<String> = entries
            .keys()
            .filter(|k| paths::depth_below(&from, k).is_some())
            .cloned()
            .collect();
        if moved.is_empty() {
            return Err(AfsError::not_found(&from));
        }

        let now = crate::now_millis();
        for key in moved {
            if let Some(mut entry) = entries.remove(&key) {
                let suffix = &key[from.len().min(key.len())..];
                let new_key = if suffix.is_empty() {
                    to.clone()
                } else {
                    paths::join(&to, suffix)
                };
                entry.path = new_key.clone();
                entry.updated_at = now;
                entries.insert(new_key, entry);
            }
        }
        Ok(())
    }

    async fn search(&self, path: &str, query: &str, opts: &SearchOptions) -> AfsResult<Vec<Entry>> {
        let base = paths::normalize(path);
        let needle = query.to_lowercase();
        let entries = self.entries.read();

        let mut hits: Vec<Entry> = entries
            .iter()
            .filter(|(k, _)| paths::depth_below(&base, k).is_some())
            .filter(|(k, e)| {
                k.to_lowercase().contains(&needle)
                    || matches!(&e.content, Some(Content::Text(t)) if t.to_lowercase().contains(&needle))
            })
            .map(|(_, e)| e.clone())
            .collect();

        hits.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(limit) = opts.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    async fn exists(&self, path: &str) -> bool {
        let path = paths::normalize(path);
        let entries = self.entries.read();
        entries.contains_key(&path) || Self::has_children(&entries, &path)
    }
}
