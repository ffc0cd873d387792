//! Revision fingerprints.
//!
//! A revision is a deterministic fingerprint of entry content, used for
//! staleness comparison — never parsed, only compared for equality. Text
//! entries hash their bytes (rename-stable, whitespace-sensitive). Binary
//! entries use an mtime/size proxy so large payloads aren't hashed on every
//! staleness check; the tradeoff is that a binary rewrite with identical
//! timestamp and size goes undetected.

use kagami_types::{Content, Entry};

/// Fingerprint an entry's current content.
pub fn revision_of(entry: &Entry) -> String {
    match &entry.content {
        Some(Content::Text(s)) => hash_hex(s.as_bytes()),
        Some(Content::Binary(b)) => binary_revision(entry.updated_at, b.len()),
        None => binary_revision(entry.updated_at, 0),
    }
}

/// The mtime/size proxy used for binary content.
pub fn binary_revision(updated_at: u64, len: usize) -> String {
    format!("mtime:{};size:{}", updated_at, len)
}

/// Lowercase hex of the blake3 hash of `bytes`.
pub fn hash_hex(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_revision_is_content_addressed() {
        let a = Entry::text("/a", "hello");
        let b = Entry::text("/somewhere/else", "hello");
        // Same content, different paths and timestamps: same revision.
        assert_eq!(revision_of(&a), revision_of(&b));
    }

    #[test]
    fn test_text_revision_changes_with_content() {
        let a = Entry::text("/a", "hello");
        let b = Entry::text("/a", "hello!");
        assert_ne!(revision_of(&a), revision_of(&b));
    }

    #[test]
    fn test_binary_revision_uses_proxy() {
        let mut e = Entry::binary("/img", vec![1, 2, 3]);
        e.updated_at = 42;
        assert_eq!(revision_of(&e), "mtime:42;size:3");
    }

    #[test]
    fn test_contentless_entry() {
        let mut e = Entry::dir("/d");
        e.updated_at = 7;
        assert_eq!(revision_of(&e), "mtime:7;size:0");
    }

    #[test]
    fn test_hash_hex_is_stable() {
        assert_eq!(hash_hex(b"hello"), hash_hex(b"hello"));
        assert_ne!(hash_hex(b"hello"), hash_hex(b"world"));
        assert_eq!(hash_hex(b"hello").len(), 64);
    }
}
