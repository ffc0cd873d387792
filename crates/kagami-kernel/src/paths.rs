//! Logical path helpers.
//!
//! Engine paths are plain `/`-separated strings, always absolute, never OS
//! paths — a mounted module may be backed by anything. All routing math works
//! on normalized segment lists; `normalize` is idempotent and collapses
//! repeated separators, trailing slashes, `.` and `..`.

/// Split a path into normalized segments. `.` is dropped, `..` pops (floored
/// at root), empty segments collapse.
pub fn segments(path: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            _ => out.push(seg.to_string()),
        }
    }
    out
}

/// Normalize to an absolute path: leading `/`, no trailing or repeated
/// separators. The empty path and `/` both normalize to `/`.
pub fn normalize(path: &str) -> String {
    let segs = segments(path);
    if segs.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segs.join("/"))
    }
}

/// Join a base path with a relative (or absolute) remainder.
pub fn join(base: &str, rest: &str) -> String {
    let mut segs = segments(base);
    segs.extend(segments(rest));
    if segs.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segs.join("/"))
    }
}

/// Whether `child` starts with every segment of `prefix`.
pub fn starts_with(child: &[String], prefix: &[String]) -> bool {
    child.len() >= prefix.len() && child[..prefix.len()] == *prefix
}

/// Parent path, or `None` at root.
pub fn parent(path: &str) -> Option<String> {
    let mut segs = segments(path);
    if segs.is_empty() {
        return None;
    }
    segs.pop();
    if segs.is_empty() {
        Some("/".to_string())
    } else {
        Some(format!("/{}", segs.join("/")))
    }
}

/// Number of segments below `base` at which `path` sits. `None` when `path`
/// is not under `base`.
pub fn depth_below(base: &str, path: &str) -> Option<usize> {
    let base_segs = segments(base);
    let path_segs = segments(path);
    if starts_with(&path_segs, &base_segs) {
        Some(path_segs.len() - base_segs.len())
    } else {
        None
    }
}
