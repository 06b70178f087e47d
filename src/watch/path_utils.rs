// src/watch/path_utils.rs

//! Path normalisation helpers shared by the scanner and the watchers.

use std::path::Path;

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// The fast path is a plain `strip_prefix`. When that fails (symlinked
/// roots, `/private/var` style prefixes on macOS) both sides are
/// canonicalized and the strip is retried.
///
/// Returns `None` if the path cannot be related to `root` at all.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(to_slash(rel));
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(to_slash(rel));
        }
    }

    None
}

/// Lossy conversion to a forward-slash string.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Basename of a root-relative slash path.
pub fn basename(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}

/// True if any component of a root-relative slash path starts with a dot.
pub fn hidden_component(rel: &str) -> bool {
    rel.split('/').any(|seg| seg.starts_with('.'))
}

/// All ancestor directories of a root-relative slash path, nearest first.
///
/// `"src/components/button.ts"` yields `["src/components", "src"]`; a
/// top-level entry yields nothing.
pub fn ancestor_dirs(rel: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = rel;
    while let Some(idx) = current.rfind('/') {
        current = &current[..idx];
        out.push(current.to_string());
    }
    out
}

/// The `path` value emitted to user callbacks: root-relative by default,
/// absolute (still slash-separated) when requested.
pub fn emitted_path(cwd: &Path, rel: &str, absolute: bool) -> String {
    if absolute {
        to_slash(&cwd.join(rel))
    } else {
        rel.to_string()
    }
}
