// src/watch/scanner.rs

//! One-shot recursive scan producing the initial matching-entry set.

use std::path::Path;

use tracing::warn;

use crate::errors::{GlobwatchError, Result};
use crate::fs::FileSystem;
use crate::types::{EntryInfo, EntryKind, FieldSelection};
use crate::watch::patterns::{Match, PatternSet};
use crate::watch::path_utils::{emitted_path, relative_str};

/// Walk `cwd` depth-first and return every entry the pattern set includes,
/// keyed by root-relative path.
///
/// Symlinks are never followed. Order is not guaranteed. A failure to read
/// or stat an individual entry is logged and the entry skipped; only an
/// unreadable `cwd` itself aborts the scan.
pub fn scan(
    fs: &dyn FileSystem,
    cwd: &Path,
    set: &PatternSet,
    fields: FieldSelection,
    absolute: bool,
) -> Result<Vec<(String, EntryInfo)>> {
    let mut out = Vec::new();
    let mut stack = vec![cwd.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let children = match fs.read_dir(&dir) {
            Ok(c) => c,
            Err(e) if dir == cwd => return Err(GlobwatchError::Other(e)),
            Err(e) => {
                warn!(dir = ?dir, error = %e, "skipping unreadable directory");
                continue;
            }
        };

        for path in children {
            let Some(rel) = relative_str(cwd, &path) else {
                continue;
            };

            let st = match fs.symlink_stat(&path) {
                Ok(Some(st)) => st,
                // Raced deletion between read_dir and stat.
                Ok(None) => continue,
                Err(e) => {
                    warn!(path = ?path, error = %e, "skipping entry that failed to stat");
                    continue;
                }
            };

            if st.kind == EntryKind::Dir && set.allows_descent(&rel) {
                stack.push(path.clone());
            }

            if let Match::Included = set.matches(&rel, Some(st.kind)) {
                let emitted = emitted_path(cwd, &rel, absolute);
                out.push((
                    rel.clone(),
                    EntryInfo::present(&rel, emitted, st.kind, st.size, st.mtime_ms, fields),
                ));
            }
        }
    }

    Ok(out)
}
