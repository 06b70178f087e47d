// src/types.rs

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use futures::future::BoxFuture;
use serde::Deserialize;

use crate::watch::path_utils::basename;

/// Which backend a watch session should run on.
///
/// - `External`: a Watchman-style daemon reached over a local socket. Falls
///   back to `Native` when the daemon is unavailable.
/// - `Native`: in-process OS directory watches plus an initial bulk scan.
/// - `Oneshot`: the initial scan only; no subscription is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    External,
    Native,
    Oneshot,
}

impl Default for WatchMode {
    fn default() -> Self {
        WatchMode::External
    }
}

impl FromStr for WatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "external" => Ok(WatchMode::External),
            "native" => Ok(WatchMode::Native),
            "oneshot" => Ok(WatchMode::Oneshot),
            other => Err(format!(
                "invalid watch mode: {other} (expected \"external\", \"native\" or \"oneshot\")"
            )),
        }
    }
}

/// Filesystem entry type, using the daemon's single-letter names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EntryKind {
    #[serde(rename = "f")]
    File,
    #[serde(rename = "d")]
    Dir,
    #[serde(rename = "l")]
    Symlink,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "f",
            EntryKind::Dir => "d",
            EntryKind::Symlink => "l",
        }
    }

    /// Parse the wire form used by the daemon protocol.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "f" => Some(EntryKind::File),
            "d" => Some(EntryKind::Dir),
            "l" => Some(EntryKind::Symlink),
            _ => None,
        }
    }
}

/// Optional stat fields to populate on emitted entries.
///
/// Everything defaults to off; `name`, `path` and `exists` are always
/// available regardless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldSelection {
    #[serde(rename = "type")]
    pub kind: bool,
    pub size: bool,
    pub mtime: bool,
}

impl FieldSelection {
    /// True if any stat-derived field was requested.
    pub fn any(&self) -> bool {
        self.kind || self.size || self.mtime
    }
}

/// Options accepted by [`crate::watch`] and [`crate::find_files`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Backend selection; see [`WatchMode`].
    pub mode: WatchMode,
    /// Stat fields to populate on emitted entries.
    pub fields: FieldSelection,
    /// Emit absolute paths instead of root-relative ones.
    pub absolute: bool,
    /// Root directory for patterns and events. Defaults to the process
    /// working directory.
    pub cwd: Option<PathBuf>,
    /// Match directories instead of files.
    pub only_directories: bool,
    /// Match regular files only. Unset means true, but an explicit value
    /// takes precedence over `only_directories` when both are set.
    pub only_files: Option<bool>,
    /// Include entries with a dot-prefixed path component.
    pub dot: bool,
    /// Glob patterns that veto inclusion.
    pub ignore: Vec<String>,
    /// Explicit daemon socket path, bypassing discovery. Only meaningful for
    /// `WatchMode::External`.
    pub daemon_sock: Option<PathBuf>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            mode: WatchMode::default(),
            fields: FieldSelection::default(),
            absolute: false,
            cwd: None,
            only_directories: false,
            only_files: None,
            dot: false,
            ignore: Vec::new(),
            daemon_sock: None,
        }
    }
}

impl WatchOptions {
    /// The configured root, or the process working directory.
    pub fn resolve_cwd(&self) -> std::io::Result<PathBuf> {
        match &self.cwd {
            Some(p) => Ok(p.clone()),
            None => std::env::current_dir(),
        }
    }
}

/// Last-known description of one filesystem entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    /// Basename of the entry.
    pub name: String,
    /// Root-relative path with forward slashes, or absolute when the session
    /// was configured with `absolute = true`. Stable for the session.
    pub path: String,
    /// Last observed existence.
    pub exists: Option<bool>,
    /// Entry type, when requested via `fields`.
    pub kind: Option<EntryKind>,
    /// Size in bytes, when requested via `fields`.
    pub size: Option<u64>,
    /// Modification time in milliseconds since epoch, when requested.
    pub mtime_ms: Option<u64>,
}

impl EntryInfo {
    /// Build an `exists = true` record, keeping only the requested fields.
    pub fn present(
        rel: &str,
        path: String,
        kind: EntryKind,
        size: u64,
        mtime_ms: Option<u64>,
        fields: FieldSelection,
    ) -> Self {
        EntryInfo {
            name: basename(rel).to_string(),
            path,
            exists: Some(true),
            kind: fields.kind.then_some(kind),
            size: fields.size.then_some(size),
            mtime_ms: if fields.mtime { mtime_ms } else { None },
        }
    }
}

/// One batch of changes delivered to the user callback.
///
/// The three sets are pairwise disjoint and keyed by the entry's emitted
/// `path`. Paths in `added` were not previously known to the session, paths
/// in `deleted` were and are now gone, and paths in `changed` were present
/// before and after.
#[derive(Debug, Clone, Default)]
pub struct FileChanges {
    pub added: HashMap<String, EntryInfo>,
    pub changed: HashMap<String, EntryInfo>,
    pub deleted: HashMap<String, EntryInfo>,
}

impl FileChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }
}

/// User patterns: a single glob string or a list of them.
#[derive(Debug, Clone)]
pub struct PatternList(pub Vec<String>);

impl From<&str> for PatternList {
    fn from(p: &str) -> Self {
        PatternList(vec![p.to_string()])
    }
}

impl From<String> for PatternList {
    fn from(p: String) -> Self {
        PatternList(vec![p])
    }
}

impl From<Vec<String>> for PatternList {
    fn from(ps: Vec<String>) -> Self {
        PatternList(ps)
    }
}

impl From<Vec<&str>> for PatternList {
    fn from(ps: Vec<&str>) -> Self {
        PatternList(ps.into_iter().map(|s| s.to_string()).collect())
    }
}

impl From<&[&str]> for PatternList {
    fn from(ps: &[&str]) -> Self {
        PatternList(ps.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for PatternList {
    fn from(ps: [&str; N]) -> Self {
        PatternList(ps.iter().map(|s| s.to_string()).collect())
    }
}

/// Boxed future returned by a change callback; awaited before the next batch
/// is processed.
pub type CallbackFuture = BoxFuture<'static, ()>;

/// Type-erased change callback held by a watch session.
pub type ChangeCallback = Box<dyn FnMut(FileChanges) -> CallbackFuture + Send>;
