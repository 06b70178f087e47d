// src/watch/patterns.rs

use std::fmt;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::errors::{GlobwatchError, Result};
use crate::types::{EntryKind, WatchOptions};
use crate::watch::path_utils::hidden_component;

/// Resolved file/directory filter.
///
/// `only_files` defaults to true; `only_directories = true` flips it off
/// unless the caller set both explicitly, in which case `only_files` wins
/// (the same precedence the daemon's `type` filter uses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypePolicy {
    FilesOnly,
    DirectoriesOnly,
    Any,
}

impl TypePolicy {
    pub fn resolve(options: &WatchOptions) -> Self {
        match (options.only_directories, options.only_files) {
            (true, Some(true)) => TypePolicy::FilesOnly,
            (true, _) => TypePolicy::DirectoriesOnly,
            (false, Some(false)) => TypePolicy::Any,
            (false, _) => TypePolicy::FilesOnly,
        }
    }
}

/// Outcome of evaluating one root-relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// The path is out: no pattern matched, an ignore pattern vetoed it, or
    /// policy excluded it.
    Excluded,
    /// The path is in.
    Included,
    /// Patterns matched but the type policy needs the entry's kind; the
    /// caller must stat and re-evaluate.
    NeedsKind,
}

/// Immutable compiled form of the user's include + ignore patterns with the
/// dot and type policy bound in.
///
/// All matching happens on root-relative forward-slash paths, so the same
/// set serves every backend regardless of how it surfaces paths internally.
#[derive(Clone)]
pub struct PatternSet {
    include: GlobSet,
    ignore: Option<GlobSet>,
    dot: bool,
    type_policy: TypePolicy,
}

impl fmt::Debug for PatternSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternSet")
            .field("dot", &self.dot)
            .field("type_policy", &self.type_policy)
            .finish_non_exhaustive()
    }
}

impl PatternSet {
    pub fn compile(patterns: &[String], options: &WatchOptions) -> Result<Self> {
        if patterns.is_empty() {
            return Err(GlobwatchError::Config(
                "at least one include pattern is required".into(),
            ));
        }

        let include = build_globset(patterns)?;
        let ignore = if options.ignore.is_empty() {
            None
        } else {
            Some(build_globset(&options.ignore)?)
        };

        Ok(Self {
            include,
            ignore,
            dot: options.dot,
            type_policy: TypePolicy::resolve(options),
        })
    }

    pub fn type_policy(&self) -> TypePolicy {
        self.type_policy
    }

    /// Type-policy check in isolation. Symlinks count as non-directories.
    pub fn allows_kind(&self, kind: EntryKind) -> bool {
        match self.type_policy {
            TypePolicy::Any => true,
            TypePolicy::FilesOnly => kind != EntryKind::Dir,
            TypePolicy::DirectoriesOnly => kind == EntryKind::Dir,
        }
    }

    /// Whether a directory is worth descending into. With dot disabled a
    /// hidden directory cannot contain an includable path; ignore patterns
    /// cannot prune descent since they only veto exact matches.
    pub fn allows_descent(&self, rel: &str) -> bool {
        self.dot || !hidden_component(rel)
    }

    /// Cheap pre-filter used on raw events and directory descent: dot policy
    /// and ignore veto only, no include match.
    pub fn prefilter(&self, rel: &str) -> bool {
        if !self.dot && hidden_component(rel) {
            return false;
        }
        if let Some(ignore) = &self.ignore {
            if ignore.is_match(rel) {
                return false;
            }
        }
        true
    }

    /// Full evaluation of a root-relative path.
    ///
    /// A path is included iff an include pattern matches, no ignore pattern
    /// matches, the dot policy allows it, and the type policy allows it.
    pub fn matches(&self, rel: &str, kind: Option<EntryKind>) -> Match {
        if rel.is_empty() {
            return Match::Excluded;
        }
        if !self.prefilter(rel) {
            return Match::Excluded;
        }
        if !self.include.is_match(rel) {
            return Match::Excluded;
        }
        match kind {
            Some(k) if self.allows_kind(k) => Match::Included,
            Some(_) => Match::Excluded,
            None if self.type_policy == TypePolicy::Any => Match::Included,
            None => Match::NeedsKind,
        }
    }
}

/// Compile string patterns into a `GlobSet`.
///
/// `literal_separator` keeps `*` and `?` within one path segment; `**` is
/// the only way to cross segments.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .map_err(|e| GlobwatchError::Pattern(format!("{pat}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| GlobwatchError::Pattern(e.to_string()))
}
