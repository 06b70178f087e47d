// src/fs/mod.rs

use std::fmt::Debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};

use crate::types::EntryKind;

pub mod mock;

/// Stat result for one entry, never following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStat {
    pub kind: EntryKind,
    pub size: u64,
    /// Modification time in milliseconds since epoch, when the platform
    /// reports one.
    pub mtime_ms: Option<u64>,
}

/// Abstract filesystem interface.
///
/// Only the read-side operations the scanner and watchers need; writes never
/// happen in this crate.
pub trait FileSystem: Send + Sync + Debug {
    /// Stat an entry without following symlinks.
    ///
    /// `Ok(None)` means the entry does not exist; other failures (EACCES and
    /// friends) surface as errors.
    fn symlink_stat(&self, path: &Path) -> Result<Option<EntryStat>>;

    /// Return the full paths of a directory's entries.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    fn is_dir(&self, path: &Path) -> bool;

    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn symlink_stat(&self, path: &Path) -> Result<Option<EntryStat>> {
        let meta = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("stat {:?}", path));
            }
        };

        let ft = meta.file_type();
        let kind = if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };

        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64);

        Ok(Some(EntryStat {
            kind,
            size: meta.len(),
            mtime_ms,
        }))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry?;
            entries.push(entry.path());
        }
        Ok(entries)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).with_context(|| format!("canonicalizing {:?}", path))
    }
}
