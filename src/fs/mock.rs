// src/fs/mock.rs

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::{EntryStat, FileSystem};
use crate::types::EntryKind;

#[derive(Debug, Clone)]
pub enum MockEntry {
    File { size: u64, mtime_ms: u64 },
    Symlink,
    Dir(Vec<String>), // child names
}

/// In-memory filesystem for scanner and matcher tests.
///
/// Parent directories are created implicitly when files are added; stat
/// failures can be injected per path to exercise the skip-and-continue
/// behaviour.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    failing_stats: Arc<Mutex<HashSet<PathBuf>>>,
}

impl MockFileSystem {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(root.as_ref().to_path_buf(), MockEntry::Dir(Vec::new()));

        Self {
            entries: Arc::new(Mutex::new(entries)),
            failing_stats: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, size: u64, mtime_ms: u64) {
        self.insert(path.as_ref(), MockEntry::File { size, mtime_ms });
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.insert(path.as_ref(), MockEntry::Dir(Vec::new()));
    }

    pub fn add_symlink(&self, path: impl AsRef<Path>) {
        self.insert(path.as_ref(), MockEntry::Symlink);
    }

    /// Make `symlink_stat` fail for this path (an EACCES stand-in).
    pub fn fail_stat(&self, path: impl AsRef<Path>) {
        self.failing_stats
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf());
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut entries = self.entries.lock().unwrap();
        entries.remove(path);
        if let Some(parent) = path.parent() {
            if let Some(MockEntry::Dir(children)) = entries.get_mut(parent) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    children.retain(|c| c != name);
                }
            }
        }
    }

    fn insert(&self, path: &Path, entry: MockEntry) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(path.to_path_buf(), entry);
        drop(entries);
        self.link_into_parents(path);
    }

    fn link_into_parents(&self, path: &Path) {
        let mut entries = self.entries.lock().unwrap();
        let mut current = path.to_path_buf();
        while let Some(parent) = current.parent().map(|p| p.to_path_buf()) {
            let name = match current.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => break,
            };
            let dir = entries
                .entry(parent.clone())
                .or_insert_with(|| MockEntry::Dir(Vec::new()));
            if let MockEntry::Dir(children) = dir {
                if !children.contains(&name) {
                    children.push(name);
                }
            }
            if parent.parent().is_none() {
                break;
            }
            current = parent;
        }
    }
}

impl FileSystem for MockFileSystem {
    fn symlink_stat(&self, path: &Path) -> Result<Option<EntryStat>> {
        if self.failing_stats.lock().unwrap().contains(path) {
            return Err(anyhow!("mock stat failure for {:?}", path));
        }
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(path).map(|e| match e {
            MockEntry::File { size, mtime_ms } => EntryStat {
                kind: EntryKind::File,
                size: *size,
                mtime_ms: Some(*mtime_ms),
            },
            MockEntry::Symlink => EntryStat {
                kind: EntryKind::Symlink,
                size: 0,
                mtime_ms: None,
            },
            MockEntry::Dir(_) => EntryStat {
                kind: EntryKind::Dir,
                size: 0,
                mtime_ms: None,
            },
        }))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let entries = self.entries.lock().unwrap();
        match entries.get(path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            Some(_) => Err(anyhow!("not a directory: {:?}", path)),
            None => Err(anyhow!("no such directory: {:?}", path)),
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(
            self.entries.lock().unwrap().get(path),
            Some(MockEntry::Dir(_))
        )
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }
}
