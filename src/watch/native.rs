// src/watch/native.rs

//! Native backend: an initial bulk scan plus per-directory OS watches.
//!
//! Directories are always registered `NonRecursive`, even on platforms with
//! recursive watch support, so per-entry filtering behaves the same
//! everywhere. Coverage grows at runtime: when an event reveals a directory
//! we are not watching yet, a watch is attached and its existing subtree is
//! registered as well.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{GlobwatchError, Result};
use crate::fs::FileSystem;
use crate::types::{EntryInfo, EntryKind, FieldSelection};
use crate::watch::index::Observation;
use crate::watch::patterns::{Match, PatternSet};
use crate::watch::path_utils::{ancestor_dirs, emitted_path, relative_str};
use crate::watch::scanner;
use crate::watch::session::SessionEvent;

/// Shared handle to the OS watcher.
///
/// The event loop needs it to attach watches for newly created directories
/// while the session handle needs to drop it synchronously on `destroy`;
/// `close` takes the watcher out so every OS handle is released immediately,
/// after which further attach calls are no-ops.
#[derive(Clone)]
pub struct WatcherCell {
    inner: Arc<Mutex<Option<RecommendedWatcher>>>,
}

impl std::fmt::Debug for WatcherCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherCell").finish()
    }
}

impl WatcherCell {
    fn new(watcher: RecommendedWatcher) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(watcher))),
        }
    }

    /// Register a non-recursive watch. No-op after `close`.
    fn watch_dir(&self, dir: &Path) -> notify::Result<()> {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => {
                warn!("watcher cell mutex poisoned");
                return Ok(());
            }
        };
        match guard.as_mut() {
            Some(watcher) => watcher.watch(dir, RecursiveMode::NonRecursive),
            None => Ok(()),
        }
    }

    /// Drop the underlying watcher, closing every OS watch.
    pub(crate) fn close(&self) {
        match self.inner.lock() {
            Ok(mut g) => {
                g.take();
            }
            Err(_) => warn!("watcher cell mutex poisoned during close"),
        }
    }
}

/// Bootstrap the native backend for one session.
///
/// Seeds the session with a bulk scan, installs the initial watch set,
/// queues the mandatory initial batch, and spawns the event loop. Returned
/// alongside the loop's task handle is the [`WatcherCell`] the session
/// handle closes on teardown.
pub(crate) async fn start(
    fs: Arc<dyn FileSystem>,
    cwd: PathBuf,
    set: Arc<PatternSet>,
    fields: FieldSelection,
    absolute: bool,
    events_tx: mpsc::Sender<SessionEvent>,
) -> Result<(WatcherCell, JoinHandle<()>)> {
    let seed = {
        let fs = Arc::clone(&fs);
        let cwd = cwd.clone();
        let set = Arc::clone(&set);
        tokio::task::spawn_blocking(move || scanner::scan(fs.as_ref(), &cwd, &set, fields, absolute))
            .await
            .map_err(|e| GlobwatchError::Other(anyhow::anyhow!("initial scan task failed: {e}")))??
    };

    // Watch the root plus every ancestor directory of every seeded entry.
    let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();
    dirs.insert(cwd.clone());
    for (rel, _) in &seed {
        for ancestor in ancestor_dirs(rel) {
            dirs.insert(cwd.join(ancestor));
        }
    }

    // Channel from the blocking notify callback into the async world.
    let (raw_tx, mut raw_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

    let watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = raw_tx.send(event);
            }
            Err(err) => {
                // No tracing from notify's thread; fall back to stderr.
                eprintln!("globwatch: file watch error: {err}");
            }
        },
        Config::default(),
    )?;
    let cell = WatcherCell::new(watcher);

    let mut watched: HashSet<PathBuf> = HashSet::new();
    for dir in dirs {
        match cell.watch_dir(&dir) {
            Ok(()) => {
                watched.insert(dir);
            }
            // Reduced coverage, not a fatal condition (EACCES, ENOENT race).
            Err(err) => warn!(dir = ?dir, error = %err, "failed to install directory watch"),
        }
    }

    // The mandatory initial batch, before anything from the event loop.
    events_tx
        .send(SessionEvent::Initial(seed))
        .await
        .map_err(|_| GlobwatchError::Config("session closed before the initial batch".into()))?;

    info!(root = ?cwd, watched = watched.len(), "native watcher started");

    let task = tokio::spawn({
        let cell = cell.clone();
        async move {
            while let Some(event) = raw_rx.recv().await {
                debug!(?event, "received notify event");

                if event.need_rescan() {
                    // Queue overflow. The event is dropped; coverage until
                    // the next real event on each entry is best-effort.
                    warn!("watcher signalled a rescan; some events may have been lost");
                }

                let mut observations = Vec::new();
                for path in &event.paths {
                    process_path(
                        fs.as_ref(),
                        &cwd,
                        &set,
                        fields,
                        absolute,
                        &mut watched,
                        &cell,
                        path,
                        &mut observations,
                    );
                }

                if observations.is_empty() {
                    continue;
                }
                if events_tx
                    .send(SessionEvent::Batch(observations))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            debug!("native watcher event loop finished");
        }
    });

    Ok((cell, task))
}

/// Translate one raw event path into zero or one observation, growing watch
/// coverage when the path turns out to be an unwatched directory.
#[allow(clippy::too_many_arguments)]
fn process_path(
    fs: &dyn FileSystem,
    cwd: &Path,
    set: &PatternSet,
    fields: FieldSelection,
    absolute: bool,
    watched: &mut HashSet<PathBuf>,
    cell: &WatcherCell,
    path: &Path,
    out: &mut Vec<Observation>,
) {
    let Some(rel) = relative_str(cwd, path) else {
        debug!(path = ?path, "event path outside watch root");
        return;
    };
    if rel.is_empty() {
        // The root itself is not an entry.
        return;
    }
    if !set.prefilter(&rel) {
        return;
    }

    let st = match fs.symlink_stat(path) {
        Ok(st) => st,
        Err(e) => {
            warn!(path = ?path, error = %e, "stat failed for event path");
            return;
        }
    };

    match st {
        None => {
            watched.remove(path);
            out.push(Observation::gone(rel));
        }
        Some(st) => {
            if st.kind == EntryKind::Dir && !watched.contains(path) {
                attach_tree(fs, cwd, set, watched, cell, path);
            }
            if let Match::Included = set.matches(&rel, Some(st.kind)) {
                let emitted = emitted_path(cwd, &rel, absolute);
                out.push(Observation::seen(
                    rel.clone(),
                    EntryInfo::present(&rel, emitted, st.kind, st.size, st.mtime_ms, fields),
                ));
            }
        }
    }
}

/// Attach a watch for a newly discovered directory and for its existing
/// subdirectories, one non-recursive read per level.
fn attach_tree(
    fs: &dyn FileSystem,
    cwd: &Path,
    set: &PatternSet,
    watched: &mut HashSet<PathBuf>,
    cell: &WatcherCell,
    dir: &Path,
) {
    let mut stack = vec![dir.to_path_buf()];

    while let Some(d) = stack.pop() {
        if watched.contains(&d) {
            continue;
        }
        match cell.watch_dir(&d) {
            Ok(()) => {
                debug!(dir = ?d, "attached watch for new directory");
                watched.insert(d.clone());
            }
            Err(err) => {
                warn!(dir = ?d, error = %err, "failed to install directory watch");
                continue;
            }
        }

        let children = match fs.read_dir(&d) {
            Ok(c) => c,
            Err(e) => {
                warn!(dir = ?d, error = %e, "failed to list new directory");
                continue;
            }
        };
        for child in children {
            let Some(child_rel) = relative_str(cwd, &child) else {
                continue;
            };
            if !set.allows_descent(&child_rel) {
                continue;
            }
            match fs.symlink_stat(&child) {
                Ok(Some(st)) if st.kind == EntryKind::Dir => stack.push(child),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = ?child, error = %e, "skipping entry that failed to stat");
                }
            }
        }
    }
}
