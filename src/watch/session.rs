// src/watch/session.rs

//! Watch session lifecycle: batch delivery and teardown.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::daemon::adapter::DaemonGuard;
use crate::types::{ChangeCallback, EntryInfo};
use crate::watch::index::{EntryIndex, Observation};
use crate::watch::native::WatcherCell;

/// Messages flowing from a backend into the delivery loop.
pub(crate) enum SessionEvent {
    /// The seeded entry set. Always produces a callback invocation, even
    /// when empty, and always precedes any `Batch`.
    Initial(Vec<(String, EntryInfo)>),
    /// One backend notification's worth of observations.
    Batch(Vec<Observation>),
}

/// Backend-specific resources released on teardown.
pub(crate) enum SessionGuard {
    /// A one-shot scan holds nothing.
    Oneshot,
    /// The native OS watcher.
    Native(WatcherCell),
    /// The daemon connection.
    Daemon(DaemonGuard),
}

struct ActiveSession {
    guard: SessionGuard,
    tasks: Vec<JoinHandle<()>>,
}

/// Handle for one live watch invocation.
///
/// Holds the backend resources and the session's tasks. [`destroy`] is the
/// sole cancellation mechanism: synchronous, idempotent, and final — once it
/// returns, no further batches reach the callback. Dropping the session
/// destroys it as well.
///
/// [`destroy`]: WatchSession::destroy
pub struct WatchSession {
    state: Mutex<Option<ActiveSession>>,
}

impl std::fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession").finish()
    }
}

impl WatchSession {
    pub(crate) fn new(guard: SessionGuard, tasks: Vec<JoinHandle<()>>) -> Self {
        Self {
            state: Mutex::new(Some(ActiveSession { guard, tasks })),
        }
    }

    /// Tear the session down: close OS watches or the daemon connection,
    /// stop the event and delivery tasks, and discard the entry index.
    /// Calling it again is a no-op.
    pub fn destroy(&self) {
        let active = match self.state.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                warn!("session state mutex poisoned during destroy");
                return;
            }
        };
        let Some(active) = active else {
            return;
        };

        for task in &active.tasks {
            task.abort();
        }
        match active.guard {
            SessionGuard::Oneshot => {}
            SessionGuard::Native(cell) => cell.close(),
            SessionGuard::Daemon(daemon) => drop(daemon),
        }
        debug!("watch session destroyed");
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Spawn the delivery loop: the exclusive owner of the session's entry
/// index. Batches are diffed in arrival order and the callback's future is
/// awaited before the next batch is touched, so callback executions never
/// overlap within a session.
pub(crate) fn spawn_delivery(
    mut callback: ChangeCallback,
    mut rx: mpsc::Receiver<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut index = EntryIndex::new();

        while let Some(event) = rx.recv().await {
            let changes = match event {
                SessionEvent::Initial(seed) => index.seed_initial(seed),
                SessionEvent::Batch(observations) => {
                    let changes = index.apply(observations);
                    if changes.is_empty() {
                        continue;
                    }
                    changes
                }
            };
            callback(changes).await;
        }

        index.clear();
        debug!("delivery loop finished");
    })
}
