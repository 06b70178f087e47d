// src/watch/backend.rs

//! Backend selection and the external→native fallback policy.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::daemon;
use crate::errors::{GlobwatchError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::{ChangeCallback, EntryInfo, WatchMode, WatchOptions};
use crate::watch::native;
use crate::watch::patterns::PatternSet;
use crate::watch::scanner;
use crate::watch::session::{spawn_delivery, SessionEvent, SessionGuard, WatchSession};

/// Resolve the requested mode into a live session.
///
/// `External` tries the daemon first and on any bootstrap failure —
/// connect error, missing capability, rejected subscription — logs and
/// retries as `Native` with the same options and callback. The fallback
/// happens at most once per session and never bounces back.
pub(crate) async fn start_session(
    patterns: Vec<String>,
    options: WatchOptions,
    callback: ChangeCallback,
) -> Result<WatchSession> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    let cwd = options.resolve_cwd()?;
    let cwd = fs
        .canonicalize(&cwd)
        .map_err(|e| GlobwatchError::Config(format!("watch root {:?}: {e}", cwd)))?;

    let set = Arc::new(PatternSet::compile(&patterns, &options)?);

    let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(64);
    let delivery = spawn_delivery(callback, events_rx);

    let session = match options.mode {
        WatchMode::Oneshot => {
            let seed = run_scan(Arc::clone(&fs), cwd, Arc::clone(&set), &options).await?;
            events_tx
                .send(SessionEvent::Initial(seed))
                .await
                .map_err(|_| {
                    GlobwatchError::Config("session closed before the initial batch".into())
                })?;
            WatchSession::new(SessionGuard::Oneshot, vec![delivery])
        }
        WatchMode::Native => {
            let (cell, task) = native::start(
                fs,
                cwd,
                set,
                options.fields,
                options.absolute,
                events_tx,
            )
            .await?;
            WatchSession::new(SessionGuard::Native(cell), vec![task, delivery])
        }
        WatchMode::External => {
            let attempt = daemon::adapter::start(
                cwd.clone(),
                patterns.clone(),
                Arc::clone(&set),
                &options,
                events_tx.clone(),
            )
            .await;

            match attempt {
                Ok((guard, task)) => {
                    WatchSession::new(SessionGuard::Daemon(guard), vec![task, delivery])
                }
                Err(e) => {
                    warn!(error = %e, "external daemon unavailable; falling back to native watcher");
                    let (cell, task) = native::start(
                        fs,
                        cwd,
                        set,
                        options.fields,
                        options.absolute,
                        events_tx,
                    )
                    .await?;
                    WatchSession::new(SessionGuard::Native(cell), vec![task, delivery])
                }
            }
        }
    };

    Ok(session)
}

async fn run_scan(
    fs: Arc<dyn FileSystem>,
    cwd: PathBuf,
    set: Arc<PatternSet>,
    options: &WatchOptions,
) -> Result<Vec<(String, EntryInfo)>> {
    let fields = options.fields;
    let absolute = options.absolute;
    tokio::task::spawn_blocking(move || scanner::scan(fs.as_ref(), &cwd, &set, fields, absolute))
        .await
        .map_err(|e| GlobwatchError::Other(anyhow::anyhow!("scan task failed: {e}")))?
}
