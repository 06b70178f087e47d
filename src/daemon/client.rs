// src/daemon/client.rs

//! Line-delimited JSON client for the watcher daemon's local socket.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{GlobwatchError, Result};

/// Bidirectional daemon connection.
///
/// Commands are written one JSON value per line; the daemon answers them in
/// order, so responses are paired with a FIFO queue of waiters. Unilateral
/// PDUs (those carrying a `subscription` field) are pushed to the channel
/// supplied at connect time. Dropping the client closes the connection.
pub struct DaemonClient {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Arc<Mutex<VecDeque<oneshot::Sender<Value>>>>,
    reader_task: JoinHandle<()>,
}

impl std::fmt::Debug for DaemonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonClient").finish()
    }
}

impl DaemonClient {
    pub async fn connect(sock: &Path, sub_tx: mpsc::Sender<Value>) -> Result<Self> {
        let stream = UnixStream::connect(sock).await.map_err(|e| {
            GlobwatchError::Daemon(format!("connecting to daemon socket {:?}: {e}", sock))
        })?;
        let (read_half, write_half) = stream.into_split();

        let pending: Arc<Mutex<VecDeque<oneshot::Sender<Value>>>> = Arc::default();
        let reader_pending = Arc::clone(&pending);

        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "daemon connection read failed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let value: Value = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "undecodable daemon PDU");
                        continue;
                    }
                };

                if value.get("subscription").is_some() {
                    if sub_tx.send(value).await.is_err() {
                        break;
                    }
                    continue;
                }

                let waiter = reader_pending.lock().ok().and_then(|mut q| q.pop_front());
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(value);
                    }
                    None => debug!("dropping unsolicited daemon response"),
                }
            }
            // Waiters still queued observe their sender being dropped.
            debug!("daemon reader loop finished");
        });

        Ok(Self {
            writer: tokio::sync::Mutex::new(write_half),
            pending,
            reader_task,
        })
    }

    /// Send one command and await its response.
    ///
    /// A response carrying an `error` field fails the request; a closed
    /// connection fails all outstanding requests.
    pub async fn request(&self, cmd: Value) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        match self.pending.lock() {
            Ok(mut q) => q.push_back(tx),
            Err(_) => {
                return Err(GlobwatchError::Daemon(
                    "daemon request queue poisoned".into(),
                ))
            }
        }

        let mut line = serde_json::to_string(&cmd)?;
        line.push('\n');
        {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(line.as_bytes())
                .await
                .map_err(|e| GlobwatchError::Daemon(format!("writing daemon command: {e}")))?;
        }

        let resp = rx
            .await
            .map_err(|_| GlobwatchError::Daemon("daemon connection closed".into()))?;

        if let Some(err) = resp.get("error").and_then(|e| e.as_str()) {
            return Err(GlobwatchError::Daemon(err.to_string()));
        }
        Ok(resp)
    }
}

impl Drop for DaemonClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Resolve the daemon's socket path.
///
/// Order: explicit override, the `WATCHMAN_SOCK` environment variable, then
/// asking the daemon binary itself via `watchman get-sockname`. Every
/// failure maps to the backend-unavailable error the selector falls back on.
pub async fn resolve_sock(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    if let Ok(s) = std::env::var("WATCHMAN_SOCK") {
        if !s.is_empty() {
            return Ok(PathBuf::from(s));
        }
    }

    let output = Command::new("watchman")
        .arg("--output-encoding=json")
        .arg("get-sockname")
        .output()
        .await
        .map_err(|e| GlobwatchError::Daemon(format!("spawning watchman: {e}")))?;

    if !output.status.success() {
        return Err(GlobwatchError::Daemon(format!(
            "watchman get-sockname exited with {}",
            output.status
        )));
    }

    let value: Value = serde_json::from_slice(&output.stdout)?;
    value
        .get("sockname")
        .and_then(|s| s.as_str())
        .map(PathBuf::from)
        .ok_or_else(|| GlobwatchError::Daemon("get-sockname response missing sockname".into()))
}
