// src/daemon/adapter.rs

//! External backend: a subscription against the watcher daemon, translated
//! into the same session events the native backend produces.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::daemon::client::{resolve_sock, DaemonClient};
use crate::errors::{GlobwatchError, Result};
use crate::types::{EntryInfo, EntryKind, FieldSelection, WatchOptions};
use crate::watch::index::Observation;
use crate::watch::patterns::{Match, PatternSet, TypePolicy};
use crate::watch::path_utils::{basename, emitted_path};
use crate::watch::session::SessionEvent;

static SUBSCRIPTION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Holds the daemon connection for the session's lifetime; dropping it
/// closes the socket and discards pending PDUs.
#[derive(Debug)]
pub struct DaemonGuard {
    _client: DaemonClient,
}

/// Bootstrap the external backend for one session.
///
/// Connects, verifies the `relative_root` capability, roots the watch via
/// `watch-project`, and subscribes with the compiled expression. The first
/// subscription PDU becomes the initial batch; everything after flows
/// through the diff engine like any native event. Every error up to the
/// subscription being established is a backend-unavailable condition the
/// selector recovers from by falling back to the native watcher.
pub(crate) async fn start(
    cwd: PathBuf,
    patterns: Vec<String>,
    set: Arc<PatternSet>,
    options: &WatchOptions,
    events_tx: mpsc::Sender<SessionEvent>,
) -> Result<(DaemonGuard, JoinHandle<()>)> {
    let sock = resolve_sock(options.daemon_sock.as_deref()).await?;

    let (sub_tx, mut sub_rx) = mpsc::channel::<Value>(64);
    let client = DaemonClient::connect(&sock, sub_tx).await?;

    client
        .request(json!(["version", { "required": ["relative_root"] }]))
        .await?;

    let cwd_str = cwd.to_string_lossy().to_string();
    let wp = client.request(json!(["watch-project", cwd_str])).await?;
    let watch_root = wp
        .get("watch")
        .and_then(|v| v.as_str())
        .ok_or_else(|| GlobwatchError::Daemon("watch-project response missing watch root".into()))?
        .to_string();
    // Offset of `cwd` below the daemon's chosen root, when they differ.
    let relative_root = wp
        .get("relative_path")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let name = format!(
        "globwatch-{}",
        SUBSCRIPTION_SEQ.fetch_add(1, Ordering::Relaxed)
    );
    let expression = build_expression(&patterns, options.dot, set.type_policy());

    let mut config = json!({
        "expression": expression,
        "fields": field_list(options.fields),
    });
    if let Some(rel) = &relative_root {
        config["relative_root"] = json!(rel);
    }

    client
        .request(json!(["subscribe", watch_root, name.clone(), config]))
        .await?;

    info!(root = ?cwd, subscription = %name, "daemon subscription established");

    let fields = options.fields;
    let absolute = options.absolute;
    let task = tokio::spawn(async move {
        let mut first = true;
        while let Some(pdu) = sub_rx.recv().await {
            let Some(files) = pdu.get("files").and_then(|f| f.as_array()) else {
                continue;
            };

            if first {
                first = false;
                let seed: Vec<(String, EntryInfo)> = files
                    .iter()
                    .filter_map(|f| match decode_file(f, &set, fields, absolute, &cwd) {
                        Some(Observation::Seen { rel, info }) => Some((rel, info)),
                        _ => None,
                    })
                    .collect();
                debug!(entries = seed.len(), "daemon initial file list");
                if events_tx.send(SessionEvent::Initial(seed)).await.is_err() {
                    break;
                }
                continue;
            }

            let observations: Vec<Observation> = files
                .iter()
                .filter_map(|f| decode_file(f, &set, fields, absolute, &cwd))
                .collect();
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
        debug!("daemon subscription loop finished");
    });

    Ok((DaemonGuard { _client: client }, task))
}

/// Decode one daemon-reported file into an observation.
///
/// The matcher is re-applied here so ignore patterns and the dot policy hold
/// exactly as they do on the native backend; the daemon's expression grammar
/// cannot veto ignores on its side.
fn decode_file(
    file: &Value,
    set: &PatternSet,
    fields: FieldSelection,
    absolute: bool,
    cwd: &Path,
) -> Option<Observation> {
    let rel = file.get("name").and_then(|v| v.as_str())?;
    if rel.is_empty() {
        return None;
    }

    let exists = file.get("exists").and_then(|v| v.as_bool()).unwrap_or(true);
    if !exists {
        // Whether this is a deletion worth reporting is decided by prior
        // index membership, not by re-matching.
        return Some(Observation::gone(rel));
    }

    let kind = file
        .get("type")
        .and_then(|v| v.as_str())
        .and_then(EntryKind::from_wire);
    match set.matches(rel, kind) {
        Match::Excluded => return None,
        // The subscription expression already carries the type filter, so a
        // PDU without a usable `type` is trusted.
        Match::Included | Match::NeedsKind => {}
    }

    let info = EntryInfo {
        name: basename(rel).to_string(),
        path: emitted_path(cwd, rel, absolute),
        exists: Some(true),
        kind: if fields.kind { kind } else { None },
        size: if fields.size {
            file.get("size").and_then(|v| v.as_u64())
        } else {
            None
        },
        mtime_ms: if fields.mtime {
            file.get("mtime_ms").and_then(|v| v.as_u64())
        } else {
            None
        },
    };
    Some(Observation::seen(rel, info))
}

/// Compose the subscription expression:
/// `allof(type?, anyof(match(p, wholename, {includedotfiles})...))`.
pub fn build_expression(patterns: &[String], dot: bool, policy: TypePolicy) -> Value {
    let mut any = vec![json!("anyof")];
    any.extend(patterns.iter().map(|p| {
        json!(["match", p, "wholename", { "includedotfiles": dot }])
    }));
    let any = Value::Array(any);

    let type_filter = match policy {
        TypePolicy::FilesOnly => Some(json!(["type", "f"])),
        TypePolicy::DirectoriesOnly => Some(json!(["type", "d"])),
        TypePolicy::Any => None,
    };

    match type_filter {
        Some(t) => Value::Array(vec![json!("allof"), t, any]),
        None => Value::Array(vec![json!("allof"), any]),
    }
}

/// Fields requested from the daemon: the fixed trio plus whatever stat
/// fields the user asked for.
pub fn field_list(fields: FieldSelection) -> Vec<&'static str> {
    let mut out = vec!["name", "exists", "type"];
    if fields.size {
        out.push("size");
    }
    if fields.mtime {
        out.push("mtime_ms");
    }
    out
}
