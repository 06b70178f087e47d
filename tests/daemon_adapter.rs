mod common;
use crate::common::{init_tracing, write_tree};

use std::collections::HashSet;
use std::error::Error;
use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixListener;
use tokio::sync::mpsc::Receiver;
use tokio::time::timeout;

use globwatch::daemon::{build_expression, field_list};
use globwatch::watch::patterns::TypePolicy;
use globwatch::{watch, FieldSelection, FileChanges, WatchMode, WatchOptions};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn expression_carries_type_filter_and_dotfile_flag() {
    init_tracing();

    let expr = build_expression(&["**/*.ts".to_string()], false, TypePolicy::FilesOnly);
    assert_eq!(
        expr,
        json!([
            "allof",
            ["type", "f"],
            ["anyof", ["match", "**/*.ts", "wholename", { "includedotfiles": false }]]
        ])
    );

    let expr = build_expression(
        &["a/*".to_string(), "b/*".to_string()],
        true,
        TypePolicy::DirectoriesOnly,
    );
    assert_eq!(
        expr,
        json!([
            "allof",
            ["type", "d"],
            [
                "anyof",
                ["match", "a/*", "wholename", { "includedotfiles": true }],
                ["match", "b/*", "wholename", { "includedotfiles": true }]
            ]
        ])
    );

    // No type policy: no type term.
    let expr = build_expression(&["**/*".to_string()], false, TypePolicy::Any);
    assert_eq!(
        expr,
        json!([
            "allof",
            ["anyof", ["match", "**/*", "wholename", { "includedotfiles": false }]]
        ])
    );
}

#[test]
fn field_list_grows_with_the_selection() {
    init_tracing();

    assert_eq!(
        field_list(FieldSelection::default()),
        vec!["name", "exists", "type"]
    );
    assert_eq!(
        field_list(FieldSelection {
            kind: true,
            size: true,
            mtime: true,
        }),
        vec!["name", "exists", "type", "size", "mtime_ms"]
    );
}

async fn send(write: &mut OwnedWriteHalf, value: Value) -> bool {
    let mut line = value.to_string();
    line.push('\n');
    write.write_all(line.as_bytes()).await.is_ok()
}

/// Minimal scripted daemon: answers the three commands the adapter issues
/// and, right after `subscribe`, pushes one initial and one incremental PDU.
fn spawn_fake_daemon(listener: UnixListener, initial: Value, update: Value, capable: bool) {
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(cmd) = serde_json::from_str::<Value>(&line) else {
                return;
            };
            let verb = cmd.get(0).and_then(|v| v.as_str()).unwrap_or_default();
            let ok = match verb {
                "version" if capable => {
                    send(
                        &mut write,
                        json!({"version": "1.0.0", "capabilities": {"relative_root": true}}),
                    )
                    .await
                }
                "version" => {
                    send(
                        &mut write,
                        json!({"error": "client required capability `relative_root` is not supported"}),
                    )
                    .await
                }
                "watch-project" => {
                    let root = cmd.get(1).cloned().unwrap_or_default();
                    send(&mut write, json!({"watch": root})).await
                }
                "subscribe" => {
                    let name = cmd
                        .get(2)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    send(&mut write, json!({"subscribe": name.clone()})).await
                        && send(
                            &mut write,
                            json!({"subscription": name.clone(), "files": initial}),
                        )
                        .await
                        && send(&mut write, json!({"subscription": name, "files": update})).await
                }
                other => send(&mut write, json!({"error": format!("unknown command {other}")})).await,
            };
            if !ok {
                return;
            }
        }
    });
}

async fn recv_batch(rx: &mut Receiver<FileChanges>) -> Result<FileChanges, Box<dyn Error>> {
    let batch = timeout(Duration::from_secs(5), rx.recv())
        .await?
        .ok_or("watch ended before the expected batch")?;
    Ok(batch)
}

async fn watch_collect(
    root: &Path,
    options: WatchOptions,
) -> Result<(globwatch::WatchSession, Receiver<FileChanges>), Box<dyn Error>> {
    let options = WatchOptions {
        mode: WatchMode::External,
        cwd: Some(root.to_path_buf()),
        ..options
    };
    let (tx, rx) = tokio::sync::mpsc::channel::<FileChanges>(16);
    let session = watch(["**/*.ts"], options, move |changes| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(changes).await;
        }
    })
    .await?;
    Ok((session, rx))
}

#[tokio::test]
async fn daemon_backend_seeds_then_diffs() -> TestResult {
    init_tracing();

    let sock_dir = tempdir()?;
    let sock = sock_dir.path().join("daemon.sock");
    let listener = UnixListener::bind(&sock)?;

    // The adapter must re-filter daemon output: an ignored path, a hidden
    // path and a directory are all reported by the fake daemon and must all
    // stay invisible.
    spawn_fake_daemon(
        listener,
        json!([
            {"name": "src/index.ts", "exists": true, "type": "f"},
            {"name": "src/old.ts", "exists": true, "type": "f"},
            {"name": "src/skip/x.ts", "exists": true, "type": "f"},
            {"name": ".hidden/y.ts", "exists": true, "type": "f"},
            {"name": "src/dir.ts", "exists": true, "type": "d"}
        ]),
        json!([
            {"name": "src/new.ts", "exists": true, "type": "f"},
            {"name": "src/index.ts", "exists": true, "type": "f"},
            {"name": "src/old.ts", "exists": false},
            {"name": "src/skip/y.ts", "exists": true, "type": "f"}
        ]),
        true,
    );

    let root = tempdir()?;
    let options = WatchOptions {
        daemon_sock: Some(sock),
        ignore: vec!["src/skip/**".into()],
        ..Default::default()
    };
    let (session, mut rx) = watch_collect(root.path(), options).await?;

    let initial = recv_batch(&mut rx).await?;
    assert!(initial.changed.is_empty() && initial.deleted.is_empty());
    assert_eq!(
        initial.added.keys().cloned().collect::<HashSet<_>>(),
        HashSet::from(["src/index.ts".to_string(), "src/old.ts".to_string()])
    );

    let update = recv_batch(&mut rx).await?;
    assert_eq!(
        update.added.keys().cloned().collect::<HashSet<_>>(),
        HashSet::from(["src/new.ts".to_string()])
    );
    assert_eq!(
        update.changed.keys().cloned().collect::<HashSet<_>>(),
        HashSet::from(["src/index.ts".to_string()])
    );
    assert_eq!(
        update.deleted.keys().cloned().collect::<HashSet<_>>(),
        HashSet::from(["src/old.ts".to_string()])
    );

    session.destroy();
    Ok(())
}

#[tokio::test]
async fn unreachable_daemon_falls_back_to_native() -> TestResult {
    init_tracing();

    let root = tempdir()?;
    write_tree(root.path(), &["src/a.ts", "src/b.ts", "README.md"]);

    let options = WatchOptions {
        daemon_sock: Some(root.path().join("no-such.sock")),
        ..Default::default()
    };
    let (session, mut rx) = watch_collect(root.path(), options).await?;

    let initial = recv_batch(&mut rx).await?;
    assert_eq!(
        initial.added.keys().cloned().collect::<HashSet<_>>(),
        HashSet::from(["src/a.ts".to_string(), "src/b.ts".to_string()])
    );

    session.destroy();
    Ok(())
}

#[tokio::test]
async fn missing_capability_falls_back_to_native() -> TestResult {
    init_tracing();

    let sock_dir = tempdir()?;
    let sock = sock_dir.path().join("daemon.sock");
    let listener = UnixListener::bind(&sock)?;
    spawn_fake_daemon(listener, json!([]), json!([]), false);

    let root = tempdir()?;
    write_tree(root.path(), &["src/a.ts"]);

    let options = WatchOptions {
        daemon_sock: Some(sock),
        ..Default::default()
    };
    let (session, mut rx) = watch_collect(root.path(), options).await?;

    // The native scan, not the (empty) daemon listing, seeds the session.
    let initial = recv_batch(&mut rx).await?;
    assert_eq!(
        initial.added.keys().cloned().collect::<HashSet<_>>(),
        HashSet::from(["src/a.ts".to_string()])
    );

    session.destroy();
    Ok(())
}
