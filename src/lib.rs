// src/lib.rs

//! Glob-filtered file watching with interchangeable backends.
//!
//! One abstraction — "give me the entries matching these patterns under a
//! root, then stream added/changed/deleted batches as the tree mutates" —
//! over three backends: an external Watchman-style daemon, a native watcher
//! built from per-directory OS watches, and a degenerate one-shot scan.
//! Backend choice is an option; observable matching semantics are identical
//! across all three, and the daemon backend degrades to the native one when
//! the daemon is unavailable.
//!
//! ```no_run
//! use globwatch::{watch, WatchOptions};
//!
//! # async fn example() -> globwatch::errors::Result<()> {
//! let session = watch(["src/**/*.rs"], WatchOptions::default(), |changes| async move {
//!     for path in changes.added.keys() {
//!         println!("added: {path}");
//!     }
//! })
//! .await?;
//! // ... later
//! session.destroy();
//! # Ok(())
//! # }
//! ```

pub mod daemon;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod types;
pub mod watch;

use std::future::Future;

use futures::FutureExt;

use crate::errors::{GlobwatchError, Result};

pub use crate::types::{
    EntryInfo, EntryKind, FieldSelection, FileChanges, PatternList, WatchMode, WatchOptions,
};
pub use crate::watch::session::WatchSession;

/// Start a watch session.
///
/// `patterns` is a single glob string or a list. The callback receives every
/// [`FileChanges`] batch, starting with the mandatory initial batch (all
/// matching entries in `added`; possibly empty) and followed by incremental
/// batches until [`WatchSession::destroy`] runs. The future a callback
/// returns is awaited before the next batch is processed.
///
/// Bootstrap failures — an unreadable root, an invalid pattern — reject the
/// call and no session is started. An unavailable daemon is not a bootstrap
/// failure: `WatchMode::External` falls back to the native backend.
pub async fn watch<P, F, Fut>(patterns: P, options: WatchOptions, callback: F) -> Result<WatchSession>
where
    P: Into<PatternList>,
    F: FnMut(FileChanges) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut callback = callback;
    let boxed: types::ChangeCallback = Box::new(move |changes| callback(changes).boxed());
    watch::backend::start_session(patterns.into().0, options, boxed).await
}

/// One-shot enumeration: the `path` of every existing entry the patterns
/// match under the root.
///
/// Defined in terms of [`watch`]: run once with `WatchMode::Oneshot`,
/// capture the initial batch, destroy the session.
pub async fn find_files<P>(patterns: P, options: WatchOptions) -> Result<Vec<String>>
where
    P: Into<PatternList>,
{
    let mut options = options;
    options.mode = WatchMode::Oneshot;

    let (tx, mut rx) = tokio::sync::mpsc::channel::<FileChanges>(1);
    let session = watch(patterns, options, move |changes| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(changes).await;
        }
    })
    .await?;

    let initial = rx.recv().await.ok_or_else(|| {
        GlobwatchError::Config("watch session ended before the initial batch".into())
    })?;
    session.destroy();

    Ok(initial
        .added
        .into_iter()
        .filter(|(_, info)| info.exists == Some(true))
        .map(|(path, _)| path)
        .collect())
}
