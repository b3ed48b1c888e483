// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Discovery file watching.
//!
//! The publisher renames a temp file into place, which replaces the inode a
//! naive watch would be attached to; after the first replacement such a
//! watch goes silent.  The watcher here therefore watches the containing
//! directory and filters events down to the discovery file by name.

use discovery::peers::Peer;
use discovery::store::{self, StoreError};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often to poll while the discovery file does not exist yet.
pub const ABSENT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Watches the discovery file and reports change signals.
pub struct PeerWatcher {
    path: PathBuf,
    rx: mpsc::UnboundedReceiver<()>,
    // dropping the watcher tears the inotify watch down
    _watcher: RecommendedWatcher,
}

impl PeerWatcher {
    /// Start watching `path` for publications.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError`] when the watch cannot be registered (missing
    /// directory, exhausted inotify budget).
    pub fn new(path: impl Into<PathBuf>) -> Result<PeerWatcher, WatchError> {
        let path = path.into();
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| WatchError::NoParent(path.display().to_string()))?
            .to_path_buf();
        let file_name: OsString = path
            .file_name()
            .ok_or_else(|| WatchError::NoParent(path.display().to_string()))?
            .to_os_string();

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher =
            notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
                match result {
                    Ok(event) => {
                        let ours = event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == Some(file_name.as_os_str()));
                        if ours && (event.kind.is_create() || event.kind.is_modify()) {
                            // the receiver collapses bursts; send failure just
                            // means the router is shutting down
                            let _ = tx.send(());
                        }
                    }
                    Err(err) => warn!(%err, "discovery watch error"),
                }
            })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        Ok(PeerWatcher {
            path,
            rx,
            _watcher: watcher,
        })
    }

    /// The watched discovery file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current active peer list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the file is absent or unparsable; the
    /// caller logs and keeps the previous state.
    pub fn load(&self) -> Result<Vec<Peer>, StoreError> {
        store::load_active(&self.path)
    }

    /// Wait for the next publication.  Returns `false` when the watcher
    /// channel is gone and no further events can arrive.
    pub async fn changed(&mut self) -> bool {
        match self.rx.recv().await {
            Some(()) => {
                // collapse a burst of events from one publication
                while self.rx.try_recv().is_ok() {}
                true
            }
            None => false,
        }
    }
}

/// Poll until `path` exists or `token` is cancelled.  Returns `true` when
/// the file appeared.
pub async fn wait_for_file(path: &Path, token: &CancellationToken) -> bool {
    if path.exists() {
        return true;
    }
    info!(path = %path.display(), "waiting for discovery file");
    loop {
        tokio::select! {
            () = token.cancelled() => return false,
            () = tokio::time::sleep(ABSENT_POLL_INTERVAL) => {
                if path.exists() {
                    info!(path = %path.display(), "discovery file found");
                    return true;
                }
            }
        }
    }
}

/// Watch registration failures.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error(transparent)]
    Notify(#[from] notify::Error),
    #[error("discovery file path {0} has no parent directory")]
    NoParent(String),
}
