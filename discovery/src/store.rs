// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Crash-consistent publication of the peer view.
//!
//! The discovery file is replaced wholesale on every publication: the new
//! snapshot is written to a sibling temp file, flushed, and renamed into
//! place.  Readers therefore observe either the previous complete snapshot
//! or the new one, never a truncated file.

use crate::peers::{Peer, PeerStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{DirBuilder, File};
use std::io::{self, Write};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

/// File name of the published peer view inside the data directory.
pub const DISCOVERY_FILE: &str = "discovery.json";

/// Schema revision of the discovery file.
pub const FILE_VERSION: u32 = 1;

/// The on-disk schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub last_update: DateTime<Utc>,
    pub peers: Vec<Peer>,
}

/// Writer for the shared discovery file.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> FileStore {
        FileStore { dir: dir.into() }
    }

    /// Create the data directory (mode 0755) if it is missing.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the directory cannot be created.
    pub fn init(&self) -> io::Result<()> {
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&self.dir)
    }

    /// Path of the published file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(DISCOVERY_FILE)
    }

    /// Atomically publish `peers` as the current membership.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if serialization or any filesystem step fails;
    /// a failed publication leaves the previous file intact.
    pub fn publish(&self, peers: Vec<Peer>, now: DateTime<Utc>) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            version: FILE_VERSION,
            last_update: now,
            peers,
        };
        let data = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = self.dir.join(format!("{DISCOVERY_FILE}.tmp"));
        let mut file = File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, self.path())?;
        Ok(())
    }
}

/// Parse a discovery file.
///
/// # Errors
///
/// Returns [`StoreError`] when the file is missing, unreadable, or not a
/// complete snapshot.
pub fn load(path: &Path) -> Result<Snapshot, StoreError> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

/// Parse a discovery file and keep only the `active` peers.
///
/// # Errors
///
/// Same conditions as [`load`].
pub fn load_active(path: &Path) -> Result<Vec<Peer>, StoreError> {
    let snapshot = load(path)?;
    Ok(snapshot
        .peers
        .into_iter()
        .filter(|peer| peer.status == PeerStatus::Active)
        .collect())
}

/// Discovery file read/write failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
