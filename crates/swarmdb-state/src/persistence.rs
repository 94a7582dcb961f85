//! JSON snapshot files for the node table.
//!
//! A snapshot is the full CRDT state of every node. Loading merges it
//! into the store, so loading into a non-empty store is safe and loading
//! the same snapshot twice is a no-op.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use swarmdb_protocol::{DbError, SNAPSHOT_VERSION};

use crate::node::Node;
use crate::store::NodeStore;

/// On-disk snapshot of the node table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub nodes: Vec<Node>,
}

impl Snapshot {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            nodes,
        }
    }

    /// Highest logical time recorded in any node.
    pub fn max_time(&self) -> Option<u64> {
        self.nodes.iter().filter_map(|n| n.state.max_time()).max()
    }
}

fn storage_err(path: &Path, e: impl std::fmt::Display) -> DbError {
    DbError::Storage(format!("{}: {}", path.display(), e))
}

/// Write a snapshot atomically: into a sibling temp file, then rename.
pub async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), DbError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension("tmp");
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| storage_err(parent, e))?;
    }
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| storage_err(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| storage_err(path, e))?;
    Ok(())
}

/// Read a snapshot. A missing file yields `None`.
pub async fn read_snapshot(path: &Path) -> Result<Option<Snapshot>, DbError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(storage_err(path, e)),
    };
    let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(storage_err(
            path,
            format!("unsupported snapshot version {}", snapshot.version),
        ));
    }
    Ok(Some(snapshot))
}

/// Save every node of `store` to `path`. Returns the node count.
pub async fn save_store(store: &NodeStore, path: &Path) -> Result<usize, DbError> {
    let snapshot = Snapshot::new(store.snapshot().await?);
    write_snapshot(path, &snapshot).await?;
    tracing::info!(path = %path.display(), nodes = snapshot.nodes.len(), "Saved snapshot");
    Ok(snapshot.nodes.len())
}

/// Load a snapshot from `path` into `store`.
///
/// Returns the snapshot that was read, if the file existed.
pub async fn load_store(store: &NodeStore, path: &Path) -> Result<Option<Snapshot>, DbError> {
    let Some(snapshot) = read_snapshot(path).await? else {
        tracing::info!(path = %path.display(), "No snapshot found, starting empty");
        return Ok(None);
    };
    let changed = store.restore(snapshot.nodes.clone()).await?;
    tracing::info!(
        path = %path.display(),
        nodes = snapshot.nodes.len(),
        changed,
        saved_at = %snapshot.saved_at,
        "Loaded snapshot"
    );
    Ok(Some(snapshot))
}
