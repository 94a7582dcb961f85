//! Keyed storage of CRDT nodes with per-node serialization.
//!
//! Every node lives behind its own mutex, so mutations of one node are
//! applied one at a time while different nodes proceed independently.
//! The outer map lock is only taken for writing when a node is created.
//!
//! Lock acquisition is bounded: if a node's mutex cannot be obtained
//! within the configured timeout the operation fails with
//! [`DbError::Busy`] instead of waiting indefinitely.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use swarmdb_protocol::{DbError, Discriminator, Mutation, NodeId, DEFAULT_LOCK_TIMEOUT_MS};

use crate::node::Node;

/// Exclusive access to one node, released on drop.
pub type NodeGuard = OwnedMutexGuard<Node>;

/// Configuration for the node store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Upper bound on waiting for a node's lock.
    pub lock_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
        }
    }
}

/// Result of applying a mutation or ingesting a replica.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    /// Snapshot of the node after the write.
    pub node: Node,
    /// Whether the node was created by this write.
    pub created: bool,
    /// Whether the node's state changed.
    pub changed: bool,
}

/// In-memory node table.
pub struct NodeStore {
    nodes: RwLock<HashMap<NodeId, Arc<Mutex<Node>>>>,
    config: StoreConfig,
}

impl NodeStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn handle(&self, id: &NodeId) -> Option<Arc<Mutex<Node>>> {
        self.nodes.read().await.get(id).cloned()
    }

    /// Return the node's handle, creating it from `make` if absent.
    ///
    /// The first writer to create a node fixes its discriminator.
    async fn handle_or_create(
        &self,
        id: NodeId,
        make: impl FnOnce() -> Node,
    ) -> (Arc<Mutex<Node>>, bool) {
        if let Some(handle) = self.handle(&id).await {
            return (handle, false);
        }
        let mut nodes = self.nodes.write().await;
        match nodes.entry(id) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let node = make();
                tracing::debug!(node = %id, kind = %node.discriminator(), "Created node");
                (Arc::clone(entry.insert(Arc::new(Mutex::new(node)))), true)
            }
        }
    }

    async fn acquire(&self, id: &NodeId, handle: Arc<Mutex<Node>>) -> Result<NodeGuard, DbError> {
        match tokio::time::timeout(self.config.lock_timeout, handle.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                let waited_ms = self.config.lock_timeout.as_millis() as u64;
                tracing::warn!(node = %id, waited_ms, "Node lock timed out");
                Err(DbError::Busy { id: *id, waited_ms })
            }
        }
    }

    /// Lock a node for exclusive access.
    pub async fn lock_node(&self, id: &NodeId) -> Result<NodeGuard, DbError> {
        let handle = self.handle(id).await.ok_or(DbError::NotFound(*id))?;
        self.acquire(id, handle).await
    }

    /// Snapshot of a node, or `NotFound`.
    pub async fn get(&self, id: &NodeId) -> Result<Node, DbError> {
        let guard = self.lock_node(id).await?;
        Ok(guard.clone())
    }

    /// Snapshot of a node if it exists.
    pub async fn find(&self, id: &NodeId) -> Result<Option<Node>, DbError> {
        match self.get(id).await {
            Ok(node) => Ok(Some(node)),
            Err(DbError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn contains(&self, id: &NodeId) -> bool {
        self.nodes.read().await.contains_key(id)
    }

    /// Discriminator of an existing node.
    pub async fn discriminator(&self, id: &NodeId) -> Result<Discriminator, DbError> {
        Ok(self.lock_node(id).await?.discriminator())
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Apply a stamped mutation, creating the node on first write.
    ///
    /// Fails with `TypeMismatch` if the node exists with a different
    /// discriminator than the one the operation requires.
    pub async fn upsert(&self, mutation: &Mutation) -> Result<UpsertOutcome, DbError> {
        mutation.op.validate()?;
        let required = mutation.op.discriminator();
        let (handle, created) = self
            .handle_or_create(mutation.id, || Node::new(mutation.id, required))
            .await;

        let mut node = self.acquire(&mutation.id, handle).await?;
        let changed = node.apply(&mutation.op, &mutation.stamp)?;
        tracing::trace!(
            node = %mutation.id,
            op = mutation.op.name(),
            stamp = %mutation.stamp,
            changed,
            "Applied mutation"
        );

        Ok(UpsertOutcome {
            node: node.clone(),
            created,
            changed,
        })
    }

    /// Ingest a replica of a node from another store.
    ///
    /// An unknown node is created with the replica's discriminator and
    /// state in one step; a known node merges the replica's state.
    pub async fn ingest(&self, replica: Node) -> Result<UpsertOutcome, DbError> {
        let id = replica.id;
        let (handle, created) = self.handle_or_create(id, || replica.clone()).await;

        let mut node = self.acquire(&id, handle).await?;
        let changed = if created { true } else { node.merge(&replica)? };

        Ok(UpsertOutcome {
            node: node.clone(),
            created,
            changed,
        })
    }

    /// Snapshots of every node, ordered by id.
    pub async fn snapshot(&self) -> Result<Vec<Node>, DbError> {
        let handles: Vec<(NodeId, Arc<Mutex<Node>>)> = self
            .nodes
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect();

        let mut nodes = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            nodes.push(self.acquire(&id, handle).await?.clone());
        }
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    /// Ingest a batch of nodes, e.g. from a persisted snapshot.
    ///
    /// Returns the number of nodes that changed.
    pub async fn restore(&self, nodes: Vec<Node>) -> Result<usize, DbError> {
        let mut changed = 0;
        for node in nodes {
            if self.ingest(node).await?.changed {
                changed += 1;
            }
        }
        Ok(changed)
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
