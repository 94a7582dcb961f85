//! Nodes: an identifier plus discriminator-tagged CRDT state.
//!
//! The discriminator is not stored separately; it is the variant of
//! [`NodeState`], so it cannot drift from the state it governs.

use serde::{Deserialize, Serialize};

use swarmdb_protocol::{DbError, Discriminator, NodeId, Operation, Stamp};

use crate::crdt::{LwwObject, LwwSet};

/// CRDT state of a node, tagged by discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "state", rename_all = "lowercase")]
pub enum NodeState {
    Lww(LwwObject),
    Set(LwwSet),
}

impl NodeState {
    /// Fresh, empty state for a discriminator.
    pub fn empty(discriminator: Discriminator) -> Self {
        match discriminator {
            Discriminator::Lww => NodeState::Lww(LwwObject::new()),
            Discriminator::Set => NodeState::Set(LwwSet::new()),
        }
    }

    pub fn discriminator(&self) -> Discriminator {
        match self {
            NodeState::Lww(_) => Discriminator::Lww,
            NodeState::Set(_) => Discriminator::Set,
        }
    }

    /// Apply an operation. Fails with `TypeMismatch` when the operation's
    /// kind disagrees with this state's discriminator.
    ///
    /// Returns `true` if the state changed.
    pub fn apply(&mut self, op: &Operation, stamp: &Stamp) -> Result<bool, DbError> {
        match (self, op) {
            (NodeState::Lww(obj), Operation::Set { payload }) => {
                Ok(obj.apply(payload, stamp)? > 0)
            }
            (NodeState::Set(set), Operation::Add { value }) => {
                Ok(set.add(value.clone(), stamp.clone()))
            }
            (NodeState::Set(set), Operation::Remove { value }) => {
                Ok(set.remove(value.clone(), stamp.clone()))
            }
            (state, op) => Err(DbError::mismatch(
                op.discriminator(),
                state.discriminator(),
            )),
        }
    }

    /// Merge another replica's state of the same discriminator.
    pub fn merge(&mut self, other: &NodeState) -> Result<bool, DbError> {
        match (self, other) {
            (NodeState::Lww(a), NodeState::Lww(b)) => Ok(a.merge(b) > 0),
            (NodeState::Set(a), NodeState::Set(b)) => Ok(a.merge(b) > 0),
            (state, other) => Err(DbError::mismatch(
                other.discriminator(),
                state.discriminator(),
            )),
        }
    }

    /// Highest logical time recorded anywhere in the state.
    pub fn max_time(&self) -> Option<u64> {
        match self {
            NodeState::Lww(obj) => obj.max_time(),
            NodeState::Set(set) => set.max_time(),
        }
    }
}

/// A node in the swarm graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(flatten)]
    pub state: NodeState,
}

impl Node {
    pub fn new(id: NodeId, discriminator: Discriminator) -> Self {
        Self {
            id,
            state: NodeState::empty(discriminator),
        }
    }

    pub fn discriminator(&self) -> Discriminator {
        self.state.discriminator()
    }

    pub fn apply(&mut self, op: &Operation, stamp: &Stamp) -> Result<bool, DbError> {
        self.state.apply(op, stamp)
    }

    /// Merge a replica of the same node.
    pub fn merge(&mut self, other: &Node) -> Result<bool, DbError> {
        if self.id != other.id {
            return Err(DbError::InvalidArgument(format!(
                "cannot merge node {} into node {}",
                other.id, self.id
            )));
        }
        self.state.merge(&other.state)
    }

    pub fn as_lww(&self) -> Option<&LwwObject> {
        match &self.state {
            NodeState::Lww(obj) => Some(obj),
            NodeState::Set(_) => None,
        }
    }

    pub fn as_set(&self) -> Option<&LwwSet> {
        match &self.state {
            NodeState::Set(set) => Some(set),
            NodeState::Lww(_) => None,
        }
    }
}
