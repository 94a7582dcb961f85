//! swarmdb State - CRDT engine and node storage
//!
//! Provides the storage side of the graph store:
//! - LWW object and LWW set CRDTs with deterministic tie-breaks
//! - Nodes tagged by discriminator, created on first write
//! - A node store serializing writes per node with bounded lock waits
//! - Lamport clocks for stamping local writes
//! - JSON snapshot persistence

pub mod clock;
pub mod crdt;
pub mod node;
pub mod persistence;
pub mod store;

pub use clock::{Clock, LamportClock};
pub use crdt::{LwwField, LwwObject, LwwSet, SetEntry};
pub use node::{Node, NodeState};
pub use persistence::Snapshot;
pub use store::{NodeGuard, NodeStore, StoreConfig, UpsertOutcome};
