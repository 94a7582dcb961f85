//! swarmdb - Core types and message definitions
//!
//! Shared vocabulary of the CRDT graph store: node identifiers, atoms,
//! payloads, logical stamps, the error type and the JSON-RPC 2.0
//! envelopes spoken by the server.

pub mod constants;
pub mod error;
pub mod messages;
pub mod types;

pub use constants::*;
pub use error::*;
pub use messages::*;
pub use types::*;
