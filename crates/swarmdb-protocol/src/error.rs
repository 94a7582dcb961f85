use thiserror::Error;

use crate::constants::*;
use crate::types::NodeId;

/// Errors reported by every layer of the store.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Node not found: {0}")]
    NotFound(NodeId),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Node {id} busy: lock not acquired within {waited_ms}ms")]
    Busy { id: NodeId, waited_ms: u64 },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl DbError {
    /// Shorthand for a discriminator disagreement.
    pub fn mismatch(expected: impl ToString, found: impl ToString) -> Self {
        DbError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// JSON-RPC error code reported for this error.
    pub fn rpc_code(&self) -> i32 {
        match self {
            DbError::NotFound(_) => RPC_NOT_FOUND,
            DbError::TypeMismatch { .. } => RPC_TYPE_MISMATCH,
            DbError::InvalidArgument(_) => RPC_INVALID_PARAMS,
            DbError::Busy { .. } | DbError::Timeout(_) => RPC_BUSY,
            DbError::Serialization(_) | DbError::Storage(_) => RPC_SERVER_ERROR,
        }
    }
}
