use serde::{Deserialize, Serialize};

use crate::constants::JSONRPC_VERSION;
use crate::types::*;

/// Top-level JSON-RPC 2.0 request envelope.
///
/// The `id` may be a string or a number and is echoed back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            id: Some(serde_json::Value::String(uuid::Uuid::new_v4().to_string())),
            params,
        }
    }
}

/// JSON-RPC response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message,
                data: None,
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// ── Method Parameters ──

/// Parameters of `db.set`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetParams {
    pub id: NodeId,
    pub payload: Payload,
}

/// Parameters of `db.add` and `db.remove`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueParams {
    pub id: NodeId,
    #[serde(default = "null_atom")]
    pub value: Atom,
}

/// Parameters of methods addressing a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeParams {
    pub id: NodeId,
}

fn null_atom() -> Atom {
    Atom::Null
}
