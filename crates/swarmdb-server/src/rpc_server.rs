//! JSON-RPC 2.0 server over TCP exposing the database.
//!
//! Provides the following methods:
//! - `db.set` - Write fields into an LWW object
//! - `db.add` - Add a value to a set
//! - `db.remove` - Remove a value from a set
//! - `db.query` - Resolve a query shape
//! - `db.get_node` - Fetch the raw CRDT state of a node
//! - `db.ingest` - Merge a node replica from another store
//! - `db.status` - Get store and clock status
//!
//! Each line received is a JSON-RPC request; each line sent is a response.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use swarmdb_protocol::*;
use swarmdb_query::Query;
use swarmdb_state::Node;

use crate::database::Database;

/// Request id echoed back in the response; a string, a number or absent.
type RequestId = Option<serde_json::Value>;

/// Parameters of `db.query`.
#[derive(Debug, Deserialize)]
struct QueryParams {
    query: Query,
    /// Resolve from this node instead of the configured root.
    #[serde(default)]
    at: Option<NodeId>,
}

/// Parameters of `db.ingest`.
#[derive(Debug, Deserialize)]
struct IngestParams {
    node: Node,
}

/// The JSON-RPC 2.0 server.
pub struct RpcServer {
    /// TCP listener address.
    bind_addr: String,
    db: Arc<Database>,
    /// Maximum concurrent connections.
    max_connections: usize,
    /// Upper bound on handling one request.
    request_timeout: Duration,
}

impl RpcServer {
    pub fn new(
        bind_addr: String,
        db: Arc<Database>,
        max_connections: usize,
        request_timeout: Duration,
    ) -> Self {
        Self {
            bind_addr,
            db,
            max_connections,
            request_timeout,
        }
    }

    /// Start the RPC server, listening for connections.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "JSON-RPC server listening");
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.max_connections.max(1)));

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            tracing::debug!(peer = %peer_addr, "RPC client connected");

            let db = Arc::clone(&self.db);
            let timeout = self.request_timeout;
            let permit = semaphore.clone().acquire_owned().await?;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, db, timeout).await {
                    tracing::warn!(
                        peer = %peer_addr,
                        error = %e,
                        "RPC connection error"
                    );
                }
                drop(permit);
            });
        }
    }
}

/// Handle a single RPC client connection.
///
/// Reads newline-delimited JSON-RPC requests and sends back responses.
async fn handle_connection(
    stream: tokio::net::TcpStream,
    db: Arc<Database>,
    timeout: Duration,
) -> Result<(), anyhow::Error> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = process_request(&line, &db, timeout).await;
        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Process a single JSON-RPC request and return a response.
pub async fn process_request(request_str: &str, db: &Database, timeout: Duration) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_str(request_str) {
        Ok(r) => r,
        Err(e) => {
            return RpcResponse::error(None, RPC_PARSE_ERROR, format!("Invalid JSON: {}", e));
        }
    };

    let request_id = request.id.clone();
    let method = request.method.clone();

    match tokio::time::timeout(timeout, dispatch(request, db)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(
                method = %method,
                timeout_ms = timeout.as_millis() as u64,
                "RPC request timed out"
            );
            let err = DbError::Timeout(format!("{} exceeded {}ms", method, timeout.as_millis()));
            RpcResponse::error(request_id, err.rpc_code(), err.to_string())
        }
    }
}

async fn dispatch(request: RpcRequest, db: &Database) -> RpcResponse {
    let id = request.id;
    let params = request.params;

    match request.method.as_str() {
        "db.set" => handle_set(id, params, db).await,
        "db.add" => handle_add(id, params, db).await,
        "db.remove" => handle_remove(id, params, db).await,
        "db.query" => handle_query(id, params, db).await,
        "db.get_node" => handle_get_node(id, params, db).await,
        "db.ingest" => handle_ingest(id, params, db).await,
        "db.status" => handle_status(id, db).await,
        _ => RpcResponse::error(
            id,
            RPC_METHOD_NOT_FOUND,
            format!("Unknown method: {}", request.method),
        ),
    }
}

fn parse_params<T: DeserializeOwned>(
    id: &RequestId,
    params: serde_json::Value,
) -> Result<T, RpcResponse> {
    serde_json::from_value(params).map_err(|e| {
        RpcResponse::error(
            id.clone(),
            RPC_INVALID_PARAMS,
            format!("Invalid params: {}", e),
        )
    })
}

fn respond<T: serde::Serialize>(id: RequestId, result: Result<T, DbError>) -> RpcResponse {
    match result.and_then(|value| serde_json::to_value(value).map_err(DbError::from)) {
        Ok(value) => RpcResponse::success(id, value),
        Err(e) => RpcResponse::error(id, e.rpc_code(), e.to_string()),
    }
}

/// Handle `db.set` - write `payload` into the LWW object `id`.
async fn handle_set(id: RequestId, params: serde_json::Value, db: &Database) -> RpcResponse {
    let params: SetParams = match parse_params(&id, params) {
        Ok(p) => p,
        Err(response) => return response,
    };
    respond(id, db.set(params.id, params.payload).await)
}

/// Handle `db.add` - add `value` to the set `id`.
async fn handle_add(id: RequestId, params: serde_json::Value, db: &Database) -> RpcResponse {
    let params: ValueParams = match parse_params(&id, params) {
        Ok(p) => p,
        Err(response) => return response,
    };
    respond(id, db.add(params.id, params.value).await)
}

/// Handle `db.remove` - remove `value` from the set `id`.
async fn handle_remove(
    id: RequestId,
    params: serde_json::Value,
    db: &Database,
) -> RpcResponse {
    let params: ValueParams = match parse_params(&id, params) {
        Ok(p) => p,
        Err(response) => return response,
    };
    respond(id, db.remove(params.id, params.value).await)
}

/// Handle `db.query` - resolve a query shape, optionally from node `at`.
async fn handle_query(id: RequestId, params: serde_json::Value, db: &Database) -> RpcResponse {
    let params: QueryParams = match parse_params(&id, params) {
        Ok(p) => p,
        Err(response) => return response,
    };
    let result = match params.at {
        Some(at) => db.query_at(&at, &params.query).await,
        None => db.query(&params.query).await,
    };
    respond(id, result.and_then(|value| value.to_json()))
}

/// Handle `db.get_node` - return the CRDT state of node `id`.
async fn handle_get_node(
    id: RequestId,
    params: serde_json::Value,
    db: &Database,
) -> RpcResponse {
    let params: NodeParams = match parse_params(&id, params) {
        Ok(p) => p,
        Err(response) => return response,
    };
    respond(id, db.get_node(&params.id).await)
}

/// Handle `db.ingest` - merge a replica of a node.
async fn handle_ingest(
    id: RequestId,
    params: serde_json::Value,
    db: &Database,
) -> RpcResponse {
    let params: IngestParams = match parse_params(&id, params) {
        Ok(p) => p,
        Err(response) => return response,
    };
    let result = db
        .ingest(params.node)
        .await
        .map(|changed| serde_json::json!({ "changed": changed }));
    respond(id, result)
}

/// Handle `db.status` - report store and clock status.
async fn handle_status(id: RequestId, db: &Database) -> RpcResponse {
    respond(id, Ok(db.status().await))
}
