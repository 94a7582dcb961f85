//! Tests for the JSON-RPC surface.
//!
//! Verifies:
//! - Method dispatch and result shapes for every `db.*` method
//! - Error codes for parse failures, unknown methods and store errors
//! - Line-delimited request handling over a real TCP connection

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value as Json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use swarmdb_protocol::*;
use swarmdb_server::rpc_server::process_request;
use swarmdb_server::{Database, RpcServer};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn call(db: &Database, method: &str, params: Json) -> RpcResponse {
    let request = RpcRequest::new(method, params);
    let line = serde_json::to_string(&request).unwrap();
    process_request(&line, db, TIMEOUT).await
}

async fn ok(db: &Database, method: &str, params: Json) -> Json {
    let response = call(db, method, params).await;
    assert!(!response.is_error(), "{} failed: {:?}", method, response.error);
    response.result.unwrap()
}

fn code(response: &RpcResponse) -> i32 {
    response.error.as_ref().map(|e| e.code).unwrap()
}

// ═══════════════════════════════════════════════════════════════
// Envelope Handling
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_parse_error() {
    let db = Database::in_memory("rpc");
    let response = process_request("{not json", &db, TIMEOUT).await;
    assert_eq!(code(&response), RPC_PARSE_ERROR);
    assert!(response.id.is_none());
}

#[tokio::test]
async fn test_unknown_method() {
    let db = Database::in_memory("rpc");
    let response = call(&db, "db.drop_everything", json!({})).await;
    assert_eq!(code(&response), RPC_METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_response_echoes_request_id() {
    let db = Database::in_memory("rpc");
    let line = r#"{"jsonrpc":"2.0","method":"db.status","id":"req-7"}"#;
    let response = process_request(line, &db, TIMEOUT).await;
    assert_eq!(response.id, Some(json!("req-7")));
    assert_eq!(response.result.unwrap()["node_count"], json!(0));
}

#[tokio::test]
async fn test_numeric_request_id_is_echoed() {
    let db = Database::in_memory("rpc");
    let line = r#"{"jsonrpc":"2.0","id":1,"method":"db.status","params":{}}"#;
    let response = process_request(line, &db, TIMEOUT).await;
    assert!(!response.is_error(), "{:?}", response.error);
    assert_eq!(response.id, Some(json!(1)));

    let reply = serde_json::to_value(&response).unwrap();
    assert_eq!(reply["id"], json!(1));
}

#[tokio::test]
async fn test_numeric_id_kept_on_error() {
    let db = Database::in_memory("rpc");
    let line = r#"{"jsonrpc":"2.0","id":42,"method":"db.get_node","params":{"id":"nope"}}"#;
    let response = process_request(line, &db, TIMEOUT).await;
    assert_eq!(code(&response), RPC_INVALID_PARAMS);
    assert_eq!(response.id, Some(json!(42)));
}

// ═══════════════════════════════════════════════════════════════
// Methods
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_set_then_query() {
    let db = Database::in_memory("rpc");
    let id = NodeId::new();

    let result = ok(&db, "db.set", json!({ "id": id, "payload": { "x": 1 } })).await;
    assert_eq!(result, json!(true));

    let query = json!({
        "query": { "fields": [
            { "name": "n",
              "directives": [ { "node": { "id": id } } ],
              "fields": [ { "name": "x" } ] }
        ] }
    });
    assert_eq!(ok(&db, "db.query", query).await, json!({ "n": { "x": 1 } }));
}

#[tokio::test]
async fn test_add_slice_and_length() {
    let db = Database::in_memory("rpc");
    let id = NodeId::new();
    for letter in ["e", "a", "c", "b", "d"] {
        ok(&db, "db.add", json!({ "id": id, "value": letter })).await;
    }
    ok(&db, "db.remove", json!({ "id": id, "value": "a" })).await;

    let query = json!({
        "query": { "fields": [
            { "name": "items",
              "directives": [ { "node": { "id": id } }, { "slice": { "offset": 1, "limit": 2 } } ] },
            { "name": "count",
              "directives": [ { "node": { "id": id } }, "length" ] }
        ] }
    });
    assert_eq!(
        ok(&db, "db.query", query).await,
        json!({ "items": ["c", "d"], "count": 4 })
    );
}

#[tokio::test]
async fn test_query_at_node() {
    let db = Database::in_memory("rpc");
    let id = NodeId::new();
    ok(&db, "db.set", json!({ "id": id, "payload": { "title": "hi" } })).await;

    let params = json!({ "query": { "fields": [ { "name": "title" } ] }, "at": id });
    assert_eq!(ok(&db, "db.query", params).await, json!({ "title": "hi" }));
}

#[tokio::test]
async fn test_get_node_and_ingest() {
    let source = Database::in_memory("a");
    let id = NodeId::new();
    ok(&source, "db.add", json!({ "id": id, "value": 7 })).await;

    let node = ok(&source, "db.get_node", json!({ "id": id })).await;
    assert_eq!(node["type"], json!("set"));

    let target = Database::in_memory("b");
    let result = ok(&target, "db.ingest", json!({ "node": node.clone() })).await;
    assert_eq!(result, json!({ "changed": true }));
    let result = ok(&target, "db.ingest", json!({ "node": node })).await;
    assert_eq!(result, json!({ "changed": false }));
}

#[tokio::test]
async fn test_status() {
    let db = Database::in_memory("rpc");
    ok(&db, "db.add", json!({ "id": NodeId::new(), "value": "x" })).await;

    let status = ok(&db, "db.status", json!({})).await;
    assert_eq!(status["node_count"], json!(1));
    assert_eq!(status["writer"], json!("rpc"));
    assert_eq!(status["clock"], json!(1));
}

// ═══════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_bad_id_is_invalid_params() {
    let db = Database::in_memory("rpc");
    let response = call(&db, "db.add", json!({ "id": "not-a-uuid", "value": 1 })).await;
    assert_eq!(code(&response), RPC_INVALID_PARAMS);
}

#[tokio::test]
async fn test_empty_payload_is_invalid_params() {
    let db = Database::in_memory("rpc");
    let response = call(&db, "db.set", json!({ "id": NodeId::new(), "payload": {} })).await;
    assert_eq!(code(&response), RPC_INVALID_PARAMS);
}

#[tokio::test]
async fn test_kind_mismatch_code() {
    let db = Database::in_memory("rpc");
    let id = NodeId::new();
    ok(&db, "db.set", json!({ "id": id, "payload": { "x": 1 } })).await;

    let response = call(&db, "db.add", json!({ "id": id, "value": 1 })).await;
    assert_eq!(code(&response), RPC_TYPE_MISMATCH);
}

#[tokio::test]
async fn test_missing_node_code() {
    let db = Database::in_memory("rpc");
    let response = call(&db, "db.get_node", json!({ "id": NodeId::new() })).await;
    assert_eq!(code(&response), RPC_NOT_FOUND);
}

#[tokio::test]
async fn test_conflicting_directives_code() {
    let db = Database::in_memory("rpc");
    let id = NodeId::new();
    ok(&db, "db.add", json!({ "id": id, "value": 1 })).await;

    let query = json!({
        "query": { "fields": [
            { "name": "n",
              "directives": [ { "node": { "id": id } }, { "slice": { "offset": 0 } }, "length" ] }
        ] }
    });
    let response = call(&db, "db.query", query).await;
    assert_eq!(code(&response), RPC_INVALID_PARAMS);
}

// ═══════════════════════════════════════════════════════════════
// TCP Transport
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_requests_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let db = Arc::new(Database::in_memory("tcp"));
    let server = RpcServer::new(addr.to_string(), Arc::clone(&db), 4, TIMEOUT);
    tokio::spawn(server.serve(listener));

    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let id = NodeId::new();
    let requests = [
        RpcRequest::new("db.add", json!({ "id": id, "value": "a" })),
        RpcRequest::new("db.get_node", json!({ "id": id })),
    ];
    for request in &requests {
        let line = serde_json::to_string(request).unwrap();
        writer.write_all(line.as_bytes()).await.unwrap();
        writer.write_all(b"\n").await.unwrap();

        let reply = lines.next_line().await.unwrap().unwrap();
        let response: RpcResponse = serde_json::from_str(&reply).unwrap();
        assert_eq!(response.id, request.id);
        assert!(!response.is_error());
    }

    assert_eq!(db.status().await.node_count, 1);
}
