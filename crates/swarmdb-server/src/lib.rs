//! swarmdb Server - query/mutation facade and JSON-RPC API
//!
//! Ties the node store, logical clock and resolver together behind the
//! [`Database`] facade (`set`, `add`, `remove`, `query`), and exposes
//! it as a JSON-RPC 2.0 API over TCP.

pub mod config;
pub mod database;
pub mod rpc_server;

pub use config::ServerConfig;
pub use database::{Database, DatabaseStatus};
pub use rpc_server::RpcServer;
