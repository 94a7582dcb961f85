/// Default bound on waiting for a node's lock, in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 500;

/// Default maximum nesting depth of a query shape.
pub const DEFAULT_MAX_QUERY_DEPTH: usize = 32;

/// Writer tag used by the default logical clock when none is configured.
pub const DEFAULT_WRITER_ID: &str = "swarmdb-local";

/// Version of the on-disk snapshot format.
pub const SNAPSHOT_VERSION: u32 = 1;

/// JSON-RPC protocol version.
pub const JSONRPC_VERSION: &str = "2.0";

/// Name of the meta field carrying a node's identifier.
pub const ID_FIELD: &str = "id";

/// Name of the meta field carrying a node's discriminator.
pub const TYPENAME_FIELD: &str = "__typename";

// JSON-RPC error codes.

/// Invalid JSON received.
pub const RPC_PARSE_ERROR: i32 = -32700;
/// Method does not exist.
pub const RPC_METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameters (also used for `InvalidArgument`).
pub const RPC_INVALID_PARAMS: i32 = -32602;
/// Generic server-side failure.
pub const RPC_SERVER_ERROR: i32 = -32000;
/// Referenced node does not exist.
pub const RPC_NOT_FOUND: i32 = -32001;
/// Operation kind disagrees with the node's discriminator.
pub const RPC_TYPE_MISMATCH: i32 = -32002;
/// Node lock could not be acquired in time.
pub const RPC_BUSY: i32 = -32003;
