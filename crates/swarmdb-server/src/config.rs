//! Configuration loading from TOML and environment variables.
//!
//! The server reads its configuration from:
//! 1. A TOML config file (`--config`)
//! 2. Environment variables (override TOML values)
//!
//! Environment variable prefix: SWARMDB_

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use swarmdb_protocol::NodeId;
use swarmdb_query::ResolverOptions;
use swarmdb_state::StoreConfig;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// RPC server configuration.
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Node store configuration.
    #[serde(default)]
    pub store: StorageConfig,
    /// Query resolution configuration.
    #[serde(default)]
    pub query: QueryConfig,
    /// Logical clock configuration.
    #[serde(default)]
    pub clock: ClockConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// JSON-RPC server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Address to bind the RPC server to.
    #[serde(default = "default_rpc_addr")]
    pub bind_addr: String,
    /// Maximum concurrent RPC connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Request timeout in seconds.
    #[serde(default = "default_rpc_timeout")]
    pub request_timeout_secs: u64,
}

/// Node store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// How long a write waits for a node's lock before failing as busy.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,
    /// JSON snapshot loaded at startup and written on shutdown.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

/// Query resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Node that top-level query fields are read from.
    #[serde(default)]
    pub root_id: Option<NodeId>,
    /// Maximum selection nesting depth.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

/// Logical clock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Writer tag stamped on locally originated mutations.
    #[serde(default = "default_writer_id")]
    pub writer_id: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "swarmdb_state=trace").
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output JSON-formatted logs.
    #[serde(default)]
    pub json_format: bool,
}

// -- Defaults --

fn default_rpc_addr() -> String {
    "127.0.0.1:9470".to_string()
}
fn default_max_connections() -> usize {
    10
}
fn default_rpc_timeout() -> u64 {
    30
}
fn default_lock_timeout() -> u64 {
    swarmdb_protocol::DEFAULT_LOCK_TIMEOUT_MS
}
fn default_max_depth() -> usize {
    swarmdb_protocol::DEFAULT_MAX_QUERY_DEPTH
}
fn default_writer_id() -> String {
    swarmdb_protocol::DEFAULT_WRITER_ID.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

// -- Trait impls --

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_rpc_addr(),
            max_connections: default_max_connections(),
            request_timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout(),
            snapshot_path: None,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            root_id: None,
            max_depth: default_max_depth(),
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            writer_id: default_writer_id(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, with environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, anyhow::Error> {
        let mut config = if let Some(path) = path {
            if path.exists() {
                Self::from_file(path)?
            } else {
                tracing::warn!(
                    path = %path.display(),
                    "Config file not found, using defaults"
                );
                Self::default()
            }
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.rpc.max_connections == 0 {
            anyhow::bail!("rpc.max_connections must be at least 1");
        }
        if self.rpc.request_timeout_secs == 0 {
            anyhow::bail!("rpc.request_timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// Apply `SWARMDB_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides looked up by variable name.
    ///
    /// Values that fail to parse are logged and ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("SWARMDB_RPC_BIND_ADDR") {
            self.rpc.bind_addr = val;
        }
        if let Some(val) = lookup("SWARMDB_MAX_CONNECTIONS") {
            match val.parse() {
                Ok(n) => self.rpc.max_connections = n,
                Err(_) => warn_unparsed("SWARMDB_MAX_CONNECTIONS", &val),
            }
        }
        if let Some(val) = lookup("SWARMDB_LOCK_TIMEOUT_MS") {
            match val.parse() {
                Ok(ms) => self.store.lock_timeout_ms = ms,
                Err(_) => warn_unparsed("SWARMDB_LOCK_TIMEOUT_MS", &val),
            }
        }
        if let Some(val) = lookup("SWARMDB_SNAPSHOT_PATH") {
            self.store.snapshot_path = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup("SWARMDB_ROOT_ID") {
            match val.parse() {
                Ok(id) => self.query.root_id = Some(id),
                Err(_) => warn_unparsed("SWARMDB_ROOT_ID", &val),
            }
        }
        if let Some(val) = lookup("SWARMDB_MAX_DEPTH") {
            match val.parse() {
                Ok(depth) => self.query.max_depth = depth,
                Err(_) => warn_unparsed("SWARMDB_MAX_DEPTH", &val),
            }
        }
        if let Some(val) = lookup("SWARMDB_WRITER_ID") {
            self.clock.writer_id = val;
        }
        if let Some(val) = lookup("SWARMDB_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("SWARMDB_LOG_JSON") {
            self.logging.json_format = val == "true" || val == "1";
        }
    }

    /// Parse the RPC bind address into a SocketAddr.
    pub fn rpc_socket_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        Ok(self.rpc.bind_addr.parse()?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.request_timeout_secs)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            lock_timeout: Duration::from_millis(self.store.lock_timeout_ms),
        }
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            root: self.query.root_id,
            max_depth: self.query.max_depth,
        }
    }
}

fn warn_unparsed(key: &str, value: &str) {
    tracing::warn!(key, value, "Ignoring unparsable environment override");
}
