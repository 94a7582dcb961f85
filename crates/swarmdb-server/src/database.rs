//! The database facade.
//!
//! Local writes are stamped by the configured [`Clock`]; stamps arriving
//! with replicated state are observed so later local writes order after
//! them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use swarmdb_protocol::{Atom, DbError, Mutation, NodeId, Operation, Payload, Stamp};
use swarmdb_query::{Query, Resolver, ResolverOptions, Value};
use swarmdb_state::{Clock, LamportClock, Node, NodeStore};

use crate::config::ServerConfig;

/// Runtime status reported by `db.status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStatus {
    pub node_count: usize,
    pub writer: String,
    pub clock: u64,
    pub root: Option<NodeId>,
    pub started_at: DateTime<Utc>,
}

pub struct Database {
    store: Arc<NodeStore>,
    clock: Arc<dyn Clock>,
    options: ResolverOptions,
    started_at: DateTime<Utc>,
}

impl Database {
    pub fn new(store: Arc<NodeStore>, clock: Arc<dyn Clock>, options: ResolverOptions) -> Self {
        Self {
            store,
            clock,
            options,
            started_at: Utc::now(),
        }
    }

    /// An empty database with default settings and a Lamport clock for
    /// `writer`.
    pub fn in_memory(writer: &str) -> Self {
        Self::new(
            Arc::new(NodeStore::default()),
            Arc::new(LamportClock::new(writer)),
            ResolverOptions::default(),
        )
    }

    /// Build a database over `store` using the configured clock and resolver
    /// settings. The clock resumes after `resume_at`, the latest time
    /// already present in the store.
    pub fn from_config(config: &ServerConfig, store: Arc<NodeStore>, resume_at: u64) -> Self {
        Self::new(
            store,
            Arc::new(LamportClock::starting_at(
                config.clock.writer_id.clone(),
                resume_at,
            )),
            config.resolver_options(),
        )
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Write `payload` into the LWW object `id`, creating it if needed.
    pub async fn set(&self, id: NodeId, payload: Payload) -> Result<bool, DbError> {
        self.local(id, Operation::Set { payload }).await
    }

    /// Add `value` to the set `id`, creating it if needed.
    pub async fn add(&self, id: NodeId, value: Atom) -> Result<bool, DbError> {
        self.local(id, Operation::Add { value }).await
    }

    /// Remove `value` from the set `id`, creating it if needed.
    pub async fn remove(&self, id: NodeId, value: Atom) -> Result<bool, DbError> {
        self.local(id, Operation::Remove { value }).await
    }

    async fn local(&self, id: NodeId, op: Operation) -> Result<bool, DbError> {
        // Rejected operations must not consume a tick.
        op.validate()?;
        let mutation = Mutation::new(id, op, self.clock.tick());
        self.write(&mutation).await
    }

    /// Apply a mutation that already carries a stamp.
    pub async fn apply(&self, mutation: Mutation) -> Result<bool, DbError> {
        mutation.op.validate()?;
        self.clock.observe(&mutation.stamp);
        self.write(&mutation).await
    }

    async fn write(&self, mutation: &Mutation) -> Result<bool, DbError> {
        match self.store.upsert(mutation).await {
            Ok(outcome) => {
                tracing::debug!(
                    node = %mutation.id,
                    op = mutation.op.name(),
                    stamp = %mutation.stamp,
                    created = outcome.created,
                    changed = outcome.changed,
                    "Mutation applied"
                );
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(
                    node = %mutation.id,
                    op = mutation.op.name(),
                    error = %e,
                    "Mutation rejected"
                );
                Err(e)
            }
        }
    }

    /// Resolve `query` from the configured root.
    pub async fn query(&self, query: &Query) -> Result<Value, DbError> {
        let result = Resolver::new(&self.store, self.options.clone())
            .resolve(query)
            .await;
        log_query(None, query, &result);
        result
    }

    /// Resolve `query` with `node` as its root context.
    pub async fn query_at(&self, node: &NodeId, query: &Query) -> Result<Value, DbError> {
        let result = Resolver::new(&self.store, self.options.clone())
            .resolve_at(node, query)
            .await;
        log_query(Some(node), query, &result);
        result
    }

    pub async fn get_node(&self, id: &NodeId) -> Result<Node, DbError> {
        self.store.get(id).await
    }

    /// Merge a replica of a node received from another store.
    ///
    /// Returns whether local state changed.
    pub async fn ingest(&self, replica: Node) -> Result<bool, DbError> {
        let id = replica.id;
        if let Some(time) = replica.state.max_time() {
            self.clock.observe(&Stamp::new(time, ""));
        }
        match self.store.ingest(replica).await {
            Ok(outcome) => {
                tracing::debug!(
                    node = %id,
                    created = outcome.created,
                    changed = outcome.changed,
                    "Replica ingested"
                );
                Ok(outcome.changed)
            }
            Err(e) => {
                tracing::warn!(node = %id, error = %e, "Replica rejected");
                Err(e)
            }
        }
    }

    pub async fn status(&self) -> DatabaseStatus {
        DatabaseStatus {
            node_count: self.store.len().await,
            writer: self.clock.writer().to_string(),
            clock: self.clock.current(),
            root: self.options.root,
            started_at: self.started_at,
        }
    }
}

fn log_query(at: Option<&NodeId>, query: &Query, result: &Result<Value, DbError>) {
    let at = at.map(ToString::to_string);
    match result {
        Ok(_) => tracing::debug!(at = ?at, fields = query.fields.len(), "Query resolved"),
        Err(e) => tracing::warn!(at = ?at, error = %e, "Query failed"),
    }
}
