//! Resolution of query shapes against the node store.
//!
//! Each field runs its [`Pipeline`] over a cursor that starts out
//! unresolved:
//!
//! 1. `@include` / `@skip` may drop the field before anything is read.
//! 2. `@node(id)` points the cursor at that node.
//! 3. `@slice` / `@length` require the cursor to be a set node (a UUID
//!    field value is dereferenced first) and turn it into a sequence or
//!    a count.
//! 4. Whatever remains is projected through the field's sub-selection.
//!
//! Nodes are read as per-node snapshots; a query spanning several nodes
//! may observe them at different points in time.

use futures::future::{BoxFuture, FutureExt};

use swarmdb_protocol::{Atom, DbError, NodeId, DEFAULT_MAX_QUERY_DEPTH, ID_FIELD, TYPENAME_FIELD};
use swarmdb_state::{Node, NodeState, NodeStore};

use crate::pipeline::{Pipeline, Step};
use crate::shape::{Field, Query};
use crate::value::Value;

/// Resolver settings.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Node that top-level fields are read from. When unset, or when the
    /// node does not exist, the root is an empty object.
    pub root: Option<NodeId>,
    /// Maximum selection nesting depth.
    pub max_depth: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            root: None,
            max_depth: DEFAULT_MAX_QUERY_DEPTH,
        }
    }
}

/// Intermediate state of a field while its steps run.
#[derive(Debug)]
enum Cursor {
    /// The field's own value has not been read yet.
    Pending,
    Atom(Atom),
    Node(Node),
    /// Elements produced by `@slice`.
    Sequence(Vec<Atom>),
    /// Count produced by `@length`.
    Count(usize),
}

/// Walks query shapes over a [`NodeStore`].
pub struct Resolver<'s> {
    store: &'s NodeStore,
    options: ResolverOptions,
}

impl<'s> Resolver<'s> {
    pub fn new(store: &'s NodeStore, options: ResolverOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve a query from the configured root.
    pub async fn resolve(&self, query: &Query) -> Result<Value, DbError> {
        let root = match self.options.root {
            Some(id) => self.store.find(&id).await?,
            None => None,
        };
        self.resolve_selection(root.as_ref(), &query.fields, 1).await
    }

    /// Resolve a query with `node` as the root context.
    pub async fn resolve_at(&self, node: &NodeId, query: &Query) -> Result<Value, DbError> {
        let root = self.fetch(node).await?;
        self.resolve_selection(Some(&root), &query.fields, 1).await
    }

    async fn fetch(&self, id: &NodeId) -> Result<Node, DbError> {
        self.store.get(id).await
    }

    fn check_depth(&self, depth: usize) -> Result<(), DbError> {
        if depth > self.options.max_depth {
            return Err(DbError::InvalidArgument(format!(
                "query nesting exceeds maximum depth of {}",
                self.options.max_depth
            )));
        }
        Ok(())
    }

    fn resolve_selection<'a>(
        &'a self,
        context: Option<&'a Node>,
        fields: &'a [Field],
        depth: usize,
    ) -> BoxFuture<'a, Result<Value, DbError>> {
        async move {
            self.check_depth(depth)?;

            let mut entries: Vec<(String, Value)> = Vec::with_capacity(fields.len());
            for field in fields {
                let key = field.output_key();
                if entries.iter().any(|(k, _)| k == key) {
                    return Err(DbError::InvalidArgument(format!(
                        "duplicate output key '{}' in selection",
                        key
                    )));
                }
                if let Some(value) = self.resolve_field(context, field, depth).await? {
                    entries.push((key.to_string(), value));
                }
            }
            Ok(Value::Object(entries))
        }
        .boxed()
    }

    /// Resolve one field; `None` means it was excluded by a condition.
    async fn resolve_field(
        &self,
        context: Option<&Node>,
        field: &Field,
        depth: usize,
    ) -> Result<Option<Value>, DbError> {
        let pipeline = Pipeline::compile(&field.directives)?;
        let mut cursor = Cursor::Pending;

        for step in pipeline.steps() {
            cursor = match *step {
                Step::Include(condition) => {
                    if !condition {
                        return Ok(None);
                    }
                    cursor
                }
                Step::Skip(condition) => {
                    if condition {
                        return Ok(None);
                    }
                    cursor
                }
                Step::Node(id) => Cursor::Node(self.fetch(&id).await?),
                Step::Slice { offset, limit } => {
                    let set = self.require_set(cursor, context, &field.name).await?;
                    let elements = set
                        .into_iter()
                        .skip(offset)
                        .take(limit.unwrap_or(usize::MAX))
                        .collect();
                    Cursor::Sequence(elements)
                }
                Step::Length => {
                    let set = self.require_set(cursor, context, &field.name).await?;
                    Cursor::Count(set.len())
                }
            };
        }

        if let Cursor::Pending = cursor {
            cursor = Cursor::Atom(lookup(context, &field.name));
        }

        tracing::trace!(field = %field.name, depth, "Resolved field cursor");
        self.project(cursor, &field.fields, depth).await.map(Some)
    }

    /// Turn the cursor into a set node's elements, or fail with
    /// `TypeMismatch`.
    async fn require_set(
        &self,
        cursor: Cursor,
        context: Option<&Node>,
        name: &str,
    ) -> Result<Vec<Atom>, DbError> {
        let cursor = match cursor {
            Cursor::Pending => Cursor::Atom(lookup(context, name)),
            other => other,
        };
        let node = match cursor {
            Cursor::Node(node) => node,
            Cursor::Atom(Atom::Uuid(id)) => self.fetch(&id).await?,
            Cursor::Atom(atom) => return Err(DbError::mismatch("set", atom.type_name())),
            Cursor::Sequence(_) => return Err(DbError::mismatch("set", "sequence")),
            Cursor::Count(_) => return Err(DbError::mismatch("set", "int")),
            Cursor::Pending => return Err(DbError::mismatch("set", "null")),
        };
        match node.state {
            NodeState::Set(set) => Ok(set.elements()),
            NodeState::Lww(_) => Err(DbError::mismatch("set", "lww")),
        }
    }

    async fn project(
        &self,
        cursor: Cursor,
        selection: &[Field],
        depth: usize,
    ) -> Result<Value, DbError> {
        match cursor {
            Cursor::Count(n) => {
                if !selection.is_empty() {
                    return Err(DbError::mismatch("node", "int"));
                }
                Ok(Value::Atom(Atom::Int(n as i64)))
            }
            Cursor::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.project_atom(item, selection, depth).await?);
                }
                Ok(Value::List(out))
            }
            Cursor::Node(node) => self.project_node(&node, selection, depth).await,
            Cursor::Atom(atom) => self.project_atom(atom, selection, depth).await,
            Cursor::Pending => Ok(Value::null()),
        }
    }

    /// A scalar is returned as-is unless a sub-selection asks for the
    /// node it references.
    async fn project_atom(
        &self,
        atom: Atom,
        selection: &[Field],
        depth: usize,
    ) -> Result<Value, DbError> {
        if selection.is_empty() {
            return Ok(Value::Atom(atom));
        }
        match atom {
            Atom::Uuid(id) => {
                let node = self.fetch(&id).await?;
                self.project_node(&node, selection, depth).await
            }
            other => Err(DbError::mismatch("uuid", other.type_name())),
        }
    }

    fn project_node<'a>(
        &'a self,
        node: &'a Node,
        selection: &'a [Field],
        depth: usize,
    ) -> BoxFuture<'a, Result<Value, DbError>> {
        async move {
            self.check_depth(depth)?;
            match (&node.state, selection.is_empty()) {
                (NodeState::Lww(obj), true) => Ok(Value::Object(
                    obj.live_fields()
                        .map(|(name, atom)| (name.clone(), Value::Atom(atom.clone())))
                        .collect(),
                )),
                (NodeState::Set(set), true) => {
                    Ok(Value::List(set.iter().cloned().map(Value::Atom).collect()))
                }
                (NodeState::Lww(_), false) => {
                    self.resolve_selection(Some(node), selection, depth + 1).await
                }
                // Each element is one level below the set, so a set that
                // reaches itself through its elements hits the depth limit.
                (NodeState::Set(set), false) => {
                    let mut out = Vec::with_capacity(set.len());
                    for element in set.iter() {
                        out.push(
                            self.project_atom(element.clone(), selection, depth + 1)
                                .await?,
                        );
                    }
                    Ok(Value::List(out))
                }
            }
        }
        .boxed()
    }
}

/// Read a field of the context node. Meta fields `id` and `__typename`
/// are available on every node; anything missing reads as `Null`.
fn lookup(context: Option<&Node>, name: &str) -> Atom {
    let Some(node) = context else {
        return Atom::Null;
    };
    match name {
        ID_FIELD => Atom::Uuid(node.id),
        TYPENAME_FIELD => Atom::from(node.discriminator().as_str()),
        _ => node
            .as_lww()
            .and_then(|obj| obj.get(name))
            .cloned()
            .unwrap_or(Atom::Null),
    }
}
