use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DbError;

/// Unique identifier of a node in the swarm.
///
/// Serialized as the canonical hyphenated UUID string; equality is
/// byte equality of the underlying UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generate a fresh random (v4) identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DbError::InvalidArgument(format!("invalid UUID '{}': {}", s, e)))
    }
}

impl From<Uuid> for NodeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// CRDT kind governing a node's merge semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Discriminator {
    /// Object whose fields are last-writer-wins registers.
    Lww,
    /// Collection of atoms with timestamped add/remove.
    Set,
}

impl Discriminator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Discriminator::Lww => "lww",
            Discriminator::Set => "set",
        }
    }
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar value stored in nodes.
///
/// `Null` is an explicit value: writing it to an LWW field deletes the
/// field while keeping its timestamp around for later comparisons.
///
/// Atoms are totally ordered: first by variant
/// (`Null < Bool < Int < Float < Uuid < String`), then by value, with
/// floats compared by their IEEE total ordering. Equality and hashing
/// agree with that ordering, so atoms can key set state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "AtomRepr", into = "AtomRepr")]
pub enum Atom {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Uuid(NodeId),
    String(String),
}

/// Wire form of an [`Atom`]. UUIDs are wrapped in an object so they
/// never collide with plain strings.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum AtomRepr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Uuid { uuid: NodeId },
    String(String),
}

impl From<AtomRepr> for Atom {
    fn from(repr: AtomRepr) -> Self {
        match repr {
            AtomRepr::Null => Atom::Null,
            AtomRepr::Bool(b) => Atom::Bool(b),
            AtomRepr::Int(i) => Atom::Int(i),
            AtomRepr::Float(f) => Atom::Float(f),
            AtomRepr::Uuid { uuid } => Atom::Uuid(uuid),
            AtomRepr::String(s) => Atom::String(s),
        }
    }
}

impl From<Atom> for AtomRepr {
    fn from(atom: Atom) -> Self {
        match atom {
            Atom::Null => AtomRepr::Null,
            Atom::Bool(b) => AtomRepr::Bool(b),
            Atom::Int(i) => AtomRepr::Int(i),
            Atom::Float(f) => AtomRepr::Float(f),
            Atom::Uuid(uuid) => AtomRepr::Uuid { uuid },
            Atom::String(s) => AtomRepr::String(s),
        }
    }
}

impl Atom {
    fn rank(&self) -> u8 {
        match self {
            Atom::Null => 0,
            Atom::Bool(_) => 1,
            Atom::Int(_) => 2,
            Atom::Float(_) => 3,
            Atom::Uuid(_) => 4,
            Atom::String(_) => 5,
        }
    }

    /// Short name of the atom's variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Atom::Null => "null",
            Atom::Bool(_) => "bool",
            Atom::Int(_) => "int",
            Atom::Float(_) => "float",
            Atom::Uuid(_) => "uuid",
            Atom::String(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Atom::Null)
    }

    pub fn as_uuid(&self) -> Option<NodeId> {
        match self {
            Atom::Uuid(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Atom::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Atom::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Atom::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Atom::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Ord for Atom {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Atom::Null, Atom::Null) => Ordering::Equal,
            (Atom::Bool(a), Atom::Bool(b)) => a.cmp(b),
            (Atom::Int(a), Atom::Int(b)) => a.cmp(b),
            (Atom::Float(a), Atom::Float(b)) => a.total_cmp(b),
            (Atom::Uuid(a), Atom::Uuid(b)) => a.cmp(b),
            (Atom::String(a), Atom::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Atom {}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Atom::Null => {}
            Atom::Bool(b) => b.hash(state),
            Atom::Int(i) => i.hash(state),
            Atom::Float(f) => f.to_bits().hash(state),
            Atom::Uuid(id) => id.hash(state),
            Atom::String(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Null => f.write_str("null"),
            Atom::Bool(b) => write!(f, "{}", b),
            Atom::Int(i) => write!(f, "{}", i),
            Atom::Float(x) => write!(f, "{}", x),
            Atom::Uuid(id) => write!(f, "{}", id),
            Atom::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for Atom {
    fn from(s: &str) -> Self {
        Atom::String(s.to_string())
    }
}

impl From<String> for Atom {
    fn from(s: String) -> Self {
        Atom::String(s)
    }
}

impl From<i64> for Atom {
    fn from(i: i64) -> Self {
        Atom::Int(i)
    }
}

impl From<i32> for Atom {
    fn from(i: i32) -> Self {
        Atom::Int(i64::from(i))
    }
}

impl From<f64> for Atom {
    fn from(f: f64) -> Self {
        Atom::Float(f)
    }
}

impl From<bool> for Atom {
    fn from(b: bool) -> Self {
        Atom::Bool(b)
    }
}

impl From<NodeId> for Atom {
    fn from(id: NodeId) -> Self {
        Atom::Uuid(id)
    }
}

impl<T: Into<Atom>> From<Option<T>> for Atom {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Atom::Null)
    }
}

/// Logical timestamp of a write: a clock reading plus the writer's tag.
///
/// Stamps order by `time` first and break ties on `writer`, so
/// two distinct writers never produce equal stamps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub time: u64,
    pub writer: String,
}

impl Stamp {
    pub fn new(time: u64, writer: impl Into<String>) -> Self {
        Self {
            time,
            writer: writer.into(),
        }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.time, self.writer)
    }
}

/// Field updates for an LWW node, keyed by field name.
///
/// A `Null` value deletes the field. Mutations reject empty payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, Atom>);

impl Payload {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Atom>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Atom>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Atom> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Atom)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Atom>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Payload {
    type Item = (String, Atom);
    type IntoIter = std::collections::btree_map::IntoIter<String, Atom>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A CRDT operation against a single node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    /// Write fields of an LWW node.
    Set { payload: Payload },
    /// Add a value to a set node.
    Add { value: Atom },
    /// Remove a value from a set node.
    Remove { value: Atom },
}

impl Operation {
    /// The discriminator a node must carry for this operation to apply.
    pub fn discriminator(&self) -> Discriminator {
        match self {
            Operation::Set { .. } => Discriminator::Lww,
            Operation::Add { .. } | Operation::Remove { .. } => Discriminator::Set,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Set { .. } => "set",
            Operation::Add { .. } => "add",
            Operation::Remove { .. } => "remove",
        }
    }

    /// Reject operations that can never apply, before any node is touched.
    pub fn validate(&self) -> Result<(), DbError> {
        match self {
            Operation::Set { payload } if payload.is_empty() => Err(DbError::InvalidArgument(
                "payload must contain at least one field".into(),
            )),
            Operation::Set { payload } => {
                if payload.iter().any(|(field, _)| field.is_empty()) {
                    return Err(DbError::InvalidArgument("field names must be non-empty".into()));
                }
                Ok(())
            }
            Operation::Add { .. } | Operation::Remove { .. } => Ok(()),
        }
    }
}

/// An operation addressed to a node, stamped by a logical clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub id: NodeId,
    #[serde(flatten)]
    pub op: Operation,
    pub stamp: Stamp,
}

impl Mutation {
    pub fn new(id: NodeId, op: Operation, stamp: Stamp) -> Self {
        Self { id, op, stamp }
    }
}
