//! Query shapes as sent by clients.
//!
//! JSON form:
//!
//! ```json
//! { "fields": [
//!     { "name": "todos",
//!       "directives": [ { "node": { "id": "…" } }, { "slice": { "offset": 0, "limit": 10 } } ],
//!       "fields": [ { "name": "title" } ] }
//! ] }
//! ```

use serde::{Deserialize, Serialize};

use swarmdb_protocol::NodeId;

/// A complete query: the selection applied to the root context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Query {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }
}

/// One field of a selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    /// Output key, if different from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directives: Vec<Directive>,
    /// Sub-selection applied to the field's node (or to each element).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            directives: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    pub fn select(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self
    }

    /// Key under which this field appears in the result.
    pub fn output_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Field-level directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    /// Keep the field only if the condition holds.
    Include {
        #[serde(rename = "if")]
        condition: bool,
    },
    /// Drop the field if the condition holds. Wins over `Include`.
    Skip {
        #[serde(rename = "if")]
        condition: bool,
    },
    /// Resolve the field against the given node instead of its value.
    Node { id: NodeId },
    /// Slice a set's elements; `limit` omitted means to the end.
    Slice {
        offset: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<i64>,
    },
    /// Replace a set with its element count.
    Length,
}

impl Directive {
    pub fn include(condition: bool) -> Self {
        Directive::Include { condition }
    }

    pub fn skip(condition: bool) -> Self {
        Directive::Skip { condition }
    }

    pub fn node(id: NodeId) -> Self {
        Directive::Node { id }
    }

    pub fn slice(offset: i64, limit: Option<i64>) -> Self {
        Directive::Slice { offset, limit }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Directive::Include { .. } => "@include",
            Directive::Skip { .. } => "@skip",
            Directive::Node { .. } => "@node",
            Directive::Slice { .. } => "@slice",
            Directive::Length => "@length",
        }
    }
}
