//! swarmdb Query - directive-driven resolution of query shapes
//!
//! A query is a tree of named fields. Each field may carry directives
//! that are compiled into an ordered [`Pipeline`] of typed steps:
//! conditional inclusion, redirection to another node, slicing and
//! measuring set collections. The [`Resolver`] walks the tree against
//! the node store and produces a [`Value`] tree of the same shape.

pub mod pipeline;
pub mod resolver;
pub mod shape;
pub mod value;

pub use pipeline::{Pipeline, Step};
pub use resolver::{Resolver, ResolverOptions};
pub use shape::{Directive, Field, Query};
pub use value::Value;
