//! Compilation of a field's directives into ordered, validated steps.
//!
//! Steps run in a fixed priority regardless of how they were written:
//! conditions first, then `@node`, then `@slice` / `@length`. Within
//! one priority the written order is kept.

use swarmdb_protocol::{DbError, NodeId};

use crate::shape::Directive;

/// A validated directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Include(bool),
    Skip(bool),
    Node(NodeId),
    Slice { offset: usize, limit: Option<usize> },
    Length,
}

impl Step {
    fn priority(&self) -> u8 {
        match self {
            Step::Include(_) | Step::Skip(_) => 0,
            Step::Node(_) => 1,
            Step::Slice { .. } | Step::Length => 2,
        }
    }
}

/// The ordered steps of one field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    steps: Vec<Step>,
}

fn non_negative(name: &str, value: i64) -> Result<usize, DbError> {
    usize::try_from(value).map_err(|_| {
        DbError::InvalidArgument(format!("@slice {} must be non-negative, got {}", name, value))
    })
}

impl Pipeline {
    /// Validate and order a field's directives.
    ///
    /// Rejects duplicate `@node`, `@slice` or `@length`, `@slice`
    /// combined with `@length`, and negative slice bounds.
    pub fn compile(directives: &[Directive]) -> Result<Self, DbError> {
        let mut steps = Vec::with_capacity(directives.len());
        let mut seen_node = false;
        let mut seen_collection: Option<&'static str> = None;

        for directive in directives {
            let step = match directive {
                Directive::Include { condition } => Step::Include(*condition),
                Directive::Skip { condition } => Step::Skip(*condition),
                Directive::Node { id } => {
                    if seen_node {
                        return Err(DbError::InvalidArgument(
                            "@node given more than once".into(),
                        ));
                    }
                    seen_node = true;
                    Step::Node(*id)
                }
                Directive::Slice { .. } | Directive::Length => {
                    if let Some(previous) = seen_collection {
                        return Err(DbError::InvalidArgument(format!(
                            "{} conflicts with {} on the same field",
                            directive.name(),
                            previous
                        )));
                    }
                    seen_collection = Some(directive.name());
                    match directive {
                        Directive::Slice { offset, limit } => Step::Slice {
                            offset: non_negative("offset", *offset)?,
                            limit: limit.map(|l| non_negative("limit", l)).transpose()?,
                        },
                        _ => Step::Length,
                    }
                }
            };
            steps.push(step);
        }

        steps.sort_by_key(Step::priority);
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Whether the conditions keep the field: every `@include` holds and
    /// no `@skip` does.
    pub fn included(&self) -> bool {
        self.steps.iter().all(|step| match step {
            Step::Include(condition) => *condition,
            Step::Skip(condition) => !*condition,
            _ => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_by_priority() {
        let id = NodeId::new();
        let pipeline = Pipeline::compile(&[
            Directive::Length,
            Directive::node(id),
            Directive::include(true),
        ])
        .unwrap();
        assert_eq!(
            pipeline.steps(),
            &[Step::Include(true), Step::Node(id), Step::Length]
        );
    }

    #[test]
    fn test_skip_beats_include() {
        let pipeline =
            Pipeline::compile(&[Directive::include(true), Directive::skip(true)]).unwrap();
        assert!(!pipeline.included());
    }

    #[test]
    fn test_include_false_excludes() {
        let pipeline = Pipeline::compile(&[Directive::include(false)]).unwrap();
        assert!(!pipeline.included());
    }

    #[test]
    fn test_negative_offset_rejected() {
        let err = Pipeline::compile(&[Directive::slice(-1, None)]).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument(_)));
    }

    #[test]
    fn test_negative_limit_rejected() {
        let err = Pipeline::compile(&[Directive::slice(0, Some(-2))]).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument(_)));
    }

    #[test]
    fn test_slice_with_length_rejected() {
        let err = Pipeline::compile(&[Directive::slice(0, None), Directive::Length]).unwrap_err();
        assert!(err.to_string().contains("@length conflicts with @slice"));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let id = NodeId::new();
        let err = Pipeline::compile(&[Directive::node(id), Directive::node(id)]).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument(_)));
    }
}
