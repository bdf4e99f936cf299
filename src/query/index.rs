//! Positional access into sequences.

use serde_json::Value;

use crate::query::{Querier, QueryError, QueryStrategy, SourceNode};

/// The `index` query language: a zero-based position.
///
/// Arrays are indexed directly and objects by the order of their keys.
/// An out-of-range position yields nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexQuerier;

impl QueryStrategy for IndexQuerier {
    fn evaluate(&self, expr: &str, node: SourceNode<'_, '_>) -> Result<Vec<Value>, QueryError> {
        let value = node.as_json(Querier::Index)?;
        let position: usize = expr.trim().parse().map_err(|_| {
            QueryError::invalid(Querier::Index, format!("'{}' is not a position", expr.trim()))
        })?;

        let found = match value {
            Value::Array(items) => items.get(position),
            Value::Object(map) => map.values().nth(position),
            _ => {
                return Err(QueryError::TypeMismatch {
                    querier: Querier::Index,
                    expected: "a sequence",
                })
            }
        };
        Ok(found.cloned().into_iter().collect())
    }
}
