//! JSONPath (RFC 9535) queries.

use serde_json::Value;
use serde_json_path::JsonPath;

use crate::query::{Querier, QueryError, QueryStrategy, SourceNode};

/// The `jsonpath` query language.
///
/// Expressions without a leading `$` are taken relative to the root, so
/// `store.book[0]` means `$.store.book[0]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPathQuerier;

impl JsonPathQuerier {
    fn compile(expr: &str) -> Result<JsonPath, QueryError> {
        let expr = expr.trim();
        let normalized = if expr.starts_with('$') {
            expr.to_string()
        } else if expr.starts_with('[') {
            format!("${}", expr)
        } else {
            format!("$.{}", expr)
        };
        JsonPath::parse(&normalized).map_err(|e| QueryError::invalid(Querier::Jsonpath, e.to_string()))
    }
}

impl QueryStrategy for JsonPathQuerier {
    fn evaluate(&self, expr: &str, node: SourceNode<'_, '_>) -> Result<Vec<Value>, QueryError> {
        let root = node.as_json(Querier::Jsonpath)?;
        let path = Self::compile(expr)?;
        Ok(path.query(root).all().into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(expr: &str, value: &Value) -> Result<Vec<Value>, QueryError> {
        JsonPathQuerier.evaluate(expr, SourceNode::Json(value))
    }

    #[test]
    fn test_jsonpath() {
        let value = json!({"store": {"book": [
            {"title": "A", "price": 8},
            {"title": "B", "price": 12}
        ]}});

        assert_eq!(
            query("$.store.book[*].title", &value).unwrap(),
            vec![json!("A"), json!("B")]
        );
        assert_eq!(query("store.book[1].title", &value).unwrap(), vec![json!("B")]);
        assert_eq!(
            query("$..book[?@.price < 10].title", &value).unwrap(),
            vec![json!("A")]
        );
        assert!(query("$.nothing", &value).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_expression() {
        let value = json!({});
        assert!(matches!(
            query("$.store[", &value),
            Err(QueryError::InvalidExpression { querier: Querier::Jsonpath, .. })
        ));
    }
}
