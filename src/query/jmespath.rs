//! JMESPath queries.

use serde_json::Value;

use crate::query::{Querier, QueryError, QueryStrategy, SourceNode};

/// The `jmespath` query language.
///
/// A `null` result means nothing matched. Array results are returned as a
/// single array value; flattening happens when values are transformed.
#[derive(Debug, Clone, Copy, Default)]
pub struct JmesPathQuerier;

impl QueryStrategy for JmesPathQuerier {
    fn evaluate(&self, expr: &str, node: SourceNode<'_, '_>) -> Result<Vec<Value>, QueryError> {
        let root = node.as_json(Querier::Jmespath)?;
        let expression = jmespath::compile(expr.trim())
            .map_err(|e| QueryError::invalid(Querier::Jmespath, e.to_string()))?;
        let result = expression
            .search(root.clone())
            .map_err(|e| QueryError::invalid(Querier::Jmespath, e.to_string()))?;
        if result.is_null() {
            return Ok(Vec::new());
        }
        let value = serde_json::to_value(&*result)
            .map_err(|e| QueryError::invalid(Querier::Jmespath, e.to_string()))?;
        Ok(vec![value])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(expr: &str, value: &Value) -> Result<Vec<Value>, QueryError> {
        JmesPathQuerier.evaluate(expr, SourceNode::Json(value))
    }

    #[test]
    fn test_jmespath() {
        let value = json!({"people": [
            {"name": "Ada", "age": 36},
            {"name": "Grace", "age": 85}
        ]});

        assert_eq!(query("people[0].name", &value).unwrap(), vec![json!("Ada")]);
        assert_eq!(
            query("people[?age > `50`].name", &value).unwrap(),
            vec![json!(["Grace"])]
        );
        assert!(query("nobody", &value).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_expression() {
        let value = json!({});
        assert!(matches!(
            query("people[", &value),
            Err(QueryError::InvalidExpression { querier: Querier::Jmespath, .. })
        ));
    }
}
