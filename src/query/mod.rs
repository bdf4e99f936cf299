//! Path query languages.
//!
//! Each query language is a [`QueryStrategy`]: a pure function from an
//! expression and a source node to zero or more values, in source order.
//! The [`QueryRegistry`] holds one strategy per [`Querier`] and lets callers
//! swap any of them out.

pub mod index;
pub mod jmespath;
pub mod jsdot;
pub mod jsonpath;
pub mod xpath;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub use index::IndexQuerier;
pub use jmespath::JmesPathQuerier;
pub use jsdot::{FieldPath, JsdotQuerier, PathSegment};
pub use jsonpath::JsonPathQuerier;
pub use xpath::{XPath, XPathQuerier};

/// Query language tag of a source path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Querier {
    Jsdot,
    Jmespath,
    Jsonpath,
    Xpath,
    Index,
}

impl Querier {
    /// All query languages, in the precedence order used when a source names
    /// several of them.
    pub const ALL: [Querier; 5] = [
        Querier::Jsdot,
        Querier::Jmespath,
        Querier::Jsonpath,
        Querier::Xpath,
        Querier::Index,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Querier::Jsdot => "jsdot",
            Querier::Jmespath => "jmespath",
            Querier::Jsonpath => "jsonpath",
            Querier::Xpath => "xpath",
            Querier::Index => "index",
        }
    }
}

impl fmt::Display for Querier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Querier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Querier::ALL
            .iter()
            .copied()
            .find(|q| q.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown query language '{}'", s))
    }
}

/// Error type for query evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The query language cannot address this shape of data.
    TypeMismatch {
        querier: Querier,
        expected: &'static str,
    },
    InvalidExpression { querier: Querier, message: String },
}

impl QueryError {
    pub(crate) fn invalid(querier: Querier, message: impl Into<String>) -> Self {
        QueryError::InvalidExpression {
            querier,
            message: message.into(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::TypeMismatch { querier, expected } => {
                write!(f, "{} query requires {}", querier, expected)
            }
            QueryError::InvalidExpression { querier, message } => {
                write!(f, "Invalid {} expression: {}", querier, message)
            }
        }
    }
}

impl std::error::Error for QueryError {}

/// A node of source data a query runs against.
#[derive(Debug, Clone, Copy)]
pub enum SourceNode<'a, 'input> {
    Json(&'a Value),
    Xml(roxmltree::Node<'a, 'input>),
}

impl<'a, 'input> SourceNode<'a, 'input> {
    /// The key/value data, or a type mismatch for `querier`.
    pub fn as_json(&self, querier: Querier) -> Result<&'a Value, QueryError> {
        match *self {
            SourceNode::Json(value) => Ok(value),
            SourceNode::Xml(_) => Err(QueryError::TypeMismatch {
                querier,
                expected: "key/value input",
            }),
        }
    }

    /// The XML tree, or a type mismatch for `querier`.
    pub fn as_xml(&self, querier: Querier) -> Result<roxmltree::Node<'a, 'input>, QueryError> {
        match *self {
            SourceNode::Xml(node) => Ok(node),
            SourceNode::Json(_) => Err(QueryError::TypeMismatch {
                querier,
                expected: "an XML tree",
            }),
        }
    }
}

/// One query language.
///
/// Implementations must not mutate the node and must keep results in
/// source order.
pub trait QueryStrategy: Send + Sync {
    fn evaluate(&self, expr: &str, node: SourceNode<'_, '_>) -> Result<Vec<Value>, QueryError>;
}

/// Simple function-based implementation of QueryStrategy
impl<F> QueryStrategy for F
where
    F: Fn(&str, SourceNode<'_, '_>) -> Result<Vec<Value>, QueryError> + Send + Sync,
{
    fn evaluate(&self, expr: &str, node: SourceNode<'_, '_>) -> Result<Vec<Value>, QueryError> {
        self(expr, node)
    }
}

/// Registry of query strategies, one per query language.
pub struct QueryRegistry {
    strategies: HashMap<Querier, Box<dyn QueryStrategy>>,
}

impl QueryRegistry {
    /// Registry with the built-in strategy for every query language.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Querier::Jsdot, Box::new(JsdotQuerier));
        registry.register(Querier::Jmespath, Box::new(JmesPathQuerier));
        registry.register(Querier::Jsonpath, Box::new(JsonPathQuerier));
        registry.register(Querier::Xpath, Box::new(XPathQuerier));
        registry.register(Querier::Index, Box::new(IndexQuerier));
        registry
    }

    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Register or replace the strategy for a query language.
    pub fn register(&mut self, querier: Querier, strategy: Box<dyn QueryStrategy>) {
        self.strategies.insert(querier, strategy);
    }

    pub fn has_strategy(&self, querier: Querier) -> bool {
        self.strategies.contains_key(&querier)
    }

    pub fn evaluate(
        &self,
        querier: Querier,
        expr: &str,
        node: SourceNode<'_, '_>,
    ) -> Result<Vec<Value>, QueryError> {
        let strategy = self
            .strategies
            .get(&querier)
            .ok_or_else(|| QueryError::invalid(querier, "no strategy registered"))?;
        strategy.evaluate(expr, node)
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_querier_parse() {
        assert_eq!("JSDot".parse::<Querier>(), Ok(Querier::Jsdot));
        assert_eq!(" xpath ".parse::<Querier>(), Ok(Querier::Xpath));
        assert!("css".parse::<Querier>().is_err());
    }

    #[test]
    fn test_querier_tags_match_schema() {
        let tags: Vec<&str> = Querier::ALL.iter().map(Querier::as_str).collect();
        assert_eq!(tags.as_slice(), crate::schema::attributes("from"));
    }

    #[test]
    fn test_type_mismatch() {
        let registry = QueryRegistry::new();
        let value = json!({"title": "Hello"});

        let err = registry
            .evaluate(Querier::Xpath, "/title", SourceNode::Json(&value))
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::TypeMismatch {
                querier: Querier::Xpath,
                expected: "an XML tree"
            }
        );

        let doc = roxmltree::Document::parse("<title>Hello</title>").unwrap();
        let err = registry
            .evaluate(Querier::Jsdot, "title", SourceNode::Xml(doc.root()))
            .unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch { querier: Querier::Jsdot, .. }));
    }

    #[test]
    fn test_replace_strategy() {
        fn shout(expr: &str, _node: SourceNode<'_, '_>) -> Result<Vec<Value>, QueryError> {
            Ok(vec![Value::String(expr.to_uppercase())])
        }

        let mut registry = QueryRegistry::new();
        registry.register(Querier::Jsdot, Box::new(shout));

        let value = json!({});
        let result = registry
            .evaluate(Querier::Jsdot, "title", SourceNode::Json(&value))
            .unwrap();
        assert_eq!(result, vec![json!("TITLE")]);
    }

    #[test]
    fn test_missing_strategy() {
        let registry = QueryRegistry::empty();
        let value = json!({});
        let result = registry.evaluate(Querier::Index, "0", SourceNode::Json(&value));
        assert!(matches!(result, Err(QueryError::InvalidExpression { .. })));
    }
}
