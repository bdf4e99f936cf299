//! Dotted field paths over key/value data.
//!
//! `record.items[0].name`, `items.0.name` and `items.*.name` all address
//! values inside a JSON tree. A field segment applied to an array projects
//! over its elements, so `authors.name` yields every author's name.

use serde_json::Value;
use std::fmt;

use crate::query::{Querier, QueryError, QueryStrategy, SourceNode};

/// A parsed dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The path as written
    pub raw: String,
    pub segments: Vec<PathSegment>,
}

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named field, or a numeric position when applied to an array
    Field(String),
    /// An explicit array index (`[0]`)
    Index(usize),
    /// Every child (`*`)
    Wildcard,
}

impl FieldPath {
    /// Parse a field path with a given delimiter.
    ///
    /// Bracket indices may follow a name (`items[0]`) or stand alone
    /// (`items.[0]`).
    pub fn parse(path: &str, delimiter: &str) -> Result<Self, String> {
        let mut segments = Vec::new();

        for part in path.trim().split(delimiter) {
            if part.is_empty() {
                continue;
            }
            let (name, mut rest) = match part.find('[') {
                Some(pos) => part.split_at(pos),
                None => (part, ""),
            };
            match name {
                "" => {}
                "*" | "**" => segments.push(PathSegment::Wildcard),
                name => segments.push(PathSegment::Field(name.to_string())),
            }
            while !rest.is_empty() {
                let close = rest
                    .find(']')
                    .ok_or_else(|| format!("unclosed '[' in '{}'", path))?;
                let inner = rest[1..close].trim();
                let segment = match inner {
                    "*" => PathSegment::Wildcard,
                    _ => inner
                        .parse::<usize>()
                        .map(PathSegment::Index)
                        .map_err(|_| format!("invalid index '[{}]' in '{}'", inner, path))?,
                };
                segments.push(segment);
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(format!("unexpected '{}' after index in '{}'", rest, path));
                }
            }
        }

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    /// Create a field path from a dotted string
    pub fn from_dotted(path: &str) -> Result<Self, String> {
        Self::parse(path, ".")
    }

    /// Every value the path reaches, in document order.
    pub fn select<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![root];
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                step(value, segment, &mut next);
            }
            if next.is_empty() {
                return next;
            }
            current = next;
        }
        current
    }
}

fn step<'a>(value: &'a Value, segment: &PathSegment, out: &mut Vec<&'a Value>) {
    match (segment, value) {
        (PathSegment::Wildcard, Value::Object(map)) => out.extend(map.values()),
        (PathSegment::Wildcard, Value::Array(items)) => out.extend(items.iter()),
        (PathSegment::Wildcard, _) => {}
        (PathSegment::Index(i), Value::Array(items)) => out.extend(items.get(*i)),
        (PathSegment::Index(_), _) => {}
        (PathSegment::Field(name), Value::Object(map)) => out.extend(map.get(name)),
        (PathSegment::Field(name), Value::Array(items)) => match name.parse::<usize>() {
            Ok(i) => out.extend(items.get(i)),
            Err(_) => {
                for item in items {
                    step(item, segment, out);
                }
            }
        },
        (PathSegment::Field(_), _) => {}
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// The `jsdot` query language.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsdotQuerier;

impl QueryStrategy for JsdotQuerier {
    fn evaluate(&self, expr: &str, node: SourceNode<'_, '_>) -> Result<Vec<Value>, QueryError> {
        let root = node.as_json(Querier::Jsdot)?;
        let path = FieldPath::from_dotted(expr).map_err(|e| QueryError::invalid(Querier::Jsdot, e))?;
        Ok(path.select(root).into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(expr: &str, value: &Value) -> Vec<Value> {
        JsdotQuerier.evaluate(expr, SourceNode::Json(value)).unwrap()
    }

    #[test]
    fn test_field_path_parse() {
        let path = FieldPath::from_dotted("user.address.city").unwrap();
        assert_eq!(
            path.segments,
            vec![
                PathSegment::Field("user".to_string()),
                PathSegment::Field("address".to_string()),
                PathSegment::Field("city".to_string()),
            ]
        );
    }

    #[test]
    fn test_field_path_with_index() {
        let path = FieldPath::from_dotted("items[0][1].name").unwrap();
        assert_eq!(
            path.segments,
            vec![
                PathSegment::Field("items".to_string()),
                PathSegment::Index(0),
                PathSegment::Index(1),
                PathSegment::Field("name".to_string()),
            ]
        );

        let path = FieldPath::from_dotted("items.[2].*").unwrap();
        assert_eq!(path.segments[1], PathSegment::Index(2));
        assert_eq!(path.segments[2], PathSegment::Wildcard);
    }

    #[test]
    fn test_field_path_errors() {
        assert!(FieldPath::from_dotted("items[0").is_err());
        assert!(FieldPath::from_dotted("items[x]").is_err());
        assert!(FieldPath::from_dotted("items[0]x").is_err());
    }

    #[test]
    fn test_select() {
        let value = json!({
            "title": "Hello",
            "authors": [{"name": "Ada"}, {"name": "Grace"}],
            "tags": ["a", "b"]
        });

        assert_eq!(query("title", &value), vec![json!("Hello")]);
        assert_eq!(query("authors.name", &value), vec![json!("Ada"), json!("Grace")]);
        assert_eq!(query("authors.1.name", &value), vec![json!("Grace")]);
        assert_eq!(query("authors[0].name", &value), vec![json!("Ada")]);
        assert_eq!(query("tags.*", &value), vec![json!("a"), json!("b")]);
        assert_eq!(query("tags", &value), vec![json!(["a", "b"])]);
        assert!(query("missing.path", &value).is_empty());
        assert!(query("tags[5]", &value).is_empty());
    }

    #[test]
    fn test_empty_path_selects_root() {
        let value = json!("scalar");
        assert_eq!(query("", &value), vec![json!("scalar")]);
    }
}
