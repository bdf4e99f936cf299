//! Source documents handed to the converter.
//!
//! JSON and YAML sources become a `serde_json::Value`. XML sources keep their
//! text and are parsed into a `roxmltree` tree for each conversion, since the
//! tree borrows from the text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;
use std::str::FromStr;

use crate::query::SourceNode;

/// Encoding of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Json,
    Xml,
    Yaml,
}

impl SourceFormat {
    /// Guess the format from the first significant byte.
    pub fn detect(bytes: &[u8]) -> Self {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        match bytes.iter().copied().find(|b| !b.is_ascii_whitespace()) {
            Some(b'<') => SourceFormat::Xml,
            Some(b'{') | Some(b'[') => SourceFormat::Json,
            _ => SourceFormat::Yaml,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Json => write!(f, "json"),
            SourceFormat::Xml => write!(f, "xml"),
            SourceFormat::Yaml => write!(f, "yaml"),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(SourceFormat::Json),
            "xml" => Ok(SourceFormat::Xml),
            "yaml" | "yml" => Ok(SourceFormat::Yaml),
            other => Err(format!("unknown source format '{}'", other)),
        }
    }
}

/// Error type for source parsing
#[derive(Debug, Clone, PartialEq)]
pub enum SourceError {
    Encoding(String),
    Syntax { format: SourceFormat, message: String },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Encoding(msg) => write!(f, "Source is not UTF-8: {}", msg),
            SourceError::Syntax { format, message } => {
                write!(f, "Invalid {} source: {}", format, message)
            }
        }
    }
}

impl std::error::Error for SourceError {}

/// A parsed source document.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceDocument {
    Json(Value),
    /// Well-formed XML text
    Xml(String),
}

fn xml_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}

impl SourceDocument {
    /// Parse raw bytes, detecting the format when none is given.
    pub fn parse(bytes: &[u8], format: Option<SourceFormat>) -> Result<Self, SourceError> {
        let format = format.unwrap_or_else(|| SourceFormat::detect(bytes));
        let text = std::str::from_utf8(bytes).map_err(|e| SourceError::Encoding(e.to_string()))?;
        let text = text.trim_start_matches('\u{feff}');
        let syntax = |message: String| SourceError::Syntax { format, message };

        match format {
            SourceFormat::Json => serde_json::from_str(text)
                .map(SourceDocument::Json)
                .map_err(|e| syntax(e.to_string())),
            SourceFormat::Yaml => {
                let yaml: serde_yaml::Value =
                    serde_yaml::from_str(text).map_err(|e| syntax(e.to_string()))?;
                yaml_to_json(yaml).map(SourceDocument::Json).map_err(syntax)
            }
            SourceFormat::Xml => {
                roxmltree::Document::parse_with_options(text, xml_options())
                    .map_err(|e| syntax(e.to_string()))?;
                Ok(SourceDocument::Xml(text.to_string()))
            }
        }
    }

    pub fn from_json(value: Value) -> Self {
        SourceDocument::Json(value)
    }

    pub fn format(&self) -> SourceFormat {
        match self {
            SourceDocument::Json(_) => SourceFormat::Json,
            SourceDocument::Xml(_) => SourceFormat::Xml,
        }
    }

    /// Run `f` with the root node of the document.
    pub fn with_root<R>(&self, f: impl FnOnce(SourceNode<'_, '_>) -> R) -> Result<R, SourceError> {
        match self {
            SourceDocument::Json(value) => Ok(f(SourceNode::Json(value))),
            SourceDocument::Xml(text) => {
                let doc = roxmltree::Document::parse_with_options(text, xml_options()).map_err(
                    |e| SourceError::Syntax {
                        format: SourceFormat::Xml,
                        message: e.to_string(),
                    },
                )?;
                Ok(f(SourceNode::Xml(doc.root())))
            }
        }
    }
}

/// Convert YAML into the JSON model; non-string keys are stringified.
pub(crate) fn yaml_to_json(value: serde_yaml::Value) -> Result<Value, String> {
    Ok(match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("number {} has no JSON form", n))?
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Null => "null".to_string(),
                    other => return Err(format!("unsupported mapping key {:?}", other)),
                };
                map.insert(key, yaml_to_json(value)?);
            }
            Value::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect() {
        assert_eq!(SourceFormat::detect(b"  <record/>"), SourceFormat::Xml);
        assert_eq!(SourceFormat::detect(b"\xEF\xBB\xBF{\"a\": 1}"), SourceFormat::Json);
        assert_eq!(SourceFormat::detect(b"[1, 2]"), SourceFormat::Json);
        assert_eq!(SourceFormat::detect(b"title: Hello"), SourceFormat::Yaml);
    }

    #[test]
    fn test_parse_json_and_yaml() {
        let json = SourceDocument::parse(br#"{"title": "Hello"}"#, None).unwrap();
        assert_eq!(json, SourceDocument::Json(json!({"title": "Hello"})));

        let yaml = SourceDocument::parse(b"title: Hello\n1: one\nyear: 2024\n", None).unwrap();
        assert_eq!(
            yaml,
            SourceDocument::Json(json!({"title": "Hello", "1": "one", "year": 2024}))
        );
    }

    #[test]
    fn test_parse_xml() {
        let doc = SourceDocument::parse(b"<record><title>Hello</title></record>", None).unwrap();
        assert_eq!(doc.format(), SourceFormat::Xml);
        let name = doc
            .with_root(|node| match node {
                SourceNode::Xml(root) => root
                    .first_element_child()
                    .map(|e| e.tag_name().name().to_string()),
                SourceNode::Json(_) => None,
            })
            .unwrap();
        assert_eq!(name.as_deref(), Some("record"));
    }

    #[test]
    fn test_parse_errors() {
        let err = SourceDocument::parse(b"<record>", Some(SourceFormat::Xml)).unwrap_err();
        assert!(matches!(err, SourceError::Syntax { format: SourceFormat::Xml, .. }));

        let err = SourceDocument::parse(b"{\"a\":", None).unwrap_err();
        assert!(err.to_string().starts_with("Invalid json source"));

        let err = SourceDocument::parse(b"\xff\xfe", Some(SourceFormat::Json)).unwrap_err();
        assert!(matches!(err, SourceError::Encoding(_)));
    }

    #[test]
    fn test_format_names() {
        assert_eq!("XML".parse::<SourceFormat>(), Ok(SourceFormat::Xml));
        assert_eq!("yml".parse::<SourceFormat>(), Ok(SourceFormat::Yaml));
        assert!("csv".parse::<SourceFormat>().is_err());
    }
}
