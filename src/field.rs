//! Output of a conversion: ordered field assignments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Visibility of an emitted value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!(
                "invalid visibility '{}', expected 'public' or 'private'",
                other
            )),
        }
    }
}

/// One value assigned to one target field.
///
/// The full output of a conversion is a `Vec<FieldAssignment>` in map entry
/// order. Fields are multi-valued: the same `field` may appear many times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAssignment {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    pub value: String,
}

impl FieldAssignment {
    /// Build a public, untyped assignment.
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            datatype: None,
            language: None,
            visibility: Visibility::Public,
            value: value.into(),
        }
    }
}

impl fmt::Display for FieldAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.field)?;
        if let Some(datatype) = &self.datatype {
            write!(f, " ^^{}", datatype)?;
        }
        if let Some(language) = &self.language {
            write!(f, " @{}", language)?;
        }
        if self.visibility == Visibility::Private {
            write!(f, " (private)")?;
        }
        write!(f, " = {}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_parse() {
        assert_eq!("public".parse::<Visibility>(), Ok(Visibility::Public));
        assert_eq!(" private ".parse::<Visibility>(), Ok(Visibility::Private));
        assert!("hidden".parse::<Visibility>().is_err());
    }

    #[test]
    fn test_display() {
        let mut assignment = FieldAssignment::new("dcterms:title", "Hello");
        assert_eq!(assignment.to_string(), "dcterms:title = Hello");

        assignment.language = Some("en".to_string());
        assignment.visibility = Visibility::Private;
        assert_eq!(assignment.to_string(), "dcterms:title @en (private) = Hello");
    }

    #[test]
    fn test_serialize_skips_empty_options() {
        let json = serde_json::to_value(FieldAssignment::new("title", "Hello")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"field": "title", "visibility": "public", "value": "Hello"})
        );
    }
}
