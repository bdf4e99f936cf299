//! Canonical mapping model and the parsers that produce it.
//!
//! Every surface syntax (nested-element XML, JSON/YAML literal, flat key-path)
//! is parsed by its own module into a [`builder::MappingBuilder`]; the
//! [`normalizer::Normalizer`] then resolves includes and hands back one
//! immutable [`MappingDefinition`].

pub mod builder;
pub mod flat;
pub mod literal;
pub mod normalizer;
pub mod resolver;
pub mod xml;

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

use crate::field::Visibility;
use crate::query::Querier;

pub use builder::{MapSpec, MappingBuilder, MappingDraft};
pub use normalizer::{normalize, Normalizer, SurfaceSyntax};
pub use resolver::{
    ChainResolver, FileResolver, MappingReference, MappingResolver, MemoryResolver, NoResolver,
};

/// A normalized mapping definition.
///
/// Immutable once built; share it across conversions behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Info>,
    /// Variable defaults, overridden by caller variables.
    pub params: IndexMap<String, String>,
    pub maps: Vec<MapEntry>,
    /// Tables in definition order; one name may have several `lang` variants.
    pub tables: Vec<Table>,
}

impl MappingDefinition {
    /// True when the definition has no map entries (a draft).
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Find a table by name, or by its `code` discriminator.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.table_variant(name, None)
    }

    /// Like [`MappingDefinition::table`], preferring the `lang` variant.
    pub fn table_variant(&self, name: &str, lang: Option<&str>) -> Option<&Table> {
        let by_name: Vec<&Table> = self.tables.iter().filter(|t| t.name == name).collect();
        if !by_name.is_empty() {
            return select_variant(by_name, lang);
        }
        let by_code = self
            .tables
            .iter()
            .filter(|t| t.code.as_deref() == Some(name))
            .collect();
        select_variant(by_code, lang)
    }

    /// Whether a table with the same name and language is already defined.
    pub(crate) fn has_variant(&self, table: &Table) -> bool {
        self.tables.iter().any(|t| t.same_variant(table))
    }

    pub fn label(&self) -> Option<&str> {
        self.info.as_ref().and_then(|i| i.label.as_deref())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Free-form metadata of a mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Info {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Kind of source the mapping reads (`xml`, `json`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Kind of destination the mapping writes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub querier: Option<Querier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapper: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

/// One `from -> to (+ mod)` rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapEntry {
    /// `None` for computed entries (pattern or raw only).
    pub from: Option<Source>,
    pub to: Target,
    #[serde(rename = "mod", skip_serializing_if = "Option::is_none")]
    pub modifier: Option<Modifier>,
}

impl MapEntry {
    pub fn raw(&self) -> Option<&str> {
        self.modifier.as_ref().and_then(|m| m.raw.as_deref())
    }

    pub fn pattern(&self) -> Option<&str> {
        self.modifier.as_ref().and_then(|m| m.pattern.as_deref())
    }
}

/// Where a value comes from: one query language and its path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub querier: Querier,
    pub path: String,
}

impl Source {
    pub fn new(querier: Querier, path: impl Into<String>) -> Self {
        Self {
            querier,
            path: path.into(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.querier, self.path)
    }
}

/// Where a value goes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Target {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

impl Target {
    pub fn field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Default::default()
        }
    }
}

/// Value modifiers. Empty strings are normalized away by the builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Modifier {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append: Option<String>,
    /// Code table translating extracted values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl Modifier {
    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
            && self.pattern.is_none()
            && self.prepend.is_none()
            && self.append.is_none()
            && self.table.is_none()
    }
}

/// A language-tagged display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableLabel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    pub text: String,
}

/// A code-to-label dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    pub labels: Vec<TableLabel>,
    pub entries: IndexMap<String, String>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Exact, case-sensitive lookup.
    pub fn lookup(&self, code: &str) -> Option<&str> {
        self.entries.get(code).map(String::as_str)
    }

    /// Total lookup: the label, or the code itself on a miss.
    pub fn translate(&self, code: &str) -> String {
        self.lookup(code).unwrap_or(code).to_string()
    }

    /// Display label of the table, preferring `lang`, then an untagged one.
    pub fn label(&self, lang: Option<&str>) -> Option<&str> {
        let tagged = lang.and_then(|lang| {
            self.labels
                .iter()
                .find(|l| l.lang.as_deref() == Some(lang))
        });
        tagged
            .or_else(|| self.labels.iter().find(|l| l.lang.is_none()))
            .or_else(|| self.labels.first())
            .map(|l| l.text.as_str())
    }

    pub fn insert(&mut self, code: impl Into<String>, label: impl Into<String>) {
        self.entries.insert(code.into(), label.into());
    }

    /// Same name and same language.
    pub fn same_variant(&self, other: &Table) -> bool {
        self.name == other.name && self.lang == other.lang
    }
}

/// Pick among tables sharing a name: the `lang` variant, else an untagged
/// one, else the first.
pub(crate) fn select_variant<'t>(variants: Vec<&'t Table>, lang: Option<&str>) -> Option<&'t Table> {
    lang.and_then(|lang| {
        variants
            .iter()
            .copied()
            .find(|t| t.lang.as_deref() == Some(lang))
    })
    .or_else(|| variants.iter().copied().find(|t| t.lang.is_none()))
    .or_else(|| variants.first().copied())
}

/// Errors raised while parsing or normalizing a mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingError {
    /// Malformed surface syntax or a violation of the closed vocabulary.
    Parse {
        syntax: SurfaceSyntax,
        message: String,
    },
    /// A structurally invalid map entry, by index within `maps`.
    Invalid { entry: usize, message: String },
    /// A malformed table definition.
    Table { name: String, message: String },
    /// A reference that is not a valid mapping reference.
    Reference(String),
    IncludeNotFound(String),
    /// The include chain, first element being the outermost reference.
    IncludeCycle(Vec<String>),
}

impl MappingError {
    pub(crate) fn parse(syntax: SurfaceSyntax, message: impl Into<String>) -> Self {
        MappingError::Parse {
            syntax,
            message: message.into(),
        }
    }

    pub(crate) fn invalid(entry: usize, message: impl Into<String>) -> Self {
        MappingError::Invalid {
            entry,
            message: message.into(),
        }
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingError::Parse { syntax, message } => {
                write!(f, "Invalid {} mapping: {}", syntax, message)
            }
            MappingError::Invalid { entry, message } => {
                write!(f, "Invalid map #{}: {}", entry, message)
            }
            MappingError::Table { name, message } => {
                write!(f, "Invalid table '{}': {}", name, message)
            }
            MappingError::Reference(reference) => {
                write!(f, "Invalid mapping reference '{}'", reference)
            }
            MappingError::IncludeNotFound(reference) => {
                write!(f, "Included mapping not found: {}", reference)
            }
            MappingError::IncludeCycle(chain) => {
                write!(f, "Include cycle: {}", chain.join(" -> "))
            }
        }
    }
}

impl std::error::Error for MappingError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_table() -> Table {
        let mut table = Table::new("status");
        table.code = Some("st".to_string());
        table.labels.push(TableLabel {
            lang: Some("fr".to_string()),
            text: "Statut".to_string(),
        });
        table.labels.push(TableLabel {
            lang: None,
            text: "Status".to_string(),
        });
        table.insert("1", "Active");
        table
    }

    #[test]
    fn test_table_lookup_is_exact() {
        let table = status_table();
        assert_eq!(table.lookup("1"), Some("Active"));
        assert_eq!(table.lookup(" 1"), None);
        assert_eq!(table.translate("9"), "9");
    }

    #[test]
    fn test_table_label_by_lang() {
        let table = status_table();
        assert_eq!(table.label(Some("fr")), Some("Statut"));
        assert_eq!(table.label(Some("de")), Some("Status"));
        assert_eq!(table.label(None), Some("Status"));
    }

    #[test]
    fn test_find_table_by_code() {
        let mut mapping = MappingDefinition::default();
        mapping.tables.push(status_table());

        assert!(mapping.table("status").is_some());
        assert!(mapping.table("st").is_some());
        assert!(mapping.table("other").is_none());
    }

    #[test]
    fn test_table_variant_by_lang() {
        let mut french = status_table();
        french.lang = Some("fr".to_string());
        french.insert("1", "Actif");

        let mut mapping = MappingDefinition::default();
        mapping.tables.push(status_table());
        mapping.tables.push(french);

        let pick = |lang| mapping.table_variant("status", lang).and_then(|t| t.lookup("1"));
        assert_eq!(pick(Some("fr")), Some("Actif"));
        assert_eq!(pick(Some("de")), Some("Active"));
        assert_eq!(pick(None), Some("Active"));
        assert_eq!(
            mapping.table_variant("st", Some("fr")).and_then(|t| t.lookup("1")),
            Some("Actif")
        );
    }

    #[test]
    fn test_error_display() {
        let err = MappingError::IncludeCycle(vec!["user:a.xml".into(), "user:b.xml".into(), "user:a.xml".into()]);
        assert_eq!(
            err.to_string(),
            "Include cycle: user:a.xml -> user:b.xml -> user:a.xml"
        );

        let err = MappingError::invalid(2, "map must define `from` or `to`");
        assert_eq!(err.to_string(), "Invalid map #2: map must define `from` or `to`");
    }
}
