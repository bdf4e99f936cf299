//! Surface syntax detection and include resolution.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::mapping::builder::{DraftItem, MappingBuilder, MappingDraft};
use crate::mapping::resolver::{MappingReference, MappingResolver, NoResolver};
use crate::mapping::{flat, literal, xml, MappingDefinition, MappingError};
use crate::query::Querier;

/// The surface syntaxes a mapping may be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceSyntax {
    Xml,
    Json,
    Yaml,
    Flat,
}

impl SurfaceSyntax {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "xml" => Some(SurfaceSyntax::Xml),
            "json" => Some(SurfaceSyntax::Json),
            "yaml" | "yml" => Some(SurfaceSyntax::Yaml),
            "ini" | "map" => Some(SurfaceSyntax::Flat),
            _ => None,
        }
    }

    /// Guess the syntax from the text itself.
    pub fn detect(text: &str) -> Self {
        static FLAT_LINE: OnceLock<Regex> = OnceLock::new();
        let flat_line = FLAT_LINE.get_or_init(|| {
            Regex::new(r"^(\[[^\]]+\]|[A-Za-z0-9_\-]+(\.[A-Za-z0-9_\-:]+)*\s*=)")
                .expect("flat line pattern is valid")
        });

        let trimmed = text.trim_start_matches('\u{feff}').trim_start();
        if trimmed.starts_with('<') {
            return SurfaceSyntax::Xml;
        }
        if trimmed.starts_with('{') {
            return SurfaceSyntax::Json;
        }
        let first_line = text
            .lines()
            .find(|line| !flat::is_insignificant(line))
            .map(str::trim);
        match first_line {
            Some(line) if flat_line.is_match(line) => SurfaceSyntax::Flat,
            _ => SurfaceSyntax::Yaml,
        }
    }
}

impl fmt::Display for SurfaceSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceSyntax::Xml => write!(f, "xml"),
            SurfaceSyntax::Json => write!(f, "json"),
            SurfaceSyntax::Yaml => write!(f, "yaml"),
            SurfaceSyntax::Flat => write!(f, "flat"),
        }
    }
}

impl FromStr for SurfaceSyntax {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" | "ini" => Ok(SurfaceSyntax::Flat),
            other => SurfaceSyntax::from_extension(other)
                .ok_or_else(|| format!("unknown mapping syntax '{}'", other)),
        }
    }
}

/// Normalize mapping text that has no includes to resolve.
///
/// Any include fails with [`MappingError::IncludeNotFound`].
pub fn normalize(text: &str, hint: Option<SurfaceSyntax>) -> Result<MappingDefinition, MappingError> {
    Normalizer::new(&NoResolver).normalize(text, hint)
}

/// Turns mapping text into a [`MappingDefinition`], resolving includes.
pub struct Normalizer<'r> {
    resolver: &'r dyn MappingResolver,
    default_querier: Querier,
}

impl<'r> Normalizer<'r> {
    pub fn new(resolver: &'r dyn MappingResolver) -> Self {
        Self {
            resolver,
            default_querier: Querier::Jsdot,
        }
    }

    pub fn with_default_querier(mut self, querier: Querier) -> Self {
        self.default_querier = querier;
        self
    }

    pub fn normalize(
        &self,
        text: &str,
        hint: Option<SurfaceSyntax>,
    ) -> Result<MappingDefinition, MappingError> {
        let mut stack = Vec::new();
        self.normalize_text(text, hint, &mut stack)
    }

    /// Resolve a reference and normalize the mapping behind it.
    pub fn normalize_reference(&self, reference: &str) -> Result<MappingDefinition, MappingError> {
        let reference = MappingReference::parse(reference)?;
        let mut stack = Vec::new();
        self.normalize_reference_in(&reference, &mut stack)
    }

    /// Parse text into a draft without touching includes.
    pub fn parse(&self, text: &str, hint: Option<SurfaceSyntax>) -> Result<MappingDraft, MappingError> {
        let syntax = hint.unwrap_or_else(|| SurfaceSyntax::detect(text));
        tracing::debug!("Parsing {} mapping", syntax);
        let builder = MappingBuilder::new().default_querier(self.default_querier);
        match syntax {
            SurfaceSyntax::Xml => xml::parse_with(text, builder),
            SurfaceSyntax::Json => {
                let value = serde_json::from_str(text)
                    .map_err(|e| MappingError::parse(SurfaceSyntax::Json, e.to_string()))?;
                literal::parse_value(value, SurfaceSyntax::Json, builder)
            }
            SurfaceSyntax::Yaml => {
                let yaml: serde_yaml::Value = serde_yaml::from_str(text)
                    .map_err(|e| MappingError::parse(SurfaceSyntax::Yaml, e.to_string()))?;
                let value = crate::source::yaml_to_json(yaml)
                    .map_err(|e| MappingError::parse(SurfaceSyntax::Yaml, e))?;
                literal::parse_value(value, SurfaceSyntax::Yaml, builder)
            }
            SurfaceSyntax::Flat => {
                let value = flat::to_tree(text)?;
                literal::parse_value(value, SurfaceSyntax::Flat, builder)
            }
        }
    }

    fn normalize_reference_in(
        &self,
        reference: &MappingReference,
        stack: &mut Vec<String>,
    ) -> Result<MappingDefinition, MappingError> {
        let key = reference.to_string();
        if stack.contains(&key) {
            let mut chain = stack.clone();
            chain.push(key);
            return Err(MappingError::IncludeCycle(chain));
        }
        let text = self
            .resolver
            .resolve(reference)
            .ok_or_else(|| MappingError::IncludeNotFound(key.clone()))?;

        stack.push(key);
        let result = self.normalize_text(&text, reference.syntax_hint(), stack);
        stack.pop();
        result
    }

    fn normalize_text(
        &self,
        text: &str,
        hint: Option<SurfaceSyntax>,
        stack: &mut Vec<String>,
    ) -> Result<MappingDefinition, MappingError> {
        let draft = self.parse(text, hint)?;

        let mut mapping = MappingDefinition {
            info: draft.info,
            params: draft.params,
            maps: Vec::with_capacity(draft.items.len()),
            tables: draft.tables,
        };

        for item in draft.items {
            match item {
                DraftItem::Map(entry) => mapping.maps.push(entry),
                DraftItem::Include(reference) => {
                    let reference = MappingReference::parse(&reference)?;
                    let included = self.normalize_reference_in(&reference, stack)?;
                    tracing::debug!(
                        "Included {} ({} maps, {} tables)",
                        reference,
                        included.maps.len(),
                        included.tables.len()
                    );
                    mapping.maps.extend(included.maps);
                    for table in included.tables {
                        if !mapping.has_variant(&table) {
                            mapping.tables.push(table);
                        }
                    }
                    for (name, value) in included.params {
                        mapping.params.entry(name).or_insert(value);
                    }
                }
            }
        }

        Ok(mapping)
    }
}
