//! Conversion pipeline: runs every map entry of a mapping against a source.
//!
//! Each entry moves through the same steps: resolve its source, transform the
//! values, emit the non-empty ones. An entry whose query fails is skipped and
//! logged; it never stops the entries after it. Failures that concern the whole
//! document (unparsable source, failed preprocessing) surface as
//! [`ConvertError`] before any entry runs.

use serde::Serialize;
use std::fmt;

use crate::field::FieldAssignment;
use crate::mapping::{MapEntry, MappingDefinition};
use crate::preprocess::PreprocessError;
use crate::query::{QueryError, QueryRegistry, SourceNode};
use crate::runtime::context::{VariableScope, Variables, VALUE_VARIABLE};
use crate::source::{SourceDocument, SourceError};
use crate::transform::{flatten_values, PatternWarning, TableChain, TableRegistry, Transformer};

/// Error type for a conversion call
#[derive(Debug)]
pub enum ConvertError {
    Source(SourceError),
    Preprocess(PreprocessError),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::Source(e) => write!(f, "Source error: {}", e),
            ConvertError::Preprocess(e) => write!(f, "Preprocessing failed: {}", e),
        }
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConvertError::Source(e) => Some(e),
            ConvertError::Preprocess(e) => Some(e),
        }
    }
}

impl From<SourceError> for ConvertError {
    fn from(err: SourceError) -> Self {
        ConvertError::Source(err)
    }
}

impl From<PreprocessError> for ConvertError {
    fn from(err: PreprocessError) -> Self {
        ConvertError::Preprocess(err)
    }
}

/// Why an entry emitted nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The source matched nothing, or every value was empty.
    Empty,
    Query(QueryError),
}

/// What happened to one map entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Emitted(usize),
    Skipped(SkipReason),
}

/// A map entry whose query failed.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEntry {
    pub entry: usize,
    pub field: String,
    pub error: QueryError,
}

impl fmt::Display for SkippedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map #{} ({}) skipped: {}", self.entry, self.field, self.error)
    }
}

/// Result of a conversion that ran to completion.
///
/// Zero fields with no skipped entries means nothing in the source matched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversion {
    pub fields: Vec<FieldAssignment>,
    /// One outcome per map entry, in mapping order
    pub outcomes: Vec<EntryOutcome>,
    pub skipped: Vec<SkippedEntry>,
    pub warnings: Vec<PatternWarning>,
}

impl Conversion {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All values emitted for `field`, in order.
    pub fn values(&self, field: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.field == field)
            .map(|f| f.value.as_str())
            .collect()
    }
}

/// Summary counts, for logs and the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    pub entries: usize,
    pub emitted_entries: usize,
    pub fields: usize,
    pub skipped: usize,
    pub warnings: usize,
}

impl From<&Conversion> for ConversionStats {
    fn from(conversion: &Conversion) -> Self {
        Self {
            entries: conversion.outcomes.len(),
            emitted_entries: conversion
                .outcomes
                .iter()
                .filter(|o| matches!(o, EntryOutcome::Emitted(_)))
                .count(),
            fields: conversion.fields.len(),
            skipped: conversion.skipped.len(),
            warnings: conversion.warnings.len(),
        }
    }
}

/// Runs mappings against source documents.
///
/// Holds no per-call state, so one converter serves concurrent calls.
pub struct Converter {
    queries: QueryRegistry,
    tables: Option<Box<dyn TableRegistry>>,
}

impl Converter {
    pub fn new() -> Self {
        Self {
            queries: QueryRegistry::new(),
            tables: None,
        }
    }

    /// Use a custom set of query strategies.
    pub fn with_queries(mut self, queries: QueryRegistry) -> Self {
        self.queries = queries;
        self
    }

    /// Tables consulted when a mapping does not define the table itself.
    pub fn with_tables(mut self, tables: impl TableRegistry + 'static) -> Self {
        self.tables = Some(Box::new(tables));
        self
    }

    pub fn queries(&self) -> &QueryRegistry {
        &self.queries
    }

    /// Convert a parsed source document.
    pub fn convert(
        &self,
        source: &SourceDocument,
        mapping: &MappingDefinition,
        variables: &Variables,
    ) -> Result<Conversion, ConvertError> {
        let conversion = source.with_root(|root| self.convert_node(root, mapping, variables))?;
        Ok(conversion)
    }

    /// Convert with `node` as the context every query starts from.
    pub fn convert_node(
        &self,
        node: SourceNode<'_, '_>,
        mapping: &MappingDefinition,
        variables: &Variables,
    ) -> Conversion {
        let mut scope = VariableScope::for_mapping(mapping, variables);
        let tables = match &self.tables {
            Some(external) => TableChain::new(mapping).then(external.as_ref()),
            None => TableChain::new(mapping),
        };
        let mut conversion = Conversion::default();

        for (index, entry) in mapping.maps.iter().enumerate() {
            let outcome = self.run_entry(index, entry, node, &mut scope, &tables, &mut conversion);
            if let EntryOutcome::Skipped(SkipReason::Query(error)) = &outcome {
                conversion.skipped.push(SkippedEntry {
                    entry: index,
                    field: entry.to.field.clone(),
                    error: error.clone(),
                });
            }
            conversion.outcomes.push(outcome);
        }

        tracing::debug!(
            "Converted {} entries into {} fields ({} skipped, {} warnings)",
            mapping.maps.len(),
            conversion.fields.len(),
            conversion.skipped.len(),
            conversion.warnings.len()
        );
        conversion
    }

    fn run_entry(
        &self,
        index: usize,
        entry: &MapEntry,
        node: SourceNode<'_, '_>,
        scope: &mut VariableScope,
        tables: &dyn TableRegistry,
        conversion: &mut Conversion,
    ) -> EntryOutcome {
        let values = match &entry.from {
            // A raw literal replaces whatever the source would have produced.
            Some(_) if entry.raw().is_some() => Vec::new(),
            // Empty extracted values never reach a pattern.
            Some(source) => match self.queries.evaluate(source.querier, &source.path, node) {
                Ok(values) => flatten_values(values)
                    .into_iter()
                    .filter(|v| !v.is_empty())
                    .collect(),
                Err(error) => {
                    tracing::warn!(
                        "Skipping map #{} ({}) from {}: {}",
                        index,
                        entry.to.field,
                        source,
                        error
                    );
                    return EntryOutcome::Skipped(SkipReason::Query(error));
                }
            },
            None => match scope.get(VALUE_VARIABLE) {
                Some(value) => vec![value.to_string()],
                None if entry.pattern().is_some() => vec![String::new()],
                None => Vec::new(),
            },
        };

        let output = Transformer::new(scope, tables).apply(
            values,
            entry.modifier.as_ref(),
            entry.to.language.as_deref(),
        );

        for placeholder in output.unresolved {
            tracing::warn!(
                "Map #{} ({}): placeholder {{{}}} has no value",
                index,
                entry.to.field,
                placeholder
            );
            conversion.warnings.push(PatternWarning {
                entry: index,
                field: entry.to.field.clone(),
                placeholder,
            });
        }

        let mut emitted = 0;
        for value in output.values.into_iter().filter(|v| !v.is_empty()) {
            scope.record(&entry.to.field, &value);
            conversion.fields.push(FieldAssignment {
                field: entry.to.field.clone(),
                datatype: entry.to.datatype.clone(),
                language: entry.to.language.clone(),
                visibility: entry.to.visibility.unwrap_or_default(),
                value,
            });
            emitted += 1;
        }

        if emitted == 0 {
            tracing::debug!("Map #{} ({}) emitted nothing", index, entry.to.field);
            EntryOutcome::Skipped(SkipReason::Empty)
        } else {
            EntryOutcome::Emitted(emitted)
        }
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Visibility;
    use crate::mapping::{Modifier, Source, Table, Target};
    use crate::query::Querier;
    use crate::transform::StaticTableRegistry;
    use serde_json::json;

    fn entry(querier: Querier, path: &str, field: &str) -> MapEntry {
        MapEntry {
            from: Some(Source::new(querier, path)),
            to: Target::field(field),
            modifier: None,
        }
    }

    fn convert(mapping: &MappingDefinition, source: serde_json::Value) -> Conversion {
        Converter::new()
            .convert(&SourceDocument::from_json(source), mapping, &Variables::new())
            .unwrap()
    }

    #[test]
    fn test_empty_mapping_gives_empty_output() {
        let conversion = convert(&MappingDefinition::default(), json!({"title": "Hello"}));
        assert!(conversion.is_empty());
        assert!(conversion.outcomes.is_empty());
    }

    #[test]
    fn test_multi_value_order_is_preserved() {
        let mut mapping = MappingDefinition::default();
        mapping.maps.push(entry(Querier::Jsdot, "authors.name", "dcterms:creator"));
        mapping.maps.push(entry(Querier::Jsdot, "title", "dcterms:title"));
        mapping.maps.push(entry(Querier::Jsdot, "editor", "dcterms:creator"));

        let conversion = convert(
            &mapping,
            json!({"title": "T", "editor": "C", "authors": [{"name": "A"}, {"name": "B"}]}),
        );
        assert_eq!(conversion.values("dcterms:creator"), vec!["A", "B", "C"]);
        assert_eq!(conversion.fields[2].field, "dcterms:title");
        assert_eq!(
            conversion.outcomes,
            vec![
                EntryOutcome::Emitted(2),
                EntryOutcome::Emitted(1),
                EntryOutcome::Emitted(1)
            ]
        );
    }

    #[test]
    fn test_query_error_skips_only_that_entry() {
        let mut mapping = MappingDefinition::default();
        mapping.maps.push(entry(Querier::Xpath, "/record/title", "dcterms:title"));
        mapping.maps.push(entry(Querier::Jsdot, "title", "dcterms:title"));

        let conversion = convert(&mapping, json!({"title": "Hello"}));
        assert_eq!(conversion.values("dcterms:title"), vec!["Hello"]);
        assert_eq!(conversion.skipped.len(), 1);
        assert_eq!(conversion.skipped[0].entry, 0);
        assert!(matches!(
            conversion.outcomes[0],
            EntryOutcome::Skipped(SkipReason::Query(QueryError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn test_target_attributes_are_copied() {
        let mut mapping = MappingDefinition::default();
        let mut e = entry(Querier::Jsdot, "note", "skos:note");
        e.to.datatype = Some("literal".to_string());
        e.to.language = Some("en".to_string());
        e.to.visibility = Some(Visibility::Private);
        mapping.maps.push(e);

        let conversion = convert(&mapping, json!({"note": "internal"}));
        let field = &conversion.fields[0];
        assert_eq!(field.datatype.as_deref(), Some("literal"));
        assert_eq!(field.language.as_deref(), Some("en"));
        assert_eq!(field.visibility, Visibility::Private);
    }

    #[test]
    fn test_computed_entry_reads_emitted_values_and_variables() {
        let mut mapping = MappingDefinition::default();
        mapping.params.insert("site".to_string(), "Archive".to_string());
        mapping.maps.push(entry(Querier::Jsdot, "title", "dcterms:title"));
        mapping.maps.push(MapEntry {
            from: None,
            to: Target::field("dcterms:description"),
            modifier: Some(Modifier {
                pattern: Some("{dcterms:title} at {site}{nothing}".to_string()),
                ..Modifier::default()
            }),
        });

        let conversion = convert(&mapping, json!({"title": "Hello"}));
        assert_eq!(conversion.values("dcterms:description"), vec!["Hello at Archive"]);
        assert_eq!(conversion.warnings.len(), 1);
        assert_eq!(conversion.warnings[0].placeholder, "nothing");
    }

    #[test]
    fn test_external_tables() {
        let mut table = Table::new("language");
        table.insert("fra", "French");
        let converter = Converter::new().with_tables(StaticTableRegistry::new().with(table));

        let mut mapping = MappingDefinition::default();
        let mut e = entry(Querier::Jsdot, "lang", "dcterms:language");
        e.modifier = Some(Modifier {
            table: Some("language".to_string()),
            ..Modifier::default()
        });
        mapping.maps.push(e);

        let conversion = converter
            .convert(
                &SourceDocument::from_json(json!({"lang": ["fra", "xyz"]})),
                &mapping,
                &Variables::new(),
            )
            .unwrap();
        assert_eq!(conversion.values("dcterms:language"), vec!["French", "xyz"]);
    }

    #[test]
    fn test_target_language_selects_table_variant() {
        let mut english = Table::new("status");
        english.lang = Some("en".to_string());
        english.insert("1", "Active");
        let mut french = Table::new("status");
        french.lang = Some("fr".to_string());
        french.insert("1", "Actif");

        let mut mapping = MappingDefinition::default();
        mapping.tables.push(english);
        mapping.tables.push(french);
        for lang in ["en", "fr"] {
            let mut e = entry(Querier::Jsdot, "status", &format!("status_{}", lang));
            e.to.language = Some(lang.to_string());
            e.modifier = Some(Modifier {
                table: Some("status".to_string()),
                ..Modifier::default()
            });
            mapping.maps.push(e);
        }

        let conversion = convert(&mapping, json!({"status": "1"}));
        assert_eq!(conversion.values("status_en"), vec!["Active"]);
        assert_eq!(conversion.values("status_fr"), vec!["Actif"]);
    }

    #[test]
    fn test_empty_value_skips_pattern_and_affixes() {
        let mut mapping = MappingDefinition::default();
        let mut e = entry(Querier::Jsdot, "title", "dcterms:title");
        e.modifier = Some(Modifier {
            pattern: Some("Mr. {value}".to_string()),
            prepend: Some("[".to_string()),
            ..Modifier::default()
        });
        mapping.maps.push(e);

        let conversion = convert(&mapping, json!({"title": ""}));
        assert!(conversion.is_empty());
        assert_eq!(conversion.outcomes, vec![EntryOutcome::Skipped(SkipReason::Empty)]);

        let conversion = convert(&mapping, json!({"title": ["", "Smith"]}));
        assert_eq!(conversion.values("dcterms:title"), vec!["[Mr. Smith"]);
    }

    #[test]
    fn test_value_variable_feeds_sourceless_entries() {
        let mut mapping = MappingDefinition::default();
        mapping.maps.push(MapEntry {
            from: None,
            to: Target::field("dcterms:identifier"),
            modifier: None,
        });
        let mut variables = Variables::new();
        variables.insert("value".to_string(), "urn:1".to_string());

        let conversion = Converter::new()
            .convert(&SourceDocument::from_json(json!({})), &mapping, &variables)
            .unwrap();
        assert_eq!(conversion.values("dcterms:identifier"), vec!["urn:1"]);
    }

    #[test]
    fn test_convert_errors_are_document_level() {
        use std::error::Error;

        let errors = [
            ConvertError::from(SourceError::Encoding("bad byte".to_string())),
            ConvertError::from(PreprocessError::MissingOutput),
        ];
        for err in &errors {
            assert!(err.source().is_some());
            let document_level = match err {
                ConvertError::Source(_) => err.to_string().starts_with("Source error"),
                ConvertError::Preprocess(_) => err.to_string().starts_with("Preprocessing failed"),
            };
            assert!(document_level, "{}", err);
        }
    }

    #[test]
    fn test_stats() {
        let mut mapping = MappingDefinition::default();
        mapping.maps.push(entry(Querier::Jsdot, "title", "dcterms:title"));
        mapping.maps.push(entry(Querier::Jsdot, "missing", "dcterms:date"));

        let conversion = convert(&mapping, json!({"title": "Hello"}));
        let stats = ConversionStats::from(&conversion);
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.emitted_entries, 1);
        assert_eq!(stats.fields, 1);
        assert_eq!(stats.skipped, 0);
    }
}
