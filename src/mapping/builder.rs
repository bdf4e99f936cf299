//! Shared builder driven by every surface-syntax parser.
//!
//! Parsers only collect raw strings into [`MapSpec`]s; validation, querier
//! precedence and empty-string normalization happen once, in [`MappingBuilder::build`].

use indexmap::IndexMap;

use crate::field::Visibility;
use crate::mapping::{Info, MapEntry, MappingError, Modifier, Source, Table, Target};
use crate::query::Querier;

/// Raw `to` attributes as written by the author.
#[derive(Debug, Clone, Default)]
pub struct TargetSpec {
    pub field: Option<String>,
    pub datatype: Option<String>,
    pub language: Option<String>,
    pub visibility: Option<String>,
}

/// Raw content of one map entry, before validation.
#[derive(Debug, Clone, Default)]
pub struct MapSpec {
    /// Whether a `from` was written at all, even an empty one.
    pub from_present: bool,
    /// `(query language, path)` pairs in authoring order.
    pub from: Vec<(String, String)>,
    /// A path written without a query language; uses the default querier.
    pub path: Option<String>,
    pub to: Option<TargetSpec>,
    pub modifier: Modifier,
}

impl MapSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, querier: &str, path: &str) -> Self {
        self.from_present = true;
        self.from.push((querier.to_string(), path.to_string()));
        self
    }

    pub fn target(mut self, field: &str) -> Self {
        self.to = Some(TargetSpec {
            field: Some(field.to_string()),
            ..Default::default()
        });
        self
    }
}

/// An item of a parsed mapping, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftItem {
    Map(MapEntry),
    Include(String),
}

/// A validated mapping whose includes are not resolved yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingDraft {
    pub info: Option<Info>,
    pub params: IndexMap<String, String>,
    pub items: Vec<DraftItem>,
    pub tables: Vec<Table>,
}

enum PendingItem {
    Map { position: usize, spec: MapSpec },
    Include(String),
}

pub struct MappingBuilder {
    info: Option<Info>,
    params: IndexMap<String, String>,
    items: Vec<PendingItem>,
    tables: Vec<Table>,
    default_querier: Querier,
}

impl MappingBuilder {
    pub fn new() -> Self {
        Self {
            info: None,
            params: IndexMap::new(),
            items: Vec::new(),
            tables: Vec::new(),
            default_querier: Querier::Jsdot,
        }
    }

    /// Querier used for bare paths when `info.querier` is not set.
    pub fn default_querier(mut self, querier: Querier) -> Self {
        self.default_querier = querier;
        self
    }

    pub fn info(&mut self, info: Info) {
        self.info = Some(info);
    }

    pub fn param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
    }

    /// Index the next map or include will get within `maps`.
    pub fn position(&self) -> usize {
        self.items.len()
    }

    pub fn map(&mut self, spec: MapSpec) -> usize {
        let position = self.position();
        self.items.push(PendingItem::Map { position, spec });
        position
    }

    pub fn include(&mut self, reference: impl Into<String>) {
        self.items.push(PendingItem::Include(reference.into()));
    }

    pub fn table(&mut self, table: Table) -> Result<(), MappingError> {
        if table.name.trim().is_empty() {
            return Err(MappingError::Table {
                name: String::new(),
                message: "table has no name".to_string(),
            });
        }
        if self.tables.iter().any(|t| t.same_variant(&table)) {
            let message = match &table.lang {
                Some(lang) => format!("defined more than once for language '{}'", lang),
                None => "defined more than once".to_string(),
            };
            return Err(MappingError::Table {
                name: table.name,
                message,
            });
        }
        self.tables.push(table);
        Ok(())
    }

    pub fn build(self) -> Result<MappingDraft, MappingError> {
        let default_querier = self
            .info
            .as_ref()
            .and_then(|i| i.querier)
            .unwrap_or(self.default_querier);

        let items = self
            .items
            .into_iter()
            .map(|item| match item {
                PendingItem::Map { position, spec } => {
                    resolve_entry(position, spec, default_querier).map(DraftItem::Map)
                }
                PendingItem::Include(reference) => Ok(DraftItem::Include(reference)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MappingDraft {
            info: self.info,
            params: self.params,
            items,
            tables: self.tables,
        })
    }
}

impl Default for MappingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn resolve_entry(
    position: usize,
    spec: MapSpec,
    default_querier: Querier,
) -> Result<MapEntry, MappingError> {
    if !spec.from_present && spec.to.is_none() {
        return Err(MappingError::invalid(
            position,
            "map must define `from` or `to`",
        ));
    }

    let from = resolve_source(position, &spec, default_querier)?;

    let to = spec
        .to
        .ok_or_else(|| MappingError::invalid(position, "map has no `to` target"))?;
    let field = non_empty(to.field)
        .ok_or_else(|| MappingError::invalid(position, "target has no field"))?;
    let visibility = match non_empty(to.visibility) {
        Some(v) => Some(
            v.parse::<Visibility>()
                .map_err(|e| MappingError::invalid(position, e))?,
        ),
        None => None,
    };

    let modifier = Modifier {
        raw: non_empty(spec.modifier.raw),
        pattern: non_empty(spec.modifier.pattern),
        prepend: non_empty(spec.modifier.prepend),
        append: non_empty(spec.modifier.append),
        table: non_empty(spec.modifier.table),
    };

    Ok(MapEntry {
        from,
        to: Target {
            field: field.trim().to_string(),
            datatype: non_empty(to.datatype),
            language: non_empty(to.language),
            visibility,
        },
        modifier: if modifier.is_empty() {
            None
        } else {
            Some(modifier)
        },
    })
}

/// First non-empty path in fixed querier order wins.
fn resolve_source(
    position: usize,
    spec: &MapSpec,
    default_querier: Querier,
) -> Result<Option<Source>, MappingError> {
    let mut given = Vec::with_capacity(spec.from.len());
    for (tag, path) in &spec.from {
        let querier = tag.parse::<Querier>().map_err(|_| {
            MappingError::invalid(position, format!("unknown query language '{}'", tag))
        })?;
        if !path.trim().is_empty() {
            given.push((querier, path.trim()));
        }
    }

    let chosen = Querier::ALL
        .iter()
        .find_map(|q| given.iter().find(|(g, _)| g == q).copied());

    if let Some((querier, path)) = chosen {
        if given.len() > 1 {
            tracing::debug!(
                "map #{}: several query languages given, using {}",
                position,
                querier
            );
        }
        return Ok(Some(Source::new(querier, path)));
    }

    Ok(spec
        .path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| Source::new(default_querier, p)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_entry(draft: MappingDraft) -> MapEntry {
        match draft.items.into_iter().next() {
            Some(DraftItem::Map(entry)) => entry,
            other => panic!("expected a map entry, got {:?}", other),
        }
    }

    #[test]
    fn test_querier_precedence() {
        let mut builder = MappingBuilder::new();
        builder.map(
            MapSpec::new()
                .query("xpath", "//title")
                .query("jsdot", "title")
                .target("dcterms:title"),
        );

        let entry = single_entry(builder.build().unwrap());
        assert_eq!(entry.from, Some(Source::new(Querier::Jsdot, "title")));
    }

    #[test]
    fn test_empty_path_does_not_win() {
        let mut builder = MappingBuilder::new();
        builder.map(
            MapSpec::new()
                .query("jsdot", "  ")
                .query("xpath", "/record/title")
                .target("dcterms:title"),
        );

        let entry = single_entry(builder.build().unwrap());
        assert_eq!(entry.from, Some(Source::new(Querier::Xpath, "/record/title")));
    }

    #[test]
    fn test_bare_path_uses_info_querier() {
        let mut builder = MappingBuilder::new();
        builder.info(Info {
            querier: Some(Querier::Jmespath),
            ..Default::default()
        });
        let mut spec = MapSpec::new().target("dcterms:title");
        spec.from_present = true;
        spec.path = Some("record.title".to_string());
        builder.map(spec);

        let entry = single_entry(builder.build().unwrap());
        assert_eq!(entry.from, Some(Source::new(Querier::Jmespath, "record.title")));
    }

    #[test]
    fn test_neither_from_nor_to() {
        let mut builder = MappingBuilder::new();
        builder.map(MapSpec::new().query("jsdot", "a").target("a"));
        builder.include("user:other.xml");
        builder.map(MapSpec::new());

        let err = builder.build().unwrap_err();
        assert_eq!(
            err,
            MappingError::invalid(2, "map must define `from` or `to`")
        );
    }

    #[test]
    fn test_invalid_visibility_and_querier() {
        let mut builder = MappingBuilder::new();
        let mut spec = MapSpec::new().target("a");
        spec.to.as_mut().unwrap().visibility = Some("hidden".to_string());
        builder.map(spec);
        assert!(matches!(builder.build(), Err(MappingError::Invalid { entry: 0, .. })));

        let mut builder = MappingBuilder::new();
        builder.map(MapSpec::new().query("sql", "select").target("a"));
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("unknown query language 'sql'"));
    }

    #[test]
    fn test_empty_modifier_is_dropped() {
        let mut builder = MappingBuilder::new();
        let mut spec = MapSpec::new().query("jsdot", "a").target("a");
        spec.modifier.prepend = Some(String::new());
        builder.map(spec);

        let entry = single_entry(builder.build().unwrap());
        assert_eq!(entry.modifier, None);
    }

    #[test]
    fn test_duplicate_table() {
        let mut builder = MappingBuilder::new();
        builder.table(Table::new("status")).unwrap();
        assert!(matches!(
            builder.table(Table::new("status")),
            Err(MappingError::Table { .. })
        ));

        let mut french = Table::new("status");
        french.lang = Some("fr".to_string());
        builder.table(french.clone()).unwrap();
        let err = builder.table(french).unwrap_err();
        assert!(err.to_string().contains("language 'fr'"), "{}", err);
        assert_eq!(builder.build().unwrap().tables.len(), 2);
    }
}
