//! Code-table lookup.
//!
//! Tables translate a code found in the source into a display label. A
//! mapping carries its own tables; tables shared across mappings come from a
//! [`StaticTableRegistry`] supplied by the embedding application.

use indexmap::IndexMap;

use crate::mapping::{select_variant, MappingDefinition, Table};

/// Lookup of labels by table name and code.
pub trait TableRegistry: Send + Sync {
    /// Label for `code` in `table`, preferring the `lang` variant of the
    /// table when there are several.
    fn lookup(&self, table: &str, code: &str, lang: Option<&str>) -> Option<String>;

    fn has_table(&self, table: &str) -> bool;
}

impl TableRegistry for MappingDefinition {
    fn lookup(&self, table: &str, code: &str, lang: Option<&str>) -> Option<String> {
        self.table_variant(table, lang)?.lookup(code).map(str::to_string)
    }

    fn has_table(&self, table: &str) -> bool {
        self.table(table).is_some()
    }
}

/// Registry for tables defined outside any mapping.
///
/// Several tables may share a name when they differ by language.
#[derive(Debug, Clone, Default)]
pub struct StaticTableRegistry {
    tables: IndexMap<String, Vec<Table>>,
}

impl StaticTableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table under its name and, if set, its code.
    ///
    /// A table with the same name and language replaces the earlier one.
    pub fn register(&mut self, table: Table) {
        let mut keys = vec![table.name.clone()];
        if let Some(code) = table.code.as_ref().filter(|c| **c != table.name) {
            keys.push(code.clone());
        }
        for key in keys {
            let variants = self.tables.entry(key).or_default();
            variants.retain(|t| t.lang != table.lang);
            variants.push(table.clone());
        }
    }

    pub fn with(mut self, table: Table) -> Self {
        self.register(table);
        self
    }

    /// Names of all registered tables
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    fn select(&self, table: &str, lang: Option<&str>) -> Option<&Table> {
        let variants = self.tables.get(table)?;
        select_variant(variants.iter().collect(), lang)
    }
}

impl TableRegistry for StaticTableRegistry {
    fn lookup(&self, table: &str, code: &str, lang: Option<&str>) -> Option<String> {
        self.select(table, lang)?.lookup(code).map(str::to_string)
    }

    fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }
}

/// Tables consulted in order; the first registry holding the table answers.
pub struct TableChain<'a> {
    layers: Vec<&'a dyn TableRegistry>,
}

impl<'a> TableChain<'a> {
    pub fn new(first: &'a dyn TableRegistry) -> Self {
        Self {
            layers: vec![first],
        }
    }

    pub fn then(mut self, next: &'a dyn TableRegistry) -> Self {
        self.layers.push(next);
        self
    }
}

impl TableRegistry for TableChain<'_> {
    fn lookup(&self, table: &str, code: &str, lang: Option<&str>) -> Option<String> {
        self.layers
            .iter()
            .find(|layer| layer.has_table(table))
            .and_then(|layer| layer.lookup(table, code, lang))
    }

    fn has_table(&self, table: &str) -> bool {
        self.layers.iter().any(|layer| layer.has_table(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(lang: Option<&str>, active: &str) -> Table {
        let mut table = Table::new("status");
        table.code = Some("st".to_string());
        table.lang = lang.map(str::to_string);
        table.insert("1", active);
        table
    }

    #[test]
    fn test_mapping_tables() {
        let mut mapping = MappingDefinition::default();
        mapping.tables.push(status(None, "Active"));

        assert_eq!(mapping.lookup("status", "1", None).as_deref(), Some("Active"));
        assert_eq!(mapping.lookup("status", "2", None), None);
        assert!(mapping.has_table("status"));
        assert!(!mapping.has_table("country"));
    }

    #[test]
    fn test_mapping_language_variants() {
        let mut mapping = MappingDefinition::default();
        mapping.tables.push(status(Some("en"), "Active"));
        mapping.tables.push(status(Some("fr"), "Actif"));

        assert_eq!(mapping.lookup("status", "1", Some("fr")).as_deref(), Some("Actif"));
        assert_eq!(mapping.lookup("status", "1", Some("en")).as_deref(), Some("Active"));
        // No untagged variant: the first one answers.
        assert_eq!(mapping.lookup("st", "1", Some("de")).as_deref(), Some("Active"));
    }

    #[test]
    fn test_language_preference() {
        let registry = StaticTableRegistry::new()
            .with(status(None, "Active"))
            .with(status(Some("fr"), "Actif"));

        assert_eq!(registry.lookup("status", "1", Some("fr")).as_deref(), Some("Actif"));
        assert_eq!(registry.lookup("status", "1", Some("de")).as_deref(), Some("Active"));
        assert_eq!(registry.lookup("st", "1", None).as_deref(), Some("Active"));
        assert_eq!(registry.table_names(), vec!["status", "st"]);
    }

    #[test]
    fn test_register_replaces_same_language() {
        let registry = StaticTableRegistry::new()
            .with(status(None, "Active"))
            .with(status(None, "Enabled"));
        assert_eq!(registry.lookup("status", "1", None).as_deref(), Some("Enabled"));
    }

    #[test]
    fn test_chain_prefers_first_holder() {
        let mut mapping = MappingDefinition::default();
        mapping.tables.push(status(None, "Own"));
        let external = StaticTableRegistry::new()
            .with(status(None, "Shared"))
            .with(Table::new("country"));

        let chain = TableChain::new(&mapping).then(&external);
        assert_eq!(chain.lookup("status", "1", None).as_deref(), Some("Own"));
        assert_eq!(chain.lookup("status", "9", None), None);
        assert!(chain.has_table("country"));
        assert!(!chain.has_table("missing"));
    }
}
