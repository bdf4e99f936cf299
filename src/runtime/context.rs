//! Variable scope for one conversion.
//!
//! Holds the pipeline variables (mapping params overlaid with caller
//! variables) and the values emitted so far, so patterns can refer to
//! fields filled by earlier entries.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::mapping::MappingDefinition;

/// Named pipeline variables, in insertion order.
pub type Variables = IndexMap<String, String>;

/// Name under which a computed entry can read a caller-supplied value.
pub const VALUE_VARIABLE: &str = "value";

/// Scope of one conversion call.
///
/// Each call owns its scope; nothing in it is shared across threads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableScope {
    #[serde(default)]
    variables: Variables,

    /// Values emitted so far: field -> values in emission order
    #[serde(default)]
    emitted: IndexMap<String, Vec<String>>,
}

impl VariableScope {
    /// Create a scope with the given variables.
    ///
    /// # Example
    /// ```
    /// use metamapper::runtime::{VariableScope, Variables};
    ///
    /// let mut variables = Variables::new();
    /// variables.insert("site".to_string(), "Archive".to_string());
    ///
    /// let scope = VariableScope::new(variables);
    /// assert_eq!(scope.get("site"), Some("Archive"));
    /// ```
    pub fn new(variables: Variables) -> Self {
        Self {
            variables,
            emitted: IndexMap::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Scope for converting with `mapping`: its params, overridden by `variables`.
    pub fn for_mapping(mapping: &MappingDefinition, variables: &Variables) -> Self {
        let mut merged = mapping.params.clone();
        for (name, value) in variables {
            merged.insert(name.clone(), value.clone());
        }
        Self::new(merged)
    }

    /// Get a variable by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Record a value emitted for `field`.
    pub fn record(&mut self, field: &str, value: &str) {
        self.emitted
            .entry(field.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// Values emitted so far for `field`.
    pub fn emitted(&self, field: &str) -> &[String] {
        self.emitted.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Resolve a placeholder name: a variable first, then the first value
    /// already emitted for a field of that name.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.get(name)
            .or_else(|| self.emitted(name).first().map(String::as_str))
    }

    /// Number of values emitted so far.
    pub fn emitted_count(&self) -> usize {
        self.emitted.values().map(Vec::len).sum()
    }
}
