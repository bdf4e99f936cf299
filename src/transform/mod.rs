//! Value post-processing.
//!
//! Every extracted value goes through the same fixed steps: `raw` override,
//! table translation, pattern substitution, then prepend/append. One value in
//! gives one value out; nothing here collapses or invents values.

pub mod pattern;
pub mod tables;

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::mapping::Modifier;
use crate::runtime::VariableScope;

pub use pattern::{Pattern, Rendered};
pub use tables::{StaticTableRegistry, TableChain, TableRegistry};

/// A placeholder that had no value when a pattern was rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternWarning {
    /// Index of the map entry within the mapping
    pub entry: usize,
    pub field: String,
    pub placeholder: String,
}

impl fmt::Display for PatternWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "map #{} ({}): unresolved placeholder {{{}}}",
            self.entry, self.field, self.placeholder
        )
    }
}

/// Values produced by a transform, plus placeholders left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    pub values: Vec<String>,
    pub unresolved: Vec<String>,
}

/// Applies modifiers against one variable scope and one set of tables.
pub struct Transformer<'a> {
    scope: &'a VariableScope,
    tables: &'a dyn TableRegistry,
}

impl<'a> Transformer<'a> {
    pub fn new(scope: &'a VariableScope, tables: &'a dyn TableRegistry) -> Self {
        Self { scope, tables }
    }

    /// Transform `values`; `lang` selects the table variant.
    pub fn apply(
        &self,
        values: Vec<String>,
        modifier: Option<&Modifier>,
        lang: Option<&str>,
    ) -> TransformOutput {
        let modifier = match modifier {
            Some(modifier) => modifier,
            None => {
                return TransformOutput {
                    values,
                    unresolved: Vec::new(),
                }
            }
        };

        if let Some(raw) = &modifier.raw {
            return TransformOutput {
                values: vec![raw.clone()],
                unresolved: Vec::new(),
            };
        }

        let table = modifier.table.as_deref().filter(|name| {
            let known = self.tables.has_table(name);
            if !known {
                tracing::warn!("Table '{}' not found, values pass through", name);
            }
            known
        });
        let pattern = modifier.pattern.as_deref().map(Pattern::new);

        let mut output = TransformOutput::default();
        for code in values {
            let label = table.and_then(|name| self.tables.lookup(name, &code, lang));
            let value = label.clone().unwrap_or_else(|| code.clone());

            let value = match &pattern {
                Some(pattern) => {
                    let rendered = pattern.render(|name| match name {
                        "value" => Some(value.clone()),
                        "key" if table.is_some() => Some(code.clone()),
                        "label" if table.is_some() => Some(value.clone()),
                        other => self.scope.resolve(other).map(str::to_string),
                    });
                    for name in rendered.unresolved {
                        if !output.unresolved.contains(&name) {
                            output.unresolved.push(name);
                        }
                    }
                    rendered.value
                }
                None => value,
            };

            output.values.push(decorate(value, modifier));
        }
        output
    }
}

/// Apply `transform` steps with no language preference.
pub fn transform(
    values: Vec<String>,
    modifier: Option<&Modifier>,
    scope: &VariableScope,
    tables: &dyn TableRegistry,
) -> TransformOutput {
    Transformer::new(scope, tables).apply(values, modifier, None)
}

fn decorate(value: String, modifier: &Modifier) -> String {
    if value.is_empty() {
        return value;
    }
    let prepend = modifier.prepend.as_deref().unwrap_or_default();
    let append = modifier.append.as_deref().unwrap_or_default();
    if prepend.is_empty() && append.is_empty() {
        value
    } else {
        format!("{}{}{}", prepend, value, append)
    }
}

/// Turn query results into text values.
///
/// `null` is dropped, arrays are flattened in order, objects become compact
/// JSON and other scalars their JSON text.
pub fn flatten_values(values: Vec<Value>) -> Vec<String> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        flatten_into(value, &mut out);
    }
    out
}

fn flatten_into(value: Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push(s),
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => out.push(other.to_string()),
    }
}
