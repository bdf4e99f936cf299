//! `{placeholder}` templates.

use regex::{Captures, Regex};
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\s*([A-Za-z_][A-Za-z0-9_:.\-]*)\s*\}").expect("placeholder pattern is valid")
    })
}

/// A template such as `Mr. {value}` or `{dcterms:title} ({year})`.
///
/// Braces that do not enclose a placeholder name are literal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern<'t> {
    template: &'t str,
}

/// Result of rendering a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub value: String,
    /// Placeholders that had no value and rendered as empty text
    pub unresolved: Vec<String>,
}

impl<'t> Pattern<'t> {
    pub fn new(template: &'t str) -> Self {
        Self { template }
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> Vec<&'t str> {
        placeholder_regex()
            .captures_iter(self.template)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect()
    }

    /// Substitute every placeholder with `resolve(name)`.
    pub fn render(&self, mut resolve: impl FnMut(&str) -> Option<String>) -> Rendered {
        let mut unresolved = Vec::new();
        let value = placeholder_regex()
            .replace_all(self.template, |caps: &Captures| {
                let name = &caps[1];
                resolve(name).unwrap_or_else(|| {
                    if !unresolved.iter().any(|n| n == name) {
                        unresolved.push(name.to_string());
                    }
                    String::new()
                })
            })
            .into_owned();
        Rendered { value, unresolved }
    }
}
