//! Flat key-path mapping syntax.
//!
//! ```ini
//! ; comments start with ; or #
//! info.label = Records
//! info.querier = jsdot
//!
//! [maps.0]
//! from.jsdot = title
//! to.field = dcterms:title
//! mod.pattern = "Mr. {value}"
//!
//! [maps.1]
//! include = module:common.ini
//!
//! [tables.status]
//! entries.1 = Active
//! ```
//!
//! Lines are folded into the same tree the literal syntax reads, so both share
//! one validation path. Keys under `maps` must be numeric; they give the order.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::mapping::builder::{MappingBuilder, MappingDraft};
use crate::mapping::{literal, MappingError, SurfaceSyntax};

pub fn parse(text: &str) -> Result<MappingDraft, MappingError> {
    let tree = to_tree(text)?;
    literal::parse_value(tree, SurfaceSyntax::Flat, MappingBuilder::new())
}

fn error(line: usize, message: impl Into<String>) -> MappingError {
    MappingError::parse(
        SurfaceSyntax::Flat,
        format!("line {}: {}", line, message.into()),
    )
}

/// Whether a line is a comment or blank.
pub(crate) fn is_insignificant(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with(';') || line.starts_with('#')
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Fold `a.b.c = value` lines into a JSON tree.
pub fn to_tree(text: &str) -> Result<Value, MappingError> {
    let mut root = Map::new();
    let mut maps: BTreeMap<usize, Map<String, Value>> = BTreeMap::new();
    let mut prefix = String::new();

    for (number, line) in text.lines().enumerate() {
        let number = number + 1;
        if is_insignificant(line) {
            continue;
        }
        let line = line.trim();

        if line.starts_with('[') {
            if !line.ends_with(']') {
                return Err(error(number, "unterminated section header"));
            }
            prefix = line[1..line.len() - 1].trim().to_string();
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| error(number, "expected `key = value`"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(error(number, "empty key"));
        }
        let full_key = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        };

        let segments: Vec<&str> = full_key.split('.').map(str::trim).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(error(number, format!("invalid key '{}'", full_key)));
        }
        let value = Value::String(unquote(value).to_string());

        match segments.as_slice() {
            ["maps", index, rest @ ..] => {
                let index: usize = index
                    .parse()
                    .map_err(|_| error(number, format!("map index '{}' is not a number", index)))?;
                if rest.is_empty() {
                    return Err(error(number, "map keys need a path after the index"));
                }
                let entry = maps.entry(index).or_default();
                insert(entry, rest, value).map_err(|e| error(number, e))?;
            }
            ["maps"] => return Err(error(number, "`maps` needs an index")),
            _ => insert(&mut root, &segments, value).map_err(|e| error(number, e))?,
        }
    }

    if !maps.is_empty() {
        root.insert(
            "maps".to_string(),
            Value::Array(maps.into_values().map(Value::Object).collect()),
        );
    }
    Ok(Value::Object(root))
}

fn insert(map: &mut Map<String, Value>, segments: &[&str], value: Value) -> Result<(), String> {
    let (first, rest) = match segments.split_first() {
        Some(split) => split,
        None => return Ok(()),
    };
    if rest.is_empty() {
        if map.contains_key(*first) {
            return Err(format!("key '{}' is set twice", first));
        }
        map.insert(first.to_string(), value);
        return Ok(());
    }
    let child = map
        .entry(first.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    match child {
        Value::Object(child) => insert(child, rest, value),
        _ => Err(format!("key '{}' already holds a value", first)),
    }
}
