//! Structured-literal mapping syntax (JSON or YAML).
//!
//! ```yaml
//! info:
//!   label: Records
//!   querier: jsdot
//! params:
//!   base: https://example.org
//! maps:
//!   - from: { jsdot: title }
//!     to: { field: dcterms:title, language: en }
//!   - from: id
//!     to: dcterms:identifier
//!     mod: { pattern: "{base}/{value}" }
//!   - include: module:common.yaml
//! tables:
//!   status:
//!     label: { en: Status }
//!     entries: { "1": Active }
//! ```
//!
//! `from` and `to` may be plain strings: a bare path for the default querier
//! and a bare field name respectively. A table name may also hold a list of
//! tables that differ by `lang`.

use serde_json::{Map, Value};

use crate::mapping::builder::{MapSpec, MappingBuilder, MappingDraft, TargetSpec};
use crate::mapping::{Info, MappingError, SurfaceSyntax, Table, TableLabel};
use crate::query::Querier;
use crate::schema;
use crate::source::yaml_to_json;

pub fn parse_json(text: &str) -> Result<MappingDraft, MappingError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| MappingError::parse(SurfaceSyntax::Json, e.to_string()))?;
    parse_value(value, SurfaceSyntax::Json, MappingBuilder::new())
}

pub fn parse_yaml(text: &str) -> Result<MappingDraft, MappingError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|e| MappingError::parse(SurfaceSyntax::Yaml, e.to_string()))?;
    let value = yaml_to_json(yaml).map_err(|e| MappingError::parse(SurfaceSyntax::Yaml, e))?;
    parse_value(value, SurfaceSyntax::Yaml, MappingBuilder::new())
}

/// Parse an already decoded literal tree.
pub fn parse_value(
    value: Value,
    syntax: SurfaceSyntax,
    mut builder: MappingBuilder,
) -> Result<MappingDraft, MappingError> {
    let root = match value {
        Value::Object(map) => map,
        // An empty YAML document is an empty mapping.
        Value::Null => return builder.build(),
        other => {
            return Err(MappingError::parse(
                syntax,
                format!("mapping must be an object, found {}", type_name(&other)),
            ))
        }
    };

    for (key, value) in root {
        match key.as_str() {
            "info" => builder.info(info(value, syntax)?),
            "params" => {
                for (name, value) in object(value, "params", syntax)? {
                    let value = scalar(value).map_err(|e| {
                        MappingError::parse(syntax, format!("param '{}': {}", name, e))
                    })?;
                    builder.param(name, value.unwrap_or_default());
                }
            }
            "maps" => match value {
                Value::Array(items) => {
                    for item in items {
                        map_item(&mut builder, item)?;
                    }
                }
                Value::Null => {}
                other => {
                    return Err(MappingError::parse(
                        syntax,
                        format!("'maps' must be an array, found {}", type_name(&other)),
                    ))
                }
            },
            "tables" => {
                for (name, value) in object(value, "tables", syntax)? {
                    match value {
                        // Language variants of one table
                        Value::Array(variants) => {
                            for variant in variants {
                                builder.table(table(name.clone(), variant)?)?;
                            }
                        }
                        value => builder.table(table(name, value)?)?,
                    }
                }
            }
            "include" => {
                for reference in string_list(value)
                    .map_err(|e| MappingError::parse(syntax, format!("'include': {}", e)))?
                {
                    builder.include(reference);
                }
            }
            other => {
                return Err(MappingError::parse(
                    syntax,
                    format!("unknown top-level key '{}'", other),
                ))
            }
        }
    }

    builder.build()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn scalar(value: Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(format!("expected a string, found {}", type_name(&other))),
    }
}

fn string_list(value: Value) -> Result<Vec<String>, String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| scalar(item).map(Option::unwrap_or_default))
            .collect(),
        other => Ok(scalar(other)?.into_iter().collect()),
    }
}

fn object(value: Value, what: &str, syntax: SurfaceSyntax) -> Result<Map<String, Value>, MappingError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(MappingError::parse(
            syntax,
            format!("'{}' must be an object, found {}", what, type_name(&other)),
        )),
    }
}

fn info(value: Value, syntax: SurfaceSyntax) -> Result<Info, MappingError> {
    let mut info = Info::default();
    for (key, value) in object(value, "info", syntax)? {
        if !schema::is_allowed_child("info", &key) {
            return Err(MappingError::parse(syntax, format!("unknown info key '{}'", key)));
        }
        let value = scalar(value)
            .map_err(|e| MappingError::parse(syntax, format!("info '{}': {}", key, e)))?
            .filter(|v| !v.is_empty());
        match key.as_str() {
            "label" => info.label = value,
            "from" => info.from = value,
            "to" => info.to = value,
            "querier" => {
                info.querier = match value {
                    Some(v) => Some(
                        v.parse::<Querier>()
                            .map_err(|e| MappingError::parse(syntax, e))?,
                    ),
                    None => None,
                }
            }
            "mapper" => info.mapper = value,
            "example" => info.example = value,
            _ => {}
        }
    }
    Ok(info)
}

/// Read `{attr: value}` pairs allowed on `element`.
fn attributes(
    position: usize,
    element: &str,
    value: Value,
) -> Result<Vec<(String, Option<String>)>, MappingError> {
    let map = match value {
        Value::Object(map) => map,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(MappingError::invalid(
                position,
                format!("`{}` must be an object, found {}", element, type_name(&other)),
            ))
        }
    };
    map.into_iter()
        .map(|(key, value)| {
            if !schema::is_allowed_attribute(element, &key) {
                return Err(MappingError::invalid(
                    position,
                    format!("unknown key '{}' in `{}`", key, element),
                ));
            }
            let value = scalar(value)
                .map_err(|e| MappingError::invalid(position, format!("{}.{}: {}", element, key, e)))?;
            Ok((key, value))
        })
        .collect()
}

fn map_item(builder: &mut MappingBuilder, item: Value) -> Result<(), MappingError> {
    let position = builder.position();
    let obj = match item {
        Value::Object(obj) => obj,
        other => {
            return Err(MappingError::invalid(
                position,
                format!("map must be an object, found {}", type_name(&other)),
            ))
        }
    };

    if let Some(include) = obj.get("include") {
        if obj.len() != 1 {
            return Err(MappingError::invalid(
                position,
                "`include` cannot be combined with other keys",
            ));
        }
        let reference = scalar(include.clone())
            .map_err(|e| MappingError::invalid(position, format!("include: {}", e)))?
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| MappingError::invalid(position, "empty include reference"))?;
        builder.include(reference.trim());
        return Ok(());
    }

    let mut spec = MapSpec::new();
    for (key, value) in obj {
        match key.as_str() {
            "from" => {
                spec.from_present = true;
                match value {
                    Value::String(path) => spec.path = Some(path),
                    // Unknown query languages are reported by the builder.
                    Value::Object(map) => {
                        for (querier, path) in map {
                            let path = scalar(path).map_err(|e| {
                                MappingError::invalid(position, format!("from.{}: {}", querier, e))
                            })?;
                            spec.from.push((querier, path.unwrap_or_default()));
                        }
                    }
                    Value::Null => {}
                    other => {
                        return Err(MappingError::invalid(
                            position,
                            format!("`from` must be a string or an object, found {}", type_name(&other)),
                        ))
                    }
                }
            }
            "to" => {
                let mut target = TargetSpec::default();
                match value {
                    Value::String(field) => target.field = Some(field),
                    other => {
                        for (attr, value) in attributes(position, "to", other)? {
                            match attr.as_str() {
                                "field" => target.field = value,
                                "datatype" => target.datatype = value,
                                "language" => target.language = value,
                                "visibility" => target.visibility = value,
                                _ => {}
                            }
                        }
                    }
                }
                spec.to = Some(target);
            }
            "mod" => {
                for (attr, value) in attributes(position, "mod", value)? {
                    match attr.as_str() {
                        "raw" => spec.modifier.raw = value,
                        "pattern" => spec.modifier.pattern = value,
                        "prepend" => spec.modifier.prepend = value,
                        "append" => spec.modifier.append = value,
                        "table" => spec.modifier.table = value,
                        _ => {}
                    }
                }
            }
            other => {
                return Err(MappingError::invalid(
                    position,
                    format!("unknown key '{}'", other),
                ))
            }
        }
    }

    builder.map(spec);
    Ok(())
}

fn table(name: String, value: Value) -> Result<Table, MappingError> {
    let table_error = |name: &str, message: String| MappingError::Table {
        name: name.to_string(),
        message,
    };
    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(table_error(
                &name,
                format!("must be an object, found {}", type_name(&other)),
            ))
        }
    };

    let mut table = Table::new(name);
    for (key, value) in map {
        match key.as_str() {
            "code" => {
                table.code = scalar(value).map_err(|e| table_error(&table.name, e))?
            }
            "lang" => {
                table.lang = scalar(value).map_err(|e| table_error(&table.name, e))?
            }
            "label" => match value {
                Value::Object(labels) => {
                    for (lang, text) in labels {
                        let text = scalar(text).map_err(|e| table_error(&table.name, e))?;
                        table.labels.push(TableLabel {
                            lang: Some(lang),
                            text: text.unwrap_or_default(),
                        });
                    }
                }
                other => {
                    if let Some(text) = scalar(other).map_err(|e| table_error(&table.name, e))? {
                        table.labels.push(TableLabel { lang: None, text });
                    }
                }
            },
            "entries" => match value {
                Value::Object(entries) => {
                    for (code, label) in entries {
                        let label = scalar(label).map_err(|e| table_error(&table.name, e))?;
                        table.insert(code, label.unwrap_or_default());
                    }
                }
                Value::Null => {}
                other => {
                    return Err(table_error(
                        &table.name,
                        format!("'entries' must be an object, found {}", type_name(&other)),
                    ))
                }
            },
            other => {
                return Err(table_error(&table.name, format!("unknown key '{}'", other)))
            }
        }
    }
    Ok(table)
}
