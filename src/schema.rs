//! Closed vocabulary of the nested-element mapping syntax.
//!
//! The table below is the only place where element names, their attributes and
//! their allowed children are listed. The XML parser validates against it, the
//! literal parser checks `from`/`to`/`mod` keys against it, and editors can pull
//! it through [`hints`] to drive autocompletion.

use serde::Serialize;

/// Description of one element of the mapping vocabulary.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ElementSchema {
    pub name: &'static str,
    pub attributes: &'static [&'static str],
    pub children: &'static [&'static str],
    /// Whether the element may carry a text value.
    pub text: bool,
    pub doc: &'static str,
}

/// Every element of the vocabulary, root first.
pub static ELEMENTS: &[ElementSchema] = &[
    ElementSchema {
        name: "mapping",
        attributes: &[],
        children: &["include", "info", "params", "maps", "map", "tables", "table"],
        text: false,
        doc: "Root of a mapping definition.",
    },
    ElementSchema {
        name: "include",
        attributes: &["mapping"],
        children: &[],
        text: false,
        doc: "Splice the maps and tables of another mapping at this position.",
    },
    ElementSchema {
        name: "info",
        attributes: &[],
        children: &["label", "from", "to", "querier", "mapper", "example"],
        text: false,
        doc: "Free-form metadata about the mapping.",
    },
    ElementSchema {
        name: "params",
        attributes: &[],
        children: &["param"],
        text: false,
        doc: "Default values for pipeline variables.",
    },
    ElementSchema {
        name: "param",
        attributes: &["name"],
        children: &[],
        text: true,
        doc: "One named variable default.",
    },
    ElementSchema {
        name: "maps",
        attributes: &[],
        children: &["map", "include"],
        text: false,
        doc: "Ordered list of map entries.",
    },
    ElementSchema {
        name: "map",
        attributes: &[],
        children: &["from", "to", "mod"],
        text: false,
        doc: "One extraction rule.",
    },
    ElementSchema {
        name: "from",
        attributes: &["jsdot", "jmespath", "jsonpath", "xpath", "index"],
        children: &[],
        text: true,
        doc: "Source path, keyed by query language. Text is a bare path.",
    },
    ElementSchema {
        name: "to",
        attributes: &["field", "datatype", "language", "visibility"],
        children: &[],
        text: true,
        doc: "Target field. Text is a bare field name.",
    },
    ElementSchema {
        name: "mod",
        attributes: &["raw", "pattern", "prepend", "append", "table"],
        children: &[],
        text: false,
        doc: "Value modifiers applied after extraction.",
    },
    ElementSchema {
        name: "tables",
        attributes: &[],
        children: &["table"],
        text: false,
        doc: "Code tables available to map entries.",
    },
    ElementSchema {
        name: "table",
        attributes: &["name", "code", "lang"],
        children: &["label", "list", "entry", "term"],
        text: false,
        doc: "A code-to-label dictionary.",
    },
    ElementSchema {
        name: "entry",
        attributes: &["key"],
        children: &[],
        text: true,
        doc: "Table entry: key attribute, label as text.",
    },
    ElementSchema {
        name: "label",
        attributes: &["lang"],
        children: &[],
        text: true,
        doc: "A label, optionally language-tagged.",
    },
    ElementSchema {
        name: "list",
        attributes: &[],
        children: &["term", "entry"],
        text: false,
        doc: "Grouping of table terms.",
    },
    ElementSchema {
        name: "term",
        attributes: &["code"],
        children: &[],
        text: true,
        doc: "Table term: code attribute, label as text.",
    },
    ElementSchema {
        name: "querier",
        attributes: &[],
        children: &[],
        text: true,
        doc: "Default query language for paths given without one.",
    },
    ElementSchema {
        name: "mapper",
        attributes: &[],
        children: &[],
        text: true,
        doc: "Name of the mapper this mapping is written for.",
    },
    ElementSchema {
        name: "example",
        attributes: &[],
        children: &[],
        text: true,
        doc: "Link or identifier of a sample source document.",
    },
];

/// Look up an element of the vocabulary.
pub fn element(name: &str) -> Option<&'static ElementSchema> {
    ELEMENTS.iter().find(|e| e.name == name)
}

/// Attributes allowed on `element`, empty for unknown elements.
pub fn attributes(element_name: &str) -> &'static [&'static str] {
    element(element_name).map(|e| e.attributes).unwrap_or(&[])
}

pub fn is_allowed_attribute(element_name: &str, attribute: &str) -> bool {
    attributes(element_name).contains(&attribute)
}

pub fn is_allowed_child(parent: &str, child: &str) -> bool {
    element(parent)
        .map(|e| e.children.contains(&child))
        .unwrap_or(false)
}

/// The vocabulary as JSON, for editor autocompletion.
pub fn hints() -> serde_json::Value {
    let elements: serde_json::Map<String, serde_json::Value> = ELEMENTS
        .iter()
        .map(|e| {
            (
                e.name.to_string(),
                serde_json::json!({
                    "attrs": e.attributes,
                    "children": e.children,
                    "text": e.text,
                    "doc": e.doc,
                }),
            )
        })
        .collect();
    serde_json::Value::Object(elements)
}
