//! Nested-element (XML) mapping syntax.
//!
//! ```xml
//! <mapping>
//!     <info><label>Records</label><querier>xpath</querier></info>
//!     <map>
//!         <from xpath="/record/title"/>
//!         <to field="dcterms:title" language="en"/>
//!     </map>
//!     <include mapping="module:common.xml"/>
//! </mapping>
//! ```
//!
//! Elements and attributes are checked against [`crate::schema`]; anything
//! outside the vocabulary is an error with its line and column.

use roxmltree::{Document, Node};

use crate::mapping::builder::{MapSpec, MappingBuilder, MappingDraft, TargetSpec};
use crate::mapping::{Info, MappingError, SurfaceSyntax, Table, TableLabel};
use crate::query::Querier;
use crate::schema;

pub fn parse(text: &str) -> Result<MappingDraft, MappingError> {
    parse_with(text, MappingBuilder::new())
}

pub fn parse_with(text: &str, mut builder: MappingBuilder) -> Result<MappingDraft, MappingError> {
    let doc = Document::parse(text)
        .map_err(|e| MappingError::parse(SurfaceSyntax::Xml, e.to_string()))?;
    let reader = Reader { doc: &doc };

    let root = doc.root_element();
    if root.tag_name().name() != "mapping" {
        return Err(reader.error(
            root,
            format!("root element must be <mapping>, found <{}>", root.tag_name().name()),
        ));
    }
    reader.check_element(root)?;

    for child in reader.children(root)? {
        match child.tag_name().name() {
            "include" => builder.include(reader.required_attr(child, "mapping")?),
            "info" => builder.info(reader.info(child)?),
            "params" => {
                for param in reader.children(child)? {
                    let name = reader.required_attr(param, "name")?;
                    builder.param(name, reader.text(param));
                }
            }
            "maps" => {
                for item in reader.children(child)? {
                    match item.tag_name().name() {
                        "include" => builder.include(reader.required_attr(item, "mapping")?),
                        _ => {
                            let spec = reader.map(item, builder.position())?;
                            builder.map(spec);
                        }
                    }
                }
            }
            "map" => {
                let spec = reader.map(child, builder.position())?;
                builder.map(spec);
            }
            "tables" => {
                for table in reader.children(child)? {
                    builder.table(reader.table(table)?)?;
                }
            }
            "table" => builder.table(reader.table(child)?)?,
            _ => {}
        }
    }

    builder.build()
}

struct Reader<'a, 'input> {
    doc: &'a Document<'input>,
}

impl<'a, 'input> Reader<'a, 'input> {
    fn error(&self, node: Node<'_, '_>, message: impl std::fmt::Display) -> MappingError {
        let pos = self.doc.text_pos_at(node.range().start);
        MappingError::parse(
            SurfaceSyntax::Xml,
            format!("{} (line {}, column {})", message, pos.row, pos.col),
        )
    }

    /// Reject attributes outside the vocabulary of this element, and text in
    /// elements that carry none.
    fn check_element(&self, node: Node<'_, '_>) -> Result<(), MappingError> {
        let name = node.tag_name().name();
        let Some(element) = schema::element(name) else {
            return Err(self.error(node, format!("unknown element <{}>", name)));
        };
        if !element.text {
            let stray = node
                .children()
                .find(|c| c.is_text() && c.text().is_some_and(|t| !t.trim().is_empty()));
            if let Some(text) = stray {
                return Err(self.error(text, format!("unexpected text in <{}>", name)));
            }
        }
        for attr in node.attributes() {
            if !schema::is_allowed_attribute(name, attr.name()) {
                return Err(self.error(
                    node,
                    format!("unknown attribute '{}' on <{}>", attr.name(), name),
                ));
            }
        }
        Ok(())
    }

    /// Element children of `node`, each validated against the vocabulary.
    fn children(&self, node: Node<'a, 'input>) -> Result<Vec<Node<'a, 'input>>, MappingError> {
        let parent = node.tag_name().name();
        let mut children = Vec::new();
        for child in node.children() {
            if child.is_text() {
                let text = child.text().unwrap_or_default();
                if !text.trim().is_empty() {
                    return Err(self.error(child, format!("unexpected text in <{}>", parent)));
                }
                continue;
            }
            if !child.is_element() {
                continue;
            }
            let name = child.tag_name().name();
            if !schema::is_allowed_child(parent, name) {
                return Err(self.error(
                    child,
                    format!("element <{}> is not allowed in <{}>", name, parent),
                ));
            }
            self.check_element(child)?;
            children.push(child);
        }
        Ok(children)
    }

    fn attr(&self, node: Node<'_, '_>, name: &str) -> Option<String> {
        node.attribute(name).map(str::to_string)
    }

    fn required_attr(&self, node: Node<'_, '_>, name: &str) -> Result<String, MappingError> {
        node.attribute(name)
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().to_string())
            .ok_or_else(|| {
                self.error(
                    node,
                    format!("<{}> requires attribute '{}'", node.tag_name().name(), name),
                )
            })
    }

    fn text(&self, node: Node<'_, '_>) -> String {
        node.children()
            .filter(|c| c.is_text())
            .filter_map(|c| c.text())
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn optional_text(&self, node: Node<'_, '_>) -> Option<String> {
        Some(self.text(node)).filter(|t| !t.is_empty())
    }

    fn info(&self, node: Node<'a, 'input>) -> Result<Info, MappingError> {
        let mut info = Info::default();
        for child in self.children(node)? {
            let value = self.optional_text(child);
            match child.tag_name().name() {
                "label" => info.label = value,
                "from" => info.from = value,
                "to" => info.to = value,
                "querier" => {
                    info.querier = match value {
                        Some(v) => Some(v.parse::<Querier>().map_err(|e| self.error(child, e))?),
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

    fn map(&self, node: Node<'a, 'input>, position: usize) -> Result<MapSpec, MappingError> {
        let mut spec = MapSpec::new();
        let mut has_mod = false;
        for child in self.children(node)? {
            match child.tag_name().name() {
                "from" => {
                    if spec.from_present {
                        return Err(MappingError::invalid(position, "more than one <from>"));
                    }
                    spec.from_present = true;
                    for attr in child.attributes() {
                        spec.from.push((attr.name().to_string(), attr.value().to_string()));
                    }
                    spec.path = self.optional_text(child);
                }
                "to" => {
                    if spec.to.is_some() {
                        return Err(MappingError::invalid(position, "more than one <to>"));
                    }
                    spec.to = Some(TargetSpec {
                        field: self.attr(child, "field").or_else(|| self.optional_text(child)),
                        datatype: self.attr(child, "datatype"),
                        language: self.attr(child, "language"),
                        visibility: self.attr(child, "visibility"),
                    });
                }
                "mod" => {
                    if has_mod {
                        return Err(MappingError::invalid(position, "more than one <mod>"));
                    }
                    has_mod = true;
                    spec.modifier.raw = self.attr(child, "raw");
                    spec.modifier.pattern = self.attr(child, "pattern");
                    spec.modifier.prepend = self.attr(child, "prepend");
                    spec.modifier.append = self.attr(child, "append");
                    spec.modifier.table = self.attr(child, "table");
                }
                _ => {}
            }
        }
        Ok(spec)
    }

    fn table(&self, node: Node<'a, 'input>) -> Result<Table, MappingError> {
        let mut table = Table::new(self.required_attr(node, "name")?);
        table.code = self.attr(node, "code").filter(|c| !c.is_empty());
        table.lang = self.attr(node, "lang").filter(|l| !l.is_empty());

        for child in self.children(node)? {
            match child.tag_name().name() {
                "label" => table.labels.push(TableLabel {
                    lang: self.attr(child, "lang").filter(|l| !l.is_empty()),
                    text: self.text(child),
                }),
                "list" => {
                    for term in self.children(child)? {
                        self.table_entry(&mut table, term)?;
                    }
                }
                _ => self.table_entry(&mut table, child)?,
            }
        }
        Ok(table)
    }

    fn table_entry(&self, table: &mut Table, node: Node<'_, '_>) -> Result<(), MappingError> {
        let key_attr = match node.tag_name().name() {
            "term" => "code",
            _ => "key",
        };
        let key = node.attribute(key_attr).ok_or_else(|| {
            self.error(
                node,
                format!("<{}> requires attribute '{}'", node.tag_name().name(), key_attr),
            )
        })?;
        table.insert(key, self.text(node));
        Ok(())
    }
}
