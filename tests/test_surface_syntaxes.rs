//! The same mapping written in every surface syntax normalizes to one model.

use metamapper::{normalize, MappingDefinition, MappingError, Querier, Source, SurfaceSyntax};

const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mapping>
    <info>
        <label>Records</label>
        <querier>jsdot</querier>
    </info>
    <params>
        <param name="base">https://example.org</param>
    </params>
    <map>
        <from>title</from>
        <to field="dcterms:title" language="en"/>
    </map>
    <map>
        <from jsonpath="$.creators[*].name"/>
        <to field="dcterms:creator"/>
        <mod pattern="{value} (author)"/>
    </map>
    <map>
        <from>status</from>
        <to field="dcterms:type" visibility="private"/>
        <mod table="status"/>
    </map>
    <map>
        <from>id</from>
        <to field="dcterms:identifier"/>
        <mod prepend="{base}/"/>
    </map>
    <table name="status">
        <label>Status</label>
        <entry key="1">Active</entry>
        <entry key="2">Retired</entry>
    </table>
</mapping>
"#;

const JSON: &str = r#"{
    "info": {"label": "Records", "querier": "jsdot"},
    "params": {"base": "https://example.org"},
    "maps": [
        {"from": "title", "to": {"field": "dcterms:title", "language": "en"}},
        {"from": {"jsonpath": "$.creators[*].name"}, "to": "dcterms:creator",
         "mod": {"pattern": "{value} (author)"}},
        {"from": "status", "to": {"field": "dcterms:type", "visibility": "private"},
         "mod": {"table": "status"}},
        {"from": "id", "to": "dcterms:identifier", "mod": {"prepend": "{base}/"}}
    ],
    "tables": {
        "status": {"label": "Status", "entries": {"1": "Active", "2": "Retired"}}
    }
}"#;

const YAML: &str = r#"
info:
  label: Records
  querier: jsdot
params:
  base: https://example.org
maps:
  - from: title
    to: { field: "dcterms:title", language: en }
  - from: { jsonpath: "$.creators[*].name" }
    to: "dcterms:creator"
    mod: { pattern: "{value} (author)" }
  - from: status
    to: { field: "dcterms:type", visibility: private }
    mod: { table: status }
  - from: id
    to: "dcterms:identifier"
    mod: { prepend: "{base}/" }
tables:
  status:
    label: Status
    entries:
      1: Active
      2: Retired
"#;

const FLAT: &str = r#"
; record mapping
info.label = Records
info.querier = jsdot
params.base = https://example.org

[maps.0]
from = title
to.field = dcterms:title
to.language = en

[maps.1]
from.jsonpath = $.creators[*].name
to = dcterms:creator
mod.pattern = "{value} (author)"

[maps.2]
from = status
to.field = dcterms:type
to.visibility = private
mod.table = status

[maps.3]
from = id
to = dcterms:identifier
mod.prepend = "{base}/"

[tables.status]
label = Status
entries.1 = Active
entries.2 = Retired
"#;

fn reference() -> MappingDefinition {
    normalize(XML, None).expect("xml mapping should normalize")
}

#[test]
fn test_detected_syntaxes() {
    assert_eq!(SurfaceSyntax::detect(XML), SurfaceSyntax::Xml);
    assert_eq!(SurfaceSyntax::detect(JSON), SurfaceSyntax::Json);
    assert_eq!(SurfaceSyntax::detect(YAML), SurfaceSyntax::Yaml);
    assert_eq!(SurfaceSyntax::detect(FLAT), SurfaceSyntax::Flat);
}

#[test]
fn test_reference_model() {
    let mapping = reference();
    assert_eq!(mapping.label(), Some("Records"));
    assert_eq!(mapping.param("base"), Some("https://example.org"));
    assert_eq!(mapping.maps.len(), 4);
    assert_eq!(
        mapping.maps[1].from,
        Some(Source::new(Querier::Jsonpath, "$.creators[*].name"))
    );
    assert_eq!(mapping.maps[0].from, Some(Source::new(Querier::Jsdot, "title")));
    assert_eq!(mapping.table("status").and_then(|t| t.lookup("2")), Some("Retired"));
}

#[test]
fn test_all_syntaxes_are_equivalent() {
    let expected = reference();
    for (name, text) in [("json", JSON), ("yaml", YAML), ("flat", FLAT)] {
        let mapping = normalize(text, None).unwrap_or_else(|e| panic!("{}: {}", name, e));
        assert_eq!(mapping, expected, "{} differs from xml", name);
    }
}

#[test]
fn test_hint_overrides_detection() {
    let err = normalize(JSON, Some(SurfaceSyntax::Xml)).unwrap_err();
    assert!(matches!(
        err,
        MappingError::Parse {
            syntax: SurfaceSyntax::Xml,
            ..
        }
    ));
}

#[test]
fn test_normalize_is_idempotent() {
    for text in [XML, JSON, YAML, FLAT] {
        assert_eq!(normalize(text, None).unwrap(), normalize(text, None).unwrap());
    }
}

#[test]
fn test_unknown_elements_are_rejected() {
    let err = normalize("<mapping><map><form>title</form></map></mapping>", None).unwrap_err();
    assert!(matches!(err, MappingError::Parse { .. }), "{}", err);

    let err = normalize(r#"{"maps": [{"from": "a", "to": "a", "mod": {"upper": true}}]}"#, None)
        .unwrap_err();
    assert!(matches!(err, MappingError::Invalid { entry: 0, .. }), "{}", err);
}

#[test]
fn test_unknown_query_language() {
    let err = normalize(r#"{"maps": [{"from": {"css": "h1"}, "to": "a"}]}"#, None).unwrap_err();
    assert!(err.to_string().contains("unknown query language 'css'"), "{}", err);
}

#[test]
fn test_malformed_text_names_its_syntax() {
    let cases = [
        ("<mapping>", SurfaceSyntax::Xml),
        ("{\"maps\": [", SurfaceSyntax::Json),
        ("maps: [unclosed", SurfaceSyntax::Yaml),
    ];
    for (text, syntax) in cases {
        match normalize(text, None) {
            Err(MappingError::Parse { syntax: got, .. }) => assert_eq!(got, syntax, "{}", text),
            other => panic!("{:?} gave {:?}", text, other),
        }
    }
}

#[test]
fn test_bad_visibility() {
    let err = normalize(
        r#"<mapping><map><from>a</from><to field="a" visibility="secret"/></map></mapping>"#,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, MappingError::Invalid { entry: 0, .. }), "{}", err);
}
