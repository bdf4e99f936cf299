//! # Metamapper: declarative mapping engine
//!
//! Metamapper turns structured source data (JSON, YAML or XML) into a flat,
//! ordered list of field assignments, driven by a mapping definition.
//!
//! ## Features
//!
//! - **Several mapping syntaxes**: nested-element XML, JSON/YAML literals and a
//!   flat `key.path = value` form all normalize to one [`MappingDefinition`]
//! - **Five query languages**: `jsdot`, `jmespath`, `jsonpath`, `xpath`, `index`
//! - **Value modifiers**: raw literals, `{placeholder}` patterns, prepend/append
//!   and code-table translation
//! - **Includes**: one mapping can splice in another, with cycle detection
//! - **Preprocessing**: XML sources can be run through an external XSLT
//!   processor first
//!
//! ## Example: XML mapping
//!
//! ```xml
//! <mapping>
//!   <info><querier>xpath</querier></info>
//!   <map>
//!     <from xpath="/record/title"/>
//!     <to field="dcterms:title" language="en"/>
//!   </map>
//!   <map>
//!     <from xpath="/record/@status"/>
//!     <to field="dcterms:type"/>
//!     <mod table="status"/>
//!   </map>
//!   <table name="status">
//!     <entry key="1">Active</entry>
//!   </table>
//! </mapping>
//! ```
//!
//! ## Example: JSON mapping
//!
//! ```json
//! {
//!   "maps": [
//!     {"from": "author.name", "to": "dcterms:creator", "mod": {"pattern": "Mr. {value}"}},
//!     {"include": "module:common.json"}
//!   ]
//! }
//! ```

// Mapping model, parsers and normalization
pub mod mapping;
pub mod schema;

// Extraction and value post-processing
pub mod query;
pub mod source;
pub mod transform;

// Conversion runtime
pub mod runtime;

pub mod preprocess;

// Output
pub mod field;
pub mod serialization;

// Re-export key types
pub use field::{FieldAssignment, Visibility};
pub use mapping::{
    normalize, MapEntry, MappingDefinition, MappingError, MappingReference, MappingResolver,
    Modifier, Normalizer, Source, SurfaceSyntax, Table, Target,
};
pub use query::{Querier, QueryError, QueryRegistry, QueryStrategy, SourceNode};
pub use source::{SourceDocument, SourceError, SourceFormat};
pub use transform::{transform, PatternWarning, StaticTableRegistry, TableRegistry};

// Re-export runtime types
pub use runtime::{
    Conversion, ConvertError, Converter, Engine, EngineConfig, EntryOutcome, SkipReason,
    VariableScope, Variables,
};

pub use preprocess::{PreprocessConfig, PreprocessError, Preprocessor};
pub use serialization::{write_fields, OutputFormat, SerializationError};
