//! Conversion runtime.
//!
//! Runs normalized mappings against source documents: per-call variable
//! scope, the per-entry conversion pipeline, engine configuration and the
//! engine itself.

pub mod config;
pub mod context;
pub mod converter;
pub mod engine;

// Re-export key types
pub use config::{ConfigError, EngineConfig, MappingsConfig};
pub use context::{VariableScope, Variables, VALUE_VARIABLE};
pub use converter::{
    Conversion, ConversionStats, ConvertError, Converter, EntryOutcome, SkipReason, SkippedEntry,
};
pub use engine::{Engine, STYLESHEET_PARAM};
