//! The engine ties mapping resolution, preprocessing and conversion together.

use std::sync::Arc;

use crate::mapping::{
    FileResolver, MappingDefinition, MappingError, MappingResolver, Normalizer, SurfaceSyntax,
};
use crate::preprocess::Preprocessor;
use crate::runtime::config::EngineConfig;
use crate::runtime::context::Variables;
use crate::runtime::converter::{Conversion, ConvertError, Converter};
use crate::source::{SourceDocument, SourceFormat};

/// Mapping param naming the stylesheets applied before conversion.
pub const STYLESHEET_PARAM: &str = "xsl";

/// A configured mapping engine.
///
/// `Send + Sync`: share one engine behind an `Arc` and convert from many
/// threads at once.
pub struct Engine {
    config: EngineConfig,
    resolver: Box<dyn MappingResolver>,
    converter: Converter,
    preprocessor: Preprocessor,
}

impl Engine {
    /// Engine resolving file references against the configured directories.
    pub fn new(config: EngineConfig) -> Self {
        let resolver = FileResolver::new(
            config.mappings.module_dir.clone(),
            config.mappings.user_dir.clone(),
        );
        let preprocessor = Preprocessor::new(config.preprocess.clone());
        Self {
            config,
            resolver: Box::new(resolver),
            converter: Converter::new(),
            preprocessor,
        }
    }

    pub fn with_resolver(mut self, resolver: impl MappingResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn normalizer(&self) -> Normalizer<'_> {
        Normalizer::new(self.resolver.as_ref()).with_default_querier(self.config.default_querier)
    }

    /// Normalize mapping text; includes resolve through the engine's resolver.
    pub fn parse_mapping(
        &self,
        text: &str,
        hint: Option<SurfaceSyntax>,
    ) -> Result<MappingDefinition, MappingError> {
        self.normalizer().normalize(text, hint)
    }

    /// Resolve and normalize a mapping reference (`mapping:3`, `user:a.xml`, ...).
    pub fn load_mapping(&self, reference: &str) -> Result<MappingDefinition, MappingError> {
        let mapping = self.normalizer().normalize_reference(reference)?;
        tracing::info!(
            "Loaded mapping {} ({} maps, {} tables)",
            reference,
            mapping.maps.len(),
            mapping.tables.len()
        );
        Ok(mapping)
    }

    /// Stylesheets to run for `mapping`: its `xsl` param, else the configured defaults.
    pub fn stylesheets_for(&self, mapping: &MappingDefinition) -> Vec<String> {
        match mapping.param(STYLESHEET_PARAM) {
            Some(names) => names.split_whitespace().map(str::to_string).collect(),
            None => self.config.preprocess.stylesheets.clone(),
        }
    }

    /// Convert an already parsed document. No preprocessing happens here.
    pub fn convert(
        &self,
        source: &SourceDocument,
        mapping: &MappingDefinition,
        variables: &Variables,
    ) -> Result<Conversion, ConvertError> {
        self.converter.convert(source, mapping, variables)
    }

    /// Parse, preprocess and convert raw source bytes.
    ///
    /// The format is `format`, else the mapping's `info.from`, else detected.
    /// Stylesheets only apply to XML sources.
    pub fn convert_bytes(
        &self,
        source: &[u8],
        format: Option<SourceFormat>,
        mapping: &MappingDefinition,
        variables: &Variables,
    ) -> Result<Conversion, ConvertError> {
        let format = format
            .or_else(|| {
                mapping
                    .info
                    .as_ref()
                    .and_then(|info| info.from.as_deref())
                    .and_then(|from| from.parse().ok())
            })
            .unwrap_or_else(|| SourceFormat::detect(source));

        let stylesheets = self.stylesheets_for(mapping);
        let document = if stylesheets.is_empty() {
            SourceDocument::parse(source, Some(format))?
        } else if format != SourceFormat::Xml {
            tracing::debug!("Ignoring stylesheets for {} source", format);
            SourceDocument::parse(source, Some(format))?
        } else {
            let transformed = self.preprocessor.preprocess_chain(source.to_vec(), &stylesheets)?;
            SourceDocument::parse(&transformed, None)?
        };

        self.converter.convert(&document, mapping, variables)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
