//! Where mapping text comes from.
//!
//! The engine never stores mappings itself; it asks a [`MappingResolver`] for
//! the text behind a [`MappingReference`].

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::mapping::{MappingError, SurfaceSyntax};

/// A reference to a mapping.
///
/// | written as | meaning |
/// |---|---|
/// | `mapping:12`, `12` | stored mapping, by numeric id |
/// | `module:xml/record.xml` | file under the module-provided directory |
/// | `user:my/record.xml`, `my/record.xml` | file under the user directory |
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MappingReference {
    Stored(u64),
    Module(PathBuf),
    User(PathBuf),
}

impl MappingReference {
    pub fn parse(reference: &str) -> Result<Self, MappingError> {
        reference.parse()
    }

    /// Surface syntax implied by the file extension, if any.
    pub fn syntax_hint(&self) -> Option<SurfaceSyntax> {
        match self {
            MappingReference::Stored(_) => None,
            MappingReference::Module(path) | MappingReference::User(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(SurfaceSyntax::from_extension),
        }
    }
}

impl FromStr for MappingReference {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MappingError::Reference(s.to_string()));
        }
        if let Ok(id) = s.parse::<u64>() {
            return Ok(MappingReference::Stored(id));
        }
        match s.split_once(':') {
            Some(("mapping", id)) => id
                .trim()
                .parse::<u64>()
                .map(MappingReference::Stored)
                .map_err(|_| MappingError::Reference(s.to_string())),
            Some(("module", path)) if !path.trim().is_empty() => {
                Ok(MappingReference::Module(PathBuf::from(path.trim())))
            }
            Some(("user", path)) if !path.trim().is_empty() => {
                Ok(MappingReference::User(PathBuf::from(path.trim())))
            }
            Some(("module", _)) | Some(("user", _)) => {
                Err(MappingError::Reference(s.to_string()))
            }
            _ => Ok(MappingReference::User(PathBuf::from(s))),
        }
    }
}

impl fmt::Display for MappingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingReference::Stored(id) => write!(f, "mapping:{}", id),
            MappingReference::Module(path) => write!(f, "module:{}", path.display()),
            MappingReference::User(path) => write!(f, "user:{}", path.display()),
        }
    }
}

/// Source of mapping text.
pub trait MappingResolver: Send + Sync {
    /// Text of the referenced mapping, or `None` when it does not exist.
    fn resolve(&self, reference: &MappingReference) -> Option<String>;
}

/// Resolver that knows no mapping; includes always fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl MappingResolver for NoResolver {
    fn resolve(&self, _reference: &MappingReference) -> Option<String> {
        None
    }
}

/// Resolves file references against a module and a user directory.
///
/// Stored references are left to another resolver.
#[derive(Debug, Clone, Default)]
pub struct FileResolver {
    module_dir: Option<PathBuf>,
    user_dir: Option<PathBuf>,
}

impl FileResolver {
    pub fn new(module_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            module_dir,
            user_dir,
        }
    }

    fn read(base: Option<&Path>, relative: &Path) -> Option<String> {
        let base = base?;
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            tracing::warn!(
                "Refusing mapping path outside its directory: {}",
                relative.display()
            );
            return None;
        }
        let path = base.join(relative);
        match fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::debug!("Cannot read mapping {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl MappingResolver for FileResolver {
    fn resolve(&self, reference: &MappingReference) -> Option<String> {
        match reference {
            MappingReference::Stored(_) => None,
            MappingReference::Module(path) => Self::read(self.module_dir.as_deref(), path),
            MappingReference::User(path) => Self::read(self.user_dir.as_deref(), path),
        }
    }
}

/// In-memory resolver keyed by reference.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    mappings: HashMap<MappingReference, String>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: &str, text: impl Into<String>) -> Result<(), MappingError> {
        self.mappings.insert(reference.parse()?, text.into());
        Ok(())
    }

    pub fn with(mut self, reference: &str, text: impl Into<String>) -> Result<Self, MappingError> {
        self.insert(reference, text)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl MappingResolver for MemoryResolver {
    fn resolve(&self, reference: &MappingReference) -> Option<String> {
        self.mappings.get(reference).cloned()
    }
}

/// Tries each resolver in turn.
#[derive(Default)]
pub struct ChainResolver {
    resolvers: Vec<Box<dyn MappingResolver>>,
}

impl ChainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, resolver: impl MappingResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }
}

impl MappingResolver for ChainResolver {
    fn resolve(&self, reference: &MappingReference) -> Option<String> {
        self.resolvers.iter().find_map(|r| r.resolve(reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_references() {
        assert_eq!(MappingReference::parse("12").unwrap(), MappingReference::Stored(12));
        assert_eq!(
            MappingReference::parse("mapping:7").unwrap(),
            MappingReference::Stored(7)
        );
        assert_eq!(
            MappingReference::parse("module:xml/ead.xml").unwrap(),
            MappingReference::Module(PathBuf::from("xml/ead.xml"))
        );
        assert_eq!(
            MappingReference::parse("mine.json").unwrap(),
            MappingReference::User(PathBuf::from("mine.json"))
        );
        assert!(MappingReference::parse("mapping:abc").is_err());
        assert!(MappingReference::parse("module:").is_err());
        assert!(MappingReference::parse("  ").is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for text in ["mapping:3", "module:a/b.xml", "user:c.ini"] {
            assert_eq!(MappingReference::parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn test_syntax_hint() {
        let reference = MappingReference::parse("module:a/b.yml").unwrap();
        assert_eq!(reference.syntax_hint(), Some(SurfaceSyntax::Yaml));
        assert_eq!(MappingReference::Stored(1).syntax_hint(), None);
    }

    #[test]
    fn test_file_resolver() {
        let module = tempfile::tempdir().unwrap();
        let user = tempfile::tempdir().unwrap();
        fs::create_dir_all(module.path().join("xml")).unwrap();
        fs::write(module.path().join("xml/base.xml"), "<mapping/>").unwrap();
        fs::write(user.path().join("mine.json"), "{}").unwrap();

        let resolver = FileResolver::new(
            Some(module.path().to_path_buf()),
            Some(user.path().to_path_buf()),
        );

        let module_ref = MappingReference::parse("module:xml/base.xml").unwrap();
        assert_eq!(resolver.resolve(&module_ref).as_deref(), Some("<mapping/>"));

        let user_ref = MappingReference::parse("user:mine.json").unwrap();
        assert_eq!(resolver.resolve(&user_ref).as_deref(), Some("{}"));

        let escaping = MappingReference::parse("user:../mine.json").unwrap();
        assert_eq!(resolver.resolve(&escaping), None);
        assert_eq!(resolver.resolve(&MappingReference::Stored(1)), None);
    }

    #[test]
    fn test_chain_resolver() {
        let first = MemoryResolver::new().with("mapping:1", "one").unwrap();
        let second = MemoryResolver::new()
            .with("mapping:1", "shadowed")
            .unwrap()
            .with("mapping:2", "two")
            .unwrap();
        let chain = ChainResolver::new().push(first).push(second);

        assert_eq!(chain.resolve(&MappingReference::Stored(1)).as_deref(), Some("one"));
        assert_eq!(chain.resolve(&MappingReference::Stored(2)).as_deref(), Some("two"));
        assert_eq!(chain.resolve(&MappingReference::Stored(3)), None);
    }
}
