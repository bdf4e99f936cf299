//! Engine configuration.
//!
//! Loaded from a YAML file (`metamapper.yaml`), then overridden by
//! environment variables:
//!
//! | variable | setting |
//! |---|---|
//! | `METAMAPPER_MODULE_DIR` | `mappings.module_dir` |
//! | `METAMAPPER_USER_DIR` | `mappings.user_dir` |
//! | `METAMAPPER_XSLT_PROGRAM` | `preprocess.program` |
//! | `METAMAPPER_PREPROCESS_TIMEOUT_SECS` | `preprocess.timeout_secs` |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::preprocess::PreprocessConfig;
use crate::query::Querier;

pub const MODULE_DIR_VAR: &str = "METAMAPPER_MODULE_DIR";
pub const USER_DIR_VAR: &str = "METAMAPPER_USER_DIR";
pub const XSLT_PROGRAM_VAR: &str = "METAMAPPER_XSLT_PROGRAM";
pub const PREPROCESS_TIMEOUT_VAR: &str = "METAMAPPER_PREPROCESS_TIMEOUT_SECS";

/// Error type for configuration loading
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, error: std::io::Error },
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, error } => {
                write!(f, "Failed to read config file {}: {}", path.display(), error)
            }
            ConfigError::Yaml(e) => write!(f, "Failed to parse YAML: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

/// Directories file references resolve against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingsConfig {
    /// Root of `module:` references
    pub module_dir: Option<PathBuf>,
    /// Root of `user:` references and bare paths
    pub user_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mappings: MappingsConfig,
    pub preprocess: PreprocessConfig,
    /// Query language of plain-string sources
    pub default_querier: Querier,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mappings: MappingsConfig::default(),
            preprocess: PreprocessConfig::default(),
            default_querier: Querier::Jsdot,
        }
    }
}

impl EngineConfig {
    /// Load configuration from YAML file.
    ///
    /// # Example
    /// ```ignore
    /// use metamapper::runtime::EngineConfig;
    ///
    /// let config = EngineConfig::load_from_file("metamapper.yaml")?;
    /// println!("Mappings under {:?}", config.mappings.user_dir);
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        let mut config = Self::from_yaml_str(&contents)?;

        // Relative directories are relative to the config file.
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// File configuration if given, defaults otherwise, then environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup(variable name)`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(dir) = lookup(MODULE_DIR_VAR) {
            self.mappings.module_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup(USER_DIR_VAR) {
            self.mappings.user_dir = Some(PathBuf::from(dir));
        }
        if let Some(program) = lookup(XSLT_PROGRAM_VAR) {
            self.preprocess.program = program;
        }
        if let Some(secs) = lookup(PREPROCESS_TIMEOUT_VAR) {
            self.preprocess.timeout_secs = secs.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "{} must be a number of seconds, got '{}'",
                    PREPROCESS_TIMEOUT_VAR, secs
                ))
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preprocess.program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "preprocess.program must not be empty".to_string(),
            ));
        }
        if self.preprocess.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "preprocess.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn rebase(&mut self, base: &Path) {
        for dir in [
            &mut self.mappings.module_dir,
            &mut self.mappings.user_dir,
            &mut self.preprocess.stylesheet_dir,
        ]
        .into_iter()
        .flatten()
        {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}
