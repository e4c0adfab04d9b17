//! autotest.toml configuration
//!
//! Every key is optional; command-line flags override file values.
//!
//! ```toml
//! marker = "@impure"
//! definition_pattern = 'function (\w+)\('
//! sources = ["src/mymod.js"]
//! dialect = "jasmine"
//! test_output = "test/autotest.js"
//! runner = ["npx", "jasmine", "{file}"]
//! ```

use crate::annotation::{DEFAULT_DEFINITION_PATTERN, DEFAULT_MARKER};
use crate::synthesizer::{Dialect, DEFAULT_MODULE_LOADER};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "autotest.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutotestConfig {
    /// Comment token flagging the next definition as impure
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Regex matching a function definition line; group 1 is the name
    #[serde(default = "default_definition_pattern")]
    pub definition_pattern: String,

    /// Source files scanned for impure annotations
    pub sources: Vec<PathBuf>,

    /// Framework of the generated suite
    pub dialect: Dialect,

    /// Where the generated suite is written (dialect default when unset)
    pub test_output: Option<PathBuf>,

    /// Loader function used by generated Rust tests
    #[serde(default = "default_module_loader")]
    pub module_loader: String,

    /// Runner command (dialect default when unset)
    pub runner: Option<Vec<String>>,
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}

fn default_definition_pattern() -> String {
    DEFAULT_DEFINITION_PATTERN.to_string()
}

fn default_module_loader() -> String {
    DEFAULT_MODULE_LOADER.to_string()
}

impl Default for AutotestConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            definition_pattern: default_definition_pattern(),
            sources: Vec::new(),
            dialect: Dialect::default(),
            test_output: None,
            module_loader: default_module_loader(),
            runner: None,
        }
    }
}

impl AutotestConfig {
    /// Parse a config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        if let Some(runner) = &config.runner {
            if runner.is_empty() {
                bail!("runner must name a program");
            }
        }
        Ok(config)
    }

    /// Explicit path, else `autotest.toml` in the working directory, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                tracing::debug!("using {}", DEFAULT_CONFIG_FILE);
                Self::from_file(DEFAULT_CONFIG_FILE)
            }
            None => Ok(Self::default()),
        }
    }

    /// Generated suite location
    pub fn test_output_path(&self) -> PathBuf {
        match &self.test_output {
            Some(path) => path.clone(),
            None => match self.dialect {
                Dialect::Jasmine => PathBuf::from("test/autotest.js"),
                Dialect::Rust => PathBuf::from("tests/autotest_generated.rs"),
            },
        }
    }

    /// Runner command for the configured dialect
    pub fn runner_command(&self) -> Vec<String> {
        self.runner
            .clone()
            .unwrap_or_else(|| crate::runner::default_runner(self.dialect))
    }
}
