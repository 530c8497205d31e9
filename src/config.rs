//! Host configuration - TOML file describing the scripts root and interpreter
//!
//! ```toml
//! [scripts]
//! root = "lua"
//! bootstrap = "Core"
//!
//! [interpreter]
//! libraries = ["coroutine"]
//! traceback = true
//!
//! [logging]
//! level = "debug"
//! format = "compact"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::logging::LogFormat;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub scripts: ScriptsConfig,

    #[serde(default)]
    pub interpreter: InterpreterConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Directory every module path pattern is rooted at
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Module required at startup; its table receives host events
    #[serde(default = "default_bootstrap")]
    pub bootstrap: String,

    /// Extra `package.path` patterns appended after the root patterns
    #[serde(default)]
    pub extra_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Standard libraries opened in addition to the base set
    #[serde(default = "default_libraries")]
    pub libraries: Vec<String>,

    #[serde(default)]
    pub traceback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            bootstrap: default_bootstrap(),
            extra_paths: Vec::new(),
        }
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            libraries: default_libraries(),
            traceback: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("lua")
}

fn default_bootstrap() -> String {
    String::from("Core")
}

fn default_libraries() -> Vec<String> {
    vec![String::from("coroutine")]
}

fn default_level() -> String {
    String::from("info")
}

impl HostConfig {
    /// Defaults with a different scripts root
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.scripts.root = root.into();
        config
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| BridgeError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| BridgeError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path`, or fall back to defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Semicolon-separated `package.path` for the scripts root
    pub fn module_path(&self) -> String {
        let root = self.scripts.root.display();
        let mut patterns = vec![
            format!("{}/?.lua", root),
            format!("{}/?/init.lua", root),
            format!("{}/lib/?.lua", root),
            format!("{}/lib/?/init.lua", root),
        ];
        patterns.extend(self.scripts.extra_paths.iter().cloned());
        patterns.join(";")
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }
}
