//! Error types - failures crossing the native/script boundary
//!
//! Design: Only `BridgeError::StateAlloc` is fatal. Everything else is a
//! recoverable value that callers report and move past.

use std::fmt;
use std::os::raw::c_int;
use std::path::PathBuf;

use mlua_sys as ffi;

/// Errors surfaced by the embedding layer
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to allocate a Lua state")]
    StateAlloc,

    #[error("unknown standard library {0:?}")]
    UnknownLibrary(String),

    #[error("script host is not initialized")]
    NotInitialized,

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Argument(#[from] ArgError),

    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Classification of a failed load or protected call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    Syntax,
    Runtime,
    Memory,
    Handler,
    Other,
}

impl ScriptErrorKind {
    /// Map a Lua status code to an error kind
    pub fn from_status(status: c_int) -> Self {
        match status {
            ffi::LUA_ERRSYNTAX => Self::Syntax,
            ffi::LUA_ERRRUN => Self::Runtime,
            ffi::LUA_ERRMEM => Self::Memory,
            ffi::LUA_ERRERR => Self::Handler,
            _ => Self::Other,
        }
    }
}

/// A script chunk or callback raised an error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
}

impl ScriptError {
    pub fn new(kind: ScriptErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::Runtime, message)
    }
}

/// A mandatory argument could not be converted to its declared type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgError {
    pub position: c_int,
    pub expected: &'static str,
    pub found: String,
    pub function: Option<&'static str>,
}

impl ArgError {
    pub fn new(position: c_int, expected: &'static str, found: impl Into<String>) -> Self {
        Self {
            position,
            expected,
            found: found.into(),
            function: None,
        }
    }

    /// Attach the name of the native function that rejected the argument
    pub fn in_function(mut self, name: &'static str) -> Self {
        self.function = Some(name);
        self
    }
}

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad argument #{}", self.position)?;
        if let Some(name) = self.function {
            write!(f, " to '{}'", name)?;
        }
        write!(f, " ({} expected, got {})", self.expected, self.found)
    }
}

impl std::error::Error for ArgError {}

pub type Result<T> = std::result::Result<T, BridgeError>;
