//! luabridge - embedding layer between Rust hosts and an embedded Lua interpreter
//!
//! Design: Lua 5.4 through its raw C API, with four guarantees layered on top:
//! - Values cross the boundary through one trait impl per type (`marshal`)
//! - The stack depth is restored on every exit path (`stack::StackMarker`)
//! - Script values outlive native calls through registry handles (`reference`)
//! - Native functions become interpreter entry points at compile time (`stub`)

// Core modules
pub mod error;
pub mod marshal;
pub mod reference;
pub mod stack;
pub mod state;
pub mod stub;

// Host boundary
pub mod config;
pub mod dispatch;
pub mod host;
pub mod logging;

/// Raw Lua C API, for stubs written against the interpreter directly
pub use mlua_sys as ffi;

// Re-export commonly used items
pub use config::HostConfig;
pub use dispatch::{Dispatch, EventDispatcher};
pub use error::{ArgError, BridgeError, Result, ScriptError, ScriptErrorKind};
pub use host::{DiagnosticSink, ScriptHost, Severity, TracingSink};
pub use marshal::{
    FromArgs, FromStack, Marshal, NativeObject, Nil, Object, ObjectRef, PushArgs, Rest, ToStack,
};
pub use reference::{FunctionReference, Reference, TableReference, TypedReference};
pub use stack::{RawState, StackMarker, ValueType};
pub use state::{LuaState, Namespace};
pub use stub::{NativeFn, StubReturn};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
