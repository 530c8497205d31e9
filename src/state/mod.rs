//! Interpreter state - owns one Lua interpreter for its whole lifetime
//!
//! Design: Construction opens the base libraries, tags the registry with a
//! fresh generation, creates the flag and namespace slots and then runs every
//! registered initializer in order. Dropping the state closes the interpreter
//! and retires its generation, which turns every handle still bound to it
//! into an inert "unbound" handle.
//!
//! Script failures never escape as panics; they come back as `ScriptError`.

mod generation;
pub mod initializers;
mod namespace;


pub use generation::generation_is_live;
pub use namespace::Namespace;

use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_int;

use mlua_sys as ffi;

use crate::error::{ArgError, BridgeError, Result, ScriptError};
use crate::logging::{debug, error, info, trace};
use crate::marshal::{FromStack, PushArgs, ToStack};
use crate::stack::{RawState, StackMarker, ValueType};
use crate::stub;

/// Registry slot holding the interpreter's generation tag
pub(crate) const GENERATION_KEY: &str = "luabridge.generation";
/// Registry slot holding the per-interpreter flag table
pub(crate) const FLAGS_KEY: &str = "luabridge.stateflags";
/// Registry slot holding namespace tables awaiting their first `require`
pub(crate) const NAMESPACES_KEY: &str = "luabridge.namespaces";

const PRELOAD_KEY: &str = "_PRELOAD";
const LOADED_KEY: &str = "_LOADED";

/// Libraries opened on every interpreter
const BASE_LIBRARIES: &[(&str, ffi::lua_CFunction)] = &[
    ("_G", ffi::luaopen_base),
    ("package", ffi::luaopen_package),
    ("table", ffi::luaopen_table),
    ("string", ffi::luaopen_string),
    ("math", ffi::luaopen_math),
    ("utf8", ffi::luaopen_utf8),
];

/// Owner of one Lua interpreter
pub struct LuaState {
    raw: RawState,
    generation: u64,
    traceback: bool,
}

impl LuaState {
    /// Create an interpreter and run the registered initializers on it
    ///
    /// Failing to allocate the interpreter is the only fatal error.
    pub fn new() -> Result<Self> {
        let ptr = unsafe { ffi::luaL_newstate() };
        if ptr.is_null() {
            error!(event = "state_alloc_failed", "luaL_newstate returned null");
            return Err(BridgeError::StateAlloc);
        }

        let mut state = Self {
            raw: unsafe { RawState::from_ptr(ptr) },
            generation: generation::open(),
            traceback: false,
        };
        state.init()?;
        Ok(state)
    }

    fn init(&mut self) -> Result<()> {
        let raw = self.raw;

        raw.push_integer(self.generation as i64);
        raw.registry_set(GENERATION_KEY);
        raw.new_table();
        raw.registry_set(FLAGS_KEY);
        raw.new_table();
        raw.registry_set(NAMESPACES_KEY);

        for (name, loader) in BASE_LIBRARIES {
            self.install_global_library(name, *loader)?;
        }

        let initializers = initializers::snapshot();
        debug!(
            event = "state_init",
            generation = self.generation,
            initializers = initializers.len(),
            "running state initializers"
        );
        for init in initializers {
            init(self);
        }

        info!(event = "state_open", generation = self.generation, "Lua state created");
        Ok(())
    }

    /// Stack view of the main thread
    #[inline]
    pub fn raw(&self) -> RawState {
        self.raw
    }

    /// Generation tag of this interpreter
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Append a traceback to errors from `eval_with_error` and `pcall`
    pub fn set_traceback(&mut self, enabled: bool) {
        self.traceback = enabled;
    }

    pub fn traceback(&self) -> bool {
        self.traceback
    }

    // ------------------------------------------------------------------
    // Module system
    // ------------------------------------------------------------------

    /// Run `loader` as module `name` and publish the result as a global
    ///
    /// Mirrors `luaL_requiref` in protected mode: a module that is already
    /// loaded is left alone.
    pub fn install_global_library(&self, name: &str, loader: ffi::lua_CFunction) -> Result<()> {
        self.open_module(name, loader, true)?;
        debug!(event = "library_install", name, "installed global library");
        Ok(())
    }

    /// Open one of the optional standard libraries by name
    pub fn install_std_library(&self, name: &str) -> Result<()> {
        let loader: ffi::lua_CFunction = match name {
            "coroutine" => ffi::luaopen_coroutine,
            "os" => ffi::luaopen_os,
            "io" => ffi::luaopen_io,
            "debug" => ffi::luaopen_debug,
            _ => match BASE_LIBRARIES.iter().find(|(base, _)| *base == name) {
                Some((_, loader)) => *loader,
                None => return Err(BridgeError::UnknownLibrary(name.to_string())),
            },
        };
        self.install_global_library(name, loader)
    }

    fn open_module(&self, name: &str, loader: ffi::lua_CFunction, global: bool) -> Result<()> {
        let raw = self.raw;
        let _marker = StackMarker::new(raw);

        push_subtable(raw, LOADED_KEY);
        let loaded = raw.top();
        raw.raw_get_field(loaded, name);
        if !raw.to_bool(-1) {
            raw.pop(1);
            raw.push_function(loader);
            raw.push_str(name);
            raw.call(1, 1, false)?;
            if raw.is_none_or_nil(-1) {
                raw.pop(1);
                raw.push_bool(true);
            }
            raw.push_value(-1);
            raw.raw_set_field(loaded, name);
        }
        if global {
            raw.set_global(name);
        }
        Ok(())
    }

    /// Register `loader` in `package.preload` under `name`
    pub fn install_preloader(&self, name: &str, loader: ffi::lua_CFunction) {
        let raw = self.raw;
        let _marker = StackMarker::new(raw);
        push_subtable(raw, PRELOAD_KEY);
        raw.push_function(loader);
        raw.raw_set_field(-2, name);
        debug!(event = "preloader_install", name, "installed preloader");
    }

    /// Build `namespace` and publish it as global `name` right away
    pub fn install_namespace(&self, name: &str, namespace: Namespace) {
        let raw = self.raw;
        let _marker = StackMarker::new(raw);

        namespace.push(raw);
        push_subtable(raw, LOADED_KEY);
        raw.push_value(-2);
        raw.raw_set_field(-2, name);
        raw.pop(1);
        raw.set_global(name);
        debug!(event = "namespace_install", name, "installed namespace");
    }

    /// Register `namespace` to be built on the first `require(name)`
    ///
    /// The built table is cached in the registry, so later loads (after
    /// `package.loaded[name]` is cleared) hand out the same table.
    pub fn install_namespace_preloader(&self, name: &str, namespace: Namespace) {
        let raw = self.raw;
        let _marker = StackMarker::new(raw);

        let pending = RefCell::new(Some(namespace));
        push_subtable(raw, PRELOAD_KEY);
        stub::push_raw_closure(raw, "namespace_loader", move |state| {
            namespace_loader(state, &pending)
        });
        raw.raw_set_field(-2, name);
        debug!(event = "namespace_preload", name, "installed namespace preloader");
    }

    /// Materialize a preloaded module without going through `require`
    ///
    /// Returns `false` when nothing is registered under `name`.
    pub fn run_preloader(&self, name: &str) -> std::result::Result<bool, ScriptError> {
        let raw = self.raw;
        let _marker = StackMarker::new(raw);

        push_subtable(raw, LOADED_KEY);
        let loaded = raw.top();
        raw.raw_get_field(loaded, name);
        if raw.to_bool(-1) {
            return Ok(true);
        }
        raw.pop(1);

        push_subtable(raw, PRELOAD_KEY);
        if raw.raw_get_field(-1, name) != ValueType::Function {
            return Ok(false);
        }
        raw.push_str(name);
        raw.call(1, 1, self.traceback)?;
        if raw.is_none_or_nil(-1) {
            raw.pop(1);
            raw.push_bool(true);
        }
        raw.raw_set_field(loaded, name);
        trace!(event = "preloader_run", name, "ran preloader");
        Ok(true)
    }

    /// Call the global `require(name)`
    ///
    /// On success the module value is left on the stack; on failure the
    /// stack is unchanged.
    pub fn require(&self, name: &str) -> std::result::Result<(), ScriptError> {
        let raw = self.raw;
        let mut marker = StackMarker::new(raw);

        if raw.get_global("require") != ValueType::Function {
            return Err(ScriptError::runtime("global 'require' is not a function"));
        }
        raw.push_str(name);
        raw.call(1, 1, self.traceback)?;
        marker.abandon();
        Ok(())
    }

    /// Set `package.path`
    pub fn set_package_path(&self, path: &str) {
        let raw = self.raw;
        let _marker = StackMarker::new(raw);

        if raw.get_global("package") != ValueType::Table {
            debug!(event = "package_path_skipped", "package library not loaded");
            return;
        }
        raw.push_str(path);
        raw.raw_set_field(-2, "path");
        debug!(event = "package_path", path, "module search path set");
    }

    // ------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------

    pub fn set_flag(&self, name: &str, value: bool) {
        let raw = self.raw;
        let _marker = StackMarker::new(raw);
        push_subtable(raw, FLAGS_KEY);
        if value {
            raw.push_bool(true);
        } else {
            raw.push_nil();
        }
        raw.raw_set_field(-2, name);
    }

    pub fn get_flag(&self, name: &str) -> bool {
        let raw = self.raw;
        let _marker = StackMarker::new(raw);
        push_subtable(raw, FLAGS_KEY);
        raw.raw_get_field(-1, name);
        raw.to_bool(-1)
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Compile `code` and push the chunk
    pub fn load_string(&self, code: &str) -> std::result::Result<(), ScriptError> {
        match CString::new(code) {
            Ok(chunk_name) => self.raw.load(code, &chunk_name),
            Err(_) => self.raw.load(code, c"=(eval)"),
        }
    }

    /// Run `code`, discarding any error
    pub fn eval(&self, code: &str) -> bool {
        match self.eval_with_error(code) {
            Ok(()) => true,
            Err(err) => {
                debug!(event = "eval_failed", error = %err, "discarded script error");
                false
            }
        }
    }

    /// Run `code`, returning the error message on failure
    pub fn eval_with_error(&self, code: &str) -> std::result::Result<(), ScriptError> {
        let _marker = StackMarker::new(self.raw);
        self.load_string(code)?;
        self.raw.call(0, 0, self.traceback)
    }

    /// Protected call of the function below `nargs` arguments
    pub fn pcall(&self, nargs: c_int, nresults: c_int) -> std::result::Result<(), ScriptError> {
        self.raw.call(nargs, nresults, self.traceback)
    }

    /// Call the function on top of the stack with `args`, keeping every result
    ///
    /// Returns how many results were left on the stack.
    pub fn call<A: PushArgs>(&self, args: A) -> std::result::Result<c_int, ScriptError> {
        let base = self.raw.top() - 1;
        let nargs = args.push_all(self.raw);
        self.raw.call(nargs, ffi::LUA_MULTRET, self.traceback)?;
        Ok(self.raw.top() - base)
    }

    // ------------------------------------------------------------------
    // Marshalling shortcuts
    // ------------------------------------------------------------------

    #[inline]
    pub fn get<T: FromStack>(&self, idx: c_int) -> Option<T> {
        T::get(self.raw, idx)
    }

    #[inline]
    pub fn check<T: FromStack>(&self, idx: c_int) -> std::result::Result<T, ArgError> {
        T::check(self.raw, idx)
    }

    #[inline]
    pub fn push<T: ToStack>(&self, value: T) {
        value.push(self.raw);
    }

    #[inline]
    pub fn pop(&self, n: c_int) {
        self.raw.pop(n);
    }

    #[inline]
    pub fn top(&self) -> c_int {
        self.raw.top()
    }

    pub fn set_global<T: ToStack>(&self, name: &str, value: T) {
        value.push(self.raw);
        self.raw.set_global(name);
    }

    pub fn get_global<T: FromStack>(&self, name: &str) -> Option<T> {
        let _marker = StackMarker::new(self.raw);
        self.raw.get_global(name);
        T::get(self.raw, -1)
    }

    /// Publish a native function as global `name`
    pub fn register(&self, name: &str, func: ffi::lua_CFunction) {
        self.raw.push_function(func);
        self.raw.set_global(name);
    }
}

impl Drop for LuaState {
    fn drop(&mut self) {
        // Retire first so handles released by finalizers never touch a closing state
        generation::retire(self.generation);
        unsafe { ffi::lua_close(self.raw.as_ptr()) };
        info!(event = "state_close", generation = self.generation, "Lua state closed");
    }
}

/// Push `registry[key]`, creating it as an empty table if missing
fn push_subtable(raw: RawState, key: &str) {
    if raw.registry_get(key) == ValueType::Table {
        return;
    }
    raw.pop(1);
    raw.new_table();
    raw.push_value(-1);
    raw.registry_set(key);
}

/// `package.preload` body for namespaces: build once, then reuse
fn namespace_loader(
    state: RawState,
    pending: &RefCell<Option<Namespace>>,
) -> std::result::Result<c_int, String> {
    let name = state
        .to_string_lossy(1)
        .ok_or_else(|| String::from("module name expected"))?;

    push_subtable(state, NAMESPACES_KEY);
    if state.raw_get_field(-1, &name) == ValueType::Table {
        return Ok(1);
    }
    state.pop(1);

    let namespace = pending
        .borrow_mut()
        .take()
        .ok_or_else(|| format!("namespace '{}' is not available", name))?;
    trace!(event = "namespace_build", name = %name, entries = namespace.len(), "building namespace");
    namespace.push(state);
    state.push_value(-1);
    state.raw_set_field(-3, &name);
    Ok(1)
}
