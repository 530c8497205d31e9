//! Script host - the boundary the embedding application drives
//!
//! Design: A `ScriptHost` owns at most one `LuaState` plus the dispatcher
//! bound to its bootstrap module. The application calls `initialize` once,
//! then `pulse`/`dispatch`/`eval` from its own loop, then `teardown`.
//!
//! Script failures go to the `DiagnosticSink`; only allocation failure and
//! bad configuration come back as errors.

mod api;
mod sink;

#[cfg(test)]
mod tests;

pub use api::{MODULE_NAME, PRELOADED_FLAG};
pub use sink::{DiagnosticSink, Severity, TracingSink};

use std::rc::Rc;
use std::time::Instant;

use crate::config::HostConfig;
use crate::dispatch::{Dispatch, EventDispatcher};
use crate::error::{BridgeError, Result, ScriptError};
use crate::logging::{debug, info, warn};
use crate::marshal::PushArgs;
use crate::stack::StackMarker;
use crate::state::LuaState;

/// Event dispatched to the bootstrap module right before teardown
pub const SHUTDOWN_EVENT: &str = "_shutdown";

pub struct ScriptHost {
    config: HostConfig,
    sink: Rc<dyn DiagnosticSink>,
    dispatcher: Rc<EventDispatcher>,
    state: Option<LuaState>,
    started: Instant,
}

impl ScriptHost {
    pub fn new(config: HostConfig, sink: Rc<dyn DiagnosticSink>) -> Self {
        let dispatcher = Rc::new(EventDispatcher::new(Rc::clone(&sink)));
        Self {
            config,
            sink,
            dispatcher,
            state: None,
            started: Instant::now(),
        }
    }

    /// Host that reports script output through `tracing`
    pub fn with_tracing(config: HostConfig) -> Self {
        Self::new(config, Rc::new(TracingSink))
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// The live interpreter, if any
    pub fn state(&self) -> Option<&LuaState> {
        self.state.as_ref()
    }

    /// Create the interpreter and load the bootstrap module
    ///
    /// Does nothing when already initialized. A bootstrap module that fails
    /// to load is reported to the sink and leaves the host running without
    /// event handlers.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state.is_some() {
            return Ok(());
        }

        let mut lua = LuaState::new()?;
        lua.set_traceback(self.config.interpreter.traceback);
        for library in &self.config.interpreter.libraries {
            lua.install_std_library(library)?;
        }
        lua.set_package_path(&self.config.module_path());

        if !lua.get_flag(PRELOADED_FLAG) {
            let context = api::HostContext {
                sink: Rc::clone(&self.sink),
                dispatcher: Rc::clone(&self.dispatcher),
                root: self.config.scripts.root.clone(),
                started: self.started,
            };
            lua.install_namespace_preloader(MODULE_NAME, api::namespace(&context));
            lua.set_flag(PRELOADED_FLAG, true);
        }

        self.load_bootstrap(&lua);
        info!(
            event = "host_initialized",
            generation = lua.generation(),
            root = %self.config.scripts.root.display(),
            "script host initialized"
        );
        self.state = Some(lua);
        Ok(())
    }

    fn load_bootstrap(&self, lua: &LuaState) {
        let bootstrap = self.config.scripts.bootstrap.as_str();
        let raw = lua.raw();
        let _marker = StackMarker::new(raw);

        match lua.require(bootstrap) {
            Ok(()) => {
                raw.push_value(-1);
                raw.set_global(bootstrap);
                if self.dispatcher.bind_handlers(raw) {
                    debug!(event = "bootstrap_loaded", module = bootstrap, "bound event handlers");
                } else {
                    warn!(
                        event = "bootstrap_not_table",
                        module = bootstrap,
                        "bootstrap module did not return a table; events are disabled"
                    );
                }
            }
            Err(err) => self.report(&err),
        }
    }

    /// Notify scripts, release every handle and close the interpreter
    pub fn teardown(&mut self) {
        let Some(lua) = self.state.take() else {
            return;
        };
        self.dispatcher.dispatch(&lua, SHUTDOWN_EVENT, ());
        self.dispatcher.free();
        let generation = lua.generation();
        drop(lua);
        info!(event = "host_teardown", generation, "script host torn down");
    }

    /// Tear down and initialize again with the same configuration
    pub fn reload(&mut self) -> Result<()> {
        self.teardown();
        self.initialize()
    }

    /// Run a chunk; `Ok(false)` means it failed and the error was reported
    pub fn eval(&self, code: &str) -> Result<bool> {
        let lua = self.state.as_ref().ok_or(BridgeError::NotInitialized)?;
        match lua.eval_with_error(code) {
            Ok(()) => Ok(true),
            Err(err) => {
                self.report(&err);
                Ok(false)
            }
        }
    }

    /// Call `Bootstrap[event](args...)`
    pub fn dispatch<A: PushArgs>(&self, event: &str, args: A) -> Result<Dispatch> {
        let lua = self.state.as_ref().ok_or(BridgeError::NotInitialized)?;
        Ok(self.dispatcher.dispatch(lua, event, args))
    }

    /// Call the callback registered with `host.event("pulse", fn)`
    pub fn pulse(&self) -> Result<Dispatch> {
        let lua = self.state.as_ref().ok_or(BridgeError::NotInitialized)?;
        Ok(self.dispatcher.dispatch_default(lua, ()))
    }

    fn report(&self, err: &ScriptError) {
        warn!(event = "script_failed", error = %err, "script error");
        self.sink
            .emit(Severity::Error, &format!("[Lua error] {}", err.message));
    }
}

impl Drop for ScriptHost {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for ScriptHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHost")
            .field("root", &self.config.scripts.root)
            .field("initialized", &self.is_initialized())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
