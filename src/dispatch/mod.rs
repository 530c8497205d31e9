//! Event dispatch - invoke script callbacks by name from the host
//!
//! Design: The dispatcher holds a table of named handlers and one default
//! ("pulse") callback, each behind its own `RefCell`. A cell is borrowed only
//! while its referent is pushed, so a handler may rebind either slot while a
//! dispatch is in flight.
//!
//! Handlers are looked up with ordinary indexing, so a handler table may
//! inherit callbacks through `__index`; the lookup runs protected.
//! Missing handlers are not errors. Failing handlers are reported to the
//! diagnostic sink and never propagate to the caller.


use std::cell::RefCell;
use std::rc::Rc;

use crate::error::ScriptError;
use crate::host::{DiagnosticSink, Severity};
use crate::logging::{trace, warn};
use crate::marshal::PushArgs;
use crate::reference::{FunctionReference, TableReference};
use crate::stack::{RawState, StackMarker, ValueType};
use crate::state::LuaState;

/// Outcome of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// No callable handler was bound; nothing ran
    NoHandler,
    Completed,
    /// The handler raised; the error went to the sink
    Failed,
}

pub struct EventDispatcher {
    sink: Rc<dyn DiagnosticSink>,
    handlers: RefCell<TableReference>,
    default: RefCell<FunctionReference>,
}

impl EventDispatcher {
    pub fn new(sink: Rc<dyn DiagnosticSink>) -> Self {
        Self {
            sink,
            handlers: RefCell::new(TableReference::new()),
            default: RefCell::new(FunctionReference::new()),
        }
    }

    /// Bind the handler table from the top of the stack (consumes it)
    pub fn bind_handlers(&self, state: RawState) -> bool {
        self.handlers.borrow_mut().bind(state)
    }

    /// Bind the default callback from the top of the stack (consumes it)
    pub fn bind_default(&self, state: RawState) -> bool {
        self.default.borrow_mut().bind(state)
    }

    /// Replace the default callback; the previous one is released
    pub fn set_default(&self, handler: FunctionReference) {
        *self.default.borrow_mut() = handler;
    }

    pub fn has_handlers(&self) -> bool {
        self.handlers.borrow().is_bound()
    }

    pub fn has_default(&self) -> bool {
        self.default.borrow().is_bound()
    }

    /// Call `handlers[event](args...)`
    pub fn dispatch<A: PushArgs>(&self, lua: &LuaState, event: &str, args: A) -> Dispatch {
        let raw = lua.raw();
        let _marker = StackMarker::new(raw);

        let pushed = self.handlers.borrow().push(raw);
        if !pushed {
            return Dispatch::NoHandler;
        }
        match raw.get_field(-1, event) {
            Ok(ValueType::Function) => {}
            Ok(_) => {
                trace!(event = "dispatch_skip", name = event, "no handler for event");
                return Dispatch::NoHandler;
            }
            Err(err) => {
                self.report(event, &err);
                return Dispatch::Failed;
            }
        }
        raw.remove(-2);
        self.call(lua, event, args)
    }

    /// Call the default callback with `args`
    pub fn dispatch_default<A: PushArgs>(&self, lua: &LuaState, args: A) -> Dispatch {
        let raw = lua.raw();
        let _marker = StackMarker::new(raw);

        let pushed = self.default.borrow().push(raw);
        if !pushed || raw.value_type(-1) != ValueType::Function {
            return Dispatch::NoHandler;
        }
        self.call(lua, "default", args)
    }

    fn call<A: PushArgs>(&self, lua: &LuaState, name: &str, args: A) -> Dispatch {
        let nargs = args.push_all(lua.raw());
        match lua.pcall(nargs, 0) {
            Ok(()) => Dispatch::Completed,
            Err(err) => {
                self.report(name, &err);
                Dispatch::Failed
            }
        }
    }

    fn report(&self, name: &str, err: &ScriptError) {
        warn!(event = "dispatch_failed", name, error = %err, "event handler raised");
        self.sink
            .emit(Severity::Error, &format!("[Lua error] {}", err.message));
    }

    /// Release both handles
    pub fn free(&self) {
        self.handlers.borrow_mut().free();
        self.default.borrow_mut().free();
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.has_handlers())
            .field("default", &self.has_default())
            .finish()
    }
}
