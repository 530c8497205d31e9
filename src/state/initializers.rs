//! State initializers - process-wide hooks run against every new interpreter
//!
//! Design: An append-only list behind a lazily created lock. Hosts register
//! their initializers from an explicit startup routine before constructing
//! interpreters; `LuaState::new` snapshots the list so an initializer may
//! itself register more without deadlocking (they apply to later states).

use std::os::raw::c_int;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;

use super::{LuaState, Namespace};
use crate::logging::debug;
use crate::lua_stub;
use crate::stack::RawState;

/// Initializer signature
pub type InitFn = fn(&mut LuaState);

static INITIALIZERS: Lazy<RwLock<Vec<InitFn>>> = Lazy::new(|| RwLock::new(Vec::new()));

static BUILTIN: OnceCell<()> = OnceCell::new();

/// Flag guarding the `bridge` namespace preloader
pub const BRIDGE_FLAG: &str = "bridge.preloaded";

/// Append `init` to the list; it runs on every interpreter created afterwards
pub fn register(init: InitFn) {
    let mut list = INITIALIZERS.write();
    list.push(init);
    debug!(event = "initializer_register", count = list.len(), "registered state initializer");
}

/// Number of registered initializers
pub fn count() -> usize {
    INITIALIZERS.read().len()
}

pub(super) fn snapshot() -> Vec<InitFn> {
    INITIALIZERS.read().clone()
}

/// Register the crate's own initializers; safe to call repeatedly
pub fn register_builtin() {
    BUILTIN.get_or_init(|| register(install_bridge));
}

fn install_bridge(state: &mut LuaState) {
    if state.get_flag(BRIDGE_FLAG) {
        return;
    }
    state.install_namespace_preloader(
        "bridge",
        Namespace::new()
            .function("version", lua_stub!(version))
            .function("generation", lua_stub!(raw generation)),
    );
    state.set_flag(BRIDGE_FLAG, true);
}

fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

fn generation(state: RawState) -> Result<c_int, String> {
    let generation = state
        .generation()
        .ok_or_else(|| String::from("interpreter has no generation tag"))?;
    state.push_integer(generation as i64);
    Ok(1)
}
