//! Namespaces - named sets of native functions exposed as one Lua table

use std::fmt;
use std::os::raw::c_int;

use mlua_sys as ffi;

use crate::marshal::{FromArgs, ToStack};
use crate::stack::RawState;
use crate::stub::{self, NativeFn};

type Entry = Box<dyn FnOnce(RawState)>;

/// Builder for a module table
///
/// Entries are pushed in insertion order; a later entry with the same name
/// replaces an earlier one.
#[derive(Default)]
pub struct Namespace {
    entries: Vec<(String, Entry)>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain `lua_CFunction`, typically from `lua_stub!`
    pub fn function(self, name: &str, func: ffi::lua_CFunction) -> Self {
        self.entry(name, Box::new(move |state| state.push_function(func)))
    }

    /// Add a closure that marshals its arguments like a typed stub
    pub fn closure<Args, F>(self, name: &'static str, func: F) -> Self
    where
        Args: FromArgs + 'static,
        F: NativeFn<Args> + 'static,
    {
        self.entry(name, Box::new(move |state| stub::push_closure(state, name, func)))
    }

    /// Add a closure that reads the stack itself
    pub fn raw_closure<F>(self, name: &'static str, func: F) -> Self
    where
        F: Fn(RawState) -> Result<c_int, String> + 'static,
    {
        self.entry(name, Box::new(move |state| stub::push_raw_closure(state, name, func)))
    }

    /// Add a constant
    pub fn value<T: ToStack + 'static>(self, name: &str, value: T) -> Self {
        self.entry(name, Box::new(move |state| value.push(state)))
    }

    // `Vec::push` spelled out: `ToStack::push` is in scope here
    fn entry(mut self, name: &str, entry: Entry) -> Self {
        Vec::push(&mut self.entries, (name.to_string(), entry));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ToStack for Namespace {
    fn push(self, state: RawState) {
        let size = c_int::try_from(self.entries.len()).unwrap_or(0);
        unsafe { ffi::lua_createtable(state.as_ptr(), 0, size) };
        for (name, entry) in self.entries {
            entry(state);
            state.raw_set_field(-2, &name);
        }
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, _)| name))
            .finish()
    }
}
