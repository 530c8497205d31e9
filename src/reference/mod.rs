//! Reference handles - keep interpreter values alive across native calls
//!
//! Design: A bound handle owns one registry slot (`luaL_ref`), which keeps the
//! referent reachable for the collector until the slot is released.
//! - Each handle remembers the generation of the interpreter it was bound in
//! - `push` compares that generation against the pushing stack and yields nil
//!   on mismatch, so stale or foreign handles degrade to "unbound"
//! - `free` only touches the interpreter while its generation is still live
//!
//! Handles are `!Send`; they belong to the thread that drives the interpreter.


use std::marker::PhantomData;
use std::os::raw::c_int;

use mlua_sys as ffi;

use crate::error::ArgError;
use crate::logging::trace;
use crate::marshal::{FromStack, ToStack};
use crate::stack::{RawState, ValueType};
use crate::state;

#[derive(Debug)]
struct Slot {
    main: RawState,
    generation: u64,
    key: c_int,
}

/// Untyped owning handle to any interpreter value
#[derive(Debug, Default)]
pub struct Reference {
    slot: Option<Slot>,
}

impl Reference {
    /// An unbound handle
    pub const fn new() -> Self {
        Self { slot: None }
    }

    /// Capture the value on top of the stack, popping it
    ///
    /// Any previous referent is released first. Binding nil (or an empty
    /// stack) leaves the handle unbound and still succeeds.
    pub fn bind(&mut self, state: RawState) -> bool {
        if state.top() == 0 {
            self.free();
            return true;
        }
        if state.is_none_or_nil(-1) {
            state.pop(1);
            self.free();
            return true;
        }
        let Some(generation) = state.generation() else {
            state.pop(1);
            return false;
        };

        self.free();
        let key = unsafe { ffi::luaL_ref(state.as_ptr(), ffi::LUA_REGISTRYINDEX) };
        trace!(event = "reference_bind", generation, key, "bound reference");
        self.slot = Some(Slot {
            main: state.main_thread(),
            generation,
            key,
        });
        true
    }

    /// Push the referent, or nil if unbound or owned by another interpreter
    pub fn push(&self, state: RawState) -> bool {
        match &self.slot {
            Some(slot) if state.generation() == Some(slot.generation) => {
                unsafe {
                    ffi::lua_rawgeti(
                        state.as_ptr(),
                        ffi::LUA_REGISTRYINDEX,
                        slot.key as ffi::lua_Integer,
                    );
                }
                true
            }
            _ => {
                state.push_nil();
                false
            }
        }
    }

    /// Release the referent; idempotent
    pub fn free(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        if state::generation_is_live(slot.generation) {
            unsafe { ffi::luaL_unref(slot.main.as_ptr(), ffi::LUA_REGISTRYINDEX, slot.key) };
            trace!(event = "reference_free", generation = slot.generation, key = slot.key, "freed reference");
        } else {
            trace!(event = "reference_forget", generation = slot.generation, "interpreter already closed");
        }
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.slot.is_some()
    }

    /// Whether this handle is bound to a value of the interpreter owning `state`
    pub fn belongs_to(&self, state: RawState) -> bool {
        match &self.slot {
            Some(slot) => state.generation() == Some(slot.generation),
            None => false,
        }
    }

    /// Generation of the interpreter the referent lives in
    pub fn generation(&self) -> Option<u64> {
        self.slot.as_ref().map(|slot| slot.generation)
    }
}

impl Drop for Reference {
    fn drop(&mut self) {
        self.free();
    }
}

impl FromStack for Reference {
    const EXPECTED: &'static str = "value";

    fn get(state: RawState, idx: c_int) -> Option<Self> {
        let mut reference = Reference::new();
        state.push_value(idx);
        reference.bind(state).then_some(reference)
    }
}

impl ToStack for &Reference {
    fn push(self, state: RawState) {
        Reference::push(self, state);
    }
}

/// Dynamic type a typed handle accepts
pub trait RefKind {
    const TYPE: ValueType;
}

/// Marker for function handles
#[derive(Debug)]
pub enum FunctionKind {}

/// Marker for table handles
#[derive(Debug)]
pub enum TableKind {}

impl RefKind for FunctionKind {
    const TYPE: ValueType = ValueType::Function;
}

impl RefKind for TableKind {
    const TYPE: ValueType = ValueType::Table;
}

/// A handle that only ever binds values of one dynamic type
#[derive(Debug)]
pub struct TypedReference<K: RefKind> {
    inner: Reference,
    _kind: PhantomData<K>,
}

pub type FunctionReference = TypedReference<FunctionKind>;
pub type TableReference = TypedReference<TableKind>;

impl<K: RefKind> Default for TypedReference<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: RefKind> TypedReference<K> {
    pub const fn new() -> Self {
        Self {
            inner: Reference::new(),
            _kind: PhantomData,
        }
    }

    /// Capture the top value if it has the declared type, popping it either way
    ///
    /// A mismatch leaves the previous binding untouched and returns `false`.
    /// Nil always succeeds and clears the handle.
    pub fn bind(&mut self, state: RawState) -> bool {
        if state.top() == 0 || state.is_none_or_nil(-1) {
            return self.inner.bind(state);
        }
        if state.value_type(-1) != K::TYPE {
            trace!(
                event = "reference_reject",
                expected = K::TYPE.name(),
                found = state.type_name(-1),
                "typed bind rejected"
            );
            state.pop(1);
            return false;
        }
        self.inner.bind(state)
    }

    #[inline]
    pub fn push(&self, state: RawState) -> bool {
        self.inner.push(state)
    }

    #[inline]
    pub fn free(&mut self) {
        self.inner.free();
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.inner.is_bound()
    }

    #[inline]
    pub fn belongs_to(&self, state: RawState) -> bool {
        self.inner.belongs_to(state)
    }

    #[inline]
    pub fn generation(&self) -> Option<u64> {
        self.inner.generation()
    }
}

impl<K: RefKind> FromStack for TypedReference<K> {
    const EXPECTED: &'static str = K::TYPE.name();

    // nil reads as an unbound handle
    fn get(state: RawState, idx: c_int) -> Option<Self> {
        let mut reference = Self::new();
        state.push_value(idx);
        reference.bind(state).then_some(reference)
    }

    fn check(state: RawState, idx: c_int) -> Result<Self, ArgError> {
        if state.value_type(idx) != K::TYPE {
            return Err(crate::marshal::mismatch(state, idx, Self::EXPECTED));
        }
        Self::get(state, idx).ok_or_else(|| crate::marshal::mismatch(state, idx, Self::EXPECTED))
    }
}

impl<K: RefKind> ToStack for &TypedReference<K> {
    fn push(self, state: RawState) {
        TypedReference::push(self, state);
    }
}
