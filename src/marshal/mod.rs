//! Type marshalling - per-type conversions between Rust values and stack slots
//!
//! Design: One trait impl per Rust type, resolved statically at the call site.
//! - `FromStack` reads a slot (`get` is best-effort, `check` is mandatory)
//! - `ToStack` pushes exactly one value
//! - `Marshal` is any type that does both
//!
//! Neither direction has a net effect on stack depth beyond the single push.

mod object;
mod primitives;
mod tuple;

#[cfg(test)]
mod tests;

pub use object::{NativeObject, Object, ObjectRef};
pub use primitives::Nil;
pub use tuple::{FromArgs, PushArgs, Rest};

pub(crate) use object::{push_boxed, userdata_ptr};

use std::os::raw::c_int;

use crate::error::ArgError;
use crate::stack::RawState;

/// Read a Rust value from a stack slot
pub trait FromStack: Sized {
    /// Type name used in argument errors
    const EXPECTED: &'static str;

    /// Convert the value at `idx`, or `None` if its dynamic type does not fit
    fn get(state: RawState, idx: c_int) -> Option<Self>;

    /// Like `get`, but a mismatch becomes an argument error
    fn check(state: RawState, idx: c_int) -> Result<Self, ArgError> {
        Self::get(state, idx).ok_or_else(|| mismatch(state, idx, Self::EXPECTED))
    }
}

/// Push a Rust value as exactly one stack value
pub trait ToStack {
    fn push(self, state: RawState);
}

/// Bidirectional marshalling
pub trait Marshal: FromStack + ToStack {}

impl<T: FromStack + ToStack> Marshal for T {}

/// Argument error describing the slot at `idx`
pub(crate) fn mismatch(state: RawState, idx: c_int, expected: &'static str) -> ArgError {
    ArgError::new(state.abs_index(idx), expected, state.type_name(idx))
}

#[inline]
pub fn get<T: FromStack>(state: RawState, idx: c_int) -> Option<T> {
    T::get(state, idx)
}

#[inline]
pub fn get_or<T: FromStack>(state: RawState, idx: c_int, default: T) -> T {
    T::get(state, idx).unwrap_or(default)
}

#[inline]
pub fn check<T: FromStack>(state: RawState, idx: c_int) -> Result<T, ArgError> {
    T::check(state, idx)
}

#[inline]
pub fn push<T: ToStack>(state: RawState, value: T) {
    value.push(state);
}
