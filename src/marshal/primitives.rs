//! Scalar, string, optional and sequence conversions
//!
//! Integers require an exact integer representation that fits the target
//! type: `3.0` converts, `3.5` and out-of-range values do not. Floats accept
//! any number or numeric string. `bool` follows Lua truthiness and never fails.

use std::os::raw::c_int;

use super::{FromStack, ToStack};
use crate::stack::{RawState, StackMarker, ValueType};

impl FromStack for bool {
    const EXPECTED: &'static str = "boolean";

    #[inline]
    fn get(state: RawState, idx: c_int) -> Option<Self> {
        Some(state.to_bool(idx))
    }
}

impl ToStack for bool {
    #[inline]
    fn push(self, state: RawState) {
        state.push_bool(self);
    }
}

macro_rules! integer_marshal {
    ($($ty:ty),* $(,)?) => {$(
        impl FromStack for $ty {
            const EXPECTED: &'static str = "integer";

            #[inline]
            fn get(state: RawState, idx: c_int) -> Option<Self> {
                state.to_integer(idx).and_then(|value| <$ty>::try_from(value).ok())
            }
        }

        impl ToStack for $ty {
            #[inline]
            fn push(self, state: RawState) {
                state.push_integer(i64::from(self));
            }
        }
    )*};
}

integer_marshal!(i8, i16, i32, i64, u8, u16, u32);

impl FromStack for f64 {
    const EXPECTED: &'static str = "number";

    #[inline]
    fn get(state: RawState, idx: c_int) -> Option<Self> {
        state.to_number(idx)
    }
}

impl ToStack for f64 {
    #[inline]
    fn push(self, state: RawState) {
        state.push_number(self);
    }
}

impl FromStack for f32 {
    const EXPECTED: &'static str = "number";

    #[inline]
    fn get(state: RawState, idx: c_int) -> Option<Self> {
        state.to_number(idx).map(|value| value as f32)
    }
}

impl ToStack for f32 {
    #[inline]
    fn push(self, state: RawState) {
        state.push_number(f64::from(self));
    }
}

// Strings and numbers both convert; the bytes must be valid UTF-8.
impl FromStack for String {
    const EXPECTED: &'static str = "string";

    fn get(state: RawState, idx: c_int) -> Option<Self> {
        state.to_bytes(idx).and_then(|bytes| String::from_utf8(bytes).ok())
    }
}

impl ToStack for String {
    #[inline]
    fn push(self, state: RawState) {
        state.push_str(&self);
    }
}

impl ToStack for &str {
    #[inline]
    fn push(self, state: RawState) {
        state.push_str(self);
    }
}

impl ToStack for &String {
    #[inline]
    fn push(self, state: RawState) {
        state.push_str(self);
    }
}

/// The nil value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Nil;

impl FromStack for Nil {
    const EXPECTED: &'static str = "nil";

    fn get(state: RawState, idx: c_int) -> Option<Self> {
        state.is_none_or_nil(idx).then_some(Nil)
    }
}

impl ToStack for Nil {
    #[inline]
    fn push(self, state: RawState) {
        state.push_nil();
    }
}

// nil and absent slots map to `None`; anything else must convert to `T`.
impl<T: FromStack> FromStack for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn get(state: RawState, idx: c_int) -> Option<Self> {
        if state.is_none_or_nil(idx) {
            Some(None)
        } else {
            T::get(state, idx).map(Some)
        }
    }

    fn check(state: RawState, idx: c_int) -> Result<Self, crate::error::ArgError> {
        if state.is_none_or_nil(idx) {
            Ok(None)
        } else {
            T::check(state, idx).map(Some)
        }
    }
}

impl<T: ToStack> ToStack for Option<T> {
    fn push(self, state: RawState) {
        match self {
            Some(value) => value.push(state),
            None => state.push_nil(),
        }
    }
}

// Sequences map to the array part `t[1..=#t]` of a table.
impl<T: FromStack> FromStack for Vec<T> {
    const EXPECTED: &'static str = "table";

    fn get(state: RawState, idx: c_int) -> Option<Self> {
        if state.value_type(idx) != ValueType::Table {
            return None;
        }
        let table = state.abs_index(idx);
        let len = state.raw_len(table);
        let _marker = StackMarker::new(state);

        (1..=len as i64)
            .map(|n| {
                state.raw_get_index(table, n);
                let item = T::get(state, -1);
                state.pop(1);
                item
            })
            .collect()
    }
}

impl<T: ToStack> ToStack for Vec<T> {
    fn push(self, state: RawState) {
        state.new_table();
        for (n, item) in self.into_iter().enumerate() {
            item.push(state);
            state.raw_set_index(-2, n as i64 + 1);
        }
    }
}
