//! Tuple sequencing - marshal ordered, heterogeneous argument lists
//!
//! Position `start + i` always maps to tuple element `i`. Extraction walks
//! the tuple left to right and stops at the first slot that fails, so a
//! mismatch is reported at the position where it occurs.

use std::os::raw::c_int;

use super::{FromStack, ToStack};
use crate::error::ArgError;
use crate::stack::RawState;

/// A tuple that can be read from consecutive stack slots
pub trait FromArgs: Sized {
    const COUNT: usize;

    /// Mandatory extraction (`check` per element)
    fn extract(state: RawState, start: c_int) -> Result<Self, ArgError>;

    /// Best-effort extraction (`get` per element)
    fn get(state: RawState, start: c_int) -> Option<Self>;
}

/// A tuple whose elements can be pushed in order
pub trait PushArgs {
    /// Push every element left to right, returning how many were pushed
    fn push_all(self, state: RawState) -> c_int;
}

/// Every remaining argument from its position to the top of the stack
///
/// Only meaningful as the last element of an argument tuple.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rest<T>(pub Vec<T>);

impl<T: FromStack> FromStack for Rest<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn get(state: RawState, idx: c_int) -> Option<Self> {
        let start = state.abs_index(idx);
        (start..=state.top())
            .map(|position| T::get(state, position))
            .collect::<Option<Vec<_>>>()
            .map(Rest)
    }

    fn check(state: RawState, idx: c_int) -> Result<Self, ArgError> {
        let start = state.abs_index(idx);
        (start..=state.top())
            .map(|position| T::check(state, position))
            .collect::<Result<Vec<_>, _>>()
            .map(Rest)
    }
}

impl<T: ToStack> PushArgs for Rest<T> {
    fn push_all(self, state: RawState) -> c_int {
        let count = self.0.len() as c_int;
        for item in self.0 {
            item.push(state);
        }
        count
    }
}

macro_rules! one {
    ($name:ident) => {
        1
    };
}

macro_rules! tuple_impls {
    ($($name:ident)*) => {
        impl<$($name: FromStack,)*> FromArgs for ($($name,)*) {
            const COUNT: usize = 0 $(+ one!($name))*;

            #[allow(unused_variables, unused_mut, unused_assignments, clippy::unused_unit)]
            fn extract(state: RawState, start: c_int) -> Result<Self, ArgError> {
                let mut position = start;
                Ok(($({
                    let value = <$name as FromStack>::check(state, position)?;
                    position += 1;
                    value
                },)*))
            }

            #[allow(unused_variables, unused_mut, unused_assignments, clippy::unused_unit)]
            fn get(state: RawState, start: c_int) -> Option<Self> {
                let mut position = start;
                Some(($({
                    let value = <$name as FromStack>::get(state, position)?;
                    position += 1;
                    value
                },)*))
            }
        }

        impl<$($name: ToStack,)*> PushArgs for ($($name,)*) {
            #[allow(non_snake_case, unused_variables)]
            fn push_all(self, state: RawState) -> c_int {
                let ($($name,)*) = self;
                $($name.push(state);)*
                0 $(+ one!($name))*
            }
        }
    };
}

tuple_impls!();
tuple_impls!(A);
tuple_impls!(A B);
tuple_impls!(A B C);
tuple_impls!(A B C D);
tuple_impls!(A B C D E);
tuple_impls!(A B C D E F);
tuple_impls!(A B C D E F G);
tuple_impls!(A B C D E F G H);
tuple_impls!(A B C D E F G H I);
tuple_impls!(A B C D E F G H I J);
