//! Native objects - Rust values owned by the interpreter as full userdata
//!
//! Design: Each Rust type gets one metatable, stored in the registry under a
//! key derived from its `TypeId` and carrying a `__gc` that drops the value.
//! Extraction compares the slot's metatable against that registry entry
//! before trusting the payload, so a foreign or mismatched userdata fails
//! cleanly. `TYPE_NAME` only names the type (`__name`, error messages); two
//! types sharing a name still get distinct metatables.
//!
//! Polymorphic hosts model their object family as one enum implementing
//! `NativeObject` and expose `as_*` accessors on it.

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};

use mlua_sys as ffi;

use super::{FromStack, ToStack};
use crate::logging::trace;
use crate::stack::{RawState, StackMarker, ValueType};

/// A Rust type that scripts can hold by value
pub trait NativeObject: Sized + 'static {
    /// Name shown to scripts and in argument errors
    const TYPE_NAME: &'static str;
}

/// Push wrapper: moves the value into a new userdata
pub struct Object<T>(pub T);

impl<T: NativeObject> ToStack for Object<T> {
    fn push(self, state: RawState) {
        push_boxed(state, self.0, T::TYPE_NAME);
    }
}

/// Borrowed view of a native object living on the interpreter stack
///
/// Valid while the userdata it was read from is reachable, which holds for
/// the duration of the native call that received it.
pub struct ObjectRef<T> {
    ptr: NonNull<T>,
    _marker: PhantomData<*const T>,
}

impl<T> Deref for ObjectRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef").field(&self.ptr).finish()
    }
}

impl<T: NativeObject> FromStack for ObjectRef<T> {
    const EXPECTED: &'static str = T::TYPE_NAME;

    fn get(state: RawState, idx: c_int) -> Option<Self> {
        userdata_ptr::<T>(state, idx).map(|ptr| ObjectRef {
            ptr,
            _marker: PhantomData,
        })
    }
}

/// Registry slot of the metatable for `T`
fn metatable_key<T: 'static>() -> String {
    format!("luabridge.type.{:?}", TypeId::of::<T>())
}

/// Push `value` as a userdata tagged with the metatable for `T`
///
/// `type_name` becomes the metatable's `__name`.
pub(crate) fn push_boxed<T: 'static>(state: RawState, value: T, type_name: &str) {
    unsafe {
        let slot = ffi::lua_newuserdatauv(state.as_ptr(), std::mem::size_of::<Box<T>>(), 0)
            as *mut Box<T>;
        ptr::write(slot, Box::new(value));
    }
    push_metatable::<T>(state, type_name);
    unsafe { ffi::lua_setmetatable(state.as_ptr(), -2) };
}

/// Payload of the userdata at `idx` if it was pushed as a `T`
pub(crate) fn userdata_ptr<T: 'static>(state: RawState, idx: c_int) -> Option<NonNull<T>> {
    if state.value_type(idx) != ValueType::Userdata {
        return None;
    }
    let idx = state.abs_index(idx);
    let _marker = StackMarker::new(state);

    if unsafe { ffi::lua_getmetatable(state.as_ptr(), idx) } == 0 {
        return None;
    }
    state.registry_get(&metatable_key::<T>());
    if unsafe { ffi::lua_rawequal(state.as_ptr(), -1, -2) } == 0 {
        return None;
    }

    let slot = unsafe { ffi::lua_touserdata(state.as_ptr(), idx) } as *mut Box<T>;
    if slot.is_null() {
        return None;
    }
    Some(NonNull::from(unsafe { &mut **slot }))
}

fn push_metatable<T: 'static>(state: RawState, type_name: &str) {
    let key = metatable_key::<T>();
    if state.registry_get(&key) == ValueType::Table {
        return;
    }
    state.pop(1);

    trace!(event = "metatable_new", type_name, "registering userdata metatable");
    state.new_table();
    state.push_function(drop_boxed::<T>);
    state.raw_set_field(-2, "__gc");
    state.push_str(type_name);
    state.raw_set_field(-2, "__name");
    state.push_value(-1);
    state.registry_set(&key);
}

/// `__gc` metamethod: drop the boxed payload
unsafe extern "C-unwind" fn drop_boxed<T: 'static>(l: *mut ffi::lua_State) -> c_int {
    let slot = ffi::lua_touserdata(l, 1) as *mut Box<T>;
    if !slot.is_null() {
        // A panicking destructor must not unwind into the collector
        let _ = panic::catch_unwind(AssertUnwindSafe(|| ptr::drop_in_place(slot)));
        // Untag so a resurrected userdata no longer passes the type check
        ffi::lua_pushnil(l);
        ffi::lua_setmetatable(l, 1);
    }
    0
}
