//! Static stubs - interpreter-callable trampolines for native functions
//!
//! Design: `lua_stub!(path)` expands to one `extern "C-unwind"` function per
//! native function, with the function itself bound as a constant. The stub
//! extracts the call arguments with `FromArgs` (mandatory semantics), calls
//! the function and pushes whatever `StubReturn` says it returns.
//!
//! Error discipline: everything that can fail is carried as a `Result` up to
//! `invoke_raw`, which owns no values with destructors by the time it raises
//! the Lua error. Panics are caught and re-raised as Lua errors.


use std::any::Any;
use std::fmt::Display;
use std::os::raw::c_int;
use std::panic::{self, AssertUnwindSafe};

use mlua_sys as ffi;

use crate::marshal::{push_boxed, userdata_ptr, FromArgs, PushArgs, Rest, ToStack};
use crate::stack::RawState;

/// Values a native function may hand back to the interpreter
pub trait StubReturn {
    /// Push the results, returning how many were pushed
    fn push_returns(self, state: RawState) -> Result<c_int, String>;
}

impl StubReturn for () {
    #[inline]
    fn push_returns(self, _state: RawState) -> Result<c_int, String> {
        Ok(0)
    }
}

impl<T: ToStack> StubReturn for T {
    #[inline]
    fn push_returns(self, state: RawState) -> Result<c_int, String> {
        self.push(state);
        Ok(1)
    }
}

impl<T: ToStack> StubReturn for Rest<T> {
    fn push_returns(self, state: RawState) -> Result<c_int, String> {
        if !state.ensure_stack(self.0.len() as c_int) {
            return Err(format!("too many results ({})", self.0.len()));
        }
        Ok(self.push_all(state))
    }
}

impl<T: StubReturn, E: Display> StubReturn for Result<T, E> {
    fn push_returns(self, state: RawState) -> Result<c_int, String> {
        match self {
            Ok(value) => value.push_returns(state),
            Err(err) => Err(err.to_string()),
        }
    }
}

macro_rules! multi_return {
    ($($name:ident)+) => {
        impl<$($name: ToStack,)+> StubReturn for ($($name,)+) {
            #[inline]
            fn push_returns(self, state: RawState) -> Result<c_int, String> {
                Ok(self.push_all(state))
            }
        }
    };
}

multi_return!(A B);
multi_return!(A B C);
multi_return!(A B C D);

/// A Rust callable usable as a stub body, keyed by its argument tuple
pub trait NativeFn<Args> {
    type Output: StubReturn;

    fn call(&self, args: Args) -> Self::Output;
}

macro_rules! native_fn {
    ($($name:ident)*) => {
        impl<Func, Ret, $($name,)*> NativeFn<($($name,)*)> for Func
        where
            Func: Fn($($name),*) -> Ret,
            Ret: StubReturn,
        {
            type Output = Ret;

            #[allow(non_snake_case)]
            #[inline]
            fn call(&self, ($($name,)*): ($($name,)*)) -> Ret {
                self($($name),*)
            }
        }
    };
}

native_fn!();
native_fn!(A);
native_fn!(A B);
native_fn!(A B C);
native_fn!(A B C D);
native_fn!(A B C D E);
native_fn!(A B C D E F);
native_fn!(A B C D E F G);
native_fn!(A B C D E F G H);
native_fn!(A B C D E F G H I);
native_fn!(A B C D E F G H I J);

/// Generate an interpreter-callable stub for a native function
///
/// `lua_stub!(path)` marshals arguments and results through the function's
/// signature. `lua_stub!(raw path)` wraps `fn(RawState) -> Result<c_int, String>`
/// for functions that read the stack themselves.
#[macro_export]
macro_rules! lua_stub {
    (raw $func:path) => {{
        unsafe extern "C-unwind" fn stub(l: *mut $crate::ffi::lua_State) -> ::std::os::raw::c_int {
            $crate::stub::invoke_raw(l, stringify!($func), $func)
        }
        stub as $crate::ffi::lua_CFunction
    }};
    ($func:path) => {{
        unsafe extern "C-unwind" fn stub(l: *mut $crate::ffi::lua_State) -> ::std::os::raw::c_int {
            $crate::stub::invoke(l, stringify!($func), $func)
        }
        stub as $crate::ffi::lua_CFunction
    }};
}

/// Body of a typed stub
///
/// # Safety
/// Must only be called from a `lua_CFunction` with the interpreter's `l`.
pub unsafe fn invoke<Args, F>(l: *mut ffi::lua_State, name: &'static str, func: F) -> c_int
where
    Args: FromArgs,
    F: NativeFn<Args>,
{
    invoke_raw(l, name, move |state| call_native(state, name, &func))
}

/// Body of a raw stub
///
/// # Safety
/// Must only be called from a `lua_CFunction` with the interpreter's `l`.
pub unsafe fn invoke_raw<F>(l: *mut ffi::lua_State, name: &'static str, body: F) -> c_int
where
    F: FnOnce(RawState) -> Result<c_int, String>,
{
    let state = RawState::from_ptr(l);
    let message = match panic::catch_unwind(AssertUnwindSafe(|| body(state))) {
        Ok(Ok(results)) => return results,
        Ok(Err(message)) => message,
        Err(payload) => format!("panic in '{}': {}", name, panic_message(payload.as_ref())),
    };
    raise(state, message)
}

fn call_native<Args, F>(state: RawState, name: &'static str, func: &F) -> Result<c_int, String>
where
    Args: FromArgs,
    F: NativeFn<Args>,
{
    let args = Args::extract(state, 1).map_err(|err| err.in_function(name).to_string())?;
    func.call(args).push_returns(state)
}

/// Raise `message` as a Lua error, prefixed with the calling script location
///
/// Never returns; the `c_int` only satisfies the `lua_CFunction` shape.
#[allow(unreachable_code)]
pub(crate) unsafe fn raise(state: RawState, message: String) -> c_int {
    let located = format!("{}{}", state.location(1), message);
    drop(message);
    state.push_str(&located);
    drop(located);
    ffi::lua_error(state.as_ptr());
    0
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

// ----------------------------------------------------------------------
// Closures
// ----------------------------------------------------------------------

struct Closure<F> {
    name: &'static str,
    func: F,
}

const CLOSURE_NAME: &str = "luabridge.closure";

/// Push a Lua function that owns `func` and marshals like a typed stub
pub fn push_closure<Args, F>(state: RawState, name: &'static str, func: F)
where
    Args: FromArgs + 'static,
    F: NativeFn<Args> + 'static,
{
    push_boxed(state, Closure { name, func }, CLOSURE_NAME);
    unsafe { ffi::lua_pushcclosure(state.as_ptr(), closure_trampoline::<Args, F>, 1) };
}

/// Push a Lua function that owns a raw stack-level body
pub fn push_raw_closure<F>(state: RawState, name: &'static str, func: F)
where
    F: Fn(RawState) -> Result<c_int, String> + 'static,
{
    push_boxed(state, Closure { name, func }, CLOSURE_NAME);
    unsafe { ffi::lua_pushcclosure(state.as_ptr(), raw_closure_trampoline::<F>, 1) };
}

unsafe fn closure_payload<'a, F: 'static>(l: *mut ffi::lua_State) -> Option<&'a Closure<F>> {
    userdata_ptr::<Closure<F>>(RawState::from_ptr(l), ffi::lua_upvalueindex(1))
        .map(|ptr| &*ptr.as_ptr())
}

unsafe extern "C-unwind" fn closure_trampoline<Args, F>(l: *mut ffi::lua_State) -> c_int
where
    Args: FromArgs,
    F: NativeFn<Args> + 'static,
{
    match closure_payload::<F>(l) {
        Some(closure) => invoke_raw(l, closure.name, |state| {
            call_native(state, closure.name, &closure.func)
        }),
        None => raise(RawState::from_ptr(l), String::from("native closure lost its state")),
    }
}

unsafe extern "C-unwind" fn raw_closure_trampoline<F>(l: *mut ffi::lua_State) -> c_int
where
    F: Fn(RawState) -> Result<c_int, String> + 'static,
{
    match closure_payload::<F>(l) {
        Some(closure) => invoke_raw(l, closure.name, |state| (closure.func)(state)),
        None => raise(RawState::from_ptr(l), String::from("native closure lost its state")),
    }
}
