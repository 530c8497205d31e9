//! Stack access - safe view over a live interpreter's operand stack
//!
//! Design: `RawState` is a `Copy` newtype over `*mut lua_State`. The only
//! unsafe step is constructing one; every method afterwards relies on the
//! invariant that the pointer refers to a live interpreter (or one of its
//! threads). Table access on behalf of the host is raw so metamethods can
//! never raise through Rust frames.

mod marker;


pub use marker::StackMarker;

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::ptr::{self, NonNull};

use mlua_sys as ffi;

use crate::error::{ScriptError, ScriptErrorKind};
use crate::state::GENERATION_KEY;

/// Dynamic type of a stack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    None,
    Nil,
    Boolean,
    LightUserdata,
    Number,
    String,
    Table,
    Function,
    Userdata,
    Thread,
}

impl ValueType {
    pub fn from_raw(tag: c_int) -> Self {
        match tag {
            ffi::LUA_TNIL => Self::Nil,
            ffi::LUA_TBOOLEAN => Self::Boolean,
            ffi::LUA_TLIGHTUSERDATA => Self::LightUserdata,
            ffi::LUA_TNUMBER => Self::Number,
            ffi::LUA_TSTRING => Self::String,
            ffi::LUA_TTABLE => Self::Table,
            ffi::LUA_TFUNCTION => Self::Function,
            ffi::LUA_TUSERDATA => Self::Userdata,
            ffi::LUA_TTHREAD => Self::Thread,
            _ => Self::None,
        }
    }

    /// Name as Lua reports it in error messages
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "no value",
            Self::Nil => "nil",
            Self::Boolean => "boolean",
            Self::LightUserdata | Self::Userdata => "userdata",
            Self::Number => "number",
            Self::String => "string",
            Self::Table => "table",
            Self::Function => "function",
            Self::Thread => "thread",
        }
    }

    #[inline]
    pub const fn is_none_or_nil(self) -> bool {
        matches!(self, Self::None | Self::Nil)
    }
}

/// Borrowed handle to an interpreter stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawState(NonNull<ffi::lua_State>);

impl RawState {
    /// Wrap a raw interpreter pointer
    ///
    /// # Safety
    /// `ptr` must be non-null and stay valid for every use of the returned
    /// value (and of its copies).
    #[inline]
    pub unsafe fn from_ptr(ptr: *mut ffi::lua_State) -> Self {
        debug_assert!(!ptr.is_null(), "null lua_State");
        Self(NonNull::new_unchecked(ptr))
    }

    #[inline]
    pub fn as_ptr(self) -> *mut ffi::lua_State {
        self.0.as_ptr()
    }

    // ------------------------------------------------------------------
    // Depth
    // ------------------------------------------------------------------

    #[inline]
    pub fn top(self) -> c_int {
        unsafe { ffi::lua_gettop(self.as_ptr()) }
    }

    #[inline]
    pub fn set_top(self, idx: c_int) {
        unsafe { ffi::lua_settop(self.as_ptr(), idx) }
    }

    /// Pop `n` values; non-positive counts are ignored
    #[inline]
    pub fn pop(self, n: c_int) {
        if n > 0 {
            self.set_top(-n - 1);
        }
    }

    #[inline]
    pub fn abs_index(self, idx: c_int) -> c_int {
        unsafe { ffi::lua_absindex(self.as_ptr(), idx) }
    }

    /// Make room for `extra` more slots
    pub fn ensure_stack(self, extra: c_int) -> bool {
        unsafe { ffi::lua_checkstack(self.as_ptr(), extra) != 0 }
    }

    #[inline]
    pub fn push_value(self, idx: c_int) {
        unsafe { ffi::lua_pushvalue(self.as_ptr(), idx) }
    }

    /// Move the top value into position `idx`, shifting the rest up
    pub fn insert(self, idx: c_int) {
        unsafe { ffi::lua_rotate(self.as_ptr(), idx, 1) }
    }

    /// Remove the value at `idx`, shifting the rest down
    pub fn remove(self, idx: c_int) {
        unsafe { ffi::lua_rotate(self.as_ptr(), idx, -1) };
        self.pop(1);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    #[inline]
    pub fn value_type(self, idx: c_int) -> ValueType {
        ValueType::from_raw(unsafe { ffi::lua_type(self.as_ptr(), idx) })
    }

    #[inline]
    pub fn type_name(self, idx: c_int) -> &'static str {
        self.value_type(idx).name()
    }

    #[inline]
    pub fn is_none_or_nil(self, idx: c_int) -> bool {
        self.value_type(idx).is_none_or_nil()
    }

    /// Lua truthiness: only `nil` and `false` are false
    #[inline]
    pub fn to_bool(self, idx: c_int) -> bool {
        unsafe { ffi::lua_toboolean(self.as_ptr(), idx) != 0 }
    }

    /// Integer value, if the slot holds an exactly representable integer
    pub fn to_integer(self, idx: c_int) -> Option<i64> {
        let mut isnum: c_int = 0;
        let value = unsafe { ffi::lua_tointegerx(self.as_ptr(), idx, &mut isnum) };
        (isnum != 0).then_some(value as i64)
    }

    pub fn to_number(self, idx: c_int) -> Option<f64> {
        let mut isnum: c_int = 0;
        let value = unsafe { ffi::lua_tonumberx(self.as_ptr(), idx, &mut isnum) };
        (isnum != 0).then_some(value as f64)
    }

    /// Bytes of a string or number slot
    ///
    /// Numbers are converted on a copy so the original slot keeps its type.
    pub fn to_bytes(self, idx: c_int) -> Option<Vec<u8>> {
        match self.value_type(idx) {
            ValueType::String => Some(self.string_bytes(idx)),
            ValueType::Number => {
                self.push_value(idx);
                let bytes = self.string_bytes(-1);
                self.pop(1);
                Some(bytes)
            }
            _ => None,
        }
    }

    pub fn to_string_lossy(self, idx: c_int) -> Option<String> {
        self.to_bytes(idx)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    fn string_bytes(self, idx: c_int) -> Vec<u8> {
        let mut len: usize = 0;
        unsafe {
            let data = ffi::lua_tolstring(self.as_ptr(), idx, &mut len);
            if data.is_null() {
                return Vec::new();
            }
            std::slice::from_raw_parts(data as *const u8, len).to_vec()
        }
    }

    /// Readable form of an error object
    pub fn error_message(self, idx: c_int) -> String {
        self.to_string_lossy(idx).unwrap_or_else(|| {
            format!("(error object is a {} value)", self.type_name(idx))
        })
    }

    // ------------------------------------------------------------------
    // Pushing
    // ------------------------------------------------------------------

    #[inline]
    pub fn push_nil(self) {
        unsafe { ffi::lua_pushnil(self.as_ptr()) }
    }

    #[inline]
    pub fn push_bool(self, value: bool) {
        unsafe { ffi::lua_pushboolean(self.as_ptr(), value as c_int) }
    }

    #[inline]
    pub fn push_integer(self, value: i64) {
        unsafe { ffi::lua_pushinteger(self.as_ptr(), value as ffi::lua_Integer) }
    }

    #[inline]
    pub fn push_number(self, value: f64) {
        unsafe { ffi::lua_pushnumber(self.as_ptr(), value as ffi::lua_Number) }
    }

    #[inline]
    pub fn push_str(self, value: &str) {
        self.push_bytes(value.as_bytes());
    }

    pub fn push_bytes(self, value: &[u8]) {
        unsafe {
            ffi::lua_pushlstring(self.as_ptr(), value.as_ptr() as *const c_char, value.len());
        }
    }

    #[inline]
    pub fn push_function(self, func: ffi::lua_CFunction) {
        unsafe { ffi::lua_pushcclosure(self.as_ptr(), func, 0) }
    }

    pub fn new_table(self) {
        unsafe { ffi::lua_createtable(self.as_ptr(), 0, 0) }
    }

    // ------------------------------------------------------------------
    // Raw tables, registry, globals
    // ------------------------------------------------------------------

    /// Push `table[key]` without invoking metamethods
    pub fn raw_get_field(self, table: c_int, key: &str) -> ValueType {
        let table = self.abs_index(table);
        self.push_str(key);
        ValueType::from_raw(unsafe { ffi::lua_rawget(self.as_ptr(), table) })
    }

    /// Push `table[key]` honoring `__index`, inside a protected call
    ///
    /// A raising metamethod comes back as the error and pushes nothing.
    pub fn get_field(self, table: c_int, key: &str) -> Result<ValueType, ScriptError> {
        let table = self.abs_index(table);
        self.push_function(protected_index);
        self.push_value(table);
        self.push_str(key);
        self.call(2, 1, false)?;
        Ok(self.value_type(-1))
    }

    /// Pop the top value into `table[key]` without invoking metamethods
    pub fn raw_set_field(self, table: c_int, key: &str) {
        let table = self.abs_index(table);
        self.push_str(key);
        self.insert(-2);
        unsafe { ffi::lua_rawset(self.as_ptr(), table) }
    }

    /// Length of a table/string without `__len`
    pub fn raw_len(self, idx: c_int) -> usize {
        unsafe { ffi::lua_rawlen(self.as_ptr(), idx) as usize }
    }

    /// Push `table[n]` without invoking metamethods
    pub fn raw_get_index(self, table: c_int, n: i64) -> ValueType {
        ValueType::from_raw(unsafe {
            ffi::lua_rawgeti(self.as_ptr(), table, n as ffi::lua_Integer)
        })
    }

    /// Pop the top value into `table[n]` without invoking metamethods
    pub fn raw_set_index(self, table: c_int, n: i64) {
        unsafe { ffi::lua_rawseti(self.as_ptr(), table, n as ffi::lua_Integer) }
    }

    pub fn registry_get(self, key: &str) -> ValueType {
        self.raw_get_field(ffi::LUA_REGISTRYINDEX, key)
    }

    pub fn registry_set(self, key: &str) {
        self.raw_set_field(ffi::LUA_REGISTRYINDEX, key);
    }

    /// Push the globals table
    pub fn push_globals(self) {
        unsafe {
            ffi::lua_rawgeti(
                self.as_ptr(),
                ffi::LUA_REGISTRYINDEX,
                ffi::LUA_RIDX_GLOBALS as ffi::lua_Integer,
            );
        }
    }

    /// Push `_G[name]` (raw access)
    pub fn get_global(self, name: &str) -> ValueType {
        self.push_globals();
        let ty = self.raw_get_field(-1, name);
        self.remove(-2);
        ty
    }

    /// Pop the top value into `_G[name]` (raw access)
    pub fn set_global(self, name: &str) {
        self.push_globals();
        self.insert(-2);
        self.raw_set_field(-2, name);
        self.pop(1);
    }

    /// Generation tag of the interpreter this stack belongs to
    pub fn generation(self) -> Option<u64> {
        self.registry_get(GENERATION_KEY);
        let generation = self.to_integer(-1).map(|g| g as u64);
        self.pop(1);
        generation
    }

    /// The interpreter's main thread (differs from `self` inside coroutines)
    pub fn main_thread(self) -> RawState {
        unsafe {
            ffi::lua_rawgeti(
                self.as_ptr(),
                ffi::LUA_REGISTRYINDEX,
                ffi::LUA_RIDX_MAINTHREAD as ffi::lua_Integer,
            );
            let main = ffi::lua_tothread(self.as_ptr(), -1);
            self.pop(1);
            if main.is_null() {
                self
            } else {
                RawState::from_ptr(main)
            }
        }
    }

    /// `source:line:` of the function at call level `level`, or empty
    pub fn location(self, level: c_int) -> String {
        unsafe { ffi::luaL_where(self.as_ptr(), level) };
        let location = self.to_string_lossy(-1).unwrap_or_default();
        self.pop(1);
        location
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// Protected call of the function below `nargs` arguments
    ///
    /// On success leaves `nresults` values; on failure leaves nothing and
    /// returns the error message.
    pub fn call(self, nargs: c_int, nresults: c_int, traceback: bool) -> Result<(), ScriptError> {
        let handler = if traceback {
            let base = self.top() - nargs;
            self.push_function(traceback_handler);
            self.insert(base);
            base
        } else {
            0
        };

        let status = unsafe { ffi::lua_pcall(self.as_ptr(), nargs, nresults, handler) };

        if handler != 0 {
            self.remove(handler);
        }

        if status == ffi::LUA_OK {
            Ok(())
        } else {
            let message = self.error_message(-1);
            self.pop(1);
            Err(ScriptError::new(ScriptErrorKind::from_status(status), message))
        }
    }

    /// Compile `code` and push the resulting chunk
    pub fn load(self, code: &str, chunk_name: &CStr) -> Result<(), ScriptError> {
        let status = unsafe {
            ffi::luaL_loadbufferx(
                self.as_ptr(),
                code.as_ptr() as *const c_char,
                code.len(),
                chunk_name.as_ptr(),
                ptr::null(),
            )
        };
        if status == ffi::LUA_OK {
            Ok(())
        } else {
            let message = self.error_message(-1);
            self.pop(1);
            Err(ScriptError::new(ScriptErrorKind::from_status(status), message))
        }
    }
}

/// Message handler that appends a stack traceback to string errors
/// `t, k -> t[k]`; only ever run under `lua_pcall`
unsafe extern "C-unwind" fn protected_index(l: *mut ffi::lua_State) -> c_int {
    ffi::lua_gettable(l, 1);
    1
}

unsafe extern "C-unwind" fn traceback_handler(l: *mut ffi::lua_State) -> c_int {
    let message = ffi::lua_tolstring(l, 1, ptr::null_mut());
    if message.is_null() {
        // Non-string error objects pass through untouched
        ffi::lua_pushvalue(l, 1);
    } else {
        ffi::luaL_traceback(l, l, message, 1);
    }
    1
}
