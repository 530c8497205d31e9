//! Stack marker - scoped restore point for the interpreter stack
//!
//! Create one on the Rust stack before touching the interpreter stack; on
//! every exit path (return, `?`, panic unwind) the stack is truncated back
//! to the recorded depth. Markers nest: each restores only its own interval.

use std::os::raw::c_int;

use super::RawState;

pub struct StackMarker {
    state: Option<RawState>,
    restore: c_int,
}

impl StackMarker {
    /// Record `top - reserve` as the restore point
    ///
    /// `reserve` leaves that many existing values above the restore point,
    /// so they are dropped too when the marker fires. The restore point never
    /// goes below an empty stack.
    #[inline]
    pub fn acquire(state: RawState, reserve: c_int) -> Self {
        Self {
            restore: restore_point(state, reserve),
            state: Some(state),
        }
    }

    /// Shorthand for `acquire(state, 0)`
    #[inline]
    pub fn new(state: RawState) -> Self {
        Self::acquire(state, 0)
    }

    /// Re-capture the current top (minus `reserve`) as the restore point
    pub fn reset(&mut self, reserve: c_int) {
        if let Some(state) = self.state {
            self.restore = restore_point(state, reserve);
        }
    }

    /// Disarm; the stack is left as-is when the marker drops
    pub fn abandon(&mut self) {
        self.state = None;
    }

    /// Truncate to the restore point now and disarm
    pub fn collapse(&mut self) {
        if let Some(state) = self.state.take() {
            state.set_top(self.restore);
        }
    }

    /// Restore depth recorded by this marker
    #[inline]
    pub fn depth(&self) -> c_int {
        self.restore
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.state.is_some()
    }
}

// A negative `lua_settop` index is relative to the top, not absolute
#[inline]
fn restore_point(state: RawState, reserve: c_int) -> c_int {
    (state.top() - reserve).max(0)
}

impl Drop for StackMarker {
    fn drop(&mut self) {
        self.collapse();
    }
}
