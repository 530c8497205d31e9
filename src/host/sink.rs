//! Diagnostic sink - where script output and script errors end up

use crate::logging::{error, info};

/// Kind of message a script or the host produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// `host.print`
    Print,
    /// `host.log`, prefixed with the caller's location
    Log,
    /// Script failures, formatted as `[Lua error] message`
    Error,
}

/// Host-side receiver for script output and failures
pub trait DiagnosticSink {
    fn emit(&self, severity: Severity, message: &str);
}

impl<F> DiagnosticSink for F
where
    F: Fn(Severity, &str),
{
    fn emit(&self, severity: Severity, message: &str) {
        self(severity, message)
    }
}

/// Forwards everything to `tracing` under the `luabridge::script` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Print => info!(target: "luabridge::script", kind = "print", "{}", message),
            Severity::Log => info!(target: "luabridge::script", kind = "log", "{}", message),
            Severity::Error => error!(target: "luabridge::script", "{}", message),
        }
    }
}
