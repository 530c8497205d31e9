//! The `host` module - script-facing functions backed by host state
//!
//! Every function is a closure owning clones of the shared host pieces, so
//! the module table stays valid for exactly as long as the interpreter does.

use std::ffi::CString;
use std::fs;
use std::os::raw::c_int;
use std::path::{Component, Path, PathBuf};
use std::ptr;
use std::rc::Rc;
use std::time::Instant;

use mlua_sys as ffi;

use super::{DiagnosticSink, Severity};
use crate::dispatch::EventDispatcher;
use crate::logging::debug;
use crate::marshal::{FromStack, Rest};
use crate::reference::FunctionReference;
use crate::stack::RawState;
use crate::state::Namespace;

/// Module name scripts `require`
pub const MODULE_NAME: &str = "host";

/// Flag guarding the one-time preloader install
pub const PRELOADED_FLAG: &str = "host.preloaded";

/// Events scripts may subscribe to through `host.event`
const DEFAULT_EVENT: &str = "pulse";

/// Shared pieces the module functions close over
#[derive(Clone)]
pub(crate) struct HostContext {
    pub sink: Rc<dyn DiagnosticSink>,
    pub dispatcher: Rc<EventDispatcher>,
    pub root: PathBuf,
    pub started: Instant,
}

pub(crate) fn namespace(ctx: &HostContext) -> Namespace {
    let print_sink = Rc::clone(&ctx.sink);
    let log_sink = Rc::clone(&ctx.sink);
    let dispatcher = Rc::clone(&ctx.dispatcher);
    let started = ctx.started;
    let load_root = ctx.root.clone();
    let save_root = ctx.root.clone();

    Namespace::new()
        .closure("print", move |Rest(parts): Rest<String>| {
            print_sink.emit(Severity::Print, &parts.concat());
        })
        .raw_closure("log", move |state| {
            let Rest(parts) = Rest::<String>::check(state, 1)
                .map_err(|err| err.in_function("log").to_string())?;
            let line = format!("{}{}", caller_tag(state), parts.concat());
            log_sink.emit(Severity::Log, &line);
            Ok(0)
        })
        .closure("event", move |name: String, handler: Option<FunctionReference>| {
            if name != DEFAULT_EVENT {
                return Err(format!("bad argument #1 to 'event' (invalid event name '{}')", name));
            }
            dispatcher.set_default(handler.unwrap_or_default());
            Ok(())
        })
        .closure("clock", move || started.elapsed().as_secs_f64())
        .raw_closure("load", move |state| load_chunk(state, &load_root))
        .closure("saveconfig", move |name: String, data: String| {
            save_config(&save_root, &name, &data)
        })
}

/// ` <Lua: source@line> ` for the calling script, or nothing
fn caller_tag(state: RawState) -> String {
    location_tag(&state.location(1))
}

/// Reformat a `luaL_where` location (`source:line: `)
fn location_tag(location: &str) -> String {
    match location.trim_end().trim_end_matches(':').rsplit_once(':') {
        Some((source, line)) => format!(" <Lua: {}@{}> ", source, line),
        None => String::new(),
    }
}

fn load_chunk(state: RawState, root: &Path) -> Result<c_int, String> {
    let name = String::check(state, 1).map_err(|err| err.in_function("load").to_string())?;
    let relative = script_relative_path(&name)?;
    let path = root.join(relative);
    let path = CString::new(path.to_string_lossy().into_owned())
        .map_err(|_| format!("invalid script name '{}'", name))?;

    let status = unsafe { ffi::luaL_loadfilex(state.as_ptr(), path.as_ptr(), ptr::null()) };
    if status == ffi::LUA_OK {
        debug!(event = "script_load", name = %name, "compiled script file");
        Ok(1)
    } else {
        let message = state.error_message(-1);
        state.pop(1);
        Err(message)
    }
}

/// Validate a script name relative to the scripts root
pub(crate) fn script_relative_path(name: &str) -> Result<&Path, String> {
    let path = Path::new(name);
    let escapes = path
        .components()
        .any(|part| !matches!(part, Component::Normal(_) | Component::CurDir));
    if name.is_empty() || escapes {
        Err(format!("script name '{}' must stay inside the scripts root", name))
    } else {
        Ok(path)
    }
}

/// Validate a config name; it becomes `<root>/<name>.config.lua`
pub(crate) fn config_file_name(name: &str) -> Result<String, String> {
    let invalid = name.is_empty()
        || name.contains("..")
        || name.contains(['/', '\\', ':', '\0']);
    if invalid {
        Err(format!("invalid config name '{}'", name))
    } else {
        Ok(format!("{}.config.lua", name))
    }
}

fn save_config(root: &Path, name: &str, data: &str) -> Result<(), String> {
    let file = root.join(config_file_name(name)?);
    fs::write(&file, data).map_err(|err| format!("couldn't save file: {}", err))?;
    debug!(event = "config_save", path = %file.display(), "saved script config");
    Ok(())
}
