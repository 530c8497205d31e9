//! Script host tests

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use tempfile::TempDir;

use super::*;

#[derive(Default)]
struct RecordingSink {
    messages: RefCell<Vec<(Severity, String)>>,
}

impl RecordingSink {
    fn of(&self, severity: Severity) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .filter(|(kind, _)| *kind == severity)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, severity: Severity, message: &str) {
        self.messages.borrow_mut().push((severity, message.to_string()));
    }
}

const CORE: &str = r#"
local host = require("host")
local Core = { pulses = 0 }

host.event("pulse", function() Core.pulses = Core.pulses + 1 end)

function Core.onTick(n) Core.last = n end
function Core.onFail() error("tick failed") end
function Core._shutdown() host.print("bye") end

return Core
"#;

fn scripts(core: Option<&str>) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    if let Some(source) = core {
        fs::write(dir.path().join("Core.lua"), source).unwrap();
    }
    dir
}

fn host_at(root: &Path) -> (ScriptHost, Rc<RecordingSink>) {
    let sink = Rc::new(RecordingSink::default());
    let host = ScriptHost::new(HostConfig::with_root(root), sink.clone());
    (host, sink)
}

fn global_i64(host: &ScriptHost, code: &str) -> Option<i64> {
    let lua = host.state().unwrap();
    assert!(lua.eval(&format!("result = {}", code)));
    lua.get_global::<i64>("result")
}

#[test]
fn test_initialize_binds_bootstrap() {
    let dir = scripts(Some(CORE));
    let (mut host, sink) = host_at(dir.path());

    assert!(!host.is_initialized());
    host.initialize().unwrap();
    let generation = host.state().unwrap().generation();
    host.initialize().unwrap();
    assert_eq!(host.state().unwrap().generation(), generation);

    assert_eq!(host.dispatch("onTick", (9i64,)).unwrap(), Dispatch::Completed);
    assert_eq!(global_i64(&host, "Core.last"), Some(9));
    assert!(host.state().unwrap().get_flag(PRELOADED_FLAG));
    assert!(sink.messages.borrow().is_empty());
}

#[test]
fn test_pulse_runs_default_callback() {
    let dir = scripts(Some(CORE));
    let (mut host, _sink) = host_at(dir.path());
    host.initialize().unwrap();

    for _ in 0..3 {
        assert_eq!(host.pulse().unwrap(), Dispatch::Completed);
    }
    assert_eq!(global_i64(&host, "Core.pulses"), Some(3));

    assert!(host.eval("require('host').event('pulse', nil)").unwrap());
    assert_eq!(host.pulse().unwrap(), Dispatch::NoHandler);
}

#[test]
fn test_failing_handler_is_reported_once() {
    let dir = scripts(Some(CORE));
    let (mut host, sink) = host_at(dir.path());
    host.initialize().unwrap();

    assert_eq!(host.dispatch("onFail", ()).unwrap(), Dispatch::Failed);
    let errors = sink.of(Severity::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("[Lua error] "));
    assert!(errors[0].contains("tick failed"));

    assert_eq!(host.dispatch("onTick", (1i64,)).unwrap(), Dispatch::Completed);
    assert_eq!(host.dispatch("noSuchEvent", ()).unwrap(), Dispatch::NoHandler);
    assert_eq!(sink.of(Severity::Error).len(), 1);
}

#[test]
fn test_uninitialized_host_rejects_calls() {
    let dir = scripts(Some(CORE));
    let (host, _sink) = host_at(dir.path());

    assert!(matches!(host.eval("x = 1"), Err(BridgeError::NotInitialized)));
    assert!(matches!(host.pulse(), Err(BridgeError::NotInitialized)));
    assert!(matches!(
        host.dispatch("onTick", ()),
        Err(BridgeError::NotInitialized)
    ));
}

#[test]
fn test_missing_bootstrap_is_not_fatal() {
    let dir = scripts(None);
    let (mut host, sink) = host_at(dir.path());

    host.initialize().unwrap();
    assert!(host.is_initialized());
    let errors = sink.of(Severity::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("module 'Core' not found"));
    assert_eq!(host.dispatch("onTick", ()).unwrap(), Dispatch::NoHandler);
    assert!(host.eval("x = 1").unwrap());
}

#[test]
fn test_unknown_library_fails_initialize() {
    let dir = scripts(Some(CORE));
    let mut config = HostConfig::with_root(dir.path());
    config.interpreter.libraries.push("sockets".into());
    let mut host = ScriptHost::new(config, Rc::new(RecordingSink::default()));

    assert!(matches!(
        host.initialize(),
        Err(BridgeError::UnknownLibrary(name)) if name == "sockets"
    ));
    assert!(!host.is_initialized());
}

#[test]
fn test_teardown_dispatches_shutdown() {
    let dir = scripts(Some(CORE));
    let (mut host, sink) = host_at(dir.path());
    host.initialize().unwrap();

    host.teardown();
    assert!(!host.is_initialized());
    assert_eq!(sink.of(Severity::Print), vec!["bye".to_string()]);

    host.teardown();
    assert_eq!(sink.of(Severity::Print).len(), 1);
}

#[test]
fn test_drop_tears_down() {
    let dir = scripts(Some(CORE));
    let (mut host, sink) = host_at(dir.path());
    host.initialize().unwrap();
    drop(host);
    assert_eq!(sink.of(Severity::Print), vec!["bye".to_string()]);
}

#[test]
fn test_reload_starts_fresh() {
    let dir = scripts(Some(CORE));
    let (mut host, _sink) = host_at(dir.path());
    host.initialize().unwrap();
    let first = host.state().unwrap().generation();
    host.pulse().unwrap();
    host.pulse().unwrap();

    host.reload().unwrap();
    assert_ne!(host.state().unwrap().generation(), first);
    assert_eq!(global_i64(&host, "Core.pulses"), Some(0));
    assert_eq!(host.pulse().unwrap(), Dispatch::Completed);
    assert_eq!(global_i64(&host, "Core.pulses"), Some(1));
}

#[test]
fn test_eval_reports_errors() {
    let dir = scripts(Some(CORE));
    let (mut host, sink) = host_at(dir.path());
    host.initialize().unwrap();

    assert!(!host.eval("error('boom')").unwrap());
    assert!(!host.eval("this is not lua").unwrap());
    let errors = sink.of(Severity::Error);
    assert_eq!(errors.len(), 2);
    assert!(errors[0].contains("boom"));
}

#[test]
fn test_print_and_log() {
    let dir = scripts(Some(CORE));
    let (mut host, sink) = host_at(dir.path());
    host.initialize().unwrap();

    assert!(host.eval("require('host').print('a', 1, 'b')").unwrap());
    assert_eq!(sink.of(Severity::Print), vec!["a1b".to_string()]);

    assert!(host.eval("require('host').log('hello')").unwrap());
    let logs = sink.of(Severity::Log);
    assert_eq!(logs.len(), 1);
    assert!(logs[0].starts_with(" <Lua: "));
    assert!(logs[0].ends_with("@1> hello"));
}

#[test]
fn test_event_rejects_unknown_names() {
    let dir = scripts(Some(CORE));
    let (mut host, sink) = host_at(dir.path());
    host.initialize().unwrap();

    assert!(!host.eval("require('host').event('tick', function() end)").unwrap());
    assert!(sink.of(Severity::Error)[0].contains("invalid event name"));
    assert_eq!(host.pulse().unwrap(), Dispatch::Completed);
}

#[test]
fn test_clock_is_monotonic() {
    let dir = scripts(Some(CORE));
    let (mut host, _sink) = host_at(dir.path());
    host.initialize().unwrap();

    let lua = host.state().unwrap();
    assert!(lua.eval("local h = require('host'); a = h.clock(); b = h.clock()"));
    let a = lua.get_global::<f64>("a").unwrap();
    let b = lua.get_global::<f64>("b").unwrap();
    assert!(a >= 0.0);
    assert!(b >= a);
}

#[test]
fn test_load_compiles_scripts_under_root() {
    let dir = scripts(Some(CORE));
    fs::write(dir.path().join("helper.lua"), "return 41").unwrap();
    let (mut host, sink) = host_at(dir.path());
    host.initialize().unwrap();

    assert!(host.eval("answer = require('host').load('helper.lua')() + 1").unwrap());
    assert_eq!(global_i64(&host, "answer"), Some(42));

    assert!(!host.eval("require('host').load('../outside.lua')").unwrap());
    assert!(!host.eval("require('host').load('missing.lua')").unwrap());
    assert_eq!(sink.of(Severity::Error).len(), 2);
}

#[test]
fn test_saveconfig_writes_under_root() {
    let dir = scripts(Some(CORE));
    let (mut host, sink) = host_at(dir.path());
    host.initialize().unwrap();

    assert!(host.eval("require('host').saveconfig('hunter', 'return { range = 5 }')").unwrap());
    let saved = fs::read_to_string(dir.path().join("hunter.config.lua")).unwrap();
    assert_eq!(saved, "return { range = 5 }");

    assert!(!host.eval("require('host').saveconfig('../evil', 'x')").unwrap());
    assert!(sink.of(Severity::Error)[0].contains("invalid config name"));
}

#[test]
fn test_modules_resolve_from_lib() {
    let dir = scripts(Some("return { value = require('util').value }"));
    fs::create_dir(dir.path().join("lib")).unwrap();
    fs::write(dir.path().join("lib").join("util.lua"), "return { value = 7 }").unwrap();
    let (mut host, sink) = host_at(dir.path());
    host.initialize().unwrap();

    assert!(sink.messages.borrow().is_empty());
    assert_eq!(global_i64(&host, "Core.value"), Some(7));
}
