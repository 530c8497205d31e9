//! `luabridge` - drive a script host from the command line

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use luabridge::logging::{self, error, info, LogConfig};
use luabridge::state::initializers;
use luabridge::{BridgeError, Dispatch, HostConfig, ScriptHost};

#[derive(Parser, Debug)]
#[command(name = "luabridge", version, about = "Host Lua scripts from a TOML configuration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a host, pulse it and tear it down
    Run {
        /// Host configuration file
        #[arg(short, long, default_value = "luabridge.toml")]
        config: PathBuf,

        /// Number of pulses before teardown
        #[arg(long, default_value_t = 1)]
        ticks: u64,

        /// Delay between pulses
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },

    /// Evaluate one chunk inside a freshly initialized host
    Eval {
        code: String,

        #[arg(short, long, default_value = "luabridge.toml")]
        config: PathBuf,
    },

    /// Print the default configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match execute(cli.command) {
        Ok(code) => code,
        Err(err) => {
            error!(event = "fatal", error = %err, "luabridge failed");
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn execute(command: Command) -> Result<ExitCode, BridgeError> {
    match command {
        Command::Run {
            config,
            ticks,
            interval_ms,
        } => {
            let (mut host, _guard) = start(&config)?;
            let mut failures = 0u64;
            for tick in 0..ticks {
                if host.pulse()? == Dispatch::Failed {
                    failures += 1;
                }
                if interval_ms > 0 && tick + 1 < ticks {
                    thread::sleep(Duration::from_millis(interval_ms));
                }
            }
            host.teardown();
            info!(event = "run_complete", ticks, failures, "run finished");
            Ok(ExitCode::SUCCESS)
        }
        Command::Eval { code, config } => {
            let (mut host, _guard) = start(&config)?;
            let ok = host.eval(&code)?;
            host.teardown();
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Config => {
            print!("{}", HostConfig::generate_default());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn start(
    path: &Path,
) -> Result<(ScriptHost, Option<tracing_appender::non_blocking::WorkerGuard>), BridgeError> {
    let config = HostConfig::load_or_default(path)?;
    let guard = logging::init_with_config(LogConfig::from_settings(&config.logging).apply_env());
    info!(event = "config_loaded", path = %path.display(), "configuration loaded");

    initializers::register_builtin();
    let mut host = ScriptHost::with_tracing(config);
    host.initialize()?;
    Ok((host, guard))
}
