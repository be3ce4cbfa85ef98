//! Event interception CLI.
//!
//! Provides the `evtap` binary, which runs a JSON-encoded program on the
//! reference host with an event-logging analysis attached and prints the
//! program result plus per-kind telemetry.

mod event_log;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use evtap_analysis::registry_with;
use evtap_dispatch::{DispatchConfig, DispatchContext};
use evtap_host::{HostConfig, HostError, Interpreter, Program};

use crate::event_log::EventSink;

/// Event interception tools.
#[derive(Parser)]
#[command(name = "evtap", about = "Run programs under event interception")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program with instrumentation attached.
    Run {
        /// Path to the JSON-encoded program.
        program: PathBuf,

        /// JSON config file with `dispatch` and `host` sections.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print every analysis event.
        #[arg(long)]
        log_events: bool,

        /// Warn when tainted values reach a call.
        #[arg(long)]
        taint: bool,

        /// Start with instrumentation disabled.
        #[arg(long)]
        disabled: bool,

        /// Log and swallow analysis faults instead of exiting.
        #[arg(long)]
        ignore_analysis_faults: bool,

        /// Telemetry output format.
        #[arg(long, value_enum, default_value = "text")]
        telemetry: TelemetryFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TelemetryFormat {
    Text,
    Json,
    None,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    dispatch: DispatchConfig,
    host: HostConfig,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            program,
            config,
            log_events,
            taint,
            disabled,
            ignore_analysis_faults,
            telemetry,
        } => {
            let options = RunOptions {
                log_events,
                taint,
                disabled,
                ignore_analysis_faults,
                telemetry,
            };
            process::exit(run_program(&program, config.as_deref(), &options));
        }
    }
}

struct RunOptions {
    log_events: bool,
    taint: bool,
    disabled: bool,
    ignore_analysis_faults: bool,
    telemetry: TelemetryFormat,
}

fn load_config(path: Option<&Path>) -> Result<FileConfig, String> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read config '{}': {}", path.display(), e))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("invalid config '{}': {}", path.display(), e))
}

/// Execute the run subcommand.
///
/// Returns exit code: 0 = success, 1 = uncaught program error,
/// 2 = invalid program or config, 3 = I/O error.
fn run_program(path: &Path, config_path: Option<&Path>, options: &RunOptions) -> i32 {
    let file_config = match load_config(config_path) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return 2;
        }
    };

    // File, then environment, then flags.
    let mut dispatch = file_config.dispatch.with_env();
    if options.disabled {
        dispatch.enabled = false;
    }
    if options.ignore_analysis_faults {
        dispatch.ignore_analysis_faults = true;
    }

    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: failed to read '{}': {}", path.display(), e);
            return 3;
        }
    };
    let program = match Program::from_json(path.display().to_string(), &source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: invalid program '{}': {}", path.display(), e);
            return 2;
        }
    };

    let sink = EventSink::default();
    let endpoints = event_log::endpoints(&sink, options.log_events, options.taint);
    let mut host = Interpreter::new(
        file_config.host,
        registry_with(&endpoints),
        DispatchContext::new(dispatch),
    );
    if let Err(e) = host.instrument(&program) {
        eprintln!("Error: {}", e);
        return 2;
    }

    let outcome = host.run(&program);
    for line in sink.borrow().iter() {
        println!("{}", line);
    }

    let code = match outcome {
        Ok(value) => {
            println!("result: {}", value);
            0
        }
        Err(HostError::Uncaught(fault)) => {
            eprintln!("Uncaught exception: {}", fault);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    match options.telemetry {
        TelemetryFormat::Text => print!("{}", host.telemetry()),
        TelemetryFormat::Json => {
            let json = serde_json::to_string_pretty(&host.telemetry()).unwrap_or_else(|e| {
                format!("{{\"error\": \"failed to serialize telemetry: {}\"}}", e)
            });
            println!("{}", json);
        }
        TelemetryFormat::None => {}
    }
    code
}
