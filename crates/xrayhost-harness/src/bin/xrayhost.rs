//! CLI entrypoint for the xrayhost harness.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use xrayhost_harness::{ConfigSource, LogEmitter, ReloadStep, RunPlan};

/// Drive a wrapper library through the xrayhost shim.
#[derive(Debug, Parser)]
#[command(name = "xrayhost")]
#[command(about = "Load, probe and exercise an xraywrapper library")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bind the wrapper and print its version (or load failure) as JSON.
    Probe {
        /// Wrapper library path (defaults to XRAYHOST_LIBRARY or the platform name).
        #[arg(long)]
        library: Option<PathBuf>,
    },
    /// Start the wrapper, stream its log as JSONL, then stop it.
    #[command(group(ArgGroup::new("source").required(true).args(["config", "json"])))]
    Run {
        /// JSON configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Inline JSON configuration.
        #[arg(long)]
        json: Option<String>,
        /// Wrapper library path.
        #[arg(long)]
        library: Option<PathBuf>,
        /// How long to keep the wrapper running.
        #[arg(long, default_value_t = 5_000)]
        duration_ms: u64,
        /// Interval between log polls.
        #[arg(long, default_value_t = 200)]
        poll_interval_ms: u64,
        /// Configuration file to reload once while running.
        #[arg(long, requires = "reload_after_ms")]
        reload_config: Option<PathBuf>,
        /// Delay after start before the reload.
        #[arg(long, requires = "reload_config")]
        reload_after_ms: Option<u64>,
        /// JSONL output path (if omitted, prints to stdout).
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let host = xrayhost_abi::host();

    match cli.command {
        Command::Probe { library } => {
            let report = xrayhost_harness::probe(host, library.as_deref().map(|p| p.as_os_str()));
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.loaded {
                std::process::exit(1);
            }
        }
        Command::Run {
            config,
            json,
            library,
            duration_ms,
            poll_interval_ms,
            reload_config,
            reload_after_ms,
            log,
        } => {
            let source = match (config, json) {
                (Some(path), _) => ConfigSource::File(path),
                (None, Some(text)) => ConfigSource::Json(text),
                (None, None) => return Err("either --config or --json is required".into()),
            };
            let reload = reload_config.zip(reload_after_ms).map(|(path, after)| ReloadStep {
                source: ConfigSource::File(path),
                after: Duration::from_millis(after),
            });
            let plan = RunPlan {
                source,
                duration: Duration::from_millis(duration_ms),
                poll_interval: Duration::from_millis(poll_interval_ms),
                reload,
            };

            let writer: Box<dyn Write> = match &log {
                Some(path) => Box::new(BufWriter::new(File::create(path)?)),
                None => Box::new(std::io::stdout().lock()),
            };
            let run_id = format!("xrayhost-{}", std::process::id());
            let mut emitter = LogEmitter::new(writer, run_id);
            let summary = xrayhost_harness::run(
                host,
                library.as_deref().map(|p| p.as_os_str()),
                &plan,
                &mut emitter,
            )?;
            eprintln!(
                "start={} reload={:?} stop={} log_bytes={}",
                summary.start_status, summary.reload_status, summary.stop_status, summary.log_bytes
            );
        }
    }

    Ok(())
}
