//! jsnap agent binary.
//!
//! Three entry modes:
//! - one-shot full snapshot (default)
//! - continuous monitoring (`--m3`)
//! - internal attach mode, entered when the attach env hook is set by a
//!   re-invocation from the privileged capture chain (never by users)

use clap::Parser;
use jsnap_core::capture::attach::{self, ATTACH_PID_ENV, ATTACH_TOOL_ENV};
use jsnap_core::m3::M3Loop;
use jsnap_core::run::{self, RunContext, RunKind};
use jsnap_core::upload::HttpUploader;
use jsnap_core::{logging, proc};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "jsnap",
    version,
    about = "Diagnostic snapshot agent for JVM services"
)]
struct Cli {
    /// Config file path (default: JSNAP_CONFIG, ./jsnap.yaml, then
    /// /etc/jsnap/jsnap.yaml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target process id (overrides the config file)
    #[arg(short, long)]
    pid: Option<u32>,

    /// Analysis endpoint URL (overrides the config file)
    #[arg(short, long)]
    server: Option<String>,

    /// Run continuous monitoring instead of a one-shot snapshot
    #[arg(long)]
    m3: bool,

    /// Emit JSON log lines regardless of config
    #[arg(long)]
    json_logs: bool,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    // Attach mode bypasses normal CLI handling entirely; the re-exec
    // passes a flag clap does not know about.
    if std::env::var_os(ATTACH_PID_ENV).is_some() {
        let tool = std::env::var(ATTACH_TOOL_ENV).unwrap_or_else(|_| "jcmd".to_string());
        return match attach::run_attach_mode(&attach::attach_mode_runner(), &tool) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("attach mode failed: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let cli = Cli::parse();

    let Some((config_path, source)) = jsnap_config::resolve_config_path(cli.config.as_deref())
    else {
        eprintln!("no config file found; provide --config or create jsnap.yaml");
        return ExitCode::FAILURE;
    };
    let mut config = match jsnap_config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(pid) = cli.pid {
        config.pid = Some(pid);
    }
    if let Some(server) = cli.server {
        config.server = server;
    }
    let mut log_settings = config.log.clone();
    match cli.verbose {
        0 => {}
        1 => log_settings.level = "debug".to_string(),
        _ => log_settings.level = "trace".to_string(),
    }
    if cli.json_logs {
        log_settings.json = true;
    }
    logging::init(&log_settings);
    info!(config = %config_path.display(), %source, "configuration loaded");

    if let Some(pid) = config.pid {
        if !proc::is_alive(pid) {
            error!(pid, "target process does not exist");
            return ExitCode::FAILURE;
        }
    } else {
        warn!("no target pid configured; only system-level data will be captured");
    }

    let uploader = Arc::new(HttpUploader::new(config.api_key.clone()));
    let ctx = RunContext::new(config, uploader);

    if cli.m3 {
        M3Loop::new(ctx).run();
        return ExitCode::SUCCESS;
    }

    match run::execute_run(&ctx, RunKind::Full) {
        Ok(report) => {
            if report.any_ok() {
                ExitCode::SUCCESS
            } else {
                error!(run_id = report.run_id, "no artifact was captured");
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!(error = %e, "capture run failed during setup");
            ExitCode::FAILURE
        }
    }
}
