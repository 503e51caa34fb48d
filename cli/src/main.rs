//! hq binary
//!
//! Reads control commands from standard input and supervises the jobs they
//! start. Job output is only ever shown through `rcv`.

#![allow(unused_crate_dependencies)]

use clap::Parser;
use cli::{run_session, CliError};
use hq_core::config::{load_config_from_toml_path, SupervisorConfig};
use hq_core::process::unix::ignore_operator_signals;
use hq_core::Supervisor;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

#[derive(Parser)]
#[command(name = "hq")]
#[command(about = "Interactively supervise line-oriented child programs")]
#[command(version)]
struct Cli {
    /// TOML supervisor configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Do not print a prompt before each command
    #[arg(long, conflicts_with = "prompt")]
    no_prompt: bool,

    /// Prompt text
    #[arg(long, value_name = "TEXT")]
    prompt: Option<String>,

    /// Start every job in its own process group
    #[arg(long)]
    isolate: bool,

    /// Default tracing filter when RUST_LOG is unset
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Load the config file, if any, and apply flag overrides on top
    fn resolve_config(&self) -> cli::Result<SupervisorConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from_toml_path(path)
                .map_err(|e| CliError::ConfigError(e.to_string()))?,
            None => SupervisorConfig::default(),
        };

        if self.no_prompt {
            config.show_prompt = false;
        }
        if let Some(prompt) = &self.prompt {
            config.prompt = prompt.clone();
            config.show_prompt = true;
        }
        if self.isolate {
            config.isolate_process_group = true;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }

        config
            .validate()
            .map_err(|e| CliError::ConfigError(e.to_string()))?;
        Ok(config)
    }
}

fn run(args: Cli) -> cli::Result<()> {
    let config = args.resolve_config()?;
    hq_core::utils::init_tracing(&config.log_level)
        .map_err(|e| CliError::StartupFailed(e.to_string()))?;
    debug!("Effective configuration: {:?}", config);

    ignore_operator_signals()?;

    let mut supervisor = Supervisor::new(config.spawn_options());
    let prompt = config.show_prompt.then_some(config.prompt.as_str());
    let stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();
    run_session(&mut supervisor, stdin, &mut stdout, prompt)
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("hq: {} [{}]", e, e.code());
            ExitCode::FAILURE
        }
    }
}
