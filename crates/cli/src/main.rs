// courier CLI - local runner for message/status reconciliation

mod exit_codes;
mod logging;
mod recon;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::{recon_exit_code, EXIT_SUCCESS};

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Reconcile message exports with their delivery status events")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Log filter (e.g. `debug`, `courier_recon=trace`). RUST_LOG wins when set.
    #[arg(long, global = true, env = "COURIER_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate both feeds, unify statuses, detect duplicates, write outputs
    #[command(after_help = "\
Examples:
  courier run courier.toml
  courier run courier.toml --messages today/messages.csv --statuses today/statuses.jsonl
  courier run courier.toml --out-dir /tmp/recon --json
  courier run courier.toml --strict")]
    Run {
        /// Path to the courier TOML config
        config: PathBuf,

        /// Messages feed (overrides `[inputs] messages`)
        #[arg(long)]
        messages: Option<PathBuf>,

        /// Status events feed (overrides `[inputs] statuses`)
        #[arg(long)]
        statuses: Option<PathBuf>,

        /// Output directory (overrides `[output] dir`)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Print the quality report as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Exit 1 when the quality report has any `error` check
        #[arg(long)]
        strict: bool,
    },

    /// Parse and validate a config without reading any feed
    #[command(after_help = "\
Examples:
  courier validate courier.toml")]
    Validate {
        /// Path to the courier TOML config
        config: PathBuf,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  courier-recon ", env!("CARGO_PKG_VERSION"),
        "\nbuild:   ", env!("BUILD_PROFILE"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let log_level = cli.log_level.as_deref();

    let result = match cli.command {
        Commands::Run { config, messages, statuses, out_dir, json, strict } => {
            recon::cmd_run(recon::RunArgs {
                config,
                messages,
                statuses,
                out_dir,
                json,
                strict,
                log_level,
            })
        }
        Commands::Validate { config } => recon::cmd_validate(config, log_level),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<courier_recon::ReconError> for CliError {
    fn from(err: courier_recon::ReconError) -> Self {
        Self::new(recon_exit_code(&err), err.to_string())
    }
}
