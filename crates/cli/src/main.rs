// regionfuse CLI - boundary / survey / census fusion

mod exit_codes;
mod fuse;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use exit_codes::{EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "rfuse")]
#[command(about = "Fuse county boundaries with ALICE survey extracts and census tables")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// Only log warnings and errors (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a fusion from a TOML config file
    #[command(after_help = "\
Examples:
  rfuse run fuse.toml
  rfuse run fuse.toml --json
  rfuse run fuse.toml --output result.json
  rfuse run fuse.toml --strict")]
    Run {
        /// Path to the fusion config file
        config: PathBuf,

        /// Print the full JSON result to stdout
        #[arg(long)]
        json: bool,

        /// Write the JSON result to this file (overrides [output].json)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Exit 62 when any extract failed, rows were skipped, or records were orphaned
        #[arg(long)]
        strict: bool,
    },

    /// Validate a fusion config without running
    #[command(after_help = "\
Examples:
  rfuse validate fuse.toml")]
    Validate {
        /// Path to the fusion config file
        config: PathBuf,
    },

    /// Print the canonical 5-digit region id for each identifier
    #[command(after_help = "\
Examples:
  rfuse canonicalize 1001 48201 6037.0
  rfuse canonicalize 1001 --json")]
    Canonicalize {
        /// Raw identifiers (numeric, up to 5 digits)
        #[arg(required = true)]
        ids: Vec<String>,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "regionfuse=warn" } else { "regionfuse=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let result = match cli.command {
        None => {
            eprintln!("Usage: rfuse <command> [options]");
            eprintln!("       rfuse --help for more information");
            Ok(())
        }
        Some(Commands::Run { config, json, output, strict }) => {
            fuse::cmd_run(config, json, output, strict, cli.quiet)
        }
        Some(Commands::Validate { config }) => fuse::cmd_validate(config),
        Some(Commands::Canonicalize { ids, json }) => fuse::cmd_canonicalize(&ids, json),
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

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
