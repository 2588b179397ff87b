mod bootstrap;
mod cache_cmd;
mod check_cmd;
mod rewrite_cmd;
mod scan_cmd;
mod terminal_output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use bootstrap::Bootstrap;
use check_cmd::{CheckArgs, Decision};
use scan_cmd::ScanStatus;
use terminal_output::note_error;

/// Exit codes. clap exits with 2 on usage errors by itself.
const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_SCAN_ABORT: u8 = 3;
const EXIT_DENIED: u8 = 4;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden: plugin security for the host server")]
#[command(version)]
struct Cli {
    /// Configuration directory (default: $WARDEN_CONFIG_DIR or ~/.warden)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every plugin and apply countermeasures
    Scan {
        /// Plugins directory to scan instead of the configured one
        #[arg(long)]
        plugins_dir: Option<PathBuf>,
    },
    /// Evaluate one access-control decision
    Check {
        /// Operation name, e.g. file-read or connection-open
        #[arg(long = "op")]
        operation: String,
        #[arg(long)]
        plugin: Option<String>,
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        method: Option<String>,
        /// Plugins directory used to attribute the caller
        #[arg(long)]
        plugins_dir: Option<PathBuf>,
        /// Path, host:port, exit code, command line, property or package
        argument: String,
    },
    /// Apply the built-in injections to a class file
    Rewrite { input: PathBuf, output: PathBuf },
    /// Inspection cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete every persisted inspection result
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %format!("{e:#}"), "[Warden] Command failed");
            note_error(&format!("{e:#}"));
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let boot = Bootstrap::load(cli.config_dir).await?;

    match cli.command {
        Commands::Scan { plugins_dir } => match scan_cmd::run(&boot, plugins_dir.as_deref())? {
            ScanStatus::Passed => Ok(0),
            ScanStatus::Aborted => Ok(EXIT_SCAN_ABORT),
        },
        Commands::Check {
            operation,
            plugin,
            class,
            method,
            plugins_dir,
            argument,
        } => {
            let args = CheckArgs {
                operation,
                plugin,
                class,
                method,
                argument,
            };
            let (index, ctx) = boot.context(&boot.plugins_dir(plugins_dir.as_deref()))?;
            let base = std::env::current_dir()?;
            let (op, arg, frames) = match check_cmd::prepare(&args, &*index, &base) {
                Ok(prepared) => prepared,
                Err(e) => {
                    note_error(&format!("{e:#}"));
                    return Ok(EXIT_USAGE);
                }
            };
            let decision = check_cmd::decide(&boot, ctx, op, &arg, &frames);
            check_cmd::report(&decision, op, &arg);
            Ok(match decision {
                Decision::Allowed => 0,
                Decision::Denied(_) => EXIT_DENIED,
            })
        }
        Commands::Rewrite { input, output } => {
            let (index, _) = boot.context(&boot.plugins_dir(None))?;
            rewrite_cmd::run(&rewrite_cmd::transformer_for(&index), &input, &output)?;
            Ok(0)
        }
        Commands::Cache {
            action: CacheAction::Clear,
        } => {
            cache_cmd::clear(&boot)?;
            Ok(0)
        }
    }
}
