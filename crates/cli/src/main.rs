//! reframe - split byte streams into separator-delimited records

use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;
mod logging;
mod output;

use commands::{FramingArgs, cmd_config_init, cmd_config_show, cmd_run, cmd_stdin, load_config};
use logging::init_logging;

#[derive(Parser)]
#[command(name = "reframe", version)]
#[command(about = "Split a byte stream into separator-delimited records")]
#[command(after_help = "\
EXAMPLES:
  reframe run -- ./server --verbose          # One record per CRLF-terminated line
  reframe run -s '\\n' --json -- journalctl   # LF lines as JSON objects
  tail -f app.log | reframe stdin -s '\\n'    # Frame standard input
  reframe config init                         # Write .reframe.toml")]
struct Cli {
  /// Config file to use instead of .reframe.toml / the user config
  #[arg(long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Log at debug level (RUST_LOG overrides)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a command and frame its stdout
  Run {
    #[command(flatten)]
    framing: FramingArgs,
    /// Command and arguments
    #[arg(trailing_var_arg = true, required = true, value_name = "COMMAND")]
    command: Vec<String>,
  },
  /// Frame standard input
  Stdin {
    #[command(flatten)]
    framing: FramingArgs,
  },
  /// Configuration management
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[derive(Subcommand)]
enum ConfigCommand {
  /// Show the effective configuration
  Show,
  /// Write a commented config template
  Init {
    /// Write the user config instead of .reframe.toml
    #[arg(long)]
    user: bool,
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },
}

/// How long blocking work (a pending stdin read) may delay exit
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();

  let runtime = tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()
    .context("failed to start async runtime")?;
  let result = runtime.block_on(run(cli));
  // a stdin read cannot be cancelled, so do not wait for it to return
  runtime.shutdown_timeout(SHUTDOWN_GRACE);
  result
}

async fn run(cli: Cli) -> Result<ExitCode> {
  let cwd = std::env::current_dir().context("failed to read current directory")?;
  let (config, source) = load_config(cli.config.as_deref(), &cwd)?;
  let _guard = init_logging(&config.logging, cli.verbose);
  tracing::debug!(source = %source, "Configuration loaded");

  match cli.command {
    Commands::Run { framing, command } => cmd_run(config, &framing, command).await,
    Commands::Stdin { framing } => cmd_stdin(config, &framing).await,
    Commands::Config { command } => {
      match command {
        ConfigCommand::Show => cmd_config_show(&config, &source)?,
        ConfigCommand::Init { user, force } => {
          cmd_config_init(&cwd, user, force)?;
        }
      }
      Ok(ExitCode::SUCCESS)
    }
  }
}
