mod cli;
mod logging;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

use stacks::config::Config;
use stacks::Library;

#[derive(Parser, Debug)]
#[command(name = "stacks")]
#[command(about = "A terminal client for the library management API")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./stacks.yaml, then $XDG_CONFIG_HOME/stacks/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Base URL of the library API
  #[arg(long, global = true)]
  api_url: Option<String>,

  #[command(subcommand)]
  command: cli::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override API URL if specified on command line
  if let Some(url) = args.api_url {
    config.api.base_url = url;
  }

  let _log_guard = logging::init(&config.log)?;
  tracing::debug!(base_url = %config.api.base_url, "starting");

  let library = Library::new(&config)?;
  let result = cli::run(&library, args.command).await;
  library.shutdown();

  result
}
