mod api;
mod app;
mod cache;
mod commands;
mod config;
mod filter;
mod logging;
mod selection;
mod sync;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lubd")]
#[command(about = "Offline-friendly client for the property maintenance job tracker")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/lubd/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Property to work with instead of the selected one
  #[arg(short, long)]
  property: Option<String>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Logging is best effort; the CLI works without it
  let _log_guard = match logging::init() {
    Ok(guard) => Some(guard),
    Err(e) => {
      eprintln!("warning: logging disabled: {}", e);
      None
    }
  };

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Initialize and run the app
  let app = app::App::new(config, args.property)?;
  app.run(args.command).await?;

  Ok(())
}
