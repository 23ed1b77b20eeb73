mod app;
mod cache;
mod config;
mod db;
mod error;
mod event;
mod interceptor;
mod logging;
mod net;
mod push;
mod strategy;
mod sync;
mod worker;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tikpluse-offline")]
#[command(about = "Offline-first request caching, background sync and push delivery")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tikpluse/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: app::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.logging, args.verbose)?;

  let app = app::App::new(config)?;
  app.run(args.command).await?;

  Ok(())
}
