mod app;
mod cli;
mod commands;
mod config;
mod event;
mod logging;
mod model;
mod remote;
mod session;
mod store;
mod summary;

use clap::Parser;
use color_eyre::Result;

use crate::cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Held until exit so buffered log lines are flushed
  let _log_guard = logging::init(&config.log)?;

  let mut app = app::App::new(&config)?;
  app.run(args.command).await?;

  Ok(())
}
