use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use nexus_sync::app::App;
use nexus_sync::config::Config;
use nexus_sync::logging;

#[derive(Parser, Debug)]
#[command(name = "nexus-sync")]
#[command(about = "Cached command-line client for the Nexus knowledge API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/nexus-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Search conversation turns
  Search {
    #[arg(required = true)]
    query: Vec<String>,
    /// Maximum number of results
    #[arg(short, long)]
    limit: Option<u32>,
  },
  /// Show API status
  Status,
  /// List feedback
  Feedback {
    /// Only show feedback with this status
    #[arg(short, long)]
    status: Option<String>,
  },
  /// Interactive shell (default)
  Shell,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Logs go to a file; hold the guard until exit so they are flushed
  let _log_guard = logging::init()?;

  let mut app = App::new(config)?;
  match args.command.unwrap_or(Command::Shell) {
    Command::Search { query, limit } => {
      app.search(&query.join(" "), limit).await;
      app.finish()?;
    }
    Command::Status => app.run_once("status").await?,
    Command::Feedback { status } => {
      app.list_feedback(status.as_deref()).await;
      app.finish()?;
    }
    Command::Shell => app.run().await?,
  }

  Ok(())
}
