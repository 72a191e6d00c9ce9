//! Settle CLI - settle command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;
mod logging;

/// Settle - copy files out of a directory once they stop changing
#[derive(Parser)]
#[command(name = "settle")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write daily-rotated logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a directory and copy settled files to an output directory
    Watch(cmd::watch::WatchArgs),
    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show {
        /// Config file (default: user config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the config file location
    Path {
        /// Write a default config file if none exists
        #[arg(long)]
        create: bool,
    },
    /// Print an annotated example configuration
    Example,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = logging::init(cli.verbose, cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Watch(args) => cmd::watch::run(args).await,
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show { config } => cmd::config::run_show(config.as_deref()).await,
            ConfigCommands::Path { create } => cmd::config::run_path(create).await,
            ConfigCommands::Example => cmd::config::run_example().await,
        },
    }
}
