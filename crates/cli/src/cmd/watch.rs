//! Watch a directory and copy settled files

use anyhow::{Context, Result};
use clap::Args;
use settle_core::{config, Config, OutputStore};
use settle_watcher::{CopyDispatcher, IgnoreRules, NotifySource, Scheduler, SchedulerConfig};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Folder to monitor
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// Target folder to store settled files
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// Quiescence window in milliseconds (overrides config)
    #[arg(short = 't', long = "wait", value_name = "MS")]
    pub wait_ms: Option<u64>,

    /// Config file (default: user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Retries for files still being written (overrides config)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Treat files already in the input folder as new
    #[arg(long)]
    pub scan_existing: bool,
}

pub async fn run(args: WatchArgs) -> Result<()> {
    let config = load_config(&args)?;

    let input = prepare_dir(&args.input).context("Failed to prepare input folder")?;
    let output = prepare_dir(&args.output).context("Failed to prepare output folder")?;

    let store = OutputStore::open(&output)?;
    let source = NotifySource::new(&input, config.watch.recreate_root)?;
    let shutdown = source.shutdown_handle();
    let rules = IgnoreRules::load(&input, &config.ignore)
        .context("Failed to load ignore rules")?;

    let mut scheduler = Scheduler::with_system_clock(SchedulerConfig::from(&config)).with_ignore(rules);

    info!(
        input = %input.display(),
        output = %output.display(),
        window_ms = config.watch.quiescence_window_ms,
        "Starting settle"
    );

    // The scheduler blocks on the event source, so it gets its own thread
    let mut task = tokio::task::spawn_blocking(move || {
        let mut source = source;
        let mut dispatcher = CopyDispatcher::new(store);
        scheduler.run(&mut source, &mut dispatcher)
    });

    tokio::select! {
        joined = &mut task => {
            joined.context("Scheduler task panicked")??;
        }
        signal = shutdown_signal() => {
            signal?;
            info!("Shutdown requested");
            shutdown.close();
            task.await.context("Scheduler task panicked")??;
        }
    }

    info!("Stopped");
    Ok(())
}

/// Config file values with command-line overrides applied
fn load_config(args: &WatchArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => match config::config_file_path() {
            Some(path) => Config::load_or_default(&path)?,
            None => Config::default(),
        },
    };

    if let Some(wait_ms) = args.wait_ms {
        config.watch.quiescence_window_ms = wait_ms;
    }
    if let Some(max_retries) = args.max_retries {
        config.dispatch.max_retries = max_retries;
    }
    if args.scan_existing {
        config.watch.scan_existing = true;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Create the directory if needed and return it as an absolute path
fn prepare_dir(path: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Ok(cwd.join(path))
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for Ctrl-C")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    Ok(())
}
