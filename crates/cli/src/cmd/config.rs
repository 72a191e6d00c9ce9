//! Configuration inspection commands
//!
//! Provides CLI interface to view the configuration settle will run with.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use settle_core::{config, Config};
use std::path::Path;

/// Show the effective configuration
pub async fn run_show(path: Option<&Path>) -> Result<()> {
    let (config, location) = match path {
        Some(path) => (Config::load(path)?, path.to_path_buf()),
        None => {
            let path = config::config_file_path()
                .context("Could not determine config file path")?;
            (Config::load_or_default(&path)?, path)
        }
    };

    println!("{}", "Settle Configuration".bold());
    if location.exists() {
        println!("{}: {}\n", "Location".dimmed(), location.display().dimmed());
    } else {
        println!("{}: {} {}\n", "Location".dimmed(), location.display().dimmed(), "(defaults)".dimmed());
    }

    println!("{}", "[watch]".yellow());
    println!(
        "  {} = {} {}",
        "quiescence_window_ms".cyan(),
        config.watch.quiescence_window_ms,
        format!("({:?})", config.watch.quiescence_window()).dimmed()
    );
    println!("  {} = {}", "scan_existing".cyan(), config.watch.scan_existing);
    println!("  {} = {}", "recreate_root".cyan(), config.watch.recreate_root);

    println!("\n{}", "[dispatch]".yellow());
    println!(
        "  {} = {} {}",
        "max_retries".cyan(),
        config.dispatch.max_retries,
        if config.dispatch.max_retries == 0 {
            "(wait for next change)".dimmed().to_string()
        } else {
            String::new()
        }
    );
    println!("  {} = {}", "retry_delay_ms".cyan(), config.dispatch.retry_delay_ms);

    println!("\n{}", "[ignore]".yellow());
    println!("  {} = {}", "use_settleignore".cyan(), config.ignore.use_settleignore);
    println!(
        "  {} = {:?}",
        "additional_patterns".cyan(),
        config.ignore.additional_patterns
    );

    if let Err(e) = config.validate() {
        println!("\n{} {}", "✗".red(), e);
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!("  quiescence_window_ms: 1-3,600,000");
    println!("  max_retries: 0-1,000 (0 = wait for next change)");
    println!("  retry_delay_ms: 1-3,600,000");

    Ok(())
}

/// Show the config file path and optionally create it
pub async fn run_path(create: bool) -> Result<()> {
    let config_path = config::config_file_path()
        .context("Could not determine config file path")?;

    if create && config::init_if_missing(&config_path)? {
        println!("{} Created config file at: {}", "✓".green(), config_path.display());
    } else if config_path.exists() {
        println!("{}", config_path.display());
    } else {
        println!("{}", config_path.display());
        println!("{}", "File does not exist. Use --create to create it.".yellow());
    }

    Ok(())
}

/// Show example configuration
pub async fn run_example() -> Result<()> {
    println!("{}", config::example_config());
    Ok(())
}
