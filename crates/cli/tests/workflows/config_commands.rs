//! Config subcommands and argument validation

use crate::settle;
use anyhow::Result;
use tempfile::TempDir;

#[test]
fn test_example_config_is_printed() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let result = settle!(temp_dir.path(), "config", "example").assert_success()?;
    assert!(result.contains_stdout("quiescence_window_ms = 1000"));
    assert!(result.contains_stdout("[dispatch]"));

    Ok(())
}

#[test]
fn test_config_path_create() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let expected = temp_dir.path().join(".config/settle/config.toml");

    let result = settle!(temp_dir.path(), "config", "path").assert_success()?;
    assert!(result.contains_stdout("does not exist"));
    assert!(!expected.exists());

    settle!(temp_dir.path(), "config", "path", "--create").assert_success()?;
    assert!(expected.exists());

    let result = settle!(temp_dir.path(), "config", "show").assert_success()?;
    assert!(result.contains_stdout("quiescence_window_ms"));

    Ok(())
}

#[test]
fn test_show_rejects_malformed_config() -> Result<()> {
    let temp_dir = TempDir::new()?;
    std::fs::write(temp_dir.path().join("bad.toml"), "[watch\n")?;

    let result = settle!(temp_dir.path(), "config", "show", "--config", "bad.toml").assert_failure()?;
    assert!(result.contains_stderr("failed to parse config"));

    Ok(())
}

#[test]
fn test_watch_rejects_zero_window() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let result =
        settle!(temp_dir.path(), "watch", "-i", "in", "-o", "out", "-t", "0").assert_failure()?;
    assert!(result.contains_stderr("out of range"));

    Ok(())
}

#[test]
fn test_watch_requires_input_and_output() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let result = settle!(temp_dir.path(), "watch", "-i", "in").assert_failure()?;
    assert!(result.contains_stderr("--output"));

    Ok(())
}
