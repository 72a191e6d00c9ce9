//! End-to-end `settle watch` runs against real directories

use crate::common::cli::wait_for;
use crate::settle;
use anyhow::Result;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const LIMIT: Duration = Duration::from_secs(10);

#[test]
fn test_watch_copies_settled_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input = temp_dir.path().join("in");
    let output = temp_dir.path().join("out");

    let mut watch = settle!(temp_dir.path(), "watch", "-i", "in", "-o", "out", "-t", "200").spawn()?;

    // Both folders are created on startup
    assert!(wait_for(LIMIT, || input.is_dir() && output.is_dir()));
    // Let the watch register before producing events
    std::thread::sleep(Duration::from_millis(500));

    fs::write(input.join("report.csv"), b"a,b,c\n")?;

    let copied = output.join("report.csv");
    assert!(wait_for(LIMIT, || copied.exists()), "settled file was not copied");
    assert_eq!(fs::read(&copied)?, b"a,b,c\n");
    assert!(watch.is_running());

    Ok(())
}

#[test]
fn test_watch_suffixes_name_collisions() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input = temp_dir.path().join("in");
    let output = temp_dir.path().join("out");
    fs::create_dir_all(&output)?;
    fs::write(output.join("report.csv"), b"old")?;

    let _watch = settle!(temp_dir.path(), "watch", "-i", "in", "-o", "out", "-t", "200").spawn()?;
    assert!(wait_for(LIMIT, || input.is_dir()));
    std::thread::sleep(Duration::from_millis(500));

    fs::write(input.join("report.csv"), b"new")?;

    let suffixed = output.join("report.csv1");
    assert!(wait_for(LIMIT, || suffixed.exists()), "collision copy missing");
    assert_eq!(fs::read(&suffixed)?, b"new");
    assert_eq!(fs::read(output.join("report.csv"))?, b"old");

    Ok(())
}

#[test]
fn test_watch_scan_existing_copies_present_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input = temp_dir.path().join("in");
    let output = temp_dir.path().join("out");
    fs::create_dir_all(&input)?;
    fs::write(input.join("already.txt"), b"here")?;
    fs::write(input.join("draft.swp"), b"ignored")?;

    let _watch = settle!(
        temp_dir.path(),
        "watch", "-i", "in", "-o", "out", "-t", "200", "--scan-existing"
    )
    .spawn()?;

    let copied = output.join("already.txt");
    assert!(wait_for(LIMIT, || copied.exists()), "existing file was not copied");
    assert!(!output.join("draft.swp").exists());

    Ok(())
}
