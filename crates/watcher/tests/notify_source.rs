//! End-to-end tests against the platform watcher
//!
//! These drive real file system notifications, so waits are generous.

use settle_core::OutputStore;
use settle_watcher::{
    CopyDispatcher, EventKind, EventSource, Next, NotifySource, Scheduler, SchedulerConfig,
};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const EVENT_WAIT: Duration = Duration::from_secs(5);

/// Poll `check` until it holds or `limit` passes
fn wait_for(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < limit {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    check()
}

fn names_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_file_creation_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let mut source = NotifySource::new(temp_dir.path(), true).unwrap();

    fs::write(temp_dir.path().join("incoming.csv"), b"a,b\n").unwrap();

    let started = Instant::now();
    let mut seen = None;
    while started.elapsed() < EVENT_WAIT {
        match source.next_event(Some(EVENT_WAIT)).unwrap() {
            Next::Event(event) if event.path.ends_with("incoming.csv") => {
                seen = Some(event.kind);
                break;
            }
            Next::Timeout => break,
            _ => {}
        }
    }

    assert!(matches!(seen, Some(EventKind::Created) | Some(EventKind::Modified)));
}

#[test]
fn test_file_removal_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("short-lived.txt");
    fs::write(&file, b"bye").unwrap();

    let mut source = NotifySource::new(temp_dir.path(), true).unwrap();
    fs::remove_file(&file).unwrap();

    let started = Instant::now();
    let mut deleted = false;
    while started.elapsed() < EVENT_WAIT {
        match source.next_event(Some(EVENT_WAIT)).unwrap() {
            Next::Event(event) if event.kind == EventKind::Deleted => {
                deleted = event.path.ends_with("short-lived.txt");
                break;
            }
            Next::Timeout => break,
            _ => {}
        }
    }

    assert!(deleted);
}

#[test]
fn test_settled_file_is_copied_once() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("in");
    let output = temp_dir.path().join("out");
    fs::create_dir_all(&input).unwrap();
    fs::create_dir_all(&output).unwrap();

    let mut source = NotifySource::new(&input, true).unwrap();
    let shutdown = source.shutdown_handle();
    let mut dispatcher = CopyDispatcher::new(OutputStore::open(&output).unwrap());
    let mut scheduler = Scheduler::with_system_clock(SchedulerConfig::new(Duration::from_millis(200)));

    let worker = thread::spawn(move || scheduler.run(&mut source, &mut dispatcher));

    fs::write(input.join("report.csv"), b"first\n").unwrap();
    assert!(wait_for(Duration::from_secs(10), || output.join("report.csv").exists()));

    // Quiet period: nothing else may be produced
    thread::sleep(Duration::from_millis(600));
    assert_eq!(names_in(&output), vec!["report.csv".to_string()]);
    assert_eq!(fs::read(output.join("report.csv")).unwrap(), b"first\n");

    shutdown.close();
    worker.join().unwrap().unwrap();
}

#[test]
fn test_file_deleted_before_settling_is_not_copied() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("in");
    let output = temp_dir.path().join("out");
    fs::create_dir_all(&input).unwrap();
    fs::create_dir_all(&output).unwrap();

    let mut source = NotifySource::new(&input, true).unwrap();
    let shutdown = source.shutdown_handle();
    let mut dispatcher = CopyDispatcher::new(OutputStore::open(&output).unwrap());
    let mut scheduler = Scheduler::with_system_clock(SchedulerConfig::new(Duration::from_millis(500)));

    let worker = thread::spawn(move || scheduler.run(&mut source, &mut dispatcher));

    let file = input.join("scratch.dat");
    fs::write(&file, b"temp").unwrap();
    fs::remove_file(&file).unwrap();

    thread::sleep(Duration::from_millis(1_500));
    assert!(names_in(&output).is_empty());

    shutdown.close();
    worker.join().unwrap().unwrap();
}
