//! Integration tests for Deadwood
//!
//! These tests verify that the tracker, the watcher and the CLI work together.

mod support;

use deadwood_core::UnloadReport;
use deadwood_watcher::Heartbeat;
use parking_lot::Mutex;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};
use support::{touch, Project};

/// Lay out the same three files in a fresh project.
fn cascade_project() -> (Project, std::path::PathBuf) {
    let project = Project::new();
    let a = project.load("app/a.rb", &[("A", None), ("A::C", None)]);
    project.load("app/b.rb", &[("B", Some("A"))]);
    project.load("lib/d.rb", &[("D", None)]);
    (project, a)
}

fn recording_heartbeat(project: &Project, async_mode: bool) -> (Heartbeat, Arc<Mutex<Vec<UnloadReport>>>) {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&reports);
    let heartbeat = Heartbeat::new(project.tracker.clone(), project.config(async_mode))
        .on_change(move |report| seen.lock().push(report.clone()));
    (heartbeat, reports)
}

/// Sync and async detection unload exactly the same symbols for the same touch
#[test]
fn test_async_and_sync_detection_agree() {
    let (sync_project, sync_a) = cascade_project();
    let (mut sync_heartbeat, sync_reports) = recording_heartbeat(&sync_project, false);
    touch(&sync_a);
    assert!(sync_heartbeat.heartbeat_check().unwrap());

    let (async_project, async_a) = cascade_project();
    let (mut async_heartbeat, async_reports) = recording_heartbeat(&async_project, true);
    assert!(!async_heartbeat.heartbeat_check().unwrap());
    touch(&async_a);

    let deadline = Instant::now() + Duration::from_secs(10);
    while !async_heartbeat.heartbeat_check().unwrap() {
        assert!(Instant::now() < deadline, "reactor never reported the touch");
        std::thread::sleep(Duration::from_millis(20));
    }

    let sync_removed: Vec<_> = sync_reports.lock().iter().flat_map(|r| r.removed_symbols.clone()).collect();
    let async_removed: Vec<_> = async_reports.lock().iter().flat_map(|r| r.removed_symbols.clone()).collect();
    assert_eq!(sync_removed, vec!["A::C", "B", "A"]);
    assert_eq!(async_removed, sync_removed);

    for project in [&sync_project, &async_project] {
        assert!(project.is_bound("D"));
        assert!(!project.is_bound("B"));
    }
}

/// After a touch and a reload, unloaded classes come back as new entities
#[test]
fn test_reload_after_change_rebinds_fresh_identities() {
    for async_mode in [false, true] {
        let (project, a) = cascade_project();
        let (mut heartbeat, _) = recording_heartbeat(&project, async_mode);
        let (id_a, id_b, id_d) = (project.id_of("A"), project.id_of("B"), project.id_of("D"));
        assert!(!heartbeat.heartbeat_check().unwrap());

        touch(&a);
        let deadline = Instant::now() + Duration::from_secs(10);
        while !heartbeat.heartbeat_check().unwrap() {
            assert!(Instant::now() < deadline, "change was never detected (async: {async_mode})");
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!project.is_bound("A"));
        assert_eq!(project.id_of("D"), id_d);

        project.define("app/a.rb", &[("A", None), ("A::C", None)]);
        project.define("app/b.rb", &[("B", Some("A"))]);

        assert!(project.is_bound("A") && project.is_bound("B"));
        assert_ne!(project.id_of("A"), id_a);
        assert_ne!(project.id_of("B"), id_b);
        assert_eq!(project.id_of("D"), id_d);
        assert!(!heartbeat.heartbeat_check().unwrap());
    }
}

/// One touch batch makes the heartbeat return true exactly once
#[test]
fn test_heartbeat_reports_each_batch_once() {
    let (project, a) = cascade_project();
    let d = project.root().join("lib/d.rb");
    let (mut heartbeat, reports) = recording_heartbeat(&project, false);

    assert!(!heartbeat.heartbeat_check().unwrap());
    touch(&a);
    touch(&d);
    assert!(heartbeat.heartbeat_check().unwrap());
    assert!(!heartbeat.heartbeat_check().unwrap());
    assert!(!heartbeat.heartbeat_check().unwrap());

    let reports = reports.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].removed_files.len(), 3);
    assert!(project.tracker.symbol_index().is_empty());
}

/// Explicit removal and change detection share the same cascade
#[test]
fn test_remove_symbol_then_touch_is_a_no_op() {
    let (project, a) = cascade_project();
    project.tracker.remove_symbol("A").unwrap();
    assert!(!project.is_bound("B"));
    assert!(project.is_bound("D"));

    touch(&a);
    assert!(!project.tracker.unload_modified().unwrap());
}

/// The CLI maps files under the root to camel-cased symbols
#[test]
fn test_cli_scan_lists_symbols() {
    let project = Project::new();
    let root = project.root();
    std::fs::create_dir_all(root.join("models")).unwrap();
    std::fs::write(root.join("models/user_profile.rb"), "").unwrap();
    std::fs::write(root.join("models/post.rb"), "").unwrap();
    std::fs::write(root.join("notes.txt"), "").unwrap();
    std::fs::write(root.join("deadwood.toml"), "include = [\"**/*.rb\"]\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_deadwood"))
        .args(["--root", root.to_str().unwrap(), "scan", "--json"])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());

    let entries: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    let symbols: Vec<&str> = entries.iter().filter_map(|e| e["symbol"].as_str()).collect();
    assert_eq!(symbols, vec!["Models::Post", "Models::UserProfile"]);
}

/// Test that the CLI can be invoked
#[test]
fn test_cli_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_deadwood"))
        .arg("version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Deadwood v"));
}
