#![cfg(unix)]

use std::time::Duration;

use healthstack_supervisor::pidfile;
use healthstack_supervisor::process::manager::ShutdownOutcome;
use healthstack_supervisor::process::scanner::{self, PortMatch};

/// Spawn a sleep with an unusual argument so its command line is unique
/// enough to match without catching unrelated processes.
fn spawn_marked_sleeper(marker: &str) -> std::process::Child {
    std::process::Command::new("sleep")
        .arg(marker)
        .spawn()
        .expect("sleep should spawn")
}

#[test]
fn find_by_command_pattern_matches_spawned_process() {
    let mut child = spawn_marked_sleeper("31417");
    // Give the OS a moment to publish the cmdline.
    std::thread::sleep(Duration::from_millis(200));

    let matches = scanner::find_by_command_pattern(&["sleep 31417"]);
    let found = matches.iter().any(|m| m.pid == child.id());
    let _ = child.kill();
    let _ = child.wait();
    assert!(found, "spawned sleeper should be discovered by pattern");
}

#[test]
fn pattern_matching_is_case_insensitive() {
    let mut child = spawn_marked_sleeper("31418");
    std::thread::sleep(Duration::from_millis(200));

    let matches = scanner::find_by_command_pattern(&["SLEEP 31418"]);
    let found = matches.iter().any(|m| m.pid == child.id());
    let _ = child.kill();
    let _ = child.wait();
    assert!(found);
}

#[tokio::test]
async fn terminate_all_stops_discovered_process() {
    let mut child = spawn_marked_sleeper("31419");
    let pid = child.id();

    let matches = vec![PortMatch {
        pid,
        port: None,
        process_name: "sleep".to_string(),
    }];
    let results = scanner::terminate_all(&matches, Duration::from_secs(5)).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome, ShutdownOutcome::Terminated);

    // Reap the child so the test process does not leak a zombie.
    let _ = child.wait();
}

#[tokio::test]
async fn stop_flow_from_pidfiles_terminates_recorded_pid() {
    let tmp = tempfile::tempdir().unwrap();
    let run_dir = tmp.path().to_path_buf();

    let mut child = spawn_marked_sleeper("31420");
    pidfile::write_pidfile(&run_dir, "backend", child.id()).unwrap();

    let recorded = pidfile::read_pidfiles(&run_dir);
    assert_eq!(recorded.len(), 1);

    let matches: Vec<PortMatch> = recorded
        .iter()
        .map(|(service, pid)| PortMatch {
            pid: *pid,
            port: None,
            process_name: service.clone(),
        })
        .collect();

    let results = scanner::terminate_all(&matches, Duration::from_secs(5)).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].succeeded());

    let _ = child.wait();
}

#[tokio::test]
async fn listening_port_scan_never_reports_own_pid() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let matches = scanner::find_by_listening_port(&[port]).await;
    let own_pid = std::process::id();
    assert!(matches.iter().all(|m| m.pid != own_pid));
}

#[tokio::test]
async fn terminating_nothing_yields_empty_summary() {
    // The "stop when nothing is running" scenario: empty discovery result,
    // empty shutdown report.
    let merged = scanner::merge(Vec::new(), Vec::new());
    assert!(merged.is_empty());
    let results = scanner::terminate_all(&merged, Duration::from_secs(1)).await;
    assert!(results.is_empty());
}
