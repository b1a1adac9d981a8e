#![cfg(unix)]

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use healthstack_supervisor::config::{ReadyProbe, ServiceDescriptor, Tier};
use healthstack_supervisor::error::SupervisorError;
use healthstack_supervisor::process::manager::{ShutdownOutcome, Supervisor};

/// A long-running child whose readiness probe points at a port the test
/// controls, so launch succeeds as soon as the listener is up.
fn sleeper(name: &'static str, tier: Tier, ready_port: u16) -> ServiceDescriptor {
    ServiceDescriptor {
        name,
        program: "sleep".into(),
        args: vec!["30".into()],
        working_dir: std::env::temp_dir(),
        depends_on: vec![],
        tier,
        ready: ReadyProbe::TcpPort(ready_port),
        ready_timeout: Duration::from_secs(5),
    }
}

fn broken(name: &'static str, tier: Tier) -> ServiceDescriptor {
    ServiceDescriptor {
        name,
        program: "definitely-not-a-real-binary".into(),
        args: vec![],
        working_dir: std::env::temp_dir(),
        depends_on: vec![],
        tier,
        ready: ReadyProbe::TcpPort(1),
        ready_timeout: Duration::from_secs(1),
    }
}

fn ready_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[tokio::test]
async fn launch_then_stop_all_terminates_gracefully() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(tmp.path().to_path_buf());
    let (_listener, port) = ready_listener();

    supervisor
        .launch(&sleeper("backend", Tier::Required, port))
        .await
        .expect("launch should succeed");
    assert!(supervisor.is_managed("backend").await);
    assert!(supervisor.any_running().await);
    assert!(tmp.path().join("backend.pid").exists());

    let results = supervisor.stop_all().await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome, ShutdownOutcome::Terminated);
    assert!(!tmp.path().join("backend.pid").exists());
    assert!(!supervisor.any_running().await);
}

#[tokio::test]
async fn stop_all_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(tmp.path().to_path_buf());
    let (_listener, port) = ready_listener();

    supervisor
        .launch(&sleeper("frontend", Tier::Required, port))
        .await
        .unwrap();

    let first = supervisor.stop_all().await;
    assert_eq!(first.len(), 1);

    let second = supervisor.stop_all().await;
    assert!(second.is_empty(), "second stop_all should find nothing");
}

#[tokio::test]
async fn launch_missing_program_reports_launch_error() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(tmp.path().to_path_buf());

    let err = supervisor
        .launch(&broken("backend", Tier::Required))
        .await
        .expect_err("missing binary must fail");
    assert!(matches!(err, SupervisorError::Launch { .. }));
    assert!(supervisor.managed_names().await.is_empty());
}

#[tokio::test]
async fn required_tier_failure_halts_sequence() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(tmp.path().to_path_buf());
    let (_listener, port) = ready_listener();

    let descriptors = vec![
        broken("mongodb", Tier::Required),
        sleeper("backend", Tier::Required, port),
    ];
    let err = supervisor.launch_all(&descriptors).await.expect_err("required failure aborts");
    assert!(matches!(err, SupervisorError::Launch { .. }));

    // The second service must never have been launched.
    assert!(supervisor.managed_names().await.is_empty());
}

#[tokio::test]
async fn optional_tier_failure_continues() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(tmp.path().to_path_buf());
    let (_listener, port) = ready_listener();

    let descriptors = vec![
        broken("ai-service", Tier::Optional),
        sleeper("frontend", Tier::Required, port),
    ];
    supervisor
        .launch_all(&descriptors)
        .await
        .expect("optional failure must not abort");

    assert_eq!(supervisor.managed_names().await, vec!["frontend".to_string()]);
    supervisor.stop_all().await;
}

#[tokio::test]
async fn child_exiting_during_startup_is_a_launch_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(tmp.path().to_path_buf());

    // A port nothing listens on, so readiness can only come from the probe
    // never succeeding; `false` exits nonzero right away.
    let (listener, port) = ready_listener();
    drop(listener);

    let descriptor = ServiceDescriptor {
        name: "backend",
        program: "false".into(),
        args: vec![],
        working_dir: std::env::temp_dir(),
        depends_on: vec![],
        tier: Tier::Required,
        ready: ReadyProbe::TcpPort(port),
        ready_timeout: Duration::from_secs(5),
    };

    let err = supervisor.launch(&descriptor).await.expect_err("exit during startup");
    assert!(matches!(err, SupervisorError::ExitedDuringStartup { .. }));
    assert!(supervisor.managed_names().await.is_empty());
    assert!(!tmp.path().join("backend.pid").exists());
}

#[tokio::test]
async fn duplicate_launch_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(tmp.path().to_path_buf());
    let (_listener, port) = ready_listener();

    supervisor
        .launch(&sleeper("mongodb", Tier::Required, port))
        .await
        .unwrap();
    let err = supervisor
        .launch(&sleeper("mongodb", Tier::Required, port))
        .await
        .expect_err("second launch of the same service must fail");
    assert!(matches!(err, SupervisorError::AlreadyRunning { .. }));

    supervisor.stop_all().await;
}

#[tokio::test]
async fn unmet_dependency_fails_required_service() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(tmp.path().to_path_buf());
    let (_listener, port) = ready_listener();

    let mut descriptor = sleeper("backend", Tier::Required, port);
    descriptor.depends_on = vec!["mongodb"];

    let err = supervisor
        .launch_all(&[descriptor])
        .await
        .expect_err("missing dependency must abort");
    assert!(err.to_string().contains("mongodb"));
    assert!(supervisor.managed_names().await.is_empty());
}

#[tokio::test]
async fn stop_all_during_readiness_wait_interrupts_launch_sequence() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Arc::new(Supervisor::new(tmp.path().to_path_buf()));

    // The first service's probe port never opens, so launch_all sits in the
    // readiness poll; the second would become ready instantly.
    let (listener, stuck_port) = ready_listener();
    drop(listener);
    let (_live_listener, live_port) = ready_listener();

    let mut first = sleeper("mongodb", Tier::Required, stuck_port);
    first.ready_timeout = Duration::from_secs(30);
    let descriptors = vec![first, sleeper("backend", Tier::Required, live_port)];

    let launcher = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.launch_all(&descriptors).await })
    };

    // Let the first launch enter its readiness poll, then shut down.
    tokio::time::sleep(Duration::from_millis(400)).await;
    supervisor.stop_all().await;

    let result = tokio::time::timeout(Duration::from_secs(10), launcher)
        .await
        .expect("launch_all must return promptly after shutdown")
        .unwrap();
    assert!(matches!(result, Err(SupervisorError::Interrupted { .. })));

    // Nothing may survive: the stuck child is reaped and the second service
    // must never have been launched.
    assert!(supervisor.managed_names().await.is_empty());
    assert!(!supervisor.any_running().await);
}

#[tokio::test]
async fn stop_single_service_leaves_the_rest_running() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(tmp.path().to_path_buf());
    let (_listener, port) = ready_listener();

    supervisor
        .launch(&sleeper("backend", Tier::Required, port))
        .await
        .unwrap();
    supervisor
        .launch(&sleeper("frontend", Tier::Required, port))
        .await
        .unwrap();

    let result = supervisor.stop("backend").await.expect("backend is managed");
    assert_eq!(result.outcome, ShutdownOutcome::Terminated);
    assert!(!tmp.path().join("backend.pid").exists());

    assert!(supervisor.is_managed("frontend").await);
    assert!(supervisor.any_running().await);
    assert!(supervisor.stop("backend").await.is_none());

    supervisor.stop_all().await;
}

#[tokio::test]
async fn launch_after_stop_all_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(tmp.path().to_path_buf());
    let (_listener, port) = ready_listener();

    supervisor.stop_all().await;

    let err = supervisor
        .launch(&sleeper("backend", Tier::Required, port))
        .await
        .expect_err("launch after shutdown must be refused");
    assert!(matches!(err, SupervisorError::Interrupted { .. }));
    assert!(supervisor.managed_names().await.is_empty());
}

#[tokio::test]
async fn ready_timeout_converts_to_error_but_keeps_child_managed() {
    let tmp = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::new(tmp.path().to_path_buf());
    let (listener, port) = ready_listener();
    drop(listener);

    let mut descriptor = sleeper("frontend", Tier::Required, port);
    descriptor.ready_timeout = Duration::from_millis(600);

    let err = supervisor.launch(&descriptor).await.expect_err("probe must time out");
    assert!(matches!(err, SupervisorError::ReadyTimeout { .. }));

    // Still tracked, so the abort path's stop_all reaps it.
    assert!(supervisor.is_managed("frontend").await);
    let results = supervisor.stop_all().await;
    assert_eq!(results.len(), 1);
    assert!(results[0].succeeded());
}
