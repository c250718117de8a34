//! The process provider against real children: stdio capture, graceful
//! stop with SIGKILL escalation, stop commands, and exit detection.

#![cfg(unix)]

use std::time::{Duration, Instant};
use warden::{Manager, Process, PropertyName, PropertyValue, Service};

fn shell(name: &str, script: &str) -> Process {
    Process::new(
        name,
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()],
    )
}

async fn wait_until<F, Fut>(deadline: Duration, mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let end = tokio::time::Instant::now() + deadline;
    while tokio::time::Instant::now() < end {
        if cond().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test]
async fn stdout_lands_in_the_service_log() {
    let mgr = Manager::new("proc");
    let svc = mgr
        .add_service(Service::new(Box::new(shell(
            "echoer",
            "echo hello from child; sleep 30",
        ))))
        .await;

    svc.enable().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || async {
            let (records, _) = svc.log_records(0).await.unwrap();
            records
                .iter()
                .any(|r| r.text.contains("stdout> hello from child"))
        })
        .await,
        "captured stdout line should appear in the ring"
    );
    svc.disable().await.unwrap();
    assert!(!svc.running().await);
}

#[tokio::test]
async fn sigterm_ignorer_is_escalated_to_sigkill() {
    let mgr = Manager::new("proc");
    let svc = mgr
        .add_service(Service::new(Box::new(shell(
            "stubborn",
            "trap '' TERM; while :; do sleep 1; done",
        ))))
        .await;
    svc.set_property(
        PropertyName::StopTime,
        PropertyValue::Duration(Duration::from_millis(200)),
    )
    .await
    .unwrap();

    svc.enable().await.unwrap();
    assert!(svc.running().await);
    // Give the shell a moment to install its trap.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let begun = Instant::now();
    svc.disable().await.unwrap();
    let elapsed = begun.elapsed();

    assert!(!svc.running().await);
    assert!(
        elapsed >= Duration::from_millis(200),
        "must wait out the grace period, took {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_secs(5),
        "SIGKILL must end it promptly, took {elapsed:?}"
    );
}

#[tokio::test]
async fn stop_command_receives_the_pid() {
    let mgr = Manager::new("proc");
    let svc = mgr
        .add_service(Service::new(Box::new(shell("victim", "sleep 30"))))
        .await;
    svc.set_property(
        PropertyName::StopCommand,
        PropertyValue::TextList(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "kill -TERM $PID".to_string(),
        ]),
    )
    .await
    .unwrap();

    svc.enable().await.unwrap();
    assert!(svc.running().await);

    let begun = Instant::now();
    svc.disable().await.unwrap();
    assert!(!svc.running().await);
    assert!(begun.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn clean_exit_without_fail_on_exit_is_not_a_fault() {
    let mgr = Manager::new("proc");
    let svc = mgr
        .add_service(Service::new(Box::new(shell("oneshot", "exit 0"))))
        .await;

    svc.enable().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!svc.failed().await);
}

#[tokio::test]
async fn unexpected_exit_with_fail_on_exit_latches_via_notify() {
    let mgr = Manager::new("proc");
    let svc = mgr
        .add_service(Service::new(Box::new(shell("flash", "sleep 0.2"))))
        .await;
    svc.set_property(PropertyName::FailOnExit, PropertyValue::Bool(true))
        .await
        .unwrap();

    svc.enable().await.unwrap();
    // No monitoring started: the exit must be reported through the
    // provider's notify callback, not the periodic check.
    assert!(
        wait_until(Duration::from_secs(3), || svc.failed()).await,
        "exit should latch a fault through notify"
    );
    assert!(!svc.running().await);
}

#[tokio::test]
async fn nonzero_exit_latches_even_without_fail_on_exit() {
    let mgr = Manager::new("proc");
    let svc = mgr
        .add_service(Service::new(Box::new(shell("crasher", "exit 3"))))
        .await;

    svc.enable().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(3), || svc.failed()).await,
        "non-zero exit is always a fault"
    );
}

#[tokio::test]
async fn failing_check_command_faults_the_service() {
    let mgr = Manager::new("proc");
    let svc = mgr
        .add_service(Service::new(Box::new(shell("checked", "sleep 30"))))
        .await;
    svc.set_property(
        PropertyName::CheckCommand,
        PropertyValue::TextList(vec!["/bin/false".to_string()]),
    )
    .await
    .unwrap();

    svc.enable().await.unwrap();
    assert!(svc.check().await.is_err());
    assert!(svc.failed().await);
    assert!(!svc.running().await);
}

#[tokio::test]
async fn passing_check_command_keeps_the_service_up() {
    let mgr = Manager::new("proc");
    let svc = mgr
        .add_service(Service::new(Box::new(shell("healthy", "sleep 30"))))
        .await;
    svc.set_property(
        PropertyName::CheckCommand,
        PropertyValue::TextList(vec!["/bin/true".to_string()]),
    )
    .await
    .unwrap();

    svc.enable().await.unwrap();
    svc.check().await.unwrap();
    assert!(svc.running().await);
    svc.disable().await.unwrap();
}

#[tokio::test]
async fn environment_entries_reach_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = r#"{
        "name": "envy",
        "command": ["/bin/sh", "-c", "echo value=$DEMO_VALUE; sleep 30"],
        "env": ["DEMO_VALUE=42"]
    }"#;
    let path = dir.path().join("envy.json");
    std::fs::write(&path, manifest).unwrap();

    let mgr = Manager::new("proc");
    let svc = mgr
        .add_service(warden::load_manifest_file(&path).unwrap())
        .await;
    svc.enable().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || async {
            let (records, _) = svc.log_records(0).await.unwrap();
            records.iter().any(|r| r.text.contains("value=42"))
        })
        .await
    );
    svc.disable().await.unwrap();
}
