//! Integration tests for the hand-off protocol driven through a scripted pane.
//!
//! Validates:
//! - A signal for a missing artifact logs one error and touches no pane
//! - Readiness polling stops at the first sample showing a prompt
//! - A pane that never shows a prompt times out without relaunching
//! - A full hand-off interrupts twice, relaunches, archives and records status

use std::sync::Arc;
use std::time::Duration;

use symphony_relay::audit::{HandoffArchive, HandoffPhase, StatusStore};
use symphony_relay::ipc::codec::{RelaySignal, SignalKind};
use symphony_relay::orchestrator::handoff::HandoffHandler;
use symphony_relay::pane::readiness::ReadinessProbe;
use symphony_relay::pane::PaneHandle;
use symphony_relay::AppError;

use super::test_helpers::{capture_logs, FakePane, PaneOp, TestRelay};

fn signal(path: &str, pane: &str) -> RelaySignal {
    RelaySignal {
        kind: SignalKind::Ready,
        handoff_path: path.into(),
        pane_id: pane.into(),
    }
}

fn handler(relay: &TestRelay, pane: &Arc<FakePane>) -> HandoffHandler {
    HandoffHandler::new(&relay.config, pane.clone()).expect("handler")
}

fn status_store(relay: &TestRelay) -> StatusStore {
    StatusStore::new(relay.config.paths.status_file.clone())
}

// ── Missing artifact ──────────────────────────────────────

#[tokio::test]
async fn missing_artifact_logs_one_error_and_leaves_pane_alone() {
    let relay = TestRelay::new();
    let pane = FakePane::at_prompt();
    let handler = handler(&relay, &pane);
    let missing = relay.temp.path().join("nope.md");
    let missing = missing.to_string_lossy().into_owned();

    let (logs, _guard) = capture_logs();
    let err = handler
        .handle(&signal(&missing, "%3"))
        .await
        .expect_err("missing artifact");

    assert!(matches!(err, AppError::HandoffFileMissing(ref path) if *path == missing));
    let errors = logs.at_level("ERROR");
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains(&missing), "{}", errors[0]);
    assert!(pane.ops().is_empty(), "pane touched: {:?}", pane.ops());

    let status = status_store(&relay).read().expect("read").expect("recorded");
    assert_eq!(status.phase, HandoffPhase::Failed);
    assert_eq!(status.handoff_path, missing);
    assert!(
        errors[0].contains(&format!("handoff{{id={} pane=%3}}: ", status.id)),
        "log line not tied to status record: {}",
        errors[0]
    );
    assert!(status.detail.expect("detail").contains("handoff file missing"));
}

// ── Readiness polling ─────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn readiness_succeeds_on_third_sample() {
    let relay = TestRelay::new();
    let pane = FakePane::new();
    pane.script_captures(&[
        &["Thinking…"],
        &["Saving hand-off", ""],
        &["^C", "user@host:~/work$ "],
    ]);
    let handler = handler(&relay, &pane);

    let waited = handler
        .wait_for_shell(&PaneHandle::new("%3"))
        .await
        .expect("ready");

    assert_eq!(pane.captures_taken(), 3);
    assert!(
        waited >= Duration::from_millis(600) && waited < Duration::from_millis(900),
        "waited {waited:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn readiness_returns_immediately_when_prompt_already_visible() {
    let relay = TestRelay::new();
    let pane = FakePane::at_prompt();
    let handler = handler(&relay, &pane);

    let waited = handler
        .wait_for_shell(&PaneHandle::new("%3"))
        .await
        .expect("ready");

    assert_eq!(pane.captures_taken(), 1);
    assert_eq!(waited, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn readiness_timeout_abandons_without_relaunch() {
    let relay = TestRelay::new();
    let artifact = relay.handoff_file("handoff.md");
    let artifact = artifact.to_string_lossy().into_owned();
    let pane = FakePane::new();
    pane.script_captures(&[&["Esc to cancel · still working"]]);
    let handler = handler(&relay, &pane);

    let started = tokio::time::Instant::now();
    let err = handler
        .handle(&signal(&artifact, "%3"))
        .await
        .expect_err("timeout");

    assert!(matches!(err, AppError::ReadinessTimeout(_)), "{err}");
    assert!(started.elapsed() <= Duration::from_secs(11));
    assert!(pane.captures_taken() > 1);
    assert_eq!(
        pane.mutations(),
        [
            PaneOp::Interrupt("%3".into()),
            PaneOp::Interrupt("%3".into())
        ]
    );

    let status = status_store(&relay).read().expect("read").expect("recorded");
    assert_eq!(status.phase, HandoffPhase::Failed);
    assert!(HandoffArchive::new(relay.config.paths.archive_dir.clone())
        .entries()
        .expect("entries")
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn custom_probe_replaces_prompt_heuristic() {
    struct ReadyWhenMarked;

    impl ReadinessProbe for ReadyWhenMarked {
        fn is_ready(&self, captured: &[String]) -> bool {
            captured.iter().any(|line| line.contains("READY"))
        }
    }

    let relay = TestRelay::new();
    let pane = FakePane::new();
    pane.script_captures(&[&["user@host:~$ "], &["READY"]]);
    let handler = handler(&relay, &pane).with_probe(Arc::new(ReadyWhenMarked));

    handler
        .wait_for_shell(&PaneHandle::new("%1"))
        .await
        .expect("ready");

    assert_eq!(pane.captures_taken(), 2);
}

// ── Full hand-off ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn successful_handoff_relaunches_in_same_pane() {
    let relay = TestRelay::new();
    let artifact = relay.handoff_file("handoff.md");
    let artifact_str = artifact.to_string_lossy().into_owned();
    let pane = FakePane::new();
    pane.script_captures(&[&["Thinking…"], &["user@host:~$ "]]);
    let handler = handler(&relay, &pane);

    let report = handler
        .handle(&signal(&artifact_str, "%3"))
        .await
        .expect("hand-off");

    assert_eq!(
        report.relaunch_command,
        format!(
            "claude --continue 'Read the hand-off document at {artifact_str} and resume the work it describes.'"
        )
    );
    assert_eq!(
        pane.mutations(),
        [
            PaneOp::Interrupt("%3".into()),
            PaneOp::Interrupt("%3".into()),
            PaneOp::SendKeys("%3".into(), report.relaunch_command.clone()),
        ]
    );

    let archived = report.archived.expect("archived");
    assert!(archived.starts_with(&relay.config.paths.archive_dir));
    assert_eq!(
        std::fs::read_to_string(&archived).expect("archive entry"),
        std::fs::read_to_string(&artifact).expect("artifact")
    );
    assert!(artifact.exists(), "artifact must stay in place");

    let status = status_store(&relay).read().expect("read").expect("recorded");
    assert_eq!(status.id, report.id);
    assert_eq!(status.phase, HandoffPhase::Relaunched);
    assert_eq!(status.pane_id, "%3");
}

#[tokio::test(start_paused = true)]
async fn interrupts_are_separated_by_configured_gap() {
    let relay = TestRelay::with_toml("[handoff]\ninterrupt_gap_ms = 750\n");
    let artifact = relay.handoff_file("handoff.md");
    let pane = FakePane::at_prompt();
    let handler = handler(&relay, &pane);

    let started = tokio::time::Instant::now();
    let report = handler
        .handle(&signal(&artifact.to_string_lossy(), "%5"))
        .await
        .expect("hand-off");

    assert_eq!(report.readiness_wait, Duration::ZERO);
    assert!(started.elapsed() >= Duration::from_millis(750));
}

#[test]
fn relaunch_uses_configured_cli() {
    let relay = TestRelay::with_toml(
        r#"
[cli]
binary = "aider"
continue_args = ["--restore-chat-history"]
instruction = "Continue from {handoff}"
"#,
    );
    let handler = handler(&relay, &FakePane::at_prompt());

    assert_eq!(
        handler.relaunch_command("/tmp/h.md"),
        "aider --restore-chat-history 'Continue from /tmp/h.md'"
    );
}
