//! Integration tests for the ready-signal emitter.
//!
//! Validates:
//! - Missing artifacts and missing channels are reported before any write
//! - Delivery to a channel with no reader gives up without blocking
//! - Delivery and the acknowledgment wait share one bound
//! - The acknowledgment wait honours its bound and cancellation
//! - A live daemon acknowledges a delivered signal

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use symphony_relay::audit::{HandoffPhase, HandoffStatus, StatusStore};
use symphony_relay::emitter::{await_ack, signal_relay_ready, EmitOutcome};
use symphony_relay::ipc::channel;
use symphony_relay::ipc::codec::RelaySignal;
use symphony_relay::orchestrator::daemon::Daemon;
use symphony_relay::AppError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::test_helpers::{FakePane, PaneOp, TestRelay};

#[tokio::test]
async fn missing_artifact_is_rejected_before_signalling() {
    let relay = TestRelay::fast();

    let err = signal_relay_ready(
        &relay.config,
        &relay.temp.path().join("absent.md"),
        "%1",
        CancellationToken::new(),
    )
    .await
    .expect_err("missing artifact");

    assert!(matches!(err, AppError::HandoffFileMissing(_)));
}

#[tokio::test]
async fn missing_channel_means_no_daemon() {
    let relay = TestRelay::fast();
    let artifact = relay.handoff_file("handoff.md");

    let err = signal_relay_ready(&relay.config, &artifact, "%1", CancellationToken::new())
        .await
        .expect_err("no channel");

    assert!(matches!(err, AppError::ChannelUnavailable(ref msg) if msg.contains("is the relay daemon running")));
}

// ── Delivery ──────────────────────────────────────────────

const ONE_SECOND_ACK: &str = "[emitter]\nack_timeout_secs = 1\n";

#[tokio::test]
async fn delivery_gives_up_when_no_reader_attaches() {
    let relay = TestRelay::with_toml(ONE_SECOND_ACK);
    channel::create(&relay.config.paths.pipe_path).expect("pipe left behind");
    let artifact = relay.handoff_file("handoff.md");

    let started = Instant::now();
    let err = signal_relay_ready(&relay.config, &artifact, "%1", CancellationToken::new())
        .await
        .expect_err("no reader");

    assert!(
        matches!(err, AppError::ChannelUnavailable(ref msg) if msg.contains("no relay daemon attached")),
        "{err}"
    );
    let waited = started.elapsed();
    assert!(
        waited >= Duration::from_secs(1) && waited < Duration::from_secs(2),
        "waited {waited:?}"
    );
}

#[tokio::test]
async fn delivery_stops_on_cancel() {
    let relay = TestRelay::fast();
    channel::create(&relay.config.paths.pipe_path).expect("pipe left behind");
    let artifact = relay.handoff_file("handoff.md");
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
    }

    let started = Instant::now();
    let err = signal_relay_ready(&relay.config, &artifact, "%1", cancel)
        .await
        .expect_err("cancelled");

    assert!(matches!(err, AppError::ChannelUnavailable(_)));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn delivery_and_ack_share_one_bound() {
    let relay = TestRelay::with_toml(ONE_SECOND_ACK);
    let pipe = relay.config.paths.pipe_path.clone();
    channel::create(&pipe).expect("pipe");
    let artifact = relay.handoff_file("handoff.md");

    // A reader that attaches late and never acknowledges.
    let late_reader = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(600));
        channel::start_reader(&pipe, |_| {}, |_| {}).expect("reader")
    });

    let started = Instant::now();
    let outcome = signal_relay_ready(&relay.config, &artifact, "%1", CancellationToken::new())
        .await
        .expect("delivered");

    assert_eq!(outcome, EmitOutcome::Unconfirmed);
    let waited = started.elapsed();
    assert!(waited < Duration::from_millis(1400), "waited {waited:?}");

    late_reader.join().expect("reader thread").join();
}

// ── Acknowledgment wait ───────────────────────────────────

#[tokio::test(start_paused = true)]
async fn ack_wait_gives_up_after_bound() {
    let relay = TestRelay::new();
    let artifact = relay.handoff_file("handoff.md");
    let signal = RelaySignal::ready(&artifact, "%1").expect("signal");
    let store = StatusStore::new(relay.config.paths.status_file.clone());

    let started = tokio::time::Instant::now();
    let outcome = await_ack(
        &store,
        &signal,
        Utc::now(),
        Duration::from_secs(3),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, EmitOutcome::Unconfirmed);
    let waited = started.elapsed();
    assert!(
        waited >= Duration::from_secs(3) && waited < Duration::from_millis(3100),
        "waited {waited:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn ack_wait_returns_matching_record() {
    let relay = TestRelay::new();
    let artifact = relay.handoff_file("handoff.md");
    let signal = RelaySignal::ready(&artifact, "%1").expect("signal");
    let store = StatusStore::new(relay.config.paths.status_file.clone());
    let since = Utc::now();
    let record = HandoffStatus::new(
        Uuid::new_v4(),
        &signal.handoff_path,
        "%1",
        HandoffPhase::Accepted,
    );
    store.write(&record).expect("write");

    let outcome = await_ack(
        &store,
        &signal,
        since,
        Duration::from_secs(3),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, EmitOutcome::Acknowledged(record));
}

#[tokio::test(start_paused = true)]
async fn ack_wait_ignores_records_for_other_panes() {
    let relay = TestRelay::new();
    let artifact = relay.handoff_file("handoff.md");
    let signal = RelaySignal::ready(&artifact, "%1").expect("signal");
    let store = StatusStore::new(relay.config.paths.status_file.clone());
    let since = Utc::now();
    store
        .write(&HandoffStatus::new(
            Uuid::new_v4(),
            &signal.handoff_path,
            "%9",
            HandoffPhase::Relaunched,
        ))
        .expect("write");

    let outcome = await_ack(
        &store,
        &signal,
        since,
        Duration::from_secs(1),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome, EmitOutcome::Unconfirmed);
}

#[tokio::test(start_paused = true)]
async fn ack_wait_stops_on_cancel() {
    let relay = TestRelay::new();
    let artifact = relay.handoff_file("handoff.md");
    let signal = RelaySignal::ready(&artifact, "%1").expect("signal");
    let store = StatusStore::new(relay.config.paths.status_file.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let started = tokio::time::Instant::now();
    let outcome = await_ack(&store, &signal, Utc::now(), Duration::from_secs(60), cancel).await;

    assert_eq!(outcome, EmitOutcome::Unconfirmed);
    assert!(started.elapsed() < Duration::from_secs(1));
}

// ── Against a live daemon ─────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn daemon_acknowledges_delivered_signal() {
    let relay = TestRelay::fast();
    let pane = FakePane::at_prompt();
    let daemon = Arc::new(
        Daemon::new(Arc::clone(&relay.config), pane.clone()).expect("daemon"),
    );
    let _guard = daemon.prepare().expect("prepare");

    let cancel = CancellationToken::new();
    let serving = {
        let daemon = Arc::clone(&daemon);
        let cancel = cancel.clone();
        tokio::spawn(async move { daemon.serve(cancel).await })
    };

    let artifact = relay.handoff_file("handoff.md");
    let outcome = signal_relay_ready(&relay.config, &artifact, "%6", CancellationToken::new())
        .await
        .expect("signal");

    let status = match outcome {
        EmitOutcome::Acknowledged(status) => status,
        EmitOutcome::Unconfirmed => panic!("daemon never acknowledged"),
    };
    assert_ne!(status.phase, HandoffPhase::Failed);
    assert_eq!(status.pane_id, "%6");
    assert_eq!(
        status.handoff_path,
        artifact.canonicalize().expect("canonical").to_string_lossy()
    );

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("serve returns")
        .expect("join")
        .expect("serve");
    assert!(pane.mutations().contains(&PaneOp::Interrupt("%6".into())));
}
