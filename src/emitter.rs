//! Client-side signal emitter.
//!
//! Runs inside the interactive pane when the AI session decides to hand
//! off. It publishes a ready signal and then waits for the daemon to
//! acknowledge it through the hand-off status record, up to a bound. Once
//! acknowledged (or the bound elapses) the caller may exit.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audit::{HandoffStatus, StatusStore};
use crate::config::RelayConfig;
use crate::ipc::channel;
use crate::ipc::codec::{self, RelaySignal};
use crate::{AppError, Result};

/// Interval between reads of the status record.
pub const ACK_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Interval between delivery attempts while no reader is attached.
pub const DELIVERY_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Result of emitting a ready signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitOutcome {
    /// The daemon recorded a status for this hand-off.
    Acknowledged(HandoffStatus),
    /// The signal was delivered but no acknowledgment arrived in time.
    Unconfirmed,
}

/// Publish a ready signal for `handoff_path` in `pane_id` and await the
/// daemon's acknowledgment.
///
/// # Errors
///
/// Returns `AppError::HandoffFileMissing` if the artifact does not exist and
/// `AppError::ChannelUnavailable` if the channel is missing, or no daemon
/// attaches to it before the acknowledgment bound or `cancel`. Delivery and
/// the acknowledgment wait share one bound.
pub async fn signal_relay_ready(
    config: &RelayConfig,
    handoff_path: &Path,
    pane_id: &str,
    cancel: CancellationToken,
) -> Result<EmitOutcome> {
    let signal = RelaySignal::ready(handoff_path, pane_id)?;

    let pipe = config.paths.pipe_path.clone();
    if !channel::is_fifo(&pipe) {
        return Err(AppError::ChannelUnavailable(format!(
            "{} does not exist; is the relay daemon running?",
            pipe.display()
        )));
    }

    let bound = config.emitter.ack_timeout();
    let deadline = Instant::now() + bound;
    let sent_at = Utc::now();
    deliver(&codec::encode(&signal), &pipe, bound, deadline, &cancel).await?;
    info!(handoff = %signal.handoff_path, pane = %signal.pane_id, "ready signal sent");

    let store = StatusStore::new(config.paths.status_file.clone());
    let remaining = deadline.saturating_duration_since(Instant::now());
    Ok(await_ack(&store, &signal, sent_at, remaining, cancel).await)
}

/// Write `line` to the pipe, retrying until a reader is attached, `deadline`
/// passes, or `cancel` fires.
async fn deliver(
    line: &str,
    pipe: &Path,
    bound: Duration,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        if channel::try_write(line, pipe)? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(AppError::ChannelUnavailable(format!(
                "no relay daemon attached within {}s",
                bound.as_secs()
            )));
        }

        let next = (Instant::now() + DELIVERY_RETRY_INTERVAL).min(deadline);
        tokio::select! {
            () = cancel.cancelled() => {
                return Err(AppError::ChannelUnavailable(
                    "cancelled before a relay daemon attached".into(),
                ));
            }
            () = sleep_until(next) => {}
        }
    }
}

/// Poll `store` until it holds a record answering `signal`, the bound
/// elapses, or `cancel` fires. Unreadable records are skipped.
pub async fn await_ack(
    store: &StatusStore,
    signal: &RelaySignal,
    since: DateTime<Utc>,
    bound: Duration,
    cancel: CancellationToken,
) -> EmitOutcome {
    let deadline = Instant::now() + bound;

    loop {
        match store.read() {
            Ok(Some(status)) if status.answers(&signal.handoff_path, &signal.pane_id, since) => {
                debug!(phase = ?status.phase, "hand-off acknowledged");
                return EmitOutcome::Acknowledged(status);
            }
            Ok(_) => {}
            Err(err) => debug!(%err, "skipping unreadable hand-off status"),
        }

        if Instant::now() >= deadline {
            warn!(
                timeout_secs = bound.as_secs(),
                "no acknowledgment from relay daemon"
            );
            return EmitOutcome::Unconfirmed;
        }

        let next = (Instant::now() + ACK_POLL_INTERVAL).min(deadline);
        tokio::select! {
            () = cancel.cancelled() => return EmitOutcome::Unconfirmed,
            () = sleep_until(next) => {}
        }
    }
}
