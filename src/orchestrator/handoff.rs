//! Hand-off protocol: interrupt, wait for the shell, relaunch, archive.
//!
//! The outgoing CLI is terminated in place and a successor is started in the
//! same pane with a continuation instruction naming the hand-off artifact.
//! A failure after the interrupt leaves the pane at a bare shell prompt; the
//! operator has to relaunch manually.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::audit::{HandoffArchive, HandoffPhase, HandoffStatus, StatusStore};
use crate::config::{CliConfig, HandoffConfig, RelayConfig};
use crate::ipc::codec::RelaySignal;
use crate::pane::readiness::{PromptProbe, ReadinessProbe};
use crate::pane::{command_line, PaneController, PaneHandle};
use crate::{AppError, Result};

/// Result of a completed hand-off.
#[derive(Debug, Clone)]
pub struct HandoffReport {
    /// Hand-off identifier.
    pub id: Uuid,
    /// Command line typed into the pane.
    pub relaunch_command: String,
    /// Time the pane took to show a shell prompt.
    pub readiness_wait: Duration,
    /// Archive entry, when archiving succeeded.
    pub archived: Option<PathBuf>,
}

/// Executes hand-offs one signal at a time.
pub struct HandoffHandler {
    pane: Arc<dyn PaneController>,
    probe: Arc<dyn ReadinessProbe>,
    cli: CliConfig,
    timings: HandoffConfig,
    archive: HandoffArchive,
    status: StatusStore,
}

impl HandoffHandler {
    /// Build a handler using the prompt probe for the configured shell family.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the readiness probe cannot be built.
    pub fn new(config: &RelayConfig, pane: Arc<dyn PaneController>) -> Result<Self> {
        let probe = PromptProbe::new(config.handoff.shell)?;
        Ok(Self {
            pane,
            probe: Arc::new(probe),
            cli: config.cli.clone(),
            timings: config.handoff.clone(),
            archive: HandoffArchive::new(config.paths.archive_dir.clone()),
            status: StatusStore::new(config.paths.status_file.clone()),
        })
    }

    /// Replace the readiness probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Command line that relaunches the CLI in continue mode for `handoff_path`.
    #[must_use]
    pub fn relaunch_command(&self, handoff_path: &str) -> String {
        let mut args = self.cli.continue_args.clone();
        args.push(self.cli.instruction_for(handoff_path));
        command_line(&self.cli.binary, &args)
    }

    /// Run the hand-off for a ready signal.
    ///
    /// A failure is logged once at `ERROR` and recorded as
    /// [`HandoffPhase::Failed`] before being returned.
    ///
    /// # Errors
    ///
    /// Returns `AppError::HandoffFileMissing`, `AppError::PaneOperation` or
    /// `AppError::ReadinessTimeout`.
    pub async fn handle(&self, signal: &RelaySignal) -> Result<HandoffReport> {
        let id = Uuid::new_v4();
        let span = info_span!("handoff", %id, pane = %signal.pane_id);

        async move {
            match self.execute(id, signal).await {
                Ok(report) => {
                    info!(
                        handoff = %signal.handoff_path,
                        waited_ms = u64::try_from(report.readiness_wait.as_millis()).unwrap_or(u64::MAX),
                        "hand-off complete"
                    );
                    Ok(report)
                }
                Err(err) => {
                    error!(handoff = %signal.handoff_path, %err, "hand-off abandoned");
                    self.record(
                        HandoffStatus::new(
                            id,
                            &signal.handoff_path,
                            &signal.pane_id,
                            HandoffPhase::Failed,
                        )
                        .with_detail(err.to_string()),
                    );
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, id: Uuid, signal: &RelaySignal) -> Result<HandoffReport> {
        let artifact = Path::new(&signal.handoff_path);
        if !artifact.is_file() {
            return Err(AppError::HandoffFileMissing(signal.handoff_path.clone()));
        }

        self.record(HandoffStatus::new(
            id,
            &signal.handoff_path,
            &signal.pane_id,
            HandoffPhase::Accepted,
        ));

        let pane = PaneHandle::new(signal.pane_id.clone());

        // A confirmation prompt in the CLI may swallow the first interrupt.
        self.pane.send_interrupt(&pane).await?;
        sleep(self.timings.interrupt_gap()).await;
        self.pane.send_interrupt(&pane).await?;

        let readiness_wait = self.wait_for_shell(&pane).await?;

        let relaunch_command = self.relaunch_command(&signal.handoff_path);
        self.pane.send_keys(&pane, &relaunch_command).await?;
        info!(command = %relaunch_command, "successor launched");

        let archived = match self.archive.archive(artifact) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(%err, "failed to archive hand-off artifact");
                None
            }
        };

        self.record(HandoffStatus::new(
            id,
            &signal.handoff_path,
            &signal.pane_id,
            HandoffPhase::Relaunched,
        ));

        Ok(HandoffReport {
            id,
            relaunch_command,
            readiness_wait,
            archived,
        })
    }

    /// Poll `pane` until the readiness probe matches, bounded by the
    /// configured timeout. Returns the time spent waiting.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ReadinessTimeout` when the bound elapses and
    /// `AppError::PaneOperation` if a capture fails.
    pub async fn wait_for_shell(&self, pane: &PaneHandle) -> Result<Duration> {
        let interval = self.timings.poll_interval();
        let timeout = self.timings.readiness_timeout();
        let started = Instant::now();
        let mut samples = 0u32;

        loop {
            let captured = self
                .pane
                .capture_pane(pane, self.timings.capture_lines)
                .await?;
            samples += 1;

            if self.probe.is_ready(&captured) {
                debug!(samples, "shell prompt detected");
                return Ok(started.elapsed());
            }

            if started.elapsed() + interval > timeout {
                return Err(AppError::ReadinessTimeout(format!(
                    "pane {pane} showed no shell prompt within {}s ({samples} samples)",
                    timeout.as_secs()
                )));
            }

            sleep(interval).await;
        }
    }

    fn record(&self, status: HandoffStatus) {
        if let Err(err) = self.status.write(&status) {
            warn!(%err, "failed to record hand-off status");
        }
    }
}
