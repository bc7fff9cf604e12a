//! Relay daemon lifecycle: start, stop, status, restart.
//!
//! The daemon owns the channel reader and dispatches every ready signal to
//! the [`HandoffHandler`], strictly one at a time: the reader thread blocks
//! until the current hand-off finishes before it reads the next line.
//!
//! The daemon manages only its own artifacts (PID file and pipe). It never
//! tears down the operator's tmux session.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handoff::HandoffHandler;
use crate::config::{RelayConfig, RelayPaths};
use crate::ipc::channel;
use crate::ipc::codec::{RelaySignal, SignalKind};
use crate::pane::PaneController;
use crate::{AppError, Result};

/// Pause between `stop` and `start` during a restart.
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Number of log lines reported by [`status`].
pub const STATUS_LOG_LINES: usize = 5;

/// Lifecycle state of the daemon.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DaemonState {
    /// Not running.
    Stopped,
    /// Preparing directories, channel and PID file.
    Starting,
    /// Waiting for signals.
    Listening,
    /// Running a hand-off.
    Handling,
    /// Winding down.
    Stopping,
}

/// Contents of the PID file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonRecord {
    /// Recorded process id.
    pub pid: i32,
    /// Modification time of the PID file.
    pub started_at: Option<DateTime<Utc>>,
}

impl DaemonRecord {
    /// Read the record at `pid_file`.
    ///
    /// Returns `Ok(None)` when the file is absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file is unreadable or holds no decimal pid.
    pub fn read(pid_file: &Path) -> Result<Option<Self>> {
        let raw = match fs::read_to_string(pid_file) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to read {}: {err}",
                    pid_file.display()
                )))
            }
        };

        let pid: i32 = raw.trim().parse().map_err(|err| {
            AppError::Io(format!("invalid pid {:?} in {}: {err}", raw.trim(), pid_file.display()))
        })?;

        let started_at = fs::metadata(pid_file)
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        Ok(Some(Self { pid, started_at }))
    }

    /// Persist `pid` as plain decimal text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be written.
    pub fn write(pid_file: &Path, pid: u32) -> Result<()> {
        fs::write(pid_file, format!("{pid}\n")).map_err(|err| {
            AppError::Io(format!("failed to write {}: {err}", pid_file.display()))
        })
    }

    /// Whether the recorded process is alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        process_alive(self.pid)
    }
}

/// Probe a process with signal 0. Non-positive pids are never alive.
#[must_use]
pub fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// What the PID file says about the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidFileState {
    /// No PID file.
    Absent,
    /// The recorded process is alive.
    Live(DaemonRecord),
    /// The file exists but names a dead process or is unreadable.
    Stale(Option<DaemonRecord>),
}

/// Inspect the PID file.
#[must_use]
pub fn probe_pid_file(pid_file: &Path) -> PidFileState {
    match DaemonRecord::read(pid_file) {
        Ok(None) => PidFileState::Absent,
        Ok(Some(record)) if record.is_alive() => PidFileState::Live(record),
        Ok(Some(record)) => PidFileState::Stale(Some(record)),
        Err(err) => {
            debug!(%err, "unreadable pid file treated as stale");
            PidFileState::Stale(None)
        }
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AppError::Io(format!(
            "failed to remove {}: {err}",
            path.display()
        ))),
    }
}

/// Removes the daemon's PID file and pipe when dropped.
///
/// The PID file is only removed while it still names this process. When a
/// different live process has claimed the PID file (a daemon started during a
/// restart) both the file and the pipe are left to it. A PID file already
/// removed by [`stop`] still lets the pipe be cleaned up.
#[derive(Debug)]
pub struct PidFileGuard {
    pid_file: PathBuf,
    pipe_path: PathBuf,
    pid: u32,
}

impl PidFileGuard {
    /// Process id written to the PID file.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        let owner = DaemonRecord::read(&self.pid_file).ok().flatten();
        match owner {
            Some(record) if i64::from(record.pid) == i64::from(self.pid) => {
                if let Err(err) = remove_if_present(&self.pid_file) {
                    warn!(%err, "failed to remove pid file");
                }
            }
            Some(record) if record.is_alive() => {
                debug!(pid = record.pid, "relay claimed by another daemon; leaving channel");
                return;
            }
            _ => {}
        }
        if channel::is_fifo(&self.pipe_path) {
            if let Err(err) = remove_if_present(&self.pipe_path) {
                warn!(%err, "failed to remove relay channel");
            }
        }
    }
}

/// One signal handed from the reader thread to the dispatch loop.
struct Dispatch {
    signal: RelaySignal,
    done: oneshot::Sender<()>,
}

/// The relay daemon.
pub struct Daemon {
    config: Arc<RelayConfig>,
    handler: Arc<HandoffHandler>,
    state: watch::Sender<DaemonState>,
}

impl Daemon {
    /// Daemon driving `pane` with the configured hand-off settings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the hand-off handler cannot be built.
    pub fn new(config: Arc<RelayConfig>, pane: Arc<dyn PaneController>) -> Result<Self> {
        let handler = HandoffHandler::new(&config, pane)?;
        Ok(Self::with_handler(config, Arc::new(handler)))
    }

    /// Daemon using a prepared handler.
    #[must_use]
    pub fn with_handler(config: Arc<RelayConfig>, handler: Arc<HandoffHandler>) -> Self {
        let (state, _) = watch::channel(DaemonState::Stopped);
        Self {
            config,
            handler,
            state,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DaemonState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DaemonState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: DaemonState) {
        self.state.send_replace(next);
        debug!(state = ?next, "daemon state");
    }

    /// Claim the relay: refuse if a live daemon is on record, clear a stale
    /// record, create directories and channel, and write the PID file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AlreadyRunning` if a live daemon is recorded, or
    /// `AppError::Io` / `AppError::ChannelUnavailable` on setup failures.
    pub fn prepare(&self) -> Result<PidFileGuard> {
        let paths = &self.config.paths;
        self.set_state(DaemonState::Starting);

        let claimed = self.claim(paths);
        if claimed.is_err() {
            self.set_state(DaemonState::Stopped);
        }
        claimed
    }

    fn claim(&self, paths: &RelayPaths) -> Result<PidFileGuard> {
        match probe_pid_file(&paths.pid_file) {
            PidFileState::Live(record) => {
                return Err(AppError::AlreadyRunning(format!(
                    "relay daemon already running (pid {})",
                    record.pid
                )));
            }
            PidFileState::Stale(record) => {
                info!(
                    pid = record.map_or(0, |r| r.pid),
                    "removing stale pid file"
                );
                remove_if_present(&paths.pid_file)?;
            }
            PidFileState::Absent => {}
        }

        paths.ensure_dirs()?;
        channel::create(&paths.pipe_path)?;

        let pid = std::process::id();
        DaemonRecord::write(&paths.pid_file, pid)?;
        info!(pid, base_dir = %paths.base_dir.display(), "relay daemon starting");

        Ok(PidFileGuard {
            pid_file: paths.pid_file.clone(),
            pipe_path: paths.pipe_path.clone(),
            pid,
        })
    }

    /// Run the read loop until `cancel` fires.
    ///
    /// Per-signal failures are logged by the handler and never end the loop.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the reader thread cannot be started.
    pub async fn serve(&self, cancel: CancellationToken) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<Dispatch>(1);

        let reader = channel::start_reader(
            &self.config.paths.pipe_path,
            move |signal| {
                let (done, finished) = oneshot::channel();
                if tx.blocking_send(Dispatch { signal, done }).is_ok() {
                    // Hold the reader until the hand-off completes.
                    let _ = finished.blocking_recv();
                }
            },
            |err| warn!(%err, "relay channel error"),
        )?;

        self.set_state(DaemonState::Listening);
        info!(pipe = %self.config.paths.pipe_path.display(), "relay daemon listening");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                dispatch = rx.recv() => {
                    let Some(Dispatch { signal, done }) = dispatch else {
                        break;
                    };
                    self.dispatch(&signal).await;
                    let _ = done.send(());
                }
            }
        }

        self.set_state(DaemonState::Stopping);
        reader.stop();
        drop(reader);
        self.set_state(DaemonState::Stopped);
        info!("relay daemon stopped");
        Ok(())
    }

    async fn dispatch(&self, signal: &RelaySignal) {
        match signal.kind {
            SignalKind::Ready => {
                self.set_state(DaemonState::Handling);
                // Failures are logged inside the handler.
                let _ = self.handler.handle(signal).await;
                self.set_state(DaemonState::Listening);
            }
            SignalKind::Ack => {
                debug!(pane = %signal.pane_id, "ignoring ack signal");
            }
        }
    }

    /// Prepare and serve until `cancel` fires; cleanup runs on return.
    ///
    /// # Errors
    ///
    /// See [`Daemon::prepare`] and [`Daemon::serve`].
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let _guard = self.prepare()?;
        self.serve(cancel).await
    }

    /// Stop any recorded daemon, wait [`RESTART_DELAY`], then start.
    ///
    /// Not atomic: another `start` may claim the relay during the pause.
    ///
    /// # Errors
    ///
    /// See [`stop`] and [`Daemon::start`].
    pub async fn restart(&self, cancel: CancellationToken) -> Result<()> {
        let outcome = stop(&self.config.paths)?;
        info!(?outcome, "restart: previous daemon handled");
        tokio::time::sleep(RESTART_DELAY).await;
        self.start(cancel).await
    }
}

/// Result of [`stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A live daemon was sent `SIGTERM`.
    Stopped(i32),
    /// The PID file named a dead process and was removed.
    RemovedStale,
    /// No PID file was present.
    NotRunning,
}

/// Stop the recorded daemon. Idempotent.
///
/// # Errors
///
/// Returns `AppError::Io` if the process cannot be signalled or the PID file
/// cannot be removed.
pub fn stop(paths: &RelayPaths) -> Result<StopOutcome> {
    match probe_pid_file(&paths.pid_file) {
        PidFileState::Absent => Ok(StopOutcome::NotRunning),
        PidFileState::Stale(_) => {
            remove_if_present(&paths.pid_file)?;
            info!("removed stale pid file");
            Ok(StopOutcome::RemovedStale)
        }
        PidFileState::Live(record) => {
            match kill(Pid::from_raw(record.pid), Signal::SIGTERM) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(err) => {
                    return Err(AppError::Io(format!(
                        "failed to signal pid {}: {err}",
                        record.pid
                    )))
                }
            }
            remove_if_present(&paths.pid_file)?;
            info!(pid = record.pid, "relay daemon stopped");
            Ok(StopOutcome::Stopped(record.pid))
        }
    }
}

/// Read-only snapshot of the daemon.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DaemonStatus {
    /// Whether a live daemon is recorded.
    pub running: bool,
    /// Recorded pid, live or stale.
    pub pid: Option<i32>,
    /// When the PID file was written.
    pub started_at: Option<DateTime<Utc>>,
    /// Whether the named pipe exists.
    pub channel_exists: bool,
    /// Last lines of the daemon log.
    pub recent_log: Vec<String>,
}

/// Inspect the daemon without changing anything.
#[must_use]
pub fn status(paths: &RelayPaths) -> DaemonStatus {
    let (running, record) = match probe_pid_file(&paths.pid_file) {
        PidFileState::Absent => (false, None),
        PidFileState::Live(record) => (true, Some(record)),
        PidFileState::Stale(record) => (false, record),
    };

    DaemonStatus {
        running,
        pid: record.map(|r| r.pid),
        started_at: record.and_then(|r| r.started_at),
        channel_exists: channel::is_fifo(&paths.pipe_path),
        recent_log: tail_log(&paths.log_file, STATUS_LOG_LINES),
    }
}

fn tail_log(path: &Path, lines: usize) -> Vec<String> {
    let Ok(raw) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let all: Vec<&str> = raw.lines().filter(|line| !line.trim().is_empty()).collect();
    let start = all.len().saturating_sub(lines);
    all[start..].iter().map(|line| (*line).to_owned()).collect()
}
