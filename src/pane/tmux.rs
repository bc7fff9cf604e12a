//! tmux-backed [`PaneController`].
//!
//! Every primitive shells out to the `tmux` binary. Panes are addressed by
//! the `%N` identifiers tmux prints on creation, which stay valid regardless
//! of the user's `base-index` settings.

use std::env;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use super::{PaneController, PaneFuture, PaneHandle, SessionLayout};
use crate::{AppError, Result};

/// Pane title shown above the daemon pane.
pub const DAEMON_PANE_TITLE: &str = "relay-daemon";
/// Pane title shown above the interactive pane.
pub const AGENT_PANE_TITLE: &str = "agent";

/// Check whether tmux is available on the system.
pub async fn tmux_available() -> bool {
    Command::new("tmux")
        .arg("-V")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success())
}

/// Drives a local tmux server.
#[derive(Debug, Clone)]
pub struct TmuxController {
    binary: String,
}

impl Default for TmuxController {
    fn default() -> Self {
        Self::new()
    }
}

impl TmuxController {
    /// Controller using `tmux` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: "tmux".into(),
        }
    }

    /// Controller using an explicit tmux binary.
    #[must_use]
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run a tmux command and return its stdout.
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| AppError::PaneOperation(format!("tmux {} failed: {err}", args[0])))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::PaneOperation(format!(
                "tmux {} exited with {}: {}",
                args[0],
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn new_session(&self, name: &str, work_dir: &str) -> Result<PaneHandle> {
        let out = self
            .run(&[
                "new-session",
                "-d",
                "-P",
                "-F",
                "#{pane_id}",
                "-s",
                name,
                "-x",
                "200",
                "-y",
                "50",
                "-c",
                work_dir,
            ])
            .await?;
        parse_pane_id(&out)
    }

    async fn split(&self, target: &PaneHandle, work_dir: &str) -> Result<PaneHandle> {
        let out = self
            .run(&[
                "split-window",
                "-h",
                "-P",
                "-F",
                "#{pane_id}",
                "-t",
                target.as_str(),
                "-c",
                work_dir,
            ])
            .await?;
        parse_pane_id(&out)
    }

    async fn build_layout(&self, name: &str, work_dir: &Path) -> Result<SessionLayout> {
        let dir = work_dir.to_string_lossy();

        let daemon_pane = self.new_session(name, &dir).await?;
        let agent_pane = self.split(&daemon_pane, &dir).await?;

        self.run(&["select-pane", "-t", daemon_pane.as_str(), "-T", DAEMON_PANE_TITLE])
            .await?;
        self.run(&["select-pane", "-t", agent_pane.as_str(), "-T", AGENT_PANE_TITLE])
            .await?;
        self.run(&["set-option", "-t", name, "pane-border-status", "top"])
            .await?;
        self.run(&["set-option", "-t", name, "pane-border-format", " #{pane_title} "])
            .await?;
        self.run(&["select-pane", "-t", agent_pane.as_str()]).await?;

        info!(
            session = name,
            daemon_pane = %daemon_pane,
            agent_pane = %agent_pane,
            "tmux session created"
        );

        Ok(SessionLayout {
            session: name.to_owned(),
            daemon_pane,
            agent_pane,
        })
    }

    async fn attach(&self, name: &str) -> Result<()> {
        // Inside tmux a nested attach is refused; switch the client instead.
        let verb = if env::var_os("TMUX").is_some() {
            "switch-client"
        } else {
            "attach-session"
        };

        let status = Command::new(&self.binary)
            .args([verb, "-t", name])
            .status()
            .await
            .map_err(|err| AppError::PaneOperation(format!("tmux {verb} failed: {err}")))?;

        if !status.success() {
            return Err(AppError::PaneOperation(format!(
                "tmux {verb} exited with {status}"
            )));
        }
        Ok(())
    }
}

fn parse_pane_id(out: &str) -> Result<PaneHandle> {
    let id = out.trim();
    if id.is_empty() {
        return Err(AppError::PaneOperation(
            "tmux did not report a pane id".into(),
        ));
    }
    Ok(PaneHandle::new(id))
}

/// Keep the last `lines` entries of `text`, ignoring trailing blank lines.
fn tail_lines(text: &str, lines: usize) -> Vec<String> {
    let mut all: Vec<&str> = text.lines().collect();
    while all.last().is_some_and(|line| line.trim().is_empty()) {
        all.pop();
    }
    let start = all.len().saturating_sub(lines);
    all[start..].iter().map(|line| (*line).to_owned()).collect()
}

impl PaneController for TmuxController {
    fn has_session<'a>(&'a self, name: &'a str) -> PaneFuture<'a, bool> {
        Box::pin(async move {
            let status = Command::new(&self.binary)
                .args(["has-session", "-t", &format!("={name}")])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map_err(|err| AppError::PaneOperation(format!("tmux has-session failed: {err}")))?;
            Ok(status.success())
        })
    }

    fn create_session<'a>(
        &'a self,
        name: &'a str,
        work_dir: &'a Path,
    ) -> PaneFuture<'a, SessionLayout> {
        Box::pin(self.build_layout(name, work_dir))
    }

    fn send_keys<'a>(&'a self, pane: &'a PaneHandle, text: &'a str) -> PaneFuture<'a, ()> {
        Box::pin(async move {
            debug!(pane = %pane, "sending keys");
            self.run(&["send-keys", "-t", pane.as_str(), "-l", text])
                .await?;
            self.run(&["send-keys", "-t", pane.as_str(), "Enter"]).await?;
            Ok(())
        })
    }

    fn send_interrupt<'a>(&'a self, pane: &'a PaneHandle) -> PaneFuture<'a, ()> {
        Box::pin(async move {
            debug!(pane = %pane, "sending interrupt");
            self.run(&["send-keys", "-t", pane.as_str(), "C-c"]).await?;
            Ok(())
        })
    }

    fn capture_pane<'a>(
        &'a self,
        pane: &'a PaneHandle,
        lines: usize,
    ) -> PaneFuture<'a, Vec<String>> {
        Box::pin(async move {
            let out = self
                .run(&["capture-pane", "-p", "-J", "-t", pane.as_str()])
                .await?;
            Ok(tail_lines(&out, lines))
        })
    }

    fn kill_session<'a>(&'a self, name: &'a str) -> PaneFuture<'a, ()> {
        Box::pin(async move {
            self.run(&["kill-session", "-t", &format!("={name}")])
                .await?;
            info!(session = name, "tmux session killed");
            Ok(())
        })
    }

    fn attach_session<'a>(&'a self, name: &'a str) -> PaneFuture<'a, ()> {
        Box::pin(self.attach(name))
    }
}
