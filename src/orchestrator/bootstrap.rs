//! Session bootstrapper: build the two-pane relay session and attach.
//!
//! One pane runs the relay daemon, the other the interactive CLI. When the
//! default session name is taken the operator decides what happens.

use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dialoguer::Select;
use tracing::{info, info_span, Instrument};

use crate::config::RelayConfig;
use crate::pane::tmux::tmux_available;
use crate::pane::{command_line, shell_quote, PaneController, SessionLayout};
use crate::{AppError, Result};

/// Which external tools are installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// tmux is runnable.
    pub multiplexer: bool,
    /// The interactive CLI binary is on `PATH`.
    pub cli: bool,
}

impl Capabilities {
    /// Whether every dependency is present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.multiplexer && self.cli
    }
}

/// Probe for tmux and `cli_binary`. Never fails.
pub async fn check_dependencies(cli_binary: &str) -> Capabilities {
    Capabilities {
        multiplexer: tmux_available().await,
        cli: binary_on_path(cli_binary),
    }
}

/// Whether `binary` names an executable file, directly or via `PATH`.
#[must_use]
pub fn binary_on_path(binary: &str) -> bool {
    let is_executable = |path: &Path| {
        path.metadata()
            .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
    };

    if binary.contains('/') {
        return is_executable(Path::new(binary));
    }

    env::var_os("PATH").is_some_and(|path| {
        env::split_paths(&path).any(|dir| is_executable(&dir.join(binary)))
    })
}

/// Operator decision when the requested session name is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionChoice {
    /// Attach to the existing session.
    Attach,
    /// Create another session under the next free suffixed name.
    CreateParallel,
    /// Kill the existing session and create it anew.
    KillAndRecreate,
    /// Do nothing.
    Cancel,
}

impl CollisionChoice {
    /// All choices in menu order.
    pub const ALL: [Self; 4] = [
        Self::Attach,
        Self::CreateParallel,
        Self::KillAndRecreate,
        Self::Cancel,
    ];

    /// Menu label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Attach => "Attach to the existing session",
            Self::CreateParallel => "Create a parallel session",
            Self::KillAndRecreate => "Kill the existing session and recreate it",
            Self::Cancel => "Cancel",
        }
    }
}

/// Asks the operator how to resolve a session-name collision.
pub trait OperatorPrompt: Send + Sync {
    /// Choose what to do about the existing session `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Prompt` if the operator cannot be asked.
    fn resolve_collision(&self, name: &str) -> Result<CollisionChoice>;
}

/// Terminal menu backed by `dialoguer`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialoguerPrompt;

impl OperatorPrompt for DialoguerPrompt {
    fn resolve_collision(&self, name: &str) -> Result<CollisionChoice> {
        let labels: Vec<&str> = CollisionChoice::ALL.iter().map(|c| c.label()).collect();
        let selection = Select::new()
            .with_prompt(format!("tmux session '{name}' already exists"))
            .items(&labels)
            .default(0)
            .interact()?;
        CollisionChoice::ALL
            .get(selection)
            .copied()
            .ok_or_else(|| AppError::Prompt(format!("invalid selection {selection}")))
    }
}

/// What the bootstrapper will do with the session name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPlan {
    /// Create a fresh session with this name.
    Create(String),
    /// Attach to this existing session.
    Attach(String),
    /// Abort.
    Cancel,
}

/// First free name among `base`, `base-2`, `base-3`, ….
///
/// # Errors
///
/// Returns `AppError::PaneOperation` if the multiplexer cannot be queried.
pub async fn next_free_name(pane: &dyn PaneController, base: &str) -> Result<String> {
    if !pane.has_session(base).await? {
        return Ok(base.to_owned());
    }
    let mut suffix = 2u32;
    loop {
        let candidate = format!("{base}-{suffix}");
        if !pane.has_session(&candidate).await? {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

/// Decide how to use `base`, asking the operator on a collision.
///
/// Choosing kill-and-recreate kills the existing session immediately.
///
/// # Errors
///
/// Returns `AppError::PaneOperation` or `AppError::Prompt`.
pub async fn resolve_session_name(
    pane: &dyn PaneController,
    prompt: &dyn OperatorPrompt,
    base: &str,
) -> Result<SessionPlan> {
    if !pane.has_session(base).await? {
        return Ok(SessionPlan::Create(base.to_owned()));
    }

    match prompt.resolve_collision(base)? {
        CollisionChoice::Attach => Ok(SessionPlan::Attach(base.to_owned())),
        CollisionChoice::CreateParallel => {
            Ok(SessionPlan::Create(next_free_name(pane, base).await?))
        }
        CollisionChoice::KillAndRecreate => {
            pane.kill_session(base).await?;
            Ok(SessionPlan::Create(base.to_owned()))
        }
        CollisionChoice::Cancel => Ok(SessionPlan::Cancel),
    }
}

/// Parameters of a launch.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Preferred session name.
    pub name: String,
    /// Working directory of both panes.
    pub work_dir: PathBuf,
    /// Hand-off artifact the first CLI should resume from.
    pub resume: Option<PathBuf>,
    /// Command line starting the relay daemon in the daemon pane.
    pub daemon_command: String,
}

/// Result of a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A new session was built and attached.
    Created(SessionLayout),
    /// The operator attached to an existing session.
    Attached(String),
    /// The operator cancelled.
    Cancelled,
}

/// Creates relay sessions.
pub struct SessionBootstrapper {
    config: Arc<RelayConfig>,
    pane: Arc<dyn PaneController>,
    prompt: Box<dyn OperatorPrompt>,
}

impl SessionBootstrapper {
    /// Bootstrapper driving `pane` and asking `prompt` on collisions.
    #[must_use]
    pub fn new(
        config: Arc<RelayConfig>,
        pane: Arc<dyn PaneController>,
        prompt: Box<dyn OperatorPrompt>,
    ) -> Self {
        Self {
            config,
            pane,
            prompt,
        }
    }

    /// Command line for the interactive pane, optionally resuming from a hand-off.
    #[must_use]
    pub fn agent_command(&self, resume: Option<&Path>) -> String {
        match resume {
            Some(path) => {
                let instruction = self.config.cli.instruction_for(&path.to_string_lossy());
                command_line(&self.config.cli.binary, &[instruction])
            }
            None => shell_quote(&self.config.cli.binary),
        }
    }

    /// Resolve the session name, build the layout, start both panes and attach.
    ///
    /// # Errors
    ///
    /// Returns `AppError::HandoffFileMissing` if the resume artifact does not
    /// exist, `AppError::Prompt` if the operator prompt fails, or
    /// `AppError::PaneOperation` on multiplexer failures.
    pub async fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutcome> {
        let span = info_span!("launch", session = %request.name);
        async move {
            let resume = match &request.resume {
                Some(path) if path.is_file() => Some(path.canonicalize()?),
                Some(path) => {
                    return Err(AppError::HandoffFileMissing(path.display().to_string()));
                }
                None => None,
            };

            let plan =
                resolve_session_name(self.pane.as_ref(), self.prompt.as_ref(), &request.name)
                    .await?;

            match plan {
                SessionPlan::Cancel => {
                    info!("launch cancelled by operator");
                    Ok(LaunchOutcome::Cancelled)
                }
                SessionPlan::Attach(name) => {
                    self.pane.attach_session(&name).await?;
                    Ok(LaunchOutcome::Attached(name))
                }
                SessionPlan::Create(name) => {
                    let layout = self.pane.create_session(&name, &request.work_dir).await?;
                    self.pane
                        .send_keys(&layout.daemon_pane, &request.daemon_command)
                        .await?;
                    self.pane
                        .send_keys(&layout.agent_pane, &self.agent_command(resume.as_deref()))
                        .await?;
                    info!(session = %name, resumed = resume.is_some(), "relay session launched");
                    self.pane.attach_session(&name).await?;
                    Ok(LaunchOutcome::Created(layout))
                }
            }
        }
        .instrument(span)
        .await
    }
}
