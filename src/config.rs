//! Relay configuration: filesystem layout and optional `relay.toml` settings.
//!
//! A [`RelayConfig`] is resolved once per process and handed to every
//! component at construction. Tests build independent instances rooted in
//! their own temporary directories.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::pane::readiness::ShellFamily;
use crate::{AppError, Result};

/// Environment variable overriding the relay base directory.
pub const BASE_DIR_ENV: &str = "SYMPHONY_RELAY_DIR";

/// Placeholder substituted with the hand-off path in the continuation instruction.
pub const HANDOFF_PLACEHOLDER: &str = "{handoff}";

/// Filesystem layout of one relay instance. Every path lives under `base_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPaths {
    /// Root directory of the relay.
    pub base_dir: PathBuf,
    /// Named pipe carrying hand-off signals.
    pub pipe_path: PathBuf,
    /// Daemon PID file.
    pub pid_file: PathBuf,
    /// Append-only daemon log.
    pub log_file: PathBuf,
    /// Directory receiving archived hand-off artifacts.
    pub archive_dir: PathBuf,
    /// Latest hand-off status record, read by the emitter as its acknowledgment.
    pub status_file: PathBuf,
    /// Optional TOML settings file.
    pub config_file: PathBuf,
}

impl RelayPaths {
    /// Derive the layout rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            pipe_path: base_dir.join("relay.pipe"),
            pid_file: base_dir.join("relay.pid"),
            log_file: base_dir.join("relay.log"),
            archive_dir: base_dir.join("archive"),
            status_file: base_dir.join("handoff-status.json"),
            config_file: base_dir.join("relay.toml"),
            base_dir,
        }
    }

    /// Resolve the base directory: explicit override, then
    /// [`BASE_DIR_ENV`], then `<cwd>/.symphony/relay`.
    ///
    /// Relative paths are anchored at the current directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when no base directory can be determined.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let cwd = || {
            env::current_dir()
                .map_err(|err| AppError::Config(format!("cannot resolve base directory: {err}")))
        };

        let chosen = match explicit {
            Some(path) => path.to_path_buf(),
            None => match env::var_os(BASE_DIR_ENV) {
                Some(value) if !value.is_empty() => PathBuf::from(value),
                _ => cwd()?.join(".symphony").join("relay"),
            },
        };

        let absolute = if chosen.is_absolute() {
            chosen
        } else {
            cwd()?.join(chosen)
        };

        Ok(Self::new(absolute))
    }

    /// Create the base and archive directories if missing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if a directory cannot be created.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.base_dir, &self.archive_dir] {
            fs::create_dir_all(dir).map_err(|err| {
                AppError::Io(format!("failed to create {}: {err}", dir.display()))
            })?;
        }
        Ok(())
    }
}

/// Interactive CLI invocation settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CliConfig {
    /// CLI binary launched in the interactive pane.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Arguments selecting the "continue" mode of the CLI.
    #[serde(default = "default_continue_args")]
    pub continue_args: Vec<String>,
    /// Continuation instruction; `{handoff}` is replaced by the artifact path.
    #[serde(default = "default_instruction")]
    pub instruction: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            continue_args: default_continue_args(),
            instruction: default_instruction(),
        }
    }
}

impl CliConfig {
    /// Render the continuation instruction for `handoff_path`.
    #[must_use]
    pub fn instruction_for(&self, handoff_path: &str) -> String {
        self.instruction.replace(HANDOFF_PLACEHOLDER, handoff_path)
    }
}

fn default_binary() -> String {
    "claude".into()
}

fn default_continue_args() -> Vec<String> {
    vec!["--continue".into()]
}

fn default_instruction() -> String {
    "Read the hand-off document at {handoff} and resume the work it describes.".into()
}

/// Timing and heuristics of the hand-off protocol.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HandoffConfig {
    /// Interval between pane captures while waiting for the shell.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on the shell-readiness wait.
    #[serde(default = "default_readiness_timeout_secs")]
    pub readiness_timeout_secs: u64,
    /// Pause between the two interrupt keystrokes.
    #[serde(default = "default_interrupt_gap_ms")]
    pub interrupt_gap_ms: u64,
    /// Rendered lines captured per readiness sample.
    #[serde(default = "default_capture_lines")]
    pub capture_lines: usize,
    /// Shell family whose prompt the readiness heuristic recognizes.
    #[serde(default)]
    pub shell: ShellFamily,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            readiness_timeout_secs: default_readiness_timeout_secs(),
            interrupt_gap_ms: default_interrupt_gap_ms(),
            capture_lines: default_capture_lines(),
            shell: ShellFamily::default(),
        }
    }
}

impl HandoffConfig {
    /// Interval between readiness samples.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Readiness wait bound.
    #[must_use]
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    /// Pause between the two interrupts.
    #[must_use]
    pub fn interrupt_gap(&self) -> Duration {
        Duration::from_millis(self.interrupt_gap_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    300
}

fn default_readiness_timeout_secs() -> u64 {
    10
}

fn default_interrupt_gap_ms() -> u64 {
    500
}

fn default_capture_lines() -> usize {
    20
}

/// Terminal session settings used by the bootstrapper.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Default tmux session name.
    #[serde(default = "default_session_name")]
    pub name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: default_session_name(),
        }
    }
}

fn default_session_name() -> String {
    "symphony-session".into()
}

/// Client-side emitter settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EmitterConfig {
    /// How long the emitter waits for the daemon's acknowledgment.
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            ack_timeout_secs: default_ack_timeout_secs(),
        }
    }
}

impl EmitterConfig {
    /// Acknowledgment wait bound.
    #[must_use]
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }
}

fn default_ack_timeout_secs() -> u64 {
    30
}

/// Settings section of `relay.toml`; every table is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
struct RelaySettings {
    #[serde(default)]
    cli: CliConfig,
    #[serde(default)]
    handoff: HandoffConfig,
    #[serde(default)]
    session: SessionConfig,
    #[serde(default)]
    emitter: EmitterConfig,
}

/// Complete configuration of one relay instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Filesystem layout.
    pub paths: RelayPaths,
    /// Interactive CLI settings.
    pub cli: CliConfig,
    /// Hand-off protocol settings.
    pub handoff: HandoffConfig,
    /// Terminal session settings.
    pub session: SessionConfig,
    /// Emitter settings.
    pub emitter: EmitterConfig,
}

impl RelayConfig {
    /// Configuration with default settings rooted at `paths`.
    #[must_use]
    pub fn with_defaults(paths: RelayPaths) -> Self {
        Self::from_settings(paths, RelaySettings::default())
    }

    /// Resolve the base directory and load `relay.toml` from it when present.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the base directory cannot be resolved or
    /// the settings file is unreadable or invalid.
    pub fn load(explicit_base: Option<&Path>) -> Result<Self> {
        let paths = RelayPaths::resolve(explicit_base)?;
        if !paths.config_file.exists() {
            debug!(base_dir = %paths.base_dir.display(), "no relay.toml, using defaults");
            return Ok(Self::with_defaults(paths));
        }

        let raw = fs::read_to_string(&paths.config_file)
            .map_err(|err| AppError::Config(format!("failed to read relay.toml: {err}")))?;
        Self::from_toml_str(paths, &raw)
    }

    /// Parse settings from a TOML string for the given layout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(paths: RelayPaths, raw: &str) -> Result<Self> {
        let settings: RelaySettings = toml::from_str(raw)?;
        let config = Self::from_settings(paths, settings);
        config.validate()?;
        Ok(config)
    }

    fn from_settings(paths: RelayPaths, settings: RelaySettings) -> Self {
        Self {
            paths,
            cli: settings.cli,
            handoff: settings.handoff,
            session: settings.session,
            emitter: settings.emitter,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.cli.binary.trim().is_empty() {
            return Err(AppError::Config("cli.binary must not be empty".into()));
        }

        if !self.cli.instruction.contains(HANDOFF_PLACEHOLDER) {
            return Err(AppError::Config(format!(
                "cli.instruction must contain {HANDOFF_PLACEHOLDER}"
            )));
        }

        if self.handoff.poll_interval_ms == 0 || self.handoff.readiness_timeout_secs == 0 {
            return Err(AppError::Config(
                "handoff poll interval and readiness timeout must be greater than zero".into(),
            ));
        }

        if self.handoff.capture_lines == 0 {
            return Err(AppError::Config(
                "handoff.capture_lines must be greater than zero".into(),
            ));
        }

        if self.session.name.trim().is_empty() {
            return Err(AppError::Config("session.name must not be empty".into()));
        }

        if self.emitter.ack_timeout_secs == 0 {
            return Err(AppError::Config(
                "emitter.ack_timeout_secs must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
