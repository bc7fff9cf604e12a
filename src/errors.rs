//! Error types shared across the relay.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all relay failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Base directory unresolvable or `relay.toml` invalid.
    Config(String),
    /// `start` was invoked while a live daemon is on record.
    AlreadyRunning(String),
    /// The named pipe is missing, not a pipe, or cannot be created.
    ChannelUnavailable(String),
    /// A signal references a hand-off file that does not exist.
    HandoffFileMissing(String),
    /// A terminal multiplexer command failed.
    PaneOperation(String),
    /// The pane never returned to a shell prompt within the bound.
    ReadinessTimeout(String),
    /// The daemon reported a hand-off as abandoned.
    HandoffFailed(String),
    /// A line on the channel could not be decoded.
    MalformedSignal(String),
    /// An interactive operator prompt failed.
    Prompt(String),
    /// File-system or process operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::AlreadyRunning(msg) => write!(f, "already running: {msg}"),
            Self::ChannelUnavailable(msg) => write!(f, "channel unavailable: {msg}"),
            Self::HandoffFileMissing(msg) => write!(f, "handoff file missing: {msg}"),
            Self::PaneOperation(msg) => write!(f, "pane operation: {msg}"),
            Self::ReadinessTimeout(msg) => write!(f, "readiness timeout: {msg}"),
            Self::HandoffFailed(msg) => write!(f, "handoff failed: {msg}"),
            Self::MalformedSignal(msg) => write!(f, "malformed signal: {msg}"),
            Self::Prompt(msg) => write!(f, "prompt: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<nix::Error> for AppError {
    fn from(err: nix::Error) -> Self {
        Self::Io(err.desc().to_owned())
    }
}

impl From<dialoguer::Error> for AppError {
    fn from(err: dialoguer::Error) -> Self {
        Self::Prompt(err.to_string())
    }
}
