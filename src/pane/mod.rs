//! Terminal-multiplexer pane control.
//!
//! The [`PaneController`] trait decouples the hand-off protocol and the
//! session bootstrapper from tmux itself, so tests can drive them with a
//! scripted fake. [`tmux::TmuxController`] is the production implementation.

pub mod readiness;
pub mod tmux;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::Result;

/// Boxed future returned by [`PaneController`] operations.
pub type PaneFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Opaque multiplexer-scoped pane identifier (`%3`, `session:0.1`, …).
///
/// Has no meaning beyond the lifetime of the owning session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaneHandle(String);

impl PaneHandle {
    /// Wrap a multiplexer pane identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as passed to the multiplexer.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PaneHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Panes of a freshly created relay session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    /// Session name.
    pub session: String,
    /// Pane hosting the relay daemon.
    pub daemon_pane: PaneHandle,
    /// Pane hosting the interactive CLI.
    pub agent_pane: PaneHandle,
}

/// Multiplexer primitives used by the relay.
///
/// None of the operations confirm that the program running in a pane
/// actually consumed injected input.
pub trait PaneController: Send + Sync {
    /// Whether a session called `name` exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PaneOperation` if the multiplexer cannot be queried.
    fn has_session<'a>(&'a self, name: &'a str) -> PaneFuture<'a, bool>;

    /// Create a detached two-pane session rooted at `work_dir`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PaneOperation` if any layout command fails.
    fn create_session<'a>(&'a self, name: &'a str, work_dir: &'a Path)
        -> PaneFuture<'a, SessionLayout>;

    /// Type `text` into `pane` followed by Enter.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PaneOperation` if the keys cannot be delivered.
    fn send_keys<'a>(&'a self, pane: &'a PaneHandle, text: &'a str) -> PaneFuture<'a, ()>;

    /// Send an interrupt keystroke (Ctrl-C) to `pane`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PaneOperation` if the keystroke cannot be delivered.
    fn send_interrupt<'a>(&'a self, pane: &'a PaneHandle) -> PaneFuture<'a, ()>;

    /// Return the last `lines` rendered lines of `pane`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PaneOperation` if the pane cannot be captured.
    fn capture_pane<'a>(&'a self, pane: &'a PaneHandle, lines: usize)
        -> PaneFuture<'a, Vec<String>>;

    /// Destroy the session called `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PaneOperation` if the session cannot be killed.
    fn kill_session<'a>(&'a self, name: &'a str) -> PaneFuture<'a, ()>;

    /// Attach the calling terminal to `name`; resolves once the operator detaches.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PaneOperation` if attaching fails.
    fn attach_session<'a>(&'a self, name: &'a str) -> PaneFuture<'a, ()>;
}

/// Quote `arg` for a POSIX shell command line typed into a pane.
#[must_use]
pub fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:%+@,".contains(c))
    {
        return arg.to_owned();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Join `program` and `args` into a single quoted command line.
#[must_use]
pub fn command_line<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    let mut line = shell_quote(program);
    for arg in args {
        line.push(' ');
        line.push_str(&shell_quote(arg.as_ref()));
    }
    line
}
