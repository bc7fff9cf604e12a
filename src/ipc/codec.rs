//! Single-line wire format for relay signals.
//!
//! A signal is one line of the form `TYPE:handoffPath:paneId`, where `TYPE`
//! is `RELAY_READY` or `RELAY_ACK`. Fields are not escaped: a hand-off path
//! containing `:` is cut at the first colon and the remainder is read as part
//! of the pane id.

use std::fmt::{Display, Formatter};
use std::path::Path;

use crate::{AppError, Result};

/// Wire token of a ready signal.
pub const READY_TOKEN: &str = "RELAY_READY";
/// Wire token of an acknowledgment signal.
pub const ACK_TOKEN: &str = "RELAY_ACK";

/// Signal classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// The interactive session wrote its hand-off artifact and may be replaced.
    Ready,
    /// Acknowledgment of a ready signal.
    Ack,
}

impl SignalKind {
    /// Wire token for this kind.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::Ready => READY_TOKEN,
            Self::Ack => ACK_TOKEN,
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            READY_TOKEN => Some(Self::Ready),
            ACK_TOKEN => Some(Self::Ack),
            _ => None,
        }
    }
}

impl Display for SignalKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// A decoded relay signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySignal {
    /// Signal classification.
    pub kind: SignalKind,
    /// Absolute path of the hand-off artifact.
    pub handoff_path: String,
    /// Multiplexer pane the signal refers to.
    pub pane_id: String,
}

impl RelaySignal {
    /// Build a ready signal for an existing hand-off file.
    ///
    /// The path is canonicalized so the daemon receives an absolute path
    /// regardless of the emitter's working directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::HandoffFileMissing` if `handoff_path` is not an
    /// existing regular file.
    pub fn ready(handoff_path: &Path, pane_id: impl Into<String>) -> Result<Self> {
        if !handoff_path.is_file() {
            return Err(AppError::HandoffFileMissing(
                handoff_path.display().to_string(),
            ));
        }

        let absolute = handoff_path.canonicalize().map_err(|err| {
            AppError::HandoffFileMissing(format!("{}: {err}", handoff_path.display()))
        })?;

        Ok(Self {
            kind: SignalKind::Ready,
            handoff_path: absolute.to_string_lossy().into_owned(),
            pane_id: pane_id.into(),
        })
    }
}

/// Encode a signal as a wire line, without the trailing newline.
#[must_use]
pub fn encode(signal: &RelaySignal) -> String {
    format!(
        "{}:{}:{}",
        signal.kind.token(),
        signal.handoff_path,
        signal.pane_id
    )
}

/// Decode a wire line. Unknown tokens and incomplete lines yield `None`.
#[must_use]
pub fn decode(line: &str) -> Option<RelaySignal> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut fields = line.splitn(3, ':');

    let kind = SignalKind::from_token(fields.next()?)?;
    let handoff_path = fields.next()?;
    let pane_id = fields.next()?;

    if handoff_path.is_empty() || pane_id.is_empty() {
        return None;
    }

    Some(RelaySignal {
        kind,
        handoff_path: handoff_path.to_owned(),
        pane_id: pane_id.to_owned(),
    })
}

/// Decode a wire line, reporting why it was rejected.
///
/// # Errors
///
/// Returns `AppError::MalformedSignal` carrying the offending line.
pub fn decode_strict(line: &str) -> Result<RelaySignal> {
    decode(line).ok_or_else(|| AppError::MalformedSignal(line.trim_end().to_owned()))
}
