//! Latest hand-off status record.
//!
//! The daemon rewrites a single JSON document as a hand-off progresses. The
//! emitter polls it after sending a ready signal, which turns the old fixed
//! grace period into an explicit acknowledgment with a timeout.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

use crate::{AppError, Result};

/// Progress of a single hand-off.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandoffPhase {
    /// Signal validated; the outgoing process is about to be interrupted.
    Accepted,
    /// The successor CLI was launched.
    Relaunched,
    /// The hand-off was abandoned.
    Failed,
}

/// Status of the most recent hand-off.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandoffStatus {
    /// Identifier shared by every record and log line of one hand-off.
    pub id: Uuid,
    /// Artifact path carried by the signal.
    pub handoff_path: String,
    /// Pane carried by the signal.
    pub pane_id: String,
    /// Current phase.
    pub phase: HandoffPhase,
    /// Failure reason or other context.
    pub detail: Option<String>,
    /// Time of the last update.
    pub updated_at: DateTime<Utc>,
}

impl HandoffStatus {
    /// Record `phase` for the given hand-off, stamped now.
    #[must_use]
    pub fn new(id: Uuid, handoff_path: &str, pane_id: &str, phase: HandoffPhase) -> Self {
        Self {
            id,
            handoff_path: handoff_path.to_owned(),
            pane_id: pane_id.to_owned(),
            phase,
            detail: None,
            updated_at: Utc::now(),
        }
    }

    /// Attach a detail message.
    #[must_use]
    pub fn with_detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Whether this record answers a signal for `handoff_path` in `pane_id`
    /// sent at or after `since`.
    #[must_use]
    pub fn answers(&self, handoff_path: &str, pane_id: &str, since: DateTime<Utc>) -> bool {
        self.handoff_path == handoff_path && self.pane_id == pane_id && self.updated_at >= since
    }
}

/// Reads and atomically replaces the status record file.
#[derive(Debug, Clone)]
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    /// Store backed by `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the record with `status`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the record cannot be written or renamed into place.
    pub fn write(&self, status: &HandoffStatus) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let json = serde_json::to_vec_pretty(status)
            .map_err(|err| AppError::Io(format!("failed to serialize hand-off status: {err}")))?;

        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|err| AppError::Io(format!("failed to stage hand-off status: {err}")))?;
        tmp.write_all(&json)
            .and_then(|()| tmp.flush())
            .map_err(|err| AppError::Io(format!("failed to write hand-off status: {err}")))?;
        tmp.persist(&self.path).map_err(|err| {
            AppError::Io(format!(
                "failed to persist {}: {}",
                self.path.display(),
                err.error
            ))
        })?;

        debug!(phase = ?status.phase, id = %status.id, "hand-off status recorded");
        Ok(())
    }

    /// Current record, or `None` when none has been written yet.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file exists but is unreadable or corrupt.
    pub fn read(&self) -> Result<Option<HandoffStatus>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to read {}: {err}",
                    self.path.display()
                )))
            }
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|err| AppError::Io(format!("corrupt hand-off status: {err}")))
    }
}
