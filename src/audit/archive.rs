//! Timestamped archive of hand-off artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::{AppError, Result};

/// Copies hand-off artifacts into `<archive_dir>/handoff-YYYYMMDD-HHMMSS-mmm.md`.
///
/// The original artifact is never modified or removed.
#[derive(Debug, Clone)]
pub struct HandoffArchive {
    dir: PathBuf,
}

impl HandoffArchive {
    /// Archive rooted at `dir`. The directory is created on first use.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Directory receiving archive entries.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `source` into a new timestamped entry and return its path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be created or the copy fails.
    pub fn archive(&self, source: &Path) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            AppError::Io(format!(
                "failed to create archive directory {}: {err}",
                self.dir.display()
            ))
        })?;

        let stamp = Utc::now().format("%Y%m%d-%H%M%S-%3f").to_string();
        let mut target = self.dir.join(format!("handoff-{stamp}.md"));
        let mut suffix = 2u32;
        while target.exists() {
            target = self.dir.join(format!("handoff-{stamp}-{suffix}.md"));
            suffix += 1;
        }

        fs::copy(source, &target).map_err(|err| {
            AppError::Io(format!(
                "failed to archive {} to {}: {err}",
                source.display(),
                target.display()
            ))
        })?;

        debug!(source = %source.display(), target = %target.display(), "hand-off archived");
        Ok(target)
    }

    /// Archived entries, oldest first. A missing directory yields no entries.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory exists but cannot be listed.
    pub fn entries(&self) -> Result<Vec<PathBuf>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to list {}: {err}",
                    self.dir.display()
                )))
            }
        };

        let mut entries: Vec<PathBuf> = read_dir
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        entries.sort();
        Ok(entries)
    }
}
