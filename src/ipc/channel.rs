//! Named-pipe channel carrying hand-off signals.
//!
//! [`write`] blocks in `open` until the daemon's reader is attached, so a
//! successful write doubles as a liveness probe. [`try_write`] never blocks
//! and reports whether a reader was attached. The reader runs on a dedicated
//! thread with plain blocking reads. It opens the pipe read-write, so writers
//! coming and going never produce EOF and no line is lost between them. On
//! EOF or a read error the pipe is closed and reopened after
//! [`REOPEN_DELAY`].

use std::fs::{self, OpenOptions, Permissions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tracing::{debug, info, warn};

use crate::ipc::codec::{self, RelaySignal};
use crate::{AppError, Result};

/// Pause before the reader reopens the pipe after EOF or an error.
pub const REOPEN_DELAY: Duration = Duration::from_millis(250);

/// Interval between wake-up attempts while a stopping reader winds down.
const WAKE_INTERVAL: Duration = Duration::from_millis(20);

/// Create the named pipe at `path`, replacing any existing entry.
///
/// # Errors
///
/// Returns `AppError::ChannelUnavailable` if the parent directory is missing,
/// an existing entry cannot be removed, or the pipe cannot be created.
pub fn create(path: &Path) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !parent.is_dir() {
        return Err(AppError::ChannelUnavailable(format!(
            "parent directory {} does not exist",
            parent.display()
        )));
    }

    let removed = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    };
    removed.map_err(|err| {
        AppError::ChannelUnavailable(format!(
            "cannot replace existing entry {}: {err}",
            path.display()
        ))
    })?;

    mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|err| {
        AppError::ChannelUnavailable(format!("mkfifo {} failed: {err}", path.display()))
    })?;

    // mkfifo is subject to the umask; pin the mode explicitly.
    fs::set_permissions(path, Permissions::from_mode(0o600)).map_err(|err| {
        AppError::ChannelUnavailable(format!("chmod {} failed: {err}", path.display()))
    })?;

    debug!(path = %path.display(), "relay channel created");
    Ok(())
}

/// Whether `path` is a named pipe. Any stat failure yields `false`.
#[must_use]
pub fn is_fifo(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.file_type().is_fifo())
        .unwrap_or(false)
}

/// Write `message` plus a newline to the pipe.
///
/// Blocks until a reader has the pipe open.
///
/// # Errors
///
/// Returns `AppError::ChannelUnavailable` if `path` is not a named pipe or
/// the write fails.
pub fn write(message: &str, path: &Path) -> Result<()> {
    if !is_fifo(path) {
        return Err(AppError::ChannelUnavailable(format!(
            "{} is not a named pipe",
            path.display()
        )));
    }

    let mut pipe = OpenOptions::new().write(true).open(path).map_err(|err| {
        AppError::ChannelUnavailable(format!("cannot open {}: {err}", path.display()))
    })?;

    let mut line = String::with_capacity(message.len() + 1);
    line.push_str(message);
    line.push('\n');

    pipe.write_all(line.as_bytes())
        .and_then(|()| pipe.flush())
        .map_err(|err| AppError::ChannelUnavailable(format!("write failed: {err}")))
}

/// Write `message` plus a newline without blocking.
///
/// Returns `Ok(false)` when no reader has the pipe open or the pipe buffer is
/// full, so the caller can retry.
///
/// # Errors
///
/// Returns `AppError::ChannelUnavailable` if `path` is not a named pipe or
/// the open or write fails for another reason.
pub fn try_write(message: &str, path: &Path) -> Result<bool> {
    if !is_fifo(path) {
        return Err(AppError::ChannelUnavailable(format!(
            "{} is not a named pipe",
            path.display()
        )));
    }

    let mut pipe = match OpenOptions::new()
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(path)
    {
        Ok(pipe) => pipe,
        Err(err) if err.raw_os_error() == Some(Errno::ENXIO as i32) => return Ok(false),
        Err(err) => {
            return Err(AppError::ChannelUnavailable(format!(
                "cannot open {}: {err}",
                path.display()
            )))
        }
    };

    let mut line = String::with_capacity(message.len() + 1);
    line.push_str(message);
    line.push('\n');

    // Lines shorter than PIPE_BUF are written whole or not at all.
    match pipe.write_all(line.as_bytes()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(false),
        Err(err) => Err(AppError::ChannelUnavailable(format!("write failed: {err}"))),
    }
}

/// Handle to a running reader loop.
///
/// Dropping the handle asks the loop to stop without waiting for it.
pub struct ReaderHandle {
    path: PathBuf,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReaderHandle {
    /// Ask the reader loop to stop and wake it if it is blocked in `read`.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        wake(&self.path);
    }

    /// Whether the reader thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the reader loop and wait for its thread to exit.
    pub fn join(mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            while !thread.is_finished() {
                wake(&self.path);
                thread::sleep(WAKE_INTERVAL);
            }
            if thread.join().is_err() {
                warn!("relay reader thread panicked");
            }
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Write a blank line so a reader blocked in `read` checks its stop flag.
fn wake(path: &Path) {
    let _ = try_write("", path);
}

/// Start the long-lived reader loop on a dedicated thread.
///
/// `on_signal` runs on the reader thread; the next line is not read until it
/// returns. Malformed lines are dropped with a debug log. Open and read
/// failures are reported through `on_error` and the pipe is reopened.
///
/// # Errors
///
/// Returns `AppError::Io` if the reader thread cannot be spawned.
pub fn start_reader<S, E>(path: &Path, on_signal: S, on_error: E) -> Result<ReaderHandle>
where
    S: FnMut(RelaySignal) + Send + 'static,
    E: FnMut(AppError) + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let loop_path = path.to_path_buf();
    let loop_stop = Arc::clone(&stop);

    let thread = thread::Builder::new()
        .name("relay-reader".into())
        .spawn(move || read_loop(&loop_path, &loop_stop, on_signal, on_error))
        .map_err(|err| AppError::Io(format!("failed to spawn reader thread: {err}")))?;

    info!(path = %path.display(), "relay reader started");

    Ok(ReaderHandle {
        path: path.to_path_buf(),
        stop,
        thread: Some(thread),
    })
}

fn read_loop<S, E>(path: &Path, stop: &AtomicBool, mut on_signal: S, mut on_error: E)
where
    S: FnMut(RelaySignal),
    E: FnMut(AppError),
{
    while !stop.load(Ordering::SeqCst) {
        // Holding a write end keeps the pipe from reporting EOF between writers.
        let pipe = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(pipe) => pipe,
            Err(err) => {
                on_error(AppError::ChannelUnavailable(format!(
                    "cannot open {}: {err}",
                    path.display()
                )));
                thread::sleep(REOPEN_DELAY);
                continue;
            }
        };

        if stop.load(Ordering::SeqCst) {
            break;
        }

        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end();
                    if line.is_empty() {
                        continue;
                    }
                    match codec::decode(line) {
                        Some(signal) => on_signal(signal),
                        None => debug!(line, "dropping malformed relay signal"),
                    }
                }
                Err(err) => {
                    on_error(AppError::ChannelUnavailable(format!("read failed: {err}")));
                    break;
                }
            }
        }

        drop(reader);
        if !stop.load(Ordering::SeqCst) {
            thread::sleep(REOPEN_DELAY);
        }
    }

    debug!(path = %path.display(), "relay reader stopped");
}
