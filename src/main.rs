#![forbid(unsafe_code)]

//! `symphony-relay` — relay daemon and session launcher.
//!
//! `start` runs the daemon in the foreground (normally inside the daemon
//! pane); `stop`, `status` and `restart` manage it from any terminal;
//! `launch` builds the two-pane tmux session and attaches to it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use symphony_relay::logging::{init_tracing, LogFormat};
use symphony_relay::orchestrator::bootstrap::{
    check_dependencies, DialoguerPrompt, LaunchOutcome, LaunchRequest, SessionBootstrapper,
};
use symphony_relay::orchestrator::daemon::{self, Daemon, DaemonStatus, StopOutcome};
use symphony_relay::pane::command_line;
use symphony_relay::pane::tmux::TmuxController;
use symphony_relay::{AppError, RelayConfig, Result};

#[derive(Debug, Parser)]
#[command(name = "symphony-relay", about = "AI CLI session relay daemon", version, long_about = None)]
struct Cli {
    /// Relay base directory (defaults to $SYMPHONY_RELAY_DIR, then ./.symphony/relay).
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Console log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the relay daemon in the foreground.
    Start,

    /// Stop the recorded relay daemon.
    Stop,

    /// Show whether the daemon is running.
    Status {
        /// Print the status as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Stop the recorded daemon, then run a new one in the foreground.
    Restart,

    /// Create the two-pane tmux session and attach to it.
    Launch {
        /// Hand-off document the first CLI session resumes from.
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Session name (defaults to `session.name` from relay.toml).
        #[arg(long)]
        name: Option<String>,

        /// Working directory of both panes (defaults to the current directory).
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();

    // `status` reports problems but never fails.
    let is_status = matches!(args.command, Command::Status { .. });

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to build tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            if is_status {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    let config = Arc::new(RelayConfig::load(args.base_dir.as_deref())?);

    match args.command {
        Command::Start => {
            serve_daemon(&config, args.log_format, |daemon, cancel| async move {
                daemon.start(cancel).await
            })
            .await
        }
        Command::Restart => {
            serve_daemon(&config, args.log_format, |daemon, cancel| async move {
                daemon.restart(cancel).await
            })
            .await
        }
        Command::Stop => {
            init_tracing(args.log_format, None)?;
            match daemon::stop(&config.paths)? {
                StopOutcome::Stopped(pid) => println!("relay daemon stopped (pid {pid})"),
                StopOutcome::RemovedStale => println!("removed stale pid file"),
                StopOutcome::NotRunning => println!("relay daemon is not running"),
            }
            Ok(())
        }
        Command::Status { json } => {
            let status = daemon::status(&config.paths);
            if json {
                let rendered = serde_json::to_string_pretty(&status)
                    .map_err(|err| AppError::Io(format!("failed to render status: {err}")))?;
                println!("{rendered}");
            } else {
                print_status(&status);
            }
            Ok(())
        }
        Command::Launch {
            resume,
            name,
            work_dir,
        } => {
            init_tracing(args.log_format, None)?;
            launch(&config, resume, name, work_dir).await
        }
    }
}

/// Run a daemon entry point with file logging and signal-driven shutdown.
async fn serve_daemon<F, Fut>(config: &Arc<RelayConfig>, log_format: LogFormat, body: F) -> Result<()>
where
    F: FnOnce(Arc<Daemon>, CancellationToken) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    config.paths.ensure_dirs()?;
    init_tracing(log_format, Some(&config.paths.log_file))?;

    let daemon = Arc::new(Daemon::new(
        Arc::clone(config),
        Arc::new(TmuxController::new()),
    )?);

    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    let result = body(daemon, ct).await;
    if let Err(ref err) = result {
        error!(%err, "relay daemon exited with error");
    }
    result
}

async fn launch(
    config: &Arc<RelayConfig>,
    resume: Option<PathBuf>,
    name: Option<String>,
    work_dir: Option<PathBuf>,
) -> Result<()> {
    let capabilities = check_dependencies(&config.cli.binary).await;
    if !capabilities.multiplexer {
        return Err(AppError::Config(
            "tmux is not installed or not on PATH".into(),
        ));
    }
    if !capabilities.cli {
        return Err(AppError::Config(format!(
            "'{}' is not installed or not on PATH",
            config.cli.binary
        )));
    }

    let work_dir = match work_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let exe = std::env::current_exe()?;
    let base_dir = config.paths.base_dir.to_string_lossy().into_owned();
    let daemon_command = command_line(
        &exe.to_string_lossy(),
        &["--base-dir", base_dir.as_str(), "start"],
    );

    let request = LaunchRequest {
        name: name.unwrap_or_else(|| config.session.name.clone()),
        work_dir,
        resume,
        daemon_command,
    };

    let bootstrapper = SessionBootstrapper::new(
        Arc::clone(config),
        Arc::new(TmuxController::new()),
        Box::new(DialoguerPrompt),
    );

    match bootstrapper.launch(&request).await? {
        LaunchOutcome::Created(layout) => println!("detached from {}", layout.session),
        LaunchOutcome::Attached(name) => println!("detached from {name}"),
        LaunchOutcome::Cancelled => println!("cancelled"),
    }
    Ok(())
}

fn print_status(status: &DaemonStatus) {
    match (status.running, status.pid) {
        (true, Some(pid)) => println!("relay daemon: running (pid {pid})"),
        (false, Some(pid)) => println!("relay daemon: not running (stale pid {pid})"),
        _ => println!("relay daemon: not running"),
    }
    if let Some(started_at) = status.started_at {
        println!("started:      {}", started_at.to_rfc3339());
    }
    println!(
        "channel:      {}",
        if status.channel_exists { "present" } else { "missing" }
    );
    if !status.recent_log.is_empty() {
        println!("recent log:");
        for line in &status.recent_log {
            println!("  {line}");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
            let _ = ctrl_c.await;
        }
    }
}
