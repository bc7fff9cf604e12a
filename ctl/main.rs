#![forbid(unsafe_code)]

//! `symphony-relay-ctl` — client companion for `symphony-relay`.
//!
//! Invoked from inside the interactive pane once the AI session has written
//! its hand-off document. Publishes the ready signal on the relay channel and
//! waits for the daemon to acknowledge it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use symphony_relay::audit::HandoffPhase;
use symphony_relay::emitter::{signal_relay_ready, EmitOutcome};
use symphony_relay::logging::{init_tracing, LogFormat};
use symphony_relay::{AppError, RelayConfig, Result};

#[derive(Debug, Parser)]
#[command(
    name = "symphony-relay-ctl",
    about = "Client for the symphony-relay daemon",
    version,
    long_about = None
)]
struct Cli {
    /// Relay base directory (must match the daemon's).
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Signal that the hand-off document is written and the session may be replaced.
    Ready {
        /// Path of the hand-off document.
        handoff: PathBuf,

        /// tmux pane to relaunch (defaults to $TMUX_PANE).
        #[arg(long, env = "TMUX_PANE")]
        pane: Option<String>,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();

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

    let result = runtime.block_on(run(args));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    init_tracing(args.log_format, None)?;
    let config = RelayConfig::load(args.base_dir.as_deref())?;

    match args.command {
        Command::Ready { handoff, pane } => {
            let pane = pane.ok_or_else(|| {
                AppError::Config("no pane given and $TMUX_PANE is unset".into())
            })?;

            let cancel = CancellationToken::new();
            let ctrl_c_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c_cancel.cancel();
                }
            });

            match signal_relay_ready(&config, &handoff, &pane, cancel).await? {
                EmitOutcome::Acknowledged(status) => match status.phase {
                    HandoffPhase::Failed => {
                        return Err(AppError::HandoffFailed(
                            status.detail.unwrap_or_else(|| "no detail recorded".into()),
                        ));
                    }
                    HandoffPhase::Accepted | HandoffPhase::Relaunched => {
                        println!("relay accepted the hand-off; safe to exit");
                    }
                },
                EmitOutcome::Unconfirmed => {
                    println!(
                        "ready signal delivered; no acknowledgment within {}s, exiting anyway",
                        config.emitter.ack_timeout_secs
                    );
                }
            }
            Ok(())
        }
    }
}
