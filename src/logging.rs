//! Tracing initialisation and the relay log-file format.
//!
//! Console output follows `RUST_LOG` (default `info`) in text or JSON. The
//! daemon additionally appends to its log file one line per event:
//!
//! ```text
//! [2026-10-19T08:15:02.117Z] [INFO] relay reader started path=/…/relay.pipe
//! [2026-10-19T08:15:04.530Z] [INFO] handoff{id=4f1c… pane=%3}: hand-off complete
//! ```

use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::{AppError, Result};

/// Console log output format.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Level label written to the log file. TRACE folds into DEBUG.
#[must_use]
pub fn level_label(level: Level) -> &'static str {
    match level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARN",
        Level::INFO => "INFO",
        Level::DEBUG | Level::TRACE => "DEBUG",
    }
}

/// Formats events as `[timestamp] [LEVEL] span{fields}: message key=value …`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayLogFormat;

impl<S, N> FormatEvent<S, N> for RelayLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "[{}] [{}] ",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level_label(*event.metadata().level())
        )?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the global subscriber.
///
/// With `log_file` set, events at `DEBUG` and above are also appended to it in
/// the [`RelayLogFormat`] layout.
///
/// # Errors
///
/// Returns `AppError::Config` if the log file cannot be opened or a global
/// subscriber is already installed.
pub fn init_tracing(log_format: LogFormat, log_file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console = match log_format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed(),
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| {
                    AppError::Config(format!("failed to open log file {}: {err}", path.display()))
                })?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .event_format(RelayLogFormat)
                    .with_writer(Mutex::new(file))
                    .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))
}
