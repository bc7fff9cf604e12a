//! Unit tests for the relay log-file line format.

use std::io::Write;
use std::sync::{Arc, Mutex};

use symphony_relay::logging::{level_label, RelayLogFormat};
use tracing::Level;

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn capture(emit: impl FnOnce()) -> String {
    let buffer = Buffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .event_format(RelayLogFormat)
        .with_max_level(Level::TRACE)
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, emit);

    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}

#[test]
fn labels_fold_trace_into_debug() {
    assert_eq!(level_label(Level::ERROR), "ERROR");
    assert_eq!(level_label(Level::WARN), "WARN");
    assert_eq!(level_label(Level::INFO), "INFO");
    assert_eq!(level_label(Level::DEBUG), "DEBUG");
    assert_eq!(level_label(Level::TRACE), "DEBUG");
}

#[test]
fn line_has_bracketed_timestamp_and_level() {
    let out = capture(|| tracing::info!("relay daemon listening"));

    let line = out.lines().next().expect("one line");
    assert!(line.starts_with('['), "{line}");
    let (stamp, rest) = line[1..].split_once("] ").expect("timestamp bracket");
    assert!(stamp.ends_with('Z'), "timestamp should be UTC: {stamp}");
    assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok(), "{stamp}");
    assert_eq!(rest, "[INFO] relay daemon listening");
}

#[test]
fn fields_follow_message() {
    let out = capture(|| tracing::error!(handoff = "/tmp/h.md", "hand-off abandoned"));

    assert!(out.contains("[ERROR] hand-off abandoned handoff=\"/tmp/h.md\""), "{out}");
}

#[test]
fn one_line_per_event() {
    let out = capture(|| {
        tracing::warn!("first");
        tracing::debug!("second");
        tracing::trace!("third");
    });

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("[WARN] first"));
    assert!(lines[1].contains("[DEBUG] second"));
    assert!(lines[2].contains("[DEBUG] third"));
}

#[test]
fn enclosing_span_fields_precede_message() {
    let out = capture(|| {
        let span = tracing::info_span!("handoff", id = 7, pane = "%3");
        let _entered = span.enter();
        tracing::error!(handoff = "/tmp/h.md", "hand-off abandoned");
    });

    assert!(
        out.contains("[ERROR] handoff{id=7 pane=\"%3\"}: hand-off abandoned handoff=\"/tmp/h.md\""),
        "{out}"
    );
}

#[test]
fn nested_spans_are_written_root_first() {
    let out = capture(|| {
        let outer = tracing::info_span!("daemon");
        let _outer = outer.enter();
        let inner = tracing::info_span!("handoff", id = 1);
        let _inner = inner.enter();
        tracing::info!("relaunched");
    });

    assert!(out.contains("[INFO] daemon: handoff{id=1}: relaunched"), "{out}");
}
