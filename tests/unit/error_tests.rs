//! Unit tests for `AppError` display format and conversions.

use symphony_relay::AppError;

#[test]
fn every_variant_has_its_own_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::AlreadyRunning("x".into()), "already running: x"),
        (AppError::ChannelUnavailable("x".into()), "channel unavailable: x"),
        (AppError::HandoffFileMissing("x".into()), "handoff file missing: x"),
        (AppError::PaneOperation("x".into()), "pane operation: x"),
        (AppError::ReadinessTimeout("x".into()), "readiness timeout: x"),
        (AppError::HandoffFailed("x".into()), "handoff failed: x"),
        (AppError::MalformedSignal("x".into()), "malformed signal: x"),
        (AppError::Prompt("x".into()), "prompt: x"),
        (AppError::Io("x".into()), "io: x"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn handoff_file_missing_names_the_path() {
    let err = AppError::HandoffFileMissing("/work/handoff.md".into());
    assert!(err.to_string().contains("/work/handoff.md"));
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(ref msg) if msg == "gone"));
}

#[test]
fn toml_error_converts_to_config_variant() {
    let parse = toml::from_str::<toml::Value>("= nope").expect_err("invalid toml");
    let err: AppError = parse.into();
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn nix_error_converts_to_io_variant() {
    let err: AppError = nix::errno::Errno::ENOENT.into();
    assert!(matches!(err, AppError::Io(_)));
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::Io("x".into()));
}
