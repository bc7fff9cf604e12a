//! Unit tests for command-line quoting of text typed into panes.

use symphony_relay::pane::{command_line, shell_quote};

#[test]
fn plain_words_stay_unquoted() {
    assert_eq!(shell_quote("claude"), "claude");
    assert_eq!(shell_quote("--continue"), "--continue");
    assert_eq!(shell_quote("/tmp/relay/handoff.md"), "/tmp/relay/handoff.md");
}

#[test]
fn whitespace_forces_single_quotes() {
    assert_eq!(shell_quote("two words"), "'two words'");
}

#[test]
fn empty_argument_is_quoted() {
    assert_eq!(shell_quote(""), "''");
}

#[test]
fn embedded_single_quote_is_escaped() {
    assert_eq!(shell_quote("it's"), r"'it'\''s'");
}

#[test]
fn shell_metacharacters_are_quoted() {
    for arg in ["$HOME", "a;b", "`id`", "x|y", "*"] {
        let quoted = shell_quote(arg);
        assert!(quoted.starts_with('\'') && quoted.ends_with('\''), "{arg} -> {quoted}");
    }
}

#[test]
fn command_line_joins_quoted_args() {
    let line = command_line("claude", &["--continue", "Read /tmp/h.md and resume."]);
    assert_eq!(line, "claude --continue 'Read /tmp/h.md and resume.'");
}

#[test]
fn command_line_without_args_is_program() {
    let line = command_line::<&str>("/usr/bin/claude", &[]);
    assert_eq!(line, "/usr/bin/claude");
}
