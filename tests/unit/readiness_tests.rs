//! Unit tests for the shell-readiness heuristics.

use symphony_relay::pane::readiness::{last_non_blank, PromptProbe, ReadinessProbe, ShellFamily};

fn lines(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| (*s).to_owned()).collect()
}

fn probe(family: ShellFamily) -> PromptProbe {
    PromptProbe::new(family).expect("probe")
}

#[test]
fn last_non_blank_skips_trailing_blank_lines() {
    let captured = lines(&["first", "user@host:~$ ", "", "   "]);
    assert_eq!(last_non_blank(&captured), Some("user@host:~$ "));
    assert_eq!(last_non_blank(&lines(&["", " "])), None);
    assert_eq!(last_non_blank(&[]), None);
}

#[test]
fn posix_prompts_are_ready() {
    let probe = probe(ShellFamily::Posix);
    for prompt in ["user@host:~/work$ ", "root@box:/# ", "$", "sh-5.2$", "> "] {
        assert!(probe.is_ready(&lines(&["^C", prompt])), "{prompt:?}");
    }
}

#[test]
fn running_cli_output_is_not_ready() {
    let probe = probe(ShellFamily::Posix);
    assert!(!probe.is_ready(&lines(&["Thinking…", "Writing handoff.md"])));
    assert!(!probe.is_ready(&lines(&["user@host:~$ ", "claude --continue"])));
    assert!(!probe.is_ready(&[]));
}

#[test]
fn blank_tail_does_not_hide_prompt() {
    let probe = probe(ShellFamily::Posix);
    assert!(probe.is_ready(&lines(&["user@host:~$ ", "", ""])));
}

#[test]
fn zsh_recognizes_theme_glyphs() {
    let probe = probe(ShellFamily::Zsh);
    assert!(probe.is_ready(&lines(&["~/work ❯ "])));
    assert!(probe.is_ready(&lines(&["host% "])));
    assert!(!probe.is_ready(&lines(&["compiling…"])));
}

#[test]
fn fish_recognizes_angle_prompt() {
    let probe = probe(ShellFamily::Fish);
    assert!(probe.is_ready(&lines(&["user@host ~/work> "])));
    assert!(!probe.is_ready(&lines(&["user@host ~/work$ "])));
}

#[test]
fn probe_reports_its_family() {
    assert_eq!(probe(ShellFamily::Zsh).family(), ShellFamily::Zsh);
    assert_eq!(ShellFamily::default(), ShellFamily::Posix);
}
