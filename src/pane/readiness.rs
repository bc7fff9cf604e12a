//! Shell-readiness heuristics.
//!
//! After the outgoing CLI is interrupted the relay polls the pane until its
//! last rendered line looks like an idle shell prompt. What a prompt looks
//! like depends on the shell, so each family gets its own probe.

use regex::Regex;
use serde::Deserialize;

use crate::{AppError, Result};

/// Shell family running in the interactive pane.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShellFamily {
    /// `sh`, `bash`, `dash`.
    #[default]
    Posix,
    /// `zsh`, including prompt themes ending in `❯`.
    Zsh,
    /// `fish`.
    Fish,
}

impl ShellFamily {
    /// Prompt pattern matched against the last non-blank line.
    fn prompt_pattern(self) -> &'static str {
        match self {
            Self::Posix => r"[$#%>]\s*$",
            Self::Zsh => r"[%#$>❯➜]\s*$",
            Self::Fish => r"[>#❯]\s*$",
        }
    }
}

/// Decides whether captured pane output shows an idle shell.
pub trait ReadinessProbe: Send + Sync {
    /// Whether `captured` (oldest line first) ends at a shell prompt.
    fn is_ready(&self, captured: &[String]) -> bool;
}

/// Matches the last non-blank line against a prompt-terminator pattern.
#[derive(Debug, Clone)]
pub struct PromptProbe {
    family: ShellFamily,
    pattern: Regex,
}

impl PromptProbe {
    /// Build the probe for `family`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the prompt pattern fails to compile.
    pub fn new(family: ShellFamily) -> Result<Self> {
        let pattern = Regex::new(family.prompt_pattern())
            .map_err(|err| AppError::Config(format!("invalid prompt pattern: {err}")))?;
        Ok(Self { family, pattern })
    }

    /// Shell family this probe recognizes.
    #[must_use]
    pub fn family(&self) -> ShellFamily {
        self.family
    }
}

impl ReadinessProbe for PromptProbe {
    fn is_ready(&self, captured: &[String]) -> bool {
        last_non_blank(captured).is_some_and(|line| self.pattern.is_match(line))
    }
}

/// Last line of `captured` containing anything besides whitespace.
#[must_use]
pub fn last_non_blank(captured: &[String]) -> Option<&str> {
    captured
        .iter()
        .rev()
        .map(String::as_str)
        .find(|line| !line.trim().is_empty())
}
