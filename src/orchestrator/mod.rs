//! Relay orchestration.
//!
//! Covers the daemon lifecycle, the hand-off protocol it runs for every
//! ready signal, and bootstrapping of the two-pane tmux session.

pub mod bootstrap;
pub mod daemon;
pub mod handoff;
