//! Signalling between the interactive pane and the relay daemon.
//!
//! A named pipe carries one-line signals from the emitter to the daemon.

pub mod channel;
pub mod codec;
