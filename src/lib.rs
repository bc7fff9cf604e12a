#![forbid(unsafe_code)]

//! Session relay: hands a long-running interactive AI CLI session off to a
//! fresh process inside its tmux pane when the context window runs out.

pub mod audit;
pub mod config;
pub mod emitter;
pub mod errors;
pub mod ipc;
pub mod logging;
pub mod orchestrator;
pub mod pane;

pub use config::{RelayConfig, RelayPaths};
pub use errors::{AppError, Result};
