//! Hand-off audit trail.
//!
//! Two records survive a hand-off: a timestamped copy of the artifact in the
//! archive directory ([`HandoffArchive`]) and the latest hand-off status
//! ([`StatusStore`]), which the emitter reads as its acknowledgment.

pub mod archive;
pub mod status;

pub use archive::HandoffArchive;
pub use status::{HandoffPhase, HandoffStatus, StatusStore};
