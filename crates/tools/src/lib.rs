//! Developer tooling: race inspector, recorded-frame trace summary and the
//! race-driven frame source shared by the binaries.
//!
//! # Invariants
//! - Inspectors are read-only.
//! - [`RaceSession`] is the only place input reaches the race.

pub mod inspector;
pub mod session;
pub mod trace;

pub use inspector::{RaceInspector, RaceSummary};
pub use session::RaceSession;
pub use trace::TraceSummary;
