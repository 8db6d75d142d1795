//! Race kernel: authoritative game state for the hero object.
//!
//! # Invariants
//! - All state mutations flow through [`Race::update`] and [`Race::restart`].
//! - A finished race is frozen: nothing changes until an explicit restart.
//! - The renderer only ever sees plain values ([`Race::hero_transform`]).

pub mod race;

pub use race::{Outcome, Race, RaceConfig, RaceEvent, Step};
