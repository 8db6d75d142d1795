//! Input: actions the race consumes, and the main-camera controller.
//!
//! # Invariants
//! - The kernel consumes actions, never raw window events.
//! - Camera motion lives outside the kernel; it only reads the hero position.

pub mod action;
pub mod controller;

pub use action::{Action, InputState};
pub use controller::ChaseCamera;
