//! Shared value types exchanged between the game kernel and the renderer.
//!
//! Everything here is plain data: the kernel produces transforms and camera
//! placements, the renderer consumes them. Neither side holds references into
//! the other.

mod camera;
mod types;

pub use camera::PerspectiveCamera;
pub use types::{Rgb8, Transform};
