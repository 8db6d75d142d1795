//! wgpu backend for the environment-probe pipeline.
//!
//! [`WgpuContext`] implements [`envprobe_render::GraphicsContext`] on a wgpu
//! device. Draw-state calls are recorded into passes and encoded by
//! [`WgpuContext::submit`] once per frame.
//!
//! # Invariants
//! - Captured faces are written in cube-map texel orientation; face targets
//!   flip clip-space y and the front-face winding together.
//! - A draw sees the uniform values set before it, even when later draws in
//!   the same frame change them.
//! - Cube mips are rebuilt in submission order, after every face pass
//!   recorded before the request.

mod context;
mod mipmap;
pub mod shaders;

pub use context::WgpuContext;

/// Register the WGSL sources of both scene programs under their asset names.
pub fn register_shaders(assets: &mut envprobe_assets::AssetTable) {
    assets.insert_shader(envprobe_render::TEXTURED, shaders::TEXTURED);
    assets.insert_shader(envprobe_render::CUBE_TEXTURED, shaders::CUBE_TEXTURED);
}
