//! Backend-agnostic environment-probe pipeline.
//!
//! Every frame the world is rendered six times from the hero's position into
//! the faces of a cube texture, the cube's mip chain is rebuilt, the world is
//! rendered once more from the main camera, and finally the hero is drawn
//! with a material that reflects or refracts the captured environment.
//!
//! # Invariants
//! - All six face captures and the mip rebuild are issued before the
//!   environment-mapped draw of the same frame.
//! - Capture targets are checked for completeness once, at setup. A target
//!   that is not complete aborts setup and is never drawn into.
//! - GPU resources are released once, by consuming the owning value.
//!
//! The pipeline talks to the GPU through [`GraphicsContext`]. A wgpu
//! implementation lives in `envprobe-render-wgpu`; [`RecordingContext`]
//! records calls for tests and tracing.

mod capture;
mod context;
mod face;
mod frame;
mod material;
mod programs;
mod recording;
mod scene;

pub use capture::{
    CaptureSetupError, CaptureTarget, EnvironmentConfig, SixFaceCubeCapture, mip_level_count,
};
pub use context::{
    BindingError, ContextError, CubeTextureDesc, CubeTextureId, FaceAttachment, FilterMode,
    FramebufferId, FramebufferStatus, GraphicsContext, IncompleteReason, MeshId, ProgramDesc,
    ProgramId, RenderTarget, SamplerDecl, SamplerDesc, SamplerDimension, SamplerId,
    TextureBinding, TextureFormat, TextureId, UniformDecl, UniformKind, UniformLayout,
    UniformValue, Viewport, WrapMode,
};
pub use face::CubeFace;
pub use frame::{
    FrameInputs, FrameOrchestrator, FrameSetupError, FrameSource, FrameStats, FrameStatus,
};
pub use material::{
    EnvironmentMappedMaterial, MaterialParams, MaterialSettings, lookup_direction, reflect,
    refract,
};
pub use programs::{CUBE_TEXTURED, CUBE_TEXTURED_PROGRAM, TEXTURED, TEXTURED_PROGRAM};
pub use recording::{Command, RecordingContext};
pub use scene::{CLEAR_COLOR, Drawable, SceneAssets, SceneError, SceneLayout, SceneRenderer};
