//! Immediate-mode graphics interface the pipeline is written against.
//!
//! The shape follows a classic bind-then-draw API: bind a target, pick a
//! program, set named uniforms, bind textures to units, draw. Backends map it
//! onto their own model; [`crate::RecordingContext`] records it for tests.

use crate::face::CubeFace;
use envprobe_assets::{ImageData, MeshData};
use glam::{Mat4, Vec3, Vec4};

macro_rules! handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

handle!(
    /// A six-layer cube image.
    CubeTextureId,
    /// A 2D color texture.
    TextureId,
    /// An offscreen render target with color and depth attachments.
    FramebufferId,
    SamplerId,
    MeshId,
    ProgramId,
);

/// Storage formats the pipeline allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Depth16Unorm,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth16Unorm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CubeTextureDesc {
    pub label: &'static str,
    /// Width and height of every face at mip 0.
    pub size: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
}

/// One face of one mip level of a cube texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceAttachment {
    pub texture: CubeTextureId,
    pub face: CubeFace,
    pub mip_level: u32,
}

/// Why a framebuffer cannot be rendered to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IncompleteReason {
    #[error("attachment texture does not exist")]
    MissingAttachment,
    #[error("attachment sizes differ ({color} vs {depth})")]
    SizeMismatch { color: u32, depth: u32 },
    #[error("attachment format {0:?} is not renderable in that slot")]
    UnsupportedFormat(TextureFormat),
    #[error("mip level {0} is out of range")]
    MipOutOfRange(u32),
    #[error("backend rejected the target: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    Incomplete(IncompleteReason),
}

/// Where draws land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    /// The window surface.
    Default,
    Framebuffer(FramebufferId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    Repeat,
    ClampToEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDesc {
    pub wrap: WrapMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    /// `None` samples mip 0 only.
    pub mipmap_filter: Option<FilterMode>,
}

impl SamplerDesc {
    /// Repeat wrapping, linear magnification, linear-mipmap-linear minification.
    pub const fn trilinear_repeat() -> Self {
        Self {
            wrap: WrapMode::Repeat,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: Some(FilterMode::Linear),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Mat4,
    Vec3,
    Vec4,
    Float,
    Int,
}

impl UniformKind {
    /// (alignment, size) in bytes under WGSL uniform-buffer layout rules.
    pub const fn layout(self) -> (usize, usize) {
        match self {
            UniformKind::Mat4 => (16, 64),
            UniformKind::Vec4 => (16, 16),
            UniformKind::Vec3 => (16, 12),
            UniformKind::Float | UniformKind::Int => (4, 4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Mat4(Mat4),
    Vec3(Vec3),
    Vec4(Vec4),
    Float(f32),
    Int(i32),
    /// Texture unit a sampler slot reads from.
    Sampler(u32),
}

impl UniformValue {
    /// The declared kind this value can be written to; `None` for samplers.
    pub fn kind(&self) -> Option<UniformKind> {
        match self {
            UniformValue::Mat4(_) => Some(UniformKind::Mat4),
            UniformValue::Vec3(_) => Some(UniformKind::Vec3),
            UniformValue::Vec4(_) => Some(UniformKind::Vec4),
            UniformValue::Float(_) => Some(UniformKind::Float),
            UniformValue::Int(_) => Some(UniformKind::Int),
            UniformValue::Sampler(_) => None,
        }
    }

    /// Little-endian bytes as laid out in a uniform block.
    pub fn write_to(&self, out: &mut [u8]) {
        let mut put = |values: &[f32]| {
            for (chunk, v) in out.chunks_exact_mut(4).zip(values) {
                chunk.copy_from_slice(&v.to_le_bytes());
            }
        };
        match self {
            UniformValue::Mat4(m) => put(&m.to_cols_array()),
            UniformValue::Vec3(v) => put(&v.to_array()),
            UniformValue::Vec4(v) => put(&v.to_array()),
            UniformValue::Float(f) => put(&[*f]),
            UniformValue::Int(i) => out[..4].copy_from_slice(&i.to_le_bytes()),
            UniformValue::Sampler(_) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerDimension {
    D2,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: &'static str,
    pub kind: UniformKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDecl {
    pub name: &'static str,
    pub dimension: SamplerDimension,
}

/// Interface of a shader program: its uniform block and sampler slots.
///
/// Uniforms are packed in declaration order; the shader's uniform struct must
/// declare the same members in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramDesc {
    pub name: &'static str,
    pub uniforms: &'static [UniformDecl],
    pub samplers: &'static [SamplerDecl],
}

/// Byte offsets of every uniform plus the padded block size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    pub offsets: Vec<usize>,
    pub size: usize,
}

impl ProgramDesc {
    pub fn layout(&self) -> UniformLayout {
        let mut offsets = Vec::with_capacity(self.uniforms.len());
        let mut cursor = 0usize;
        for decl in self.uniforms {
            let (align, size) = decl.kind.layout();
            cursor = cursor.next_multiple_of(align);
            offsets.push(cursor);
            cursor += size;
        }
        UniformLayout {
            offsets,
            size: cursor.next_multiple_of(16).max(16),
        }
    }

    /// Index of a declared uniform.
    pub fn uniform_index(&self, name: &str) -> Option<usize> {
        self.uniforms.iter().position(|u| u.name == name)
    }

    /// Index of a declared sampler slot.
    pub fn sampler_index(&self, name: &str) -> Option<usize> {
        self.samplers.iter().position(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureBinding {
    Texture2d(TextureId),
    Cube(CubeTextureId),
}

impl TextureBinding {
    pub fn dimension(self) -> SamplerDimension {
        match self {
            TextureBinding::Texture2d(_) => SamplerDimension::D2,
            TextureBinding::Cube(_) => SamplerDimension::Cube,
        }
    }
}

/// Resource creation failures. All of them are treated as non-transient.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContextError {
    #[error("out of memory allocating {0}")]
    OutOfMemory(String),
    #[error("invalid {what}: {reason}")]
    Invalid { what: &'static str, reason: String },
    #[error("program `{program}` failed to build: {message}")]
    Program { program: String, message: String },
    #[error("unknown {0} handle")]
    UnknownHandle(&'static str),
}

/// A draw could not be set up. Callers log it and skip that draw.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindingError {
    #[error("no program in use")]
    NoProgram,
    #[error("program `{program}` has no uniform or sampler `{name}`")]
    UnknownUniform { program: &'static str, name: String },
    #[error("uniform `{name}` is declared {expected:?} but was given {found:?}")]
    KindMismatch {
        name: String,
        expected: Option<UniformKind>,
        found: Option<UniformKind>,
    },
    #[error("sampler `{name}` needs a {dimension:?} texture on unit {unit}")]
    MissingTexture {
        name: &'static str,
        dimension: SamplerDimension,
        unit: u32,
    },
    #[error("unknown {0} handle")]
    UnknownHandle(&'static str),
}

/// Graphics device as seen by the pipeline.
///
/// Commands take effect in call order. Creation calls allocate immediately;
/// draw-state calls may be deferred by the backend but must keep their order.
pub trait GraphicsContext {
    fn create_cube_texture(&mut self, desc: &CubeTextureDesc) -> Result<CubeTextureId, ContextError>;
    fn create_face_framebuffer(
        &mut self,
        color: FaceAttachment,
        depth: FaceAttachment,
    ) -> Result<FramebufferId, ContextError>;
    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus;
    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId, ContextError>;
    /// Uploads an image with a full mip chain and a default repeat/trilinear sampler.
    fn create_texture_2d(&mut self, label: &str, image: &ImageData) -> Result<TextureId, ContextError>;
    fn create_mesh(&mut self, label: &str, mesh: &MeshData) -> Result<MeshId, ContextError>;
    fn create_program(&mut self, desc: &ProgramDesc, source: &str) -> Result<ProgramId, ContextError>;

    fn bind_framebuffer(&mut self, target: RenderTarget);
    fn set_viewport(&mut self, viewport: Viewport);
    /// Clears color and depth of the bound target.
    fn clear(&mut self, color: [f32; 4], depth: f32);
    fn use_program(&mut self, program: ProgramId);
    fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), BindingError>;
    fn bind_texture(&mut self, unit: u32, texture: TextureBinding);
    /// `None` falls back to the bound texture's own sampler.
    fn bind_sampler(&mut self, unit: u32, sampler: Option<SamplerId>);
    fn draw(&mut self, mesh: MeshId) -> Result<(), BindingError>;
    /// Rebuilds mips 1.. of every face from mip 0.
    fn generate_mipmaps(&mut self, texture: CubeTextureId);

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
    fn delete_cube_texture(&mut self, texture: CubeTextureId);
    fn delete_sampler(&mut self, sampler: SamplerId);
    fn delete_texture(&mut self, texture: TextureId);
    fn delete_mesh(&mut self, mesh: MeshId);
    fn delete_program(&mut self, program: ProgramId);
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: ProgramDesc = ProgramDesc {
        name: "block",
        uniforms: &[
            UniformDecl { name: "a", kind: UniformKind::Float },
            UniformDecl { name: "b", kind: UniformKind::Vec3 },
            UniformDecl { name: "c", kind: UniformKind::Int },
            UniformDecl { name: "d", kind: UniformKind::Mat4 },
        ],
        samplers: &[SamplerDecl { name: "s", dimension: SamplerDimension::Cube }],
    };

    #[test]
    fn layout_follows_wgsl_alignment() {
        let layout = BLOCK.layout();
        assert_eq!(layout.offsets, vec![0, 16, 28, 32]);
        assert_eq!(layout.size, 96);
    }

    #[test]
    fn lookups_by_name() {
        assert_eq!(BLOCK.uniform_index("c"), Some(2));
        assert_eq!(BLOCK.uniform_index("s"), None);
        assert_eq!(BLOCK.sampler_index("s"), Some(0));
    }

    #[test]
    fn values_serialize_little_endian() {
        let mut buf = [0u8; 16];
        UniformValue::Vec3(Vec3::new(1.0, 2.0, 3.0)).write_to(&mut buf);
        assert_eq!(&buf[4..8], &2.0f32.to_le_bytes());
        UniformValue::Int(-2).write_to(&mut buf);
        assert_eq!(&buf[..4], &(-2i32).to_le_bytes());
    }

    #[test]
    fn mat4_is_column_major() {
        let mut buf = [0u8; 64];
        let m = Mat4::from_translation(Vec3::new(7.0, 8.0, 9.0));
        UniformValue::Mat4(m).write_to(&mut buf);
        assert_eq!(&buf[48..52], &7.0f32.to_le_bytes());
    }
}
