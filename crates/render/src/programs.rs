//! Interfaces of the two shader programs the pipeline draws with.

use crate::context::{ProgramDesc, SamplerDecl, SamplerDimension, UniformDecl, UniformKind};

/// Asset name of the textured program's source.
pub const TEXTURED: &str = "textured";
/// Asset name of the environment-mapped program's source.
pub const CUBE_TEXTURED: &str = "cube-textured";

/// Combined MVP, tint, one 2D texture.
pub const TEXTURED_PROGRAM: ProgramDesc = ProgramDesc {
    name: TEXTURED,
    uniforms: &[
        UniformDecl {
            name: "MVP",
            kind: UniformKind::Mat4,
        },
        UniformDecl {
            name: "tint",
            kind: UniformKind::Vec4,
        },
    ],
    samplers: &[SamplerDecl {
        name: "texture_sampler",
        dimension: SamplerDimension::D2,
    }],
};

/// Reflection/refraction lookup into a cube texture.
pub const CUBE_TEXTURED_PROGRAM: ProgramDesc = ProgramDesc {
    name: CUBE_TEXTURED,
    uniforms: &[
        UniformDecl {
            name: "VP",
            kind: UniformKind::Mat4,
        },
        UniformDecl {
            name: "M",
            kind: UniformKind::Mat4,
        },
        UniformDecl {
            name: "M_it",
            kind: UniformKind::Mat4,
        },
        UniformDecl {
            name: "cam_position",
            kind: UniformKind::Vec3,
        },
        UniformDecl {
            name: "refraction",
            kind: UniformKind::Int,
        },
        UniformDecl {
            name: "tint",
            kind: UniformKind::Vec4,
        },
        UniformDecl {
            name: "refractive_index",
            kind: UniformKind::Float,
        },
    ],
    samplers: &[SamplerDecl {
        name: "cube_texture_sampler",
        dimension: SamplerDimension::Cube,
    }],
};
