//! WGSL sources for the two scene programs and the mip blitter.
//!
//! Uniform struct members match the declaration order of the corresponding
//! `ProgramDesc`. Both scene programs expose an override constant
//! `CLIP_Y_SIGN`; face targets set it to -1 so that captured images land in
//! cube-map texel orientation.

/// Combined MVP, 2D texture modulated by tint.
pub const TEXTURED: &str = r#"
override CLIP_Y_SIGN: f32 = 1.0;

struct Uniforms {
    MVP: mat4x4<f32>,
    tint: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> u: Uniforms;

@group(1) @binding(0)
var texture_sampler: texture_2d<f32>;
@group(1) @binding(1)
var texture_sampler_filter: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) tex_coord: vec2<f32>,
    @location(2) normal: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
};

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    let clip = u.MVP * vec4<f32>(vertex.position, 1.0);

    var out: VertexOutput;
    out.clip_position = vec4<f32>(clip.x, clip.y * CLIP_Y_SIGN, clip.z, clip.w);
    out.tex_coord = vertex.tex_coord;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(texture_sampler, texture_sampler_filter, in.tex_coord) * u.tint;
}
"#;

/// Cube lookup along the reflected or refracted view vector.
pub const CUBE_TEXTURED: &str = r#"
override CLIP_Y_SIGN: f32 = 1.0;

struct Uniforms {
    VP: mat4x4<f32>,
    M: mat4x4<f32>,
    M_it: mat4x4<f32>,
    cam_position: vec3<f32>,
    refraction: i32,
    tint: vec4<f32>,
    refractive_index: f32,
};

@group(0) @binding(0)
var<uniform> u: Uniforms;

@group(1) @binding(0)
var cube_texture_sampler: texture_cube<f32>;
@group(1) @binding(1)
var cube_texture_sampler_filter: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) tex_coord: vec2<f32>,
    @location(2) normal: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    let world = u.M * vec4<f32>(vertex.position, 1.0);
    let clip = u.VP * world;

    var out: VertexOutput;
    out.clip_position = vec4<f32>(clip.x, clip.y * CLIP_Y_SIGN, clip.z, clip.w);
    out.world = world.xyz;
    out.normal = (u.M_it * vec4<f32>(vertex.normal, 0.0)).xyz;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(in.normal);
    let view = normalize(in.world - u.cam_position);

    var direction: vec3<f32>;
    if u.refraction != 0 {
        direction = refract(view, n, u.refractive_index);
    } else {
        direction = reflect(view, n);
    }
    return textureSample(cube_texture_sampler, cube_texture_sampler_filter, direction) * u.tint;
}
"#;

/// Fullscreen triangle sampling the previous mip level.
pub const BLIT: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));

    var out: VertexOutput;
    out.clip_position = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    out.uv = uv;
    return out;
}

@group(0) @binding(0)
var source: texture_2d<f32>;
@group(0) @binding(1)
var source_filter: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(source, source_filter, in.uv);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(name: &str, source: &str) -> naga::Module {
        let module = naga::front::wgsl::parse_str(source)
            .unwrap_or_else(|e| panic!("{name} failed to parse: {}", e.emit_to_string(source)));
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .unwrap_or_else(|e| panic!("{name} failed validation: {e:?}"));
        module
    }

    fn has_entry_points(module: &naga::Module) {
        let names: Vec<&str> = module.entry_points.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"vs_main"));
        assert!(names.contains(&"fs_main"));
    }

    #[test]
    fn textured_is_valid() {
        has_entry_points(&validate("textured", TEXTURED));
    }

    #[test]
    fn cube_textured_is_valid() {
        has_entry_points(&validate("cube-textured", CUBE_TEXTURED));
    }

    #[test]
    fn blit_is_valid() {
        has_entry_points(&validate("blit", BLIT));
    }

    #[test]
    fn scene_programs_declare_clip_flip_override() {
        for (name, source) in [("textured", TEXTURED), ("cube-textured", CUBE_TEXTURED)] {
            let module = validate(name, source);
            assert!(
                module
                    .overrides
                    .iter()
                    .any(|(_, o)| o.name.as_deref() == Some("CLIP_Y_SIGN")),
                "{name}"
            );
        }
    }

    #[test]
    fn cube_uniform_block_matches_program_layout() {
        let module = validate("cube-textured", CUBE_TEXTURED);
        let (_, ty) = module
            .types
            .iter()
            .find(|(_, t)| t.name.as_deref() == Some("Uniforms"))
            .unwrap();
        let naga::TypeInner::Struct { members, span } = &ty.inner else {
            panic!("Uniforms is not a struct");
        };
        let offsets: Vec<u32> = members.iter().map(|m| m.offset).collect();
        let layout = envprobe_render::CUBE_TEXTURED_PROGRAM.layout();
        let expected: Vec<u32> = layout.offsets.iter().map(|o| *o as u32).collect();
        assert_eq!(offsets, expected);
        assert_eq!(*span as usize, layout.size);
    }

    #[test]
    fn textured_uniform_block_matches_program_layout() {
        let module = validate("textured", TEXTURED);
        let (_, ty) = module
            .types
            .iter()
            .find(|(_, t)| t.name.as_deref() == Some("Uniforms"))
            .unwrap();
        let naga::TypeInner::Struct { members, span } = &ty.inner else {
            panic!("Uniforms is not a struct");
        };
        let offsets: Vec<u32> = members.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 64]);
        assert_eq!(*span, 80);
    }
}
