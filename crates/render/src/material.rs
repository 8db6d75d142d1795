//! Reflective / refractive material reading the captured environment.

use crate::context::{
    BindingError, CubeTextureId, GraphicsContext, MeshId, ProgramId, SamplerId, TextureBinding,
    UniformValue,
};
use crate::programs::{CUBE_TEXTURED, CUBE_TEXTURED_PROGRAM};
use crate::scene::SceneError;
use envprobe_assets::AssetTable;
use envprobe_common::{PerspectiveCamera, Rgb8};
use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// User-facing material controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialSettings {
    pub tint: Rgb8,
    pub refraction: bool,
    /// Incident-to-transmitted ratio. Must be positive.
    pub refractive_index: f32,
    /// Extra hero rotation, Euler degrees.
    pub hero_rotation_degrees: Vec3,
}

impl Default for MaterialSettings {
    fn default() -> Self {
        Self {
            tint: Rgb8::default(),
            refraction: false,
            refractive_index: 1.0,
            hero_rotation_degrees: Vec3::ZERO,
        }
    }
}

/// Values uploaded for one environment-mapped draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialParams {
    pub model: Mat4,
    /// Inverse transpose of `model`, for normals.
    pub normal_matrix: Mat4,
    pub tint: Vec4,
    pub refraction: bool,
    pub refractive_index: f32,
}

impl MaterialParams {
    pub fn new(model: Mat4, settings: &MaterialSettings) -> Self {
        Self {
            model,
            normal_matrix: model.inverse().transpose(),
            tint: settings.tint.to_rgba(),
            refraction: settings.refraction,
            refractive_index: settings.refractive_index,
        }
    }
}

/// The cube-textured program plus the logic to feed it.
#[derive(Debug)]
pub struct EnvironmentMappedMaterial {
    program: ProgramId,
}

impl EnvironmentMappedMaterial {
    pub fn new<C: GraphicsContext>(ctx: &mut C, assets: &AssetTable) -> Result<Self, SceneError> {
        let source = assets.shader(CUBE_TEXTURED)?;
        let program = ctx.create_program(&CUBE_TEXTURED_PROGRAM, source)?;
        Ok(Self { program })
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    /// Bind the program and upload camera, object and optics uniforms, with
    /// `cubemap` on unit 0 read through `sampler`.
    pub fn apply<C: GraphicsContext>(
        &self,
        ctx: &mut C,
        camera: &PerspectiveCamera,
        params: &MaterialParams,
        cubemap: CubeTextureId,
        sampler: SamplerId,
    ) -> Result<(), BindingError> {
        ctx.use_program(self.program);
        ctx.set_uniform("VP", UniformValue::Mat4(camera.view_projection()))?;
        ctx.set_uniform("cam_position", UniformValue::Vec3(camera.position))?;
        ctx.set_uniform("M", UniformValue::Mat4(params.model))?;
        ctx.set_uniform("M_it", UniformValue::Mat4(params.normal_matrix))?;
        ctx.set_uniform("tint", UniformValue::Vec4(params.tint))?;
        ctx.set_uniform("refraction", UniformValue::Int(params.refraction as i32))?;
        ctx.set_uniform(
            "refractive_index",
            UniformValue::Float(params.refractive_index),
        )?;
        ctx.bind_texture(0, TextureBinding::Cube(cubemap));
        ctx.set_uniform("cube_texture_sampler", UniformValue::Sampler(0))?;
        ctx.bind_sampler(0, Some(sampler));
        Ok(())
    }

    /// [`apply`](Self::apply) followed by a draw of `mesh`.
    pub fn draw<C: GraphicsContext>(
        &self,
        ctx: &mut C,
        mesh: MeshId,
        camera: &PerspectiveCamera,
        params: &MaterialParams,
        cubemap: CubeTextureId,
        sampler: SamplerId,
    ) -> Result<(), BindingError> {
        self.apply(ctx, camera, params, cubemap, sampler)?;
        ctx.draw(mesh)
    }

    pub fn release<C: GraphicsContext>(self, ctx: &mut C) {
        ctx.delete_program(self.program);
    }
}

/// Mirror `incident` about `normal`. Both in world space; `normal` unit length.
pub fn reflect(incident: Vec3, normal: Vec3) -> Vec3 {
    incident - 2.0 * normal.dot(incident) * normal
}

/// Snell refraction with `eta` = incident / transmitted index.
///
/// Returns zero on total internal reflection.
pub fn refract(incident: Vec3, normal: Vec3, eta: f32) -> Vec3 {
    let cos_i = normal.dot(incident);
    let k = 1.0 - eta * eta * (1.0 - cos_i * cos_i);
    if k < 0.0 {
        Vec3::ZERO
    } else {
        eta * incident - (eta * cos_i + k.sqrt()) * normal
    }
}

/// Cube lookup direction for a surface point, as evaluated per fragment.
pub fn lookup_direction(
    camera: Vec3,
    surface: Vec3,
    normal: Vec3,
    refraction: bool,
    refractive_index: f32,
) -> Vec3 {
    let view = (surface - camera).normalize();
    let normal = normal.normalize();
    if refraction {
        refract(view, normal, refractive_index)
    } else {
        reflect(view, normal)
    }
}
