use crate::context::{
    BindingError, ContextError, CubeTextureDesc, CubeTextureId, FaceAttachment, FramebufferId,
    FramebufferStatus, GraphicsContext, IncompleteReason, MeshId, ProgramDesc, ProgramId,
    RenderTarget, SamplerDesc, SamplerId, TextureBinding, TextureId, UniformValue, Viewport,
};
use crate::face::CubeFace;
use envprobe_assets::{ImageData, MeshData};
use std::collections::{BTreeMap, BTreeSet};

/// One call made against a [`RecordingContext`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateCubeTexture(CubeTextureId, CubeTextureDesc),
    CreateFramebuffer(FramebufferId, FaceAttachment, FaceAttachment),
    CreateSampler(SamplerId, SamplerDesc),
    CreateTexture(TextureId),
    CreateMesh(MeshId),
    CreateProgram(ProgramId, &'static str),
    BindFramebuffer(RenderTarget),
    SetViewport(Viewport),
    Clear { color: [f32; 4], depth: f32 },
    UseProgram(ProgramId),
    SetUniform { name: String, value: UniformValue },
    BindTexture { unit: u32, texture: TextureBinding },
    BindSampler { unit: u32, sampler: Option<SamplerId> },
    Draw {
        program: &'static str,
        mesh: MeshId,
        target: RenderTarget,
    },
    GenerateMipmaps(CubeTextureId),
    DeleteFramebuffer(FramebufferId),
    DeleteCubeTexture(CubeTextureId),
    DeleteSampler(SamplerId),
    DeleteTexture(TextureId),
    DeleteMesh(MeshId),
    DeleteProgram(ProgramId),
}

/// Headless context that records every call.
///
/// Validates uniform names and kinds against program declarations the same
/// way a GPU backend would, tracks released handles, and can be told to fail
/// allocations or report specific capture faces as incomplete.
#[derive(Debug, Default)]
pub struct RecordingContext {
    commands: Vec<Command>,
    next_id: u32,
    cube_textures: BTreeMap<u32, CubeTextureDesc>,
    framebuffers: BTreeMap<u32, (FaceAttachment, FaceAttachment)>,
    samplers: BTreeSet<u32>,
    textures: BTreeSet<u32>,
    meshes: BTreeSet<u32>,
    programs: BTreeMap<u32, ProgramDesc>,
    sampler_units: BTreeMap<u32, Vec<u32>>,
    current_program: Option<ProgramId>,
    target: Option<RenderTarget>,
    units: BTreeMap<u32, TextureBinding>,
    invalid_uses: usize,
    rejected_draws: usize,
    incomplete_faces: BTreeSet<CubeFace>,
    fail_allocations: bool,
    rejected_uniform: Option<String>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report framebuffers attached to `face` as incomplete.
    pub fn with_incomplete_face(mut self, face: CubeFace) -> Self {
        self.incomplete_faces.insert(face);
        self
    }

    /// Fail every cube-texture allocation with out-of-memory.
    pub fn with_failing_allocations(mut self) -> Self {
        self.fail_allocations = true;
        self
    }

    /// Refuse the next `set_uniform` of `name` as undeclared.
    pub fn reject_next_uniform(&mut self, name: &str) {
        self.rejected_uniform = Some(name.to_string());
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Calls that referenced a handle after it was released (or never existed).
    pub fn invalid_uses(&self) -> usize {
        self.invalid_uses
    }

    /// Draws refused because of a binding error.
    pub fn rejected_draws(&self) -> usize {
        self.rejected_draws
    }

    /// Number of resources currently alive, of every kind.
    pub fn live_resources(&self) -> usize {
        self.cube_textures.len()
            + self.framebuffers.len()
            + self.samplers.len()
            + self.textures.len()
            + self.meshes.len()
            + self.programs.len()
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn check_live(&mut self, live: bool) {
        if !live {
            self.invalid_uses += 1;
        }
    }

    fn current_desc(&self) -> Result<(ProgramId, ProgramDesc), BindingError> {
        let program = self.current_program.ok_or(BindingError::NoProgram)?;
        let desc = self
            .programs
            .get(&program.0)
            .copied()
            .ok_or(BindingError::UnknownHandle("program"))?;
        Ok((program, desc))
    }

    fn binding_live(&self, binding: TextureBinding) -> bool {
        match binding {
            TextureBinding::Texture2d(t) => self.textures.contains(&t.0),
            TextureBinding::Cube(t) => self.cube_textures.contains_key(&t.0),
        }
    }
}

impl GraphicsContext for RecordingContext {
    fn create_cube_texture(&mut self, desc: &CubeTextureDesc) -> Result<CubeTextureId, ContextError> {
        if self.fail_allocations {
            return Err(ContextError::OutOfMemory(desc.label.to_string()));
        }
        if desc.size == 0 || desc.mip_levels == 0 {
            return Err(ContextError::Invalid {
                what: "cube texture",
                reason: format!("size {} with {} mips", desc.size, desc.mip_levels),
            });
        }
        let id = CubeTextureId(self.next());
        self.cube_textures.insert(id.0, *desc);
        self.commands.push(Command::CreateCubeTexture(id, *desc));
        Ok(id)
    }

    fn create_face_framebuffer(
        &mut self,
        color: FaceAttachment,
        depth: FaceAttachment,
    ) -> Result<FramebufferId, ContextError> {
        let id = FramebufferId(self.next());
        self.framebuffers.insert(id.0, (color, depth));
        self.commands.push(Command::CreateFramebuffer(id, color, depth));
        Ok(id)
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        let Some((color, depth)) = self.framebuffers.get(&framebuffer.0) else {
            return FramebufferStatus::Incomplete(IncompleteReason::MissingAttachment);
        };
        let (Some(c), Some(d)) = (
            self.cube_textures.get(&color.texture.0),
            self.cube_textures.get(&depth.texture.0),
        ) else {
            return FramebufferStatus::Incomplete(IncompleteReason::MissingAttachment);
        };
        if c.format.is_depth() {
            return FramebufferStatus::Incomplete(IncompleteReason::UnsupportedFormat(c.format));
        }
        if !d.format.is_depth() {
            return FramebufferStatus::Incomplete(IncompleteReason::UnsupportedFormat(d.format));
        }
        if color.mip_level >= c.mip_levels {
            return FramebufferStatus::Incomplete(IncompleteReason::MipOutOfRange(color.mip_level));
        }
        if depth.mip_level >= d.mip_levels {
            return FramebufferStatus::Incomplete(IncompleteReason::MipOutOfRange(depth.mip_level));
        }
        let color_size = c.size >> color.mip_level;
        let depth_size = d.size >> depth.mip_level;
        if color_size != depth_size {
            return FramebufferStatus::Incomplete(IncompleteReason::SizeMismatch {
                color: color_size,
                depth: depth_size,
            });
        }
        if self.incomplete_faces.contains(&color.face) {
            return FramebufferStatus::Incomplete(IncompleteReason::Backend(format!(
                "{} marked incomplete",
                color.face
            )));
        }
        FramebufferStatus::Complete
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId, ContextError> {
        let id = SamplerId(self.next());
        self.samplers.insert(id.0);
        self.commands.push(Command::CreateSampler(id, *desc));
        Ok(id)
    }

    fn create_texture_2d(&mut self, _label: &str, image: &ImageData) -> Result<TextureId, ContextError> {
        if image.byte_len() != Some(image.rgba.len()) {
            return Err(ContextError::Invalid {
                what: "texture",
                reason: "pixel data does not match dimensions".into(),
            });
        }
        let id = TextureId(self.next());
        self.textures.insert(id.0);
        self.commands.push(Command::CreateTexture(id));
        Ok(id)
    }

    fn create_mesh(&mut self, label: &str, mesh: &MeshData) -> Result<MeshId, ContextError> {
        if mesh.indices.is_empty() {
            return Err(ContextError::Invalid {
                what: "mesh",
                reason: format!("{label} has no indices"),
            });
        }
        let id = MeshId(self.next());
        self.meshes.insert(id.0);
        self.commands.push(Command::CreateMesh(id));
        Ok(id)
    }

    fn create_program(&mut self, desc: &ProgramDesc, _source: &str) -> Result<ProgramId, ContextError> {
        let id = ProgramId(self.next());
        self.programs.insert(id.0, *desc);
        self.sampler_units.insert(id.0, vec![0; desc.samplers.len()]);
        self.commands.push(Command::CreateProgram(id, desc.name));
        Ok(id)
    }

    fn bind_framebuffer(&mut self, target: RenderTarget) {
        if let RenderTarget::Framebuffer(fb) = target {
            let live = self.framebuffers.contains_key(&fb.0);
            self.check_live(live);
        }
        self.target = Some(target);
        self.commands.push(Command::BindFramebuffer(target));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(Command::SetViewport(viewport));
    }

    fn clear(&mut self, color: [f32; 4], depth: f32) {
        self.commands.push(Command::Clear { color, depth });
    }

    fn use_program(&mut self, program: ProgramId) {
        let live = self.programs.contains_key(&program.0);
        self.check_live(live);
        self.current_program = Some(program);
        self.commands.push(Command::UseProgram(program));
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), BindingError> {
        let (program, desc) = self.current_desc()?;
        if self.rejected_uniform.as_deref() == Some(name) {
            self.rejected_uniform = None;
            return Err(BindingError::UnknownUniform {
                program: desc.name,
                name: name.to_string(),
            });
        }
        if let Some(index) = desc.uniform_index(name) {
            let expected = desc.uniforms[index].kind;
            if value.kind() != Some(expected) {
                return Err(BindingError::KindMismatch {
                    name: name.to_string(),
                    expected: Some(expected),
                    found: value.kind(),
                });
            }
        } else if let Some(slot) = desc.sampler_index(name) {
            let UniformValue::Sampler(unit) = value else {
                return Err(BindingError::KindMismatch {
                    name: name.to_string(),
                    expected: None,
                    found: value.kind(),
                });
            };
            if let Some(units) = self.sampler_units.get_mut(&program.0) {
                units[slot] = unit;
            }
        } else {
            return Err(BindingError::UnknownUniform {
                program: desc.name,
                name: name.to_string(),
            });
        }
        self.commands.push(Command::SetUniform {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureBinding) {
        let live = self.binding_live(texture);
        self.check_live(live);
        self.units.insert(unit, texture);
        self.commands.push(Command::BindTexture { unit, texture });
    }

    fn bind_sampler(&mut self, unit: u32, sampler: Option<SamplerId>) {
        if let Some(s) = sampler {
            let live = self.samplers.contains(&s.0);
            self.check_live(live);
        }
        self.commands.push(Command::BindSampler { unit, sampler });
    }

    fn draw(&mut self, mesh: MeshId) -> Result<(), BindingError> {
        let result = (|| {
            let (program, desc) = self.current_desc()?;
            if !self.meshes.contains(&mesh.0) {
                return Err(BindingError::UnknownHandle("mesh"));
            }
            let units = self.sampler_units.get(&program.0).cloned().unwrap_or_default();
            for (decl, unit) in desc.samplers.iter().zip(units) {
                let bound = self
                    .units
                    .get(&unit)
                    .copied()
                    .filter(|b| b.dimension() == decl.dimension && self.binding_live(*b));
                if bound.is_none() {
                    return Err(BindingError::MissingTexture {
                        name: decl.name,
                        dimension: decl.dimension,
                        unit,
                    });
                }
            }
            Ok(desc.name)
        })();

        match result {
            Ok(program) => {
                let target = self.target.unwrap_or(RenderTarget::Default);
                self.commands.push(Command::Draw {
                    program,
                    mesh,
                    target,
                });
                Ok(())
            }
            Err(err) => {
                self.rejected_draws += 1;
                Err(err)
            }
        }
    }

    fn generate_mipmaps(&mut self, texture: CubeTextureId) {
        let live = self.cube_textures.contains_key(&texture.0);
        self.check_live(live);
        self.commands.push(Command::GenerateMipmaps(texture));
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        let live = self.framebuffers.remove(&framebuffer.0).is_some();
        self.check_live(live);
        self.commands.push(Command::DeleteFramebuffer(framebuffer));
    }

    fn delete_cube_texture(&mut self, texture: CubeTextureId) {
        let live = self.cube_textures.remove(&texture.0).is_some();
        self.check_live(live);
        self.commands.push(Command::DeleteCubeTexture(texture));
    }

    fn delete_sampler(&mut self, sampler: SamplerId) {
        let live = self.samplers.remove(&sampler.0);
        self.check_live(live);
        self.commands.push(Command::DeleteSampler(sampler));
    }

    fn delete_texture(&mut self, texture: TextureId) {
        let live = self.textures.remove(&texture.0);
        self.check_live(live);
        self.commands.push(Command::DeleteTexture(texture));
    }

    fn delete_mesh(&mut self, mesh: MeshId) {
        let live = self.meshes.remove(&mesh.0);
        self.check_live(live);
        self.commands.push(Command::DeleteMesh(mesh));
    }

    fn delete_program(&mut self, program: ProgramId) {
        let live = self.programs.remove(&program.0).is_some();
        self.sampler_units.remove(&program.0);
        self.check_live(live);
        self.commands.push(Command::DeleteProgram(program));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{FaceAttachment, TextureFormat};
    use crate::programs::TEXTURED_PROGRAM;
    use glam::{Mat4, Vec4};

    fn cube(ctx: &mut RecordingContext, size: u32, format: TextureFormat) -> CubeTextureId {
        ctx.create_cube_texture(&CubeTextureDesc {
            label: "test",
            size,
            mip_levels: 1,
            format,
        })
        .unwrap()
    }

    fn attach(texture: CubeTextureId) -> FaceAttachment {
        FaceAttachment {
            texture,
            face: CubeFace::PosX,
            mip_level: 0,
        }
    }

    #[test]
    fn matching_attachments_are_complete() {
        let mut ctx = RecordingContext::new();
        let color = cube(&mut ctx, 64, TextureFormat::Rgba8Unorm);
        let depth = cube(&mut ctx, 64, TextureFormat::Depth16Unorm);
        let fb = ctx.create_face_framebuffer(attach(color), attach(depth)).unwrap();
        assert_eq!(ctx.framebuffer_status(fb), FramebufferStatus::Complete);
    }

    #[test]
    fn size_mismatch_is_incomplete() {
        let mut ctx = RecordingContext::new();
        let color = cube(&mut ctx, 64, TextureFormat::Rgba8Unorm);
        let depth = cube(&mut ctx, 32, TextureFormat::Depth16Unorm);
        let fb = ctx.create_face_framebuffer(attach(color), attach(depth)).unwrap();
        assert!(matches!(
            ctx.framebuffer_status(fb),
            FramebufferStatus::Incomplete(IncompleteReason::SizeMismatch { .. })
        ));
    }

    #[test]
    fn depth_in_color_slot_is_incomplete() {
        let mut ctx = RecordingContext::new();
        let depth = cube(&mut ctx, 64, TextureFormat::Depth16Unorm);
        let fb = ctx.create_face_framebuffer(attach(depth), attach(depth)).unwrap();
        assert_eq!(
            ctx.framebuffer_status(fb),
            FramebufferStatus::Incomplete(IncompleteReason::UnsupportedFormat(
                TextureFormat::Depth16Unorm
            ))
        );
    }

    #[test]
    fn unknown_uniform_is_rejected() {
        let mut ctx = RecordingContext::new();
        let program = ctx.create_program(&TEXTURED_PROGRAM, "").unwrap();
        ctx.use_program(program);
        let err = ctx
            .set_uniform("model", UniformValue::Mat4(Mat4::IDENTITY))
            .unwrap_err();
        assert!(matches!(err, BindingError::UnknownUniform { .. }));
    }

    #[test]
    fn mismatched_kind_is_rejected() {
        let mut ctx = RecordingContext::new();
        let program = ctx.create_program(&TEXTURED_PROGRAM, "").unwrap();
        ctx.use_program(program);
        let err = ctx.set_uniform("tint", UniformValue::Float(1.0)).unwrap_err();
        assert!(matches!(err, BindingError::KindMismatch { .. }));
        assert!(ctx.set_uniform("tint", UniformValue::Vec4(Vec4::ONE)).is_ok());
    }

    #[test]
    fn draw_without_texture_is_rejected() {
        let mut ctx = RecordingContext::new();
        let program = ctx.create_program(&TEXTURED_PROGRAM, "").unwrap();
        let mesh = ctx.create_mesh("cube", &MeshData::cube()).unwrap();
        ctx.use_program(program);
        assert!(matches!(
            ctx.draw(mesh),
            Err(BindingError::MissingTexture { unit: 0, .. })
        ));
        assert_eq!(ctx.rejected_draws(), 1);

        let texture = ctx
            .create_texture_2d("white", &ImageData::solid(1, 1, [255; 4]).unwrap())
            .unwrap();
        ctx.bind_texture(0, TextureBinding::Texture2d(texture));
        assert!(ctx.draw(mesh).is_ok());
    }

    #[test]
    fn use_after_delete_is_counted() {
        let mut ctx = RecordingContext::new();
        let sampler = ctx.create_sampler(&SamplerDesc::trilinear_repeat()).unwrap();
        ctx.delete_sampler(sampler);
        assert_eq!(ctx.invalid_uses(), 0);
        ctx.bind_sampler(0, Some(sampler));
        ctx.delete_sampler(sampler);
        assert_eq!(ctx.invalid_uses(), 2);
        assert_eq!(ctx.live_resources(), 0);
    }

    #[test]
    fn failing_allocations() {
        let mut ctx = RecordingContext::new().with_failing_allocations();
        let err = ctx
            .create_cube_texture(&CubeTextureDesc {
                label: "environment",
                size: 8,
                mip_levels: 4,
                format: TextureFormat::Rgba8Unorm,
            })
            .unwrap_err();
        assert_eq!(err, ContextError::OutOfMemory("environment".into()));
    }

    #[test]
    fn rejected_uniform_fails_once() {
        let mut ctx = RecordingContext::new();
        let program = ctx.create_program(&TEXTURED_PROGRAM, "").unwrap();
        ctx.use_program(program);
        ctx.reject_next_uniform("tint");

        let tint = UniformValue::Vec4(Vec4::ONE);
        assert!(matches!(
            ctx.set_uniform("tint", tint),
            Err(BindingError::UnknownUniform { .. })
        ));
        assert!(ctx.set_uniform("tint", tint).is_ok());
    }

    #[test]
    fn texture_size_mismatch_is_an_error() {
        let mut ctx = RecordingContext::new();
        let huge = ImageData {
            width: u32::MAX,
            height: u32::MAX,
            rgba: vec![0; 4],
        };
        assert!(matches!(
            ctx.create_texture_2d("huge", &huge),
            Err(ContextError::Invalid { what: "texture", .. })
        ));
        assert_eq!(ctx.live_resources(), 0);
    }
}
