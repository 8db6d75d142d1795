use crate::mipmap::MipBlitter;
use bytemuck::{Pod, Zeroable};
use envprobe_assets::{ImageData, MeshData};
use envprobe_render::{
    BindingError, ContextError, CubeFace, CubeTextureDesc, CubeTextureId, FaceAttachment,
    FilterMode, FramebufferId, FramebufferStatus, GraphicsContext, IncompleteReason, MeshId,
    ProgramDesc, ProgramId, RenderTarget, SamplerDesc, SamplerDimension, SamplerId,
    TextureBinding, TextureFormat, TextureId, UniformLayout, UniformValue, Viewport, WrapMode,
    mip_level_count,
};
use std::collections::HashMap;
use wgpu::util::DeviceExt;

const MAIN_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const INITIAL_UNIFORM_ARENA: u64 = 64 * 1024;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct GpuVertex {
    position: [f32; 3],
    tex_coord: [f32; 2],
    normal: [f32; 3],
}

struct CubeTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: CubeTextureDesc,
}

struct FaceTarget {
    /// Color and depth views; absent when the target is incomplete.
    views: Option<(wgpu::TextureView, wgpu::TextureView)>,
    size: u32,
    status: FramebufferStatus,
}

struct Texture2d {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

struct Program {
    desc: ProgramDesc,
    layout: UniformLayout,
    module: wgpu::ShaderModule,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    /// Current uniform values, laid out as the shader's uniform block.
    block: Vec<u8>,
    /// Texture unit read by each sampler slot.
    slot_units: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    color: wgpu::TextureFormat,
    depth: wgpu::TextureFormat,
    face_target: bool,
}

struct DrawCall {
    pipeline: PipelineKey,
    mesh: MeshId,
    uniform_offset: u32,
    textures: wgpu::BindGroup,
    viewport: Viewport,
}

struct RecordedPass {
    target: RenderTarget,
    clear: Option<([f32; 4], f32)>,
    draws: Vec<DrawCall>,
}

enum FrameOp {
    Pass(RecordedPass),
    Mipmaps(CubeTextureId),
}

/// [`GraphicsContext`] on a wgpu device.
///
/// Calls are recorded into passes and encoded by [`WgpuContext::submit`] in
/// a single command buffer, in call order. Uniform values are snapshotted
/// into a per-frame arena at every draw.
pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    surface_size: (u32, u32),
    main_depth: wgpu::TextureView,
    blitter: MipBlitter,
    cube_sampler: wgpu::Sampler,
    next_id: u32,

    cube_textures: HashMap<u32, CubeTexture>,
    framebuffers: HashMap<u32, FaceTarget>,
    samplers: HashMap<u32, wgpu::Sampler>,
    textures: HashMap<u32, Texture2d>,
    meshes: HashMap<u32, GpuMesh>,
    programs: HashMap<u32, Program>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    current_program: Option<ProgramId>,
    target: RenderTarget,
    viewport: Viewport,
    units: HashMap<u32, TextureBinding>,
    unit_samplers: HashMap<u32, SamplerId>,
    last_clear: [f32; 4],

    ops: Vec<FrameOp>,
    open_pass: Option<RecordedPass>,
    uniform_staging: Vec<u8>,
    uniform_buffer: wgpu::Buffer,
    uniform_alignment: usize,
}

impl WgpuContext {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let main_depth = create_main_depth(&device, width, height);
        let blitter = MipBlitter::new(&device, wgpu::TextureFormat::Rgba8Unorm);
        let cube_sampler = device.create_sampler(&sampler_descriptor(&SamplerDesc::trilinear_repeat()));
        let uniform_buffer = create_uniform_arena(&device, INITIAL_UNIFORM_ARENA);
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as usize;

        Self {
            device,
            queue,
            surface_format,
            surface_size: (width.max(1), height.max(1)),
            main_depth,
            blitter,
            cube_sampler,
            next_id: 0,
            cube_textures: HashMap::new(),
            framebuffers: HashMap::new(),
            samplers: HashMap::new(),
            textures: HashMap::new(),
            meshes: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            current_program: None,
            target: RenderTarget::Default,
            viewport: Viewport::new(width, height),
            units: HashMap::new(),
            unit_samplers: HashMap::new(),
            last_clear: [0.0, 0.0, 0.0, 1.0],
            ops: Vec::new(),
            open_pass: None,
            uniform_staging: Vec::new(),
            uniform_buffer,
            uniform_alignment: uniform_alignment.max(16),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    /// The six-layer texture behind a cube handle, for readback.
    pub fn cube_texture(&self, texture: CubeTextureId) -> Option<&wgpu::Texture> {
        self.cube_textures.get(&texture.0).map(|cube| &cube.texture)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface_size = (width.max(1), height.max(1));
        self.main_depth = create_main_depth(&self.device, width, height);
    }

    /// Encode everything recorded since the last submit, resolving
    /// [`RenderTarget::Default`] to `surface`, and submit it.
    ///
    /// The surface is cleared even if no pass drew into it.
    pub fn submit(&mut self, surface: &wgpu::TextureView) {
        self.flush_pass();
        let ops = std::mem::take(&mut self.ops);
        let mut staging = std::mem::take(&mut self.uniform_staging);

        if staging.len() as u64 > self.uniform_buffer.size() {
            let size = (staging.len() as u64).next_power_of_two();
            tracing::debug!(size, "growing uniform arena");
            self.uniform_buffer = create_uniform_arena(&self.device, size);
        }
        if !staging.is_empty() {
            self.queue.write_buffer(&self.uniform_buffer, 0, &staging);
        }

        let mut uniform_groups: HashMap<ProgramId, wgpu::BindGroup> = HashMap::new();
        for op in &ops {
            let FrameOp::Pass(pass) = op else { continue };
            for draw in &pass.draws {
                let program = draw.pipeline.program;
                if uniform_groups.contains_key(&program) {
                    continue;
                }
                if let Some(p) = self.programs.get(&program.0) {
                    uniform_groups.insert(program, self.uniform_group(p));
                }
            }
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });

        let mut surface_drawn = false;
        for op in &ops {
            match op {
                FrameOp::Pass(pass) => {
                    surface_drawn |= pass.target == RenderTarget::Default;
                    self.encode_pass(&mut encoder, pass, surface, &uniform_groups);
                }
                FrameOp::Mipmaps(id) => match self.cube_textures.get(&id.0) {
                    Some(cube) => self.blitter.encode(
                        &self.device,
                        &mut encoder,
                        &cube.texture,
                        cube.desc.mip_levels,
                        6,
                    ),
                    None => tracing::warn!(cube = id.0, "mip rebuild of released cube skipped"),
                },
            }
        }

        if !surface_drawn {
            let clear = RecordedPass {
                target: RenderTarget::Default,
                clear: Some((self.last_clear, 1.0)),
                draws: Vec::new(),
            };
            self.encode_pass(&mut encoder, &clear, surface, &uniform_groups);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        staging.clear();
        self.uniform_staging = staging;
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn flush_pass(&mut self) {
        if let Some(pass) = self.open_pass.take() {
            self.ops.push(FrameOp::Pass(pass));
        }
    }

    fn uniform_group(&self, program: &Program) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.desc.name),
            layout: &program.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &self.uniform_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(program.layout.size as u64),
                }),
            }],
        })
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &RecordedPass,
        surface: &wgpu::TextureView,
        uniform_groups: &HashMap<ProgramId, wgpu::BindGroup>,
    ) {
        let (color, depth, size) = match pass.target {
            RenderTarget::Default => (surface, &self.main_depth, self.surface_size),
            RenderTarget::Framebuffer(id) => {
                let Some(target) = self.framebuffers.get(&id.0) else {
                    tracing::warn!(framebuffer = id.0, "pass on released framebuffer skipped");
                    return;
                };
                let Some((color, depth)) = &target.views else {
                    return;
                };
                (color, depth, (target.size, target.size))
            }
        };

        let (color_load, depth_load) = match pass.clear {
            Some((c, d)) => (
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: c[0] as f64,
                    g: c[1] as f64,
                    b: c[2] as f64,
                    a: c[3] as f64,
                }),
                wgpu::LoadOp::Clear(d),
            ),
            None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
        };

        let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("scene_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });

        for draw in &pass.draws {
            let (Some(pipeline), Some(mesh), Some(uniforms)) = (
                self.pipelines.get(&draw.pipeline),
                self.meshes.get(&draw.mesh.0),
                uniform_groups.get(&draw.pipeline.program),
            ) else {
                continue;
            };
            let Some(viewport) = clamp_viewport(draw.viewport, size) else {
                continue;
            };
            rp.set_viewport(
                viewport.x as f32,
                viewport.y as f32,
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                1.0,
            );
            rp.set_pipeline(pipeline);
            rp.set_bind_group(0, uniforms, &[draw.uniform_offset]);
            rp.set_bind_group(1, &draw.textures, &[]);
            rp.set_vertex_buffer(0, mesh.vertices.slice(..));
            rp.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
            rp.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }

    /// Target formats of the currently bound target, or `None` if it cannot
    /// be drawn into.
    fn target_key(&self) -> Option<(wgpu::TextureFormat, wgpu::TextureFormat, bool)> {
        match self.target {
            RenderTarget::Default => Some((self.surface_format, MAIN_DEPTH_FORMAT, false)),
            RenderTarget::Framebuffer(id) => {
                let target = self.framebuffers.get(&id.0)?;
                target.views.as_ref()?;
                Some((
                    map_format(TextureFormat::Rgba8Unorm),
                    map_format(TextureFormat::Depth16Unorm),
                    true,
                ))
            }
        }
    }

    fn face_status(
        &self,
        color: FaceAttachment,
        depth: FaceAttachment,
    ) -> Result<(&CubeTexture, &CubeTexture), IncompleteReason> {
        let (Some(c), Some(d)) = (
            self.cube_textures.get(&color.texture.0),
            self.cube_textures.get(&depth.texture.0),
        ) else {
            return Err(IncompleteReason::MissingAttachment);
        };
        if c.desc.format.is_depth() {
            return Err(IncompleteReason::UnsupportedFormat(c.desc.format));
        }
        if !d.desc.format.is_depth() {
            return Err(IncompleteReason::UnsupportedFormat(d.desc.format));
        }
        if color.mip_level >= c.desc.mip_levels {
            return Err(IncompleteReason::MipOutOfRange(color.mip_level));
        }
        if depth.mip_level >= d.desc.mip_levels {
            return Err(IncompleteReason::MipOutOfRange(depth.mip_level));
        }
        let color_size = c.desc.size >> color.mip_level;
        let depth_size = d.desc.size >> depth.mip_level;
        if color_size != depth_size {
            return Err(IncompleteReason::SizeMismatch {
                color: color_size,
                depth: depth_size,
            });
        }
        for texture in [&c.texture, &d.texture] {
            if !texture.usage().contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
                return Err(IncompleteReason::Backend(
                    "attachment lacks RENDER_ATTACHMENT usage".into(),
                ));
            }
        }
        Ok((c, d))
    }

    fn texture_bind_group(&self, program: &Program) -> Result<wgpu::BindGroup, BindingError> {
        let mut resources: Vec<(&wgpu::TextureView, &wgpu::Sampler)> = Vec::new();
        for (decl, unit) in program.desc.samplers.iter().zip(&program.slot_units) {
            let missing = || BindingError::MissingTexture {
                name: decl.name,
                dimension: decl.dimension,
                unit: *unit,
            };
            let binding = self
                .units
                .get(unit)
                .copied()
                .filter(|b| b.dimension() == decl.dimension)
                .ok_or_else(missing)?;
            let (view, own_sampler) = match binding {
                TextureBinding::Texture2d(id) => {
                    let texture = self.textures.get(&id.0).ok_or_else(missing)?;
                    (&texture.view, &texture.sampler)
                }
                TextureBinding::Cube(id) => {
                    let cube = self
                        .cube_textures
                        .get(&id.0)
                        .filter(|c| !c.desc.format.is_depth())
                        .ok_or_else(missing)?;
                    (&cube.view, &self.cube_sampler)
                }
            };
            let sampler = self
                .unit_samplers
                .get(unit)
                .and_then(|s| self.samplers.get(&s.0))
                .unwrap_or(own_sampler);
            resources.push((view, sampler));
        }

        let entries: Vec<wgpu::BindGroupEntry> = resources
            .iter()
            .enumerate()
            .flat_map(|(slot, (view, sampler))| {
                let base = 2 * slot as u32;
                [
                    wgpu::BindGroupEntry {
                        binding: base,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: base + 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ]
            })
            .collect();

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.desc.name),
            layout: &program.texture_layout,
            entries: &entries,
        }))
    }
}

impl GraphicsContext for WgpuContext {
    fn create_cube_texture(&mut self, desc: &CubeTextureDesc) -> Result<CubeTextureId, ContextError> {
        let usage = if desc.format.is_depth() {
            wgpu::TextureUsages::RENDER_ATTACHMENT
        } else {
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
        };
        let (texture, error) = scoped(&self.device, |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(desc.label),
                size: wgpu::Extent3d {
                    width: desc.size,
                    height: desc.size,
                    depth_or_array_layers: 6,
                },
                mip_level_count: desc.mip_levels,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: map_format(desc.format),
                usage,
                view_formats: &[],
            })
        });
        if let Some(err) = error {
            return Err(context_error("cube texture", desc.label, err));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(desc.label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            array_layer_count: Some(6),
            ..Default::default()
        });
        let id = self.next();
        tracing::debug!(label = desc.label, size = desc.size, mips = desc.mip_levels, "cube texture");
        self.cube_textures.insert(
            id,
            CubeTexture {
                texture,
                view,
                desc: *desc,
            },
        );
        Ok(CubeTextureId(id))
    }

    fn create_face_framebuffer(
        &mut self,
        color: FaceAttachment,
        depth: FaceAttachment,
    ) -> Result<FramebufferId, ContextError> {
        let target = match self.face_status(color, depth) {
            Err(reason) => FaceTarget {
                views: None,
                size: 0,
                status: FramebufferStatus::Incomplete(reason),
            },
            Ok((c, d)) => {
                let ((color_view, depth_view), error) = scoped(&self.device, |_| {
                    (
                        face_view(&c.texture, color.face, color.mip_level),
                        face_view(&d.texture, depth.face, depth.mip_level),
                    )
                });
                match error {
                    Some(err) => FaceTarget {
                        views: None,
                        size: 0,
                        status: FramebufferStatus::Incomplete(IncompleteReason::Backend(
                            err.to_string(),
                        )),
                    },
                    None => FaceTarget {
                        views: Some((color_view, depth_view)),
                        size: c.desc.size >> color.mip_level,
                        status: FramebufferStatus::Complete,
                    },
                }
            }
        };
        let id = self.next();
        self.framebuffers.insert(id, target);
        Ok(FramebufferId(id))
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        self.framebuffers
            .get(&framebuffer.0)
            .map(|f| f.status.clone())
            .unwrap_or(FramebufferStatus::Incomplete(
                IncompleteReason::MissingAttachment,
            ))
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId, ContextError> {
        let sampler = self.device.create_sampler(&sampler_descriptor(desc));
        let id = self.next();
        self.samplers.insert(id, sampler);
        Ok(SamplerId(id))
    }

    fn create_texture_2d(&mut self, label: &str, image: &ImageData) -> Result<TextureId, ContextError> {
        if image.width == 0
            || image.height == 0
            || image.byte_len() != Some(image.rgba.len())
        {
            return Err(ContextError::Invalid {
                what: "texture",
                reason: format!("{label}: pixel data does not match dimensions"),
            });
        }
        let mip_levels = mip_level_count(image.width.max(image.height));
        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };
        let (texture, error) = scoped(&self.device, |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: mip_levels,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
        });
        if let Some(err) = error {
            return Err(context_error("texture", label, err));
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width),
                rows_per_image: Some(image.height),
            },
            size,
        );
        if mip_levels > 1 {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("texture_mip_encoder"),
                });
            self.blitter
                .encode(&self.device, &mut encoder, &texture, mip_levels, 1);
            self.queue.submit(std::iter::once(encoder.finish()));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = self
            .device
            .create_sampler(&sampler_descriptor(&SamplerDesc::trilinear_repeat()));
        let id = self.next();
        self.textures.insert(
            id,
            Texture2d {
                _texture: texture,
                view,
                sampler,
            },
        );
        Ok(TextureId(id))
    }

    fn create_mesh(&mut self, label: &str, mesh: &MeshData) -> Result<MeshId, ContextError> {
        if mesh.indices.is_empty() {
            return Err(ContextError::Invalid {
                what: "mesh",
                reason: format!("{label} has no indices"),
            });
        }
        let vertices: Vec<GpuVertex> = mesh
            .vertices
            .iter()
            .map(|v| GpuVertex {
                position: v.position,
                tex_coord: v.tex_coord,
                normal: v.normal,
            })
            .collect();
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let id = self.next();
        self.meshes.insert(
            id,
            GpuMesh {
                vertices: vertex_buffer,
                indices: index_buffer,
                index_count: mesh.indices.len() as u32,
            },
        );
        Ok(MeshId(id))
    }

    fn create_program(&mut self, desc: &ProgramDesc, source: &str) -> Result<ProgramId, ContextError> {
        let (module, error) = scoped(&self.device, |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.name),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });
        if let Some(err) = error {
            return Err(ContextError::Program {
                program: desc.name.to_string(),
                message: err.to_string(),
            });
        }

        let layout = desc.layout();
        let uniform_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(desc.name),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(layout.size as u64),
                    },
                    count: None,
                }],
            });

        let texture_entries: Vec<wgpu::BindGroupLayoutEntry> = desc
            .samplers
            .iter()
            .enumerate()
            .flat_map(|(slot, decl)| {
                let base = 2 * slot as u32;
                let view_dimension = match decl.dimension {
                    SamplerDimension::D2 => wgpu::TextureViewDimension::D2,
                    SamplerDimension::Cube => wgpu::TextureViewDimension::Cube,
                };
                [
                    wgpu::BindGroupLayoutEntry {
                        binding: base,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: base + 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ]
            })
            .collect();
        let texture_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(desc.name),
                entries: &texture_entries,
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.name),
                bind_group_layouts: &[&uniform_layout, &texture_layout],
                push_constant_ranges: &[],
            });

        let id = self.next();
        tracing::debug!(program = desc.name, block = layout.size, "program built");
        self.programs.insert(
            id,
            Program {
                desc: *desc,
                block: vec![0; layout.size],
                slot_units: vec![0; desc.samplers.len()],
                layout,
                module,
                uniform_layout,
                texture_layout,
                pipeline_layout,
            },
        );
        Ok(ProgramId(id))
    }

    fn bind_framebuffer(&mut self, target: RenderTarget) {
        self.flush_pass();
        self.target = target;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn clear(&mut self, color: [f32; 4], depth: f32) {
        if self.target == RenderTarget::Default {
            self.last_clear = color;
        }
        match &mut self.open_pass {
            Some(pass) if pass.target == self.target && pass.draws.is_empty() => {
                pass.clear = Some((color, depth));
            }
            _ => {
                self.flush_pass();
                self.open_pass = Some(RecordedPass {
                    target: self.target,
                    clear: Some((color, depth)),
                    draws: Vec::new(),
                });
            }
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        if !self.programs.contains_key(&program.0) {
            tracing::warn!(program = program.0, "use of unknown program");
        }
        self.current_program = Some(program);
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), BindingError> {
        let id = self.current_program.ok_or(BindingError::NoProgram)?;
        let program = self
            .programs
            .get_mut(&id.0)
            .ok_or(BindingError::UnknownHandle("program"))?;

        if let Some(index) = program.desc.uniform_index(name) {
            let expected = program.desc.uniforms[index].kind;
            if value.kind() != Some(expected) {
                return Err(BindingError::KindMismatch {
                    name: name.to_string(),
                    expected: Some(expected),
                    found: value.kind(),
                });
            }
            let offset = program.layout.offsets[index];
            let (_, size) = expected.layout();
            value.write_to(&mut program.block[offset..offset + size]);
            Ok(())
        } else if let Some(slot) = program.desc.sampler_index(name) {
            let UniformValue::Sampler(unit) = value else {
                return Err(BindingError::KindMismatch {
                    name: name.to_string(),
                    expected: None,
                    found: value.kind(),
                });
            };
            program.slot_units[slot] = unit;
            Ok(())
        } else {
            Err(BindingError::UnknownUniform {
                program: program.desc.name,
                name: name.to_string(),
            })
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureBinding) {
        self.units.insert(unit, texture);
    }

    fn bind_sampler(&mut self, unit: u32, sampler: Option<SamplerId>) {
        match sampler {
            Some(sampler) => {
                self.unit_samplers.insert(unit, sampler);
            }
            None => {
                self.unit_samplers.remove(&unit);
            }
        }
    }

    fn draw(&mut self, mesh: MeshId) -> Result<(), BindingError> {
        let id = self.current_program.ok_or(BindingError::NoProgram)?;
        if !self.meshes.contains_key(&mesh.0) {
            return Err(BindingError::UnknownHandle("mesh"));
        }
        let (color, depth, face_target) = self
            .target_key()
            .ok_or(BindingError::UnknownHandle("framebuffer"))?;
        let key = PipelineKey {
            program: id,
            color,
            depth,
            face_target,
        };

        let program = self
            .programs
            .get(&id.0)
            .ok_or(BindingError::UnknownHandle("program"))?;
        let textures = self.texture_bind_group(program)?;
        if !self.pipelines.contains_key(&key) {
            let pipeline = build_pipeline(&self.device, program, key);
            self.pipelines.insert(key, pipeline);
        }

        let offset = self
            .uniform_staging
            .len()
            .next_multiple_of(self.uniform_alignment);
        self.uniform_staging.resize(offset, 0);
        self.uniform_staging.extend_from_slice(&program.block);

        let call = DrawCall {
            pipeline: key,
            mesh,
            uniform_offset: offset as u32,
            textures,
            viewport: self.viewport,
        };
        match &mut self.open_pass {
            Some(pass) if pass.target == self.target => pass.draws.push(call),
            _ => {
                self.flush_pass();
                self.open_pass = Some(RecordedPass {
                    target: self.target,
                    clear: None,
                    draws: vec![call],
                });
            }
        }
        Ok(())
    }

    fn generate_mipmaps(&mut self, texture: CubeTextureId) {
        self.flush_pass();
        self.ops.push(FrameOp::Mipmaps(texture));
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffers.remove(&framebuffer.0).is_none() {
            tracing::warn!(framebuffer = framebuffer.0, "framebuffer released twice");
        }
    }

    fn delete_cube_texture(&mut self, texture: CubeTextureId) {
        if self.cube_textures.remove(&texture.0).is_none() {
            tracing::warn!(cube = texture.0, "cube texture released twice");
        }
    }

    fn delete_sampler(&mut self, sampler: SamplerId) {
        if self.samplers.remove(&sampler.0).is_none() {
            tracing::warn!(sampler = sampler.0, "sampler released twice");
        }
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture.0).is_none() {
            tracing::warn!(texture = texture.0, "texture released twice");
        }
    }

    fn delete_mesh(&mut self, mesh: MeshId) {
        if self.meshes.remove(&mesh.0).is_none() {
            tracing::warn!(mesh = mesh.0, "mesh released twice");
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program.0).is_none() {
            tracing::warn!(program = program.0, "program released twice");
        }
        self.pipelines.retain(|key, _| key.program != program);
    }
}

/// Run `f` inside validation and out-of-memory error scopes.
fn scoped<T>(device: &wgpu::Device, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f(device);
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    (value, out_of_memory.or(validation))
}

fn context_error(what: &'static str, label: &str, err: wgpu::Error) -> ContextError {
    match err {
        wgpu::Error::OutOfMemory { .. } => ContextError::OutOfMemory(label.to_string()),
        other => ContextError::Invalid {
            what,
            reason: other.to_string(),
        },
    }
}

fn face_view(texture: &wgpu::Texture, face: CubeFace, mip_level: u32) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(face.label()),
        dimension: Some(wgpu::TextureViewDimension::D2),
        base_mip_level: mip_level,
        mip_level_count: Some(1),
        base_array_layer: face.layer(),
        array_layer_count: Some(1),
        ..Default::default()
    })
}

fn create_main_depth(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("main_depth"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: MAIN_DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}

fn create_uniform_arena(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("uniform_arena"),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn build_pipeline(device: &wgpu::Device, program: &Program, key: PipelineKey) -> wgpu::RenderPipeline {
    let constants = HashMap::from([(
        "CLIP_Y_SIGN".to_string(),
        if key.face_target { -1.0 } else { 1.0 },
    )]);
    let options = || wgpu::PipelineCompilationOptions {
        constants: &constants,
        zero_initialize_workgroup_memory: true,
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(program.desc.name),
        layout: Some(&program.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &program.module,
            entry_point: Some("vs_main"),
            compilation_options: options(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<GpuVertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![
                    0 => Float32x3,
                    1 => Float32x2,
                    2 => Float32x3,
                ],
            }],
        },
        fragment: Some(wgpu::FragmentState {
            module: &program.module,
            entry_point: Some("fs_main"),
            compilation_options: options(),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.color,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            // The y flip on face targets mirrors winding.
            front_face: if key.face_target {
                wgpu::FrontFace::Cw
            } else {
                wgpu::FrontFace::Ccw
            },
            cull_mode: Some(wgpu::Face::Back),
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: key.depth,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: Default::default(),
            bias: depth_bias(&program.desc),
        }),
        multisample: Default::default(),
        multiview: None,
        cache: None,
    })
}

/// Programs sampling a cube redraw geometry already in the depth buffer
/// through a different matrix chain; pull them toward the camera so they
/// win the `LessEqual` test.
fn depth_bias(desc: &ProgramDesc) -> wgpu::DepthBiasState {
    if desc
        .samplers
        .iter()
        .any(|s| s.dimension == SamplerDimension::Cube)
    {
        wgpu::DepthBiasState {
            constant: -8,
            slope_scale: -1.0,
            clamp: 0.0,
        }
    } else {
        wgpu::DepthBiasState::default()
    }
}

fn map_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Depth16Unorm => wgpu::TextureFormat::Depth16Unorm,
    }
}

fn map_filter(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn sampler_descriptor(desc: &SamplerDesc) -> wgpu::SamplerDescriptor<'static> {
    let address_mode = match desc.wrap {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    };
    wgpu::SamplerDescriptor {
        label: Some("sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: map_filter(desc.mag_filter),
        min_filter: map_filter(desc.min_filter),
        mipmap_filter: desc
            .mipmap_filter
            .map(map_filter)
            .unwrap_or(wgpu::FilterMode::Nearest),
        lod_max_clamp: if desc.mipmap_filter.is_some() { 32.0 } else { 0.0 },
        ..Default::default()
    }
}

/// Intersect `viewport` with a target of `size`; `None` if nothing is left.
fn clamp_viewport(viewport: Viewport, size: (u32, u32)) -> Option<Viewport> {
    let x = viewport.x.min(size.0);
    let y = viewport.y.min(size.1);
    let width = viewport.width.min(size.0 - x);
    let height = viewport.height.min(size.1 - y);
    (width > 0 && height > 0).then_some(Viewport {
        x,
        y,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<GpuVertex>(), 32);
    }

    #[test]
    fn viewport_is_clamped_to_target() {
        let clamped = clamp_viewport(Viewport::new(1280, 720), (256, 256)).unwrap();
        assert_eq!(clamped, Viewport::new(256, 256));
        assert_eq!(
            clamp_viewport(
                Viewport {
                    x: 300,
                    y: 0,
                    width: 10,
                    height: 10
                },
                (256, 256)
            ),
            None
        );
    }

    #[test]
    fn sampler_mapping() {
        let desc = sampler_descriptor(&SamplerDesc::trilinear_repeat());
        assert_eq!(desc.address_mode_u, wgpu::AddressMode::Repeat);
        assert_eq!(desc.min_filter, wgpu::FilterMode::Linear);
        assert_eq!(desc.mipmap_filter, wgpu::FilterMode::Linear);

        let no_mips = sampler_descriptor(&SamplerDesc {
            mipmap_filter: None,
            ..SamplerDesc::trilinear_repeat()
        });
        assert_eq!(no_mips.lod_max_clamp, 0.0);
    }

    #[test]
    fn formats_map_to_wgpu() {
        assert_eq!(
            map_format(TextureFormat::Rgba8Unorm),
            wgpu::TextureFormat::Rgba8Unorm
        );
        assert!(map_format(TextureFormat::Depth16Unorm).is_depth_stencil_format());
    }

    #[test]
    fn environment_overlay_is_biased_toward_the_camera() {
        let cube = depth_bias(&envprobe_render::CUBE_TEXTURED_PROGRAM);
        assert!(cube.is_enabled());
        assert!(cube.constant < 0);
        assert!(cube.slope_scale < 0.0);

        let textured = depth_bias(&envprobe_render::TEXTURED_PROGRAM);
        assert!(!textured.is_enabled());
    }
}
