//! Frames rendered on a real adapter into an offscreen target.
//!
//! Skipped when no adapter is available.
//!
//! ```bash
//! cargo test -p envprobe-render-wgpu --test headless
//! ```

use envprobe_assets::{AssetTable, ImageData, MeshData};
use envprobe_common::{PerspectiveCamera, Transform};
use envprobe_render::{
    CLEAR_COLOR, CubeFace, CubeTextureDesc, EnvironmentConfig, FaceAttachment, FrameInputs,
    FrameOrchestrator, FramebufferStatus, GraphicsContext, IncompleteReason, MaterialSettings,
    RenderTarget, SceneLayout, TEXTURED_PROGRAM, TextureBinding, TextureFormat, UniformValue,
    Viewport,
};
use envprobe_render_wgpu::{WgpuContext, shaders};
use glam::{Mat4, Vec3, Vec4};

const SIZE: u32 = 64;
const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

fn device() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::LowPower,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))?;
    pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None)).ok()
}

fn offscreen(device: &wgpu::Device) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen"),
        size: wgpu::Extent3d {
            width: SIZE,
            height: SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

fn read_pixel(ctx: &WgpuContext, texture: &wgpu::Texture, x: u32, y: u32) -> [u8; 4] {
    read_texel(ctx, texture.as_image_copy(), x, y)
}

/// One texel of a `SIZE` x `SIZE` region starting at `source`.
fn read_texel(ctx: &WgpuContext, source: wgpu::TexelCopyTextureInfo, x: u32, y: u32) -> [u8; 4] {
    let bytes_per_row = 4 * SIZE;
    let buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size: (bytes_per_row * SIZE) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = ctx
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_texture_to_buffer(
        source,
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(SIZE),
            },
        },
        wgpu::Extent3d {
            width: SIZE,
            height: SIZE,
            depth_or_array_layers: 1,
        },
    );
    ctx.queue().submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    slice.map_async(wgpu::MapMode::Read, |result| result.unwrap());
    ctx.device().poll(wgpu::Maintain::Wait);
    let data = slice.get_mapped_range();
    let at = (y * bytes_per_row + 4 * x) as usize;
    [data[at], data[at + 1], data[at + 2], data[at + 3]]
}

fn inputs() -> FrameInputs {
    let position = Vec3::new(0.0, 0.1, 0.0);
    FrameInputs {
        hero: Transform::from_position_scale(position, Vec3::new(0.05, 0.03, 0.04)),
        camera: PerspectiveCamera {
            position: position + Vec3::new(0.0, 0.16, -0.34),
            direction: Vec3::Z,
            ..PerspectiveCamera::default()
        },
        material: MaterialSettings::default(),
    }
}

fn assets() -> AssetTable {
    let mut assets = AssetTable::builtin().unwrap();
    envprobe_render_wgpu::register_shaders(&mut assets);
    assets
}

fn close(actual: [u8; 4], expected: [f32; 4]) -> bool {
    actual
        .iter()
        .zip(expected)
        .all(|(a, e)| (*a as f32 - e * 255.0).abs() <= 2.0)
}

#[test]
fn frame_renders_sky_above_the_horizon() {
    let Some((device, queue)) = device() else {
        eprintln!("no adapter, skipping");
        return;
    };
    let mut ctx = WgpuContext::new(device, queue, FORMAT, SIZE, SIZE);
    let layout = SceneLayout::new(&[], Vec3::new(0.0, 0.0, -50.0));
    let mut frames = FrameOrchestrator::new(
        &mut ctx,
        &assets(),
        layout,
        EnvironmentConfig { resolution: 32 },
        SIZE,
        SIZE,
    )
    .expect("pipeline setup");

    let target = offscreen(ctx.device());
    let view = target.create_view(&Default::default());
    frames.render_frame(&mut ctx, &inputs());
    ctx.submit(&view);

    let corner = read_pixel(&ctx, &target, 0, 0);
    assert!(close(corner, CLEAR_COLOR), "{corner:?}");
    assert_eq!(frames.stats().skipped_hero_draws, 0);
    frames.release(&mut ctx);
}

#[test]
fn surface_is_cleared_on_frames_without_draws() {
    let Some((device, queue)) = device() else {
        eprintln!("no adapter, skipping");
        return;
    };
    let mut ctx = WgpuContext::new(device, queue, FORMAT, SIZE, SIZE);
    let target = offscreen(ctx.device());
    let view = target.create_view(&Default::default());
    ctx.submit(&view);
    assert_eq!(read_pixel(&ctx, &target, SIZE / 2, SIZE / 2), [0, 0, 0, 255]);
}

#[test]
fn swapped_attachments_are_reported_incomplete() {
    let Some((device, queue)) = device() else {
        eprintln!("no adapter, skipping");
        return;
    };
    let mut ctx = WgpuContext::new(device, queue, FORMAT, SIZE, SIZE);
    let color = ctx
        .create_cube_texture(&CubeTextureDesc {
            label: "color",
            size: 16,
            mip_levels: 5,
            format: TextureFormat::Rgba8Unorm,
        })
        .unwrap();
    let depth = ctx
        .create_cube_texture(&CubeTextureDesc {
            label: "depth",
            size: 16,
            mip_levels: 1,
            format: TextureFormat::Depth16Unorm,
        })
        .unwrap();
    let attach = |texture| FaceAttachment {
        texture,
        face: CubeFace::NegZ,
        mip_level: 0,
    };

    let good = ctx
        .create_face_framebuffer(attach(color), attach(depth))
        .unwrap();
    assert_eq!(ctx.framebuffer_status(good), FramebufferStatus::Complete);

    let swapped = ctx
        .create_face_framebuffer(attach(depth), attach(color))
        .unwrap();
    assert_eq!(
        ctx.framebuffer_status(swapped),
        FramebufferStatus::Incomplete(IncompleteReason::UnsupportedFormat(
            TextureFormat::Depth16Unorm
        ))
    );
}

fn single_level_cube(
    ctx: &mut WgpuContext,
    label: &'static str,
    format: TextureFormat,
) -> envprobe_render::CubeTextureId {
    ctx.create_cube_texture(&CubeTextureDesc {
        label,
        size: SIZE,
        mip_levels: 1,
        format,
    })
    .unwrap()
}

#[test]
fn face_capture_lands_in_cube_texel_orientation() {
    let Some((device, queue)) = device() else {
        eprintln!("no adapter, skipping");
        return;
    };
    let mut ctx = WgpuContext::new(device, queue, FORMAT, SIZE, SIZE);
    let face = CubeFace::PosZ;
    let color = single_level_cube(&mut ctx, "color", TextureFormat::Rgba8Unorm);
    let depth = single_level_cube(&mut ctx, "depth", TextureFormat::Depth16Unorm);
    let attach = |texture| FaceAttachment {
        texture,
        face,
        mip_level: 0,
    };
    let framebuffer = ctx
        .create_face_framebuffer(attach(color), attach(depth))
        .unwrap();
    let program = ctx
        .create_program(&TEXTURED_PROGRAM, shaders::TEXTURED)
        .unwrap();
    let quad = ctx
        .create_mesh("marker", &MeshData::plane([0.0, 0.0], [1.0, 1.0]))
        .unwrap();
    let white = ctx
        .create_texture_2d("white", &ImageData::solid(1, 1, [255; 4]).unwrap())
        .unwrap();

    // Single-sided quad facing the origin, up and to the right along +Z.
    let model = Mat4::from_translation(Vec3::new(1.0, 1.0, 2.0))
        * Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2)
        * Mat4::from_scale(Vec3::splat(0.8));
    let background = [0.0, 0.0, 1.0, 1.0];

    ctx.bind_framebuffer(RenderTarget::Framebuffer(framebuffer));
    ctx.set_viewport(Viewport::new(SIZE, SIZE));
    ctx.clear(background, 1.0);
    ctx.use_program(program);
    ctx.set_uniform(
        "MVP",
        UniformValue::Mat4(face.capture_camera().view_projection() * model),
    )
    .unwrap();
    ctx.set_uniform("tint", UniformValue::Vec4(Vec4::new(1.0, 0.0, 0.0, 1.0)))
        .unwrap();
    ctx.bind_texture(0, TextureBinding::Texture2d(white));
    ctx.set_uniform("texture_sampler", UniformValue::Sampler(0))
        .unwrap();
    ctx.bind_sampler(0, None);
    ctx.draw(quad).unwrap();

    let target = offscreen(ctx.device());
    ctx.submit(&target.create_view(&Default::default()));

    // +Z face: world +X is texel right, world +Y is texel top.
    let layer = wgpu::TexelCopyTextureInfo {
        texture: ctx.cube_texture(color).unwrap(),
        mip_level: 0,
        origin: wgpu::Origin3d {
            x: 0,
            y: 0,
            z: face.layer(),
        },
        aspect: wgpu::TextureAspect::All,
    };
    let (near, far) = (SIZE / 4, 3 * SIZE / 4);
    assert_eq!(read_texel(&ctx, layer, far, near), [255, 0, 0, 255]);
    for (x, y) in [(near, near), (near, far), (far, far)] {
        let texel = read_texel(&ctx, layer, x, y);
        assert!(close(texel, background), "({x}, {y}): {texel:?}");
    }
}

#[test]
fn double_release_is_tolerated_for_every_kind() {
    let Some((device, queue)) = device() else {
        eprintln!("no adapter, skipping");
        return;
    };
    let mut ctx = WgpuContext::new(device, queue, FORMAT, SIZE, SIZE);
    let cube = single_level_cube(&mut ctx, "color", TextureFormat::Rgba8Unorm);
    let sampler = ctx
        .create_sampler(&envprobe_render::SamplerDesc::trilinear_repeat())
        .unwrap();
    let texture = ctx
        .create_texture_2d("white", &ImageData::solid(1, 1, [255; 4]).unwrap())
        .unwrap();
    let mesh = ctx.create_mesh("cube", &MeshData::cube()).unwrap();
    let program = ctx
        .create_program(&TEXTURED_PROGRAM, shaders::TEXTURED)
        .unwrap();

    for _ in 0..2 {
        ctx.delete_cube_texture(cube);
        ctx.delete_sampler(sampler);
        ctx.delete_texture(texture);
        ctx.delete_mesh(mesh);
        ctx.delete_program(program);
    }
    assert!(ctx.cube_texture(cube).is_none());

    let target = offscreen(ctx.device());
    ctx.submit(&target.create_view(&Default::default()));
    assert_eq!(read_pixel(&ctx, &target, 0, 0), [0, 0, 0, 255]);
}
