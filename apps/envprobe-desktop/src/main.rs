use anyhow::{Context, Result};
use clap::Parser;
use egui::Context as EguiContext;
use envprobe_assets::AssetTable;
use envprobe_common::Rgb8;
use envprobe_config::AppConfig;
use envprobe_input::Action;
use envprobe_kernel::RaceEvent;
use envprobe_render::{
    EnvironmentConfig, FrameOrchestrator, FrameStats, FrameStatus, GraphicsContext, SceneLayout,
};
use envprobe_render_wgpu::WgpuContext;
use envprobe_tools::{RaceInspector, RaceSession};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

/// Race updates run per redraw at most, after a stall.
const MAX_CATCH_UP: u32 = 5;

#[derive(Parser)]
#[command(name = "envprobe-desktop", about = "Race with a live environment-mapped car")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Settings file; defaults apply if it does not exist
    #[arg(long, default_value = "envprobe.json")]
    config: PathBuf,

    /// Environment cube resolution, overriding the settings file
    #[arg(long)]
    resolution: Option<u32>,

    /// Directory with image overrides named after the scene actors
    #[arg(long)]
    assets: Option<PathBuf>,
}

/// Game-side state, independent of the GPU.
struct AppState {
    session: RaceSession,
    environment: EnvironmentConfig,
    show_controls: bool,
    engaged: bool,
    attempt: u32,
    last_frame: Instant,
    tick_accumulator: f64,
    tick_rate: f64,
    last_status: FrameStatus,
}

impl AppState {
    fn new(config: AppConfig) -> Self {
        let tick_rate = 1.0 / config.race.updates_per_second as f64;
        Self {
            session: RaceSession::new(config.race, config.material),
            environment: config.environment,
            show_controls: true,
            engaged: false,
            attempt: 1,
            last_frame: Instant::now(),
            tick_accumulator: 0.0,
            tick_rate,
            last_status: FrameStatus::Rendered,
        }
    }

    fn due_updates(&mut self) -> u32 {
        let now = Instant::now();
        self.tick_accumulator += (now - self.last_frame).as_secs_f64().min(0.1);
        self.last_frame = now;
        let mut due = 0;
        while self.tick_accumulator >= self.tick_rate {
            self.tick_accumulator -= self.tick_rate;
            due += 1;
        }
        due.min(MAX_CATCH_UP)
    }

    fn handle_key(&mut self, key: KeyCode, pressed: bool) {
        let action = match key {
            KeyCode::KeyW => Action::Accelerate,
            KeyCode::KeyA => Action::SteerLeft,
            KeyCode::KeyD => Action::SteerRight,
            KeyCode::KeyR => Action::Restart,
            KeyCode::F1 => {
                if pressed {
                    self.show_controls = !self.show_controls;
                }
                return;
            }
            _ => return,
        };
        self.session.input.set(action, pressed);
    }

    fn handle_button(&mut self, pressed: bool) {
        self.engaged = pressed;
        self.session.input.set(Action::Engage, pressed);
    }

    /// Run the race updates that are due and render the frame.
    ///
    /// Between updates the last race state is rendered again; a finished
    /// race renders nothing until restarted.
    fn frame<C: GraphicsContext>(&mut self, ctx: &mut C, frames: &mut FrameOrchestrator) -> FrameStatus {
        use envprobe_render::FrameSource;

        let due = self.due_updates();
        for _ in 1..due {
            if self.session.advance().is_none() {
                break;
            }
        }
        let status = if due > 0 {
            frames.run_frame(ctx, &mut self.session)
        } else if self.session.race.is_over() {
            FrameStatus::Frozen
        } else {
            frames.render_frame(ctx, &self.session.frame_inputs());
            FrameStatus::Rendered
        };

        for event in self.session.take_events() {
            if event == RaceEvent::Restarted {
                self.attempt += 1;
            }
        }
        if status != self.last_status {
            tracing::debug!(?status, "frame status changed");
            self.last_status = status;
        }
        status
    }

    fn draw_ui(&mut self, ctx: &EguiContext, stats: FrameStats) {
        let summary = RaceInspector::summary(&self.session.race);
        let to_finish = RaceInspector::distance_to_finish(&self.session.race);

        egui::Area::new(egui::Id::new("timer"))
            .anchor(egui::Align2::LEFT_TOP, [12.0, 12.0])
            .show(ctx, |ui| {
                ui.heading(format!("Timer: {} Seconds", summary.remaining_secs));
            });

        if let Some(outcome) = summary.outcome {
            egui::Area::new(egui::Id::new("game_over"))
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.heading(outcome.to_string());
                        ui.label("Press 'R' to Restart");
                    });
                });
        }

        if !self.show_controls {
            return;
        }

        egui::SidePanel::right("controls")
            .default_width(260.0)
            .show(ctx, |ui| {
                ui.heading("Material");
                let material = &mut self.session.material;
                let mut rgb = material.tint.0;
                ui.horizontal(|ui| {
                    ui.label("Tint");
                    ui.color_edit_button_srgb(&mut rgb);
                });
                material.tint = Rgb8(rgb);
                ui.checkbox(&mut material.refraction, "Refraction");
                ui.add(
                    egui::Slider::new(&mut material.refractive_index, 0.05..=3.0)
                        .text("Refractive index"),
                );
                ui.label("Hero rotation:");
                let rotation = &mut material.hero_rotation_degrees;
                ui.horizontal(|ui| {
                    ui.add(egui::DragValue::new(&mut rotation.x).prefix("X: ").speed(1.0));
                    ui.add(egui::DragValue::new(&mut rotation.y).prefix("Y: ").speed(1.0));
                    ui.add(egui::DragValue::new(&mut rotation.z).prefix("Z: ").speed(1.0));
                });

                ui.separator();
                ui.heading("Race");
                ui.label(format!("Attempt: {}", self.attempt));
                ui.label(format!("Speed: {:.4}", summary.speed));
                ui.label(format!(
                    "Hero: ({:.2}, {:.2}, {:.2})",
                    summary.hero.x, summary.hero.y, summary.hero.z
                ));
                ui.label(format!("To finish: {to_finish:.1}"));

                ui.separator();
                ui.heading("Environment");
                ui.label(format!(
                    "Cube: {}px, {} mips",
                    self.environment.resolution,
                    self.environment.mip_levels()
                ));
                ui.label(format!(
                    "Frames: {} rendered, {} frozen",
                    stats.rendered, stats.frozen
                ));
                if stats.skipped_hero_draws > 0 {
                    ui.colored_label(
                        egui::Color32::YELLOW,
                        format!("Skipped hero draws: {}", stats.skipped_hero_draws),
                    );
                }

                ui.separator();
                ui.small("LMB: drive + look | W: accelerate | A/D: steer | R: restart | F1: panel");
            });
    }
}

/// Everything that exists once the window is up.
struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    ctx: WgpuContext,
    frames: FrameOrchestrator,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl Gpu {
    fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(self.ctx.device(), &self.config);
        self.ctx.resize(self.config.width, self.config.height);
        self.frames.resize(self.config.width, self.config.height);
    }

    fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height.max(1) as f32
    }

    fn render_ui(&mut self, egui_ctx: &EguiContext, output: egui::FullOutput, view: &wgpu::TextureView) {
        self.egui_winit
            .handle_platform_output(&self.window, output.platform_output);
        let paint_jobs = egui_ctx.tessellate(output.shapes, output.pixels_per_point);
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: output.pixels_per_point,
        };

        let device = self.ctx.device();
        let queue = self.ctx.queue();
        for (id, image_delta) in &output.textures_delta.set {
            self.egui_renderer
                .update_texture(device, queue, *id, image_delta);
        }
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("egui_encoder"),
        });
        self.egui_renderer.update_buffers(
            device,
            queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();
            self.egui_renderer
                .render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        queue.submit(std::iter::once(encoder.finish()));
        for id in &output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }

    fn release(self) {
        let Gpu {
            mut ctx, frames, ..
        } = self;
        frames.release(&mut ctx);
        tracing::info!("GPU resources released");
    }
}

struct GpuApp {
    state: AppState,
    assets: AssetTable,
    egui_ctx: EguiContext,
    gpu: Option<Gpu>,
}

impl GpuApp {
    fn new(config: AppConfig, assets: AssetTable) -> Self {
        Self {
            state: AppState::new(config),
            assets,
            egui_ctx: EguiContext::default(),
            gpu: None,
        }
    }

    fn init_gpu(&self, event_loop: &ActiveEventLoop) -> Result<Gpu> {
        let attrs = Window::default_attributes()
            .with_title("envprobe")
            .with_inner_size(PhysicalSize::new(1280u32, 720));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no suitable GPU adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("envprobe_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        // Linear output matches the unconverted 8-bit textures.
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or(surface_caps.formats.first())
            .copied()
            .context("surface reports no formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        tracing::info!(
            backend = adapter.get_info().backend.to_str(),
            format = ?surface_format,
            "GPU initialized"
        );

        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);
        let egui_winit = egui_winit::State::new(
            self.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let mut ctx = WgpuContext::new(device, queue, surface_format, config.width, config.height);
        let race = self.state.session.race.config();
        let frames = FrameOrchestrator::new(
            &mut ctx,
            &self.assets,
            SceneLayout::new(&race.obstacles, race.finish),
            self.state.environment,
            config.width,
            config.height,
        )?;

        Ok(Gpu {
            window,
            surface,
            config,
            ctx,
            frames,
            egui_winit,
            egui_renderer,
        })
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match self.init_gpu(event_loop) {
            Ok(gpu) => {
                self.state.session.camera.aspect = gpu.aspect();
                self.state.last_frame = Instant::now();
                self.gpu = Some(gpu);
            }
            Err(e) => {
                tracing::error!("setup failed: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        if gpu.egui_winit.on_window_event(&gpu.window, &event).consumed {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                if let Some(gpu) = self.gpu.take() {
                    gpu.release();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                gpu.resize(new_size.width, new_size.height);
                self.state.session.camera.aspect = gpu.aspect();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: key_state,
                        ..
                    },
                ..
            } => {
                self.state
                    .handle_key(key, key_state == ElementState::Pressed);
            }
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state: button_state,
                ..
            } => {
                self.state
                    .handle_button(button_state == ElementState::Pressed);
            }
            WindowEvent::RedrawRequested => {
                let output = match gpu.surface.get_current_texture() {
                    Ok(t) => t,
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        gpu.surface.configure(gpu.ctx.device(), &gpu.config);
                        return;
                    }
                    Err(e) => {
                        tracing::error!("surface error: {e}");
                        return;
                    }
                };
                let view = output
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());

                self.state.frame(&mut gpu.ctx, &mut gpu.frames);
                gpu.ctx.submit(&view);

                let raw_input = gpu.egui_winit.take_egui_input(&gpu.window);
                let stats = gpu.frames.stats();
                let full_output = self.egui_ctx.run(raw_input, |ctx| {
                    self.state.draw_ui(ctx, stats);
                });
                gpu.render_ui(&self.egui_ctx, full_output, &view);

                output.present();
                gpu.window.request_redraw();
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.state.engaged {
                self.state
                    .session
                    .camera
                    .rotate(delta.0 as f32, delta.1 as f32);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("envprobe-desktop starting");

    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("reading {}", cli.config.display()))?;
    if let Some(resolution) = cli.resolution {
        config.environment.resolution = resolution;
    }
    config.validate()?;
    tracing::info!(
        resolution = config.environment.resolution,
        mips = config.environment.mip_levels(),
        "environment cube"
    );

    let mut assets = AssetTable::builtin()?;
    envprobe_render_wgpu::register_shaders(&mut assets);
    if let Some(dir) = &cli.assets {
        let replaced = assets.load_images_from_dir(dir)?;
        tracing::info!(?replaced, dir = %dir.display(), "image overrides loaded");
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp::new(config, assets);
    event_loop.run_app(&mut app)?;

    Ok(())
}
