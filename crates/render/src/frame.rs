//! Per-frame sequencing: capture, mips, main pass, environment-mapped draw.

use crate::capture::{CaptureSetupError, EnvironmentConfig, SixFaceCubeCapture};
use crate::context::{GraphicsContext, RenderTarget, Viewport};
use crate::material::{EnvironmentMappedMaterial, MaterialParams, MaterialSettings};
use crate::scene::{SceneAssets, SceneError, SceneLayout, SceneRenderer};
use envprobe_assets::AssetTable;
use envprobe_common::{PerspectiveCamera, Transform};

/// Everything a frame needs from game and camera logic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    pub hero: Transform,
    pub camera: PerspectiveCamera,
    pub material: MaterialSettings,
}

/// Produces the inputs of the next frame.
///
/// `None` means the game is in a terminal state and the frame must not
/// render.
pub trait FrameSource {
    fn advance(&mut self) -> Option<FrameInputs>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> Option<FrameInputs>,
{
    fn advance(&mut self) -> Option<FrameInputs> {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Rendered,
    Frozen,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub rendered: u64,
    pub frozen: u64,
    pub skipped_hero_draws: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameSetupError {
    #[error(transparent)]
    Capture(#[from] CaptureSetupError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Owns the capture pipeline, the scene and the material for one scene
/// lifetime.
#[derive(Debug)]
pub struct FrameOrchestrator {
    capture: SixFaceCubeCapture,
    scene: SceneRenderer,
    material: EnvironmentMappedMaterial,
    viewport: Viewport,
    stats: FrameStats,
}

impl FrameOrchestrator {
    pub fn new<C: GraphicsContext>(
        ctx: &mut C,
        assets: &AssetTable,
        layout: SceneLayout,
        environment: EnvironmentConfig,
        width: u32,
        height: u32,
    ) -> Result<Self, FrameSetupError> {
        let capture = SixFaceCubeCapture::new(ctx, environment)?;
        let scene_assets = match SceneAssets::upload(ctx, assets) {
            Ok(scene_assets) => scene_assets,
            Err(err) => {
                capture.release(ctx);
                return Err(err.into());
            }
        };
        let material = match EnvironmentMappedMaterial::new(ctx, assets) {
            Ok(material) => material,
            Err(err) => {
                scene_assets.release(ctx);
                capture.release(ctx);
                return Err(err.into());
            }
        };
        Ok(Self {
            capture,
            scene: SceneRenderer::new(layout, scene_assets),
            material,
            viewport: Viewport::new(width, height),
            stats: FrameStats::default(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = Viewport::new(width, height);
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn capture(&self) -> &SixFaceCubeCapture {
        &self.capture
    }

    pub fn scene(&self) -> &SceneRenderer {
        &self.scene
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Pull inputs from `source` and render, unless the source is frozen.
    pub fn run_frame<C, S>(&mut self, ctx: &mut C, source: &mut S) -> FrameStatus
    where
        C: GraphicsContext,
        S: FrameSource + ?Sized,
    {
        match source.advance() {
            Some(inputs) => {
                self.render_frame(ctx, &inputs);
                FrameStatus::Rendered
            }
            None => {
                self.stats.frozen += 1;
                FrameStatus::Frozen
            }
        }
    }

    pub fn render_frame<C: GraphicsContext>(&mut self, ctx: &mut C, inputs: &FrameInputs) {
        let hero = inputs
            .hero
            .with_euler_degrees(inputs.material.hero_rotation_degrees)
            .model_matrix();

        let scene = &self.scene;
        self.capture
            .capture(ctx, inputs.hero.position, |ctx, view_projection| {
                scene.render(ctx, view_projection, hero)
            });

        ctx.bind_framebuffer(RenderTarget::Default);
        ctx.set_viewport(self.viewport);
        scene.render(ctx, inputs.camera.view_projection(), hero);

        let params = MaterialParams::new(hero, &inputs.material);
        if let Err(err) = self.material.draw(
            ctx,
            scene.assets().hero.mesh,
            &inputs.camera,
            &params,
            self.capture.cubemap(),
            self.capture.sampler(),
        ) {
            tracing::warn!(%err, "skipping environment-mapped draw");
            self.stats.skipped_hero_draws += 1;
        }
        self.stats.rendered += 1;
    }

    pub fn release<C: GraphicsContext>(self, ctx: &mut C) {
        self.material.release(ctx);
        self.scene.release(ctx);
        self.capture.release(ctx);
        tracing::info!(frames = self.stats.rendered, "frame pipeline released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::{CUBE_TEXTURED, TEXTURED};
    use crate::recording::RecordingContext;
    use glam::Vec3;

    fn assets() -> AssetTable {
        let mut table = AssetTable::builtin().unwrap();
        table.insert_shader(TEXTURED, "");
        table.insert_shader(CUBE_TEXTURED, "");
        table
    }

    fn inputs() -> FrameInputs {
        FrameInputs {
            hero: Transform::from_position_scale(Vec3::new(6.3, 0.1, -8.99), Vec3::splat(0.05)),
            camera: PerspectiveCamera::default(),
            material: MaterialSettings::default(),
        }
    }

    #[test]
    fn frozen_source_renders_nothing() {
        let mut ctx = RecordingContext::new();
        let mut frames = FrameOrchestrator::new(
            &mut ctx,
            &assets(),
            SceneLayout::new(&[], Vec3::Z),
            EnvironmentConfig { resolution: 16 },
            320,
            240,
        )
        .unwrap();
        ctx.take_commands();

        let mut source = || -> Option<FrameInputs> { None };
        assert_eq!(frames.run_frame(&mut ctx, &mut source), FrameStatus::Frozen);
        assert!(ctx.commands().is_empty());
        assert_eq!(frames.stats().frozen, 1);
    }

    #[test]
    fn rendered_frame_counts() {
        let mut ctx = RecordingContext::new();
        let mut frames = FrameOrchestrator::new(
            &mut ctx,
            &assets(),
            SceneLayout::new(&[], Vec3::Z),
            EnvironmentConfig { resolution: 16 },
            320,
            240,
        )
        .unwrap();
        let mut source = || Some(inputs());
        assert_eq!(frames.run_frame(&mut ctx, &mut source), FrameStatus::Rendered);
        assert_eq!(
            frames.stats(),
            FrameStats {
                rendered: 1,
                frozen: 0,
                skipped_hero_draws: 0
            }
        );
    }

    #[test]
    fn missing_material_shader_releases_everything() {
        let mut table = AssetTable::builtin().unwrap();
        table.insert_shader(TEXTURED, "");
        let mut ctx = RecordingContext::new();
        let err = FrameOrchestrator::new(
            &mut ctx,
            &table,
            SceneLayout::new(&[], Vec3::Z),
            EnvironmentConfig::default(),
            1,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, FrameSetupError::Scene(_)));
        assert_eq!(ctx.live_resources(), 0);
    }
}
