//! Shared fixtures for the frame pipeline integration tests.

#![allow(dead_code)]

use envprobe_assets::AssetTable;
use envprobe_common::{PerspectiveCamera, Transform};
use envprobe_render::{
    CUBE_TEXTURED, Command, EnvironmentConfig, FrameInputs, FrameOrchestrator, MaterialSettings,
    RecordingContext, RenderTarget, SceneLayout, TEXTURED,
};
use glam::Vec3;

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 600;

pub fn assets() -> AssetTable {
    let mut table = AssetTable::builtin().unwrap();
    table.insert_shader(TEXTURED, "// textured");
    table.insert_shader(CUBE_TEXTURED, "// cube-textured");
    table
}

pub fn layout() -> SceneLayout {
    let race = envprobe_kernel::RaceConfig::default();
    SceneLayout::new(&race.obstacles, race.finish)
}

pub fn orchestrator(ctx: &mut RecordingContext) -> FrameOrchestrator {
    FrameOrchestrator::new(
        ctx,
        &assets(),
        layout(),
        EnvironmentConfig { resolution: 32 },
        WIDTH,
        HEIGHT,
    )
    .expect("pipeline setup")
}

pub fn inputs_at(position: Vec3) -> FrameInputs {
    FrameInputs {
        hero: Transform::from_position_scale(position, Vec3::new(0.05, 0.03, 0.04)),
        camera: PerspectiveCamera {
            position: position + Vec3::new(0.0, 0.16, -0.34),
            direction: Vec3::Z,
            aspect: WIDTH as f32 / HEIGHT as f32,
            ..PerspectiveCamera::default()
        },
        material: MaterialSettings::default(),
    }
}

/// Index of the first command matching `pred`.
pub fn position_of(commands: &[Command], pred: impl Fn(&Command) -> bool) -> Option<usize> {
    commands.iter().position(pred)
}

pub fn is_face_bind(command: &Command) -> bool {
    matches!(
        command,
        Command::BindFramebuffer(RenderTarget::Framebuffer(_))
    )
}

pub fn count(commands: &[Command], pred: impl Fn(&Command) -> bool) -> usize {
    commands.iter().filter(|c| pred(c)).count()
}
