use envprobe_render::{Command, RenderTarget};
use std::collections::BTreeMap;

/// Counts over a recorded command stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceSummary {
    pub commands: usize,
    pub resources_created: usize,
    pub resources_released: usize,
    pub face_passes: usize,
    pub window_passes: usize,
    pub clears: usize,
    pub uniform_sets: usize,
    pub mip_rebuilds: usize,
    pub face_draws: usize,
    pub window_draws: usize,
    /// Draws per program name.
    pub draws: BTreeMap<&'static str, usize>,
}

impl TraceSummary {
    pub fn from_commands(commands: &[Command]) -> Self {
        let mut summary = Self {
            commands: commands.len(),
            ..Self::default()
        };
        for command in commands {
            match command {
                Command::CreateCubeTexture(..)
                | Command::CreateFramebuffer(..)
                | Command::CreateSampler(..)
                | Command::CreateTexture(_)
                | Command::CreateMesh(_)
                | Command::CreateProgram(..) => summary.resources_created += 1,
                Command::DeleteFramebuffer(_)
                | Command::DeleteCubeTexture(_)
                | Command::DeleteSampler(_)
                | Command::DeleteTexture(_)
                | Command::DeleteMesh(_)
                | Command::DeleteProgram(_) => summary.resources_released += 1,
                Command::BindFramebuffer(RenderTarget::Default) => summary.window_passes += 1,
                Command::BindFramebuffer(RenderTarget::Framebuffer(_)) => {
                    summary.face_passes += 1
                }
                Command::Clear { .. } => summary.clears += 1,
                Command::SetUniform { .. } => summary.uniform_sets += 1,
                Command::GenerateMipmaps(_) => summary.mip_rebuilds += 1,
                Command::Draw {
                    program, target, ..
                } => {
                    *summary.draws.entry(*program).or_default() += 1;
                    match target {
                        RenderTarget::Default => summary.window_draws += 1,
                        RenderTarget::Framebuffer(_) => summary.face_draws += 1,
                    }
                }
                Command::SetViewport(_)
                | Command::UseProgram(_)
                | Command::BindTexture { .. }
                | Command::BindSampler { .. } => {}
            }
        }
        summary
    }

    pub fn total_draws(&self) -> usize {
        self.face_draws + self.window_draws
    }
}

impl std::fmt::Display for TraceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "commands: {}", self.commands)?;
        writeln!(
            f,
            "resources: {} created, {} released",
            self.resources_created, self.resources_released
        )?;
        writeln!(
            f,
            "passes: {} face, {} window, {} clears",
            self.face_passes, self.window_passes, self.clears
        )?;
        writeln!(
            f,
            "draws: {} face, {} window",
            self.face_draws, self.window_draws
        )?;
        for (program, count) in &self.draws {
            writeln!(f, "  {program}: {count}")?;
        }
        writeln!(f, "uniform sets: {}", self.uniform_sets)?;
        write!(f, "mip rebuilds: {}", self.mip_rebuilds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envprobe_assets::AssetTable;
    use envprobe_common::Transform;
    use envprobe_input::ChaseCamera;
    use envprobe_kernel::RaceConfig;
    use envprobe_render::{
        CUBE_TEXTURED, EnvironmentConfig, FrameInputs, FrameOrchestrator, MaterialSettings,
        RecordingContext, SceneLayout, TEXTURED,
    };

    fn frame_commands() -> (Vec<Command>, usize) {
        let mut assets = AssetTable::builtin().unwrap();
        assets.insert_shader(TEXTURED, "");
        assets.insert_shader(CUBE_TEXTURED, "");
        let race = RaceConfig::default();
        let mut ctx = RecordingContext::new();
        let mut frames = FrameOrchestrator::new(
            &mut ctx,
            &assets,
            SceneLayout::new(&race.obstacles, race.finish),
            EnvironmentConfig { resolution: 16 },
            640,
            480,
        )
        .unwrap();
        ctx.take_commands();
        frames.render_frame(
            &mut ctx,
            &FrameInputs {
                hero: Transform::from_position_scale(race.start, race.hero_scale),
                camera: ChaseCamera::default().camera_for(race.start),
                material: MaterialSettings::default(),
            },
        );
        (ctx.take_commands(), frames.scene().draw_count())
    }

    #[test]
    fn one_frame_shape() {
        let (commands, per_pass) = frame_commands();
        let summary = TraceSummary::from_commands(&commands);
        assert_eq!(summary.face_passes, 6);
        assert_eq!(summary.window_passes, 1);
        assert_eq!(summary.clears, 7);
        assert_eq!(summary.mip_rebuilds, 1);
        assert_eq!(summary.face_draws, 6 * per_pass);
        assert_eq!(summary.window_draws, per_pass + 1);
        assert_eq!(summary.draws[CUBE_TEXTURED], 1);
        assert_eq!(summary.draws[TEXTURED], 7 * per_pass);
        assert_eq!(summary.resources_created, 0);
    }

    #[test]
    fn empty_trace() {
        let summary = TraceSummary::from_commands(&[]);
        assert_eq!(summary, TraceSummary::default());
        assert_eq!(summary.total_draws(), 0);
    }

    #[test]
    fn display_lists_programs() {
        let (commands, _) = frame_commands();
        let text = TraceSummary::from_commands(&commands).to_string();
        assert!(text.contains("passes: 6 face, 1 window"));
        assert!(text.contains(&format!("  {CUBE_TEXTURED}: 1")));
    }
}
