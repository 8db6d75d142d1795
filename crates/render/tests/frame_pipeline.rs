//! Whole-frame tests driven through the recording context.
//!
//! ```bash
//! cargo test -p envprobe-render --test frame_pipeline
//! ```

mod common;

use common::{count, inputs_at, is_face_bind, orchestrator, position_of};
use envprobe_input::{Action, InputState};
use envprobe_kernel::{Race, RaceConfig, Step};
use envprobe_render::{
    CUBE_TEXTURED, CaptureSetupError, Command, CubeFace, EnvironmentConfig, FrameInputs,
    FrameOrchestrator, FrameSetupError, FrameStatus, IncompleteReason, RecordingContext,
    RenderTarget, TextureBinding, UniformValue, Viewport,
};
use glam::Vec3;

/// Rendering one frame from a fixed hero position.
fn one_frame(position: Vec3) -> (RecordingContext, FrameOrchestrator, Vec<Command>) {
    let mut ctx = RecordingContext::new();
    let mut frames = orchestrator(&mut ctx);
    ctx.take_commands();
    frames.render_frame(&mut ctx, &inputs_at(position));
    let commands = ctx.take_commands();
    (ctx, frames, commands)
}

#[test]
fn every_face_is_captured_from_the_hero_position() {
    let hero = Vec3::new(6.3, 0.1, -8.99);
    let (_, frames, _) = one_frame(hero);
    for face in CubeFace::ALL {
        let target = frames.capture().target(face);
        assert_eq!(target.face, face);
        assert_eq!(target.camera.position, hero, "{face}");
        assert_eq!(target.camera.direction, face.direction());
        assert_eq!(target.camera.up, face.up());
    }
}

#[test]
fn mips_are_rebuilt_once_between_capture_and_sampling() {
    let (_, frames, commands) = one_frame(Vec3::new(6.3, 0.1, -8.99));
    let cube = frames.capture().cubemap();

    let mip = |c: &Command| *c == Command::GenerateMipmaps(cube);
    assert_eq!(count(&commands, mip), 1);
    assert_eq!(count(&commands, is_face_bind), 6);

    let mip_at = position_of(&commands, mip).unwrap();
    let last_face_bind = commands.iter().rposition(is_face_bind).unwrap();
    let cube_bind = position_of(&commands, |c| {
        matches!(
            c,
            Command::BindTexture {
                texture: TextureBinding::Cube(_),
                ..
            }
        )
    })
    .unwrap();
    let env_draw = position_of(&commands, |c| {
        matches!(c, Command::Draw { program, .. } if *program == CUBE_TEXTURED)
    })
    .unwrap();

    assert!(last_face_bind < mip_at);
    assert!(mip_at < cube_bind);
    assert!(cube_bind < env_draw);
    assert_eq!(env_draw, commands.len() - 1);
}

#[test]
fn main_pass_targets_the_window_with_full_viewport() {
    let (_, _, commands) = one_frame(Vec3::ZERO);
    let default_bind = position_of(&commands, |c| {
        *c == Command::BindFramebuffer(RenderTarget::Default)
    })
    .unwrap();
    assert_eq!(
        commands[default_bind + 1],
        Command::SetViewport(Viewport::new(common::WIDTH, common::HEIGHT))
    );
    for (i, command) in commands.iter().enumerate() {
        if let Command::Draw { target, .. } = command {
            let expected_default = i > default_bind;
            assert_eq!(*target == RenderTarget::Default, expected_default);
        }
    }
}

/// Commands reduced to what must stay the same between scene passes.
fn shape(command: &Command) -> String {
    match command {
        Command::SetUniform { name, .. } => format!("uniform {name}"),
        Command::Draw { program, mesh, .. } => format!("draw {program} {mesh:?}"),
        other => format!("{other:?}"),
    }
}

#[test]
fn seven_scene_passes_share_one_draw_structure() {
    let (_, frames, commands) = one_frame(Vec3::new(6.0, 0.1, 10.0));
    let draws_per_pass = frames.scene().draw_count();

    let starts: Vec<usize> = commands
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, Command::Clear { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(starts.len(), 7);

    let passes: Vec<Vec<String>> = starts
        .iter()
        .map(|&start| {
            let mut draws = 0;
            commands[start..]
                .iter()
                .take_while(|c| {
                    if draws == draws_per_pass {
                        return false;
                    }
                    if matches!(c, Command::Draw { .. }) {
                        draws += 1;
                    }
                    true
                })
                .map(shape)
                .collect()
        })
        .collect();

    for pass in &passes[1..] {
        assert_eq!(pass, &passes[0]);
    }
    assert_eq!(
        count(&commands, |c| matches!(c, Command::Draw { .. })),
        7 * draws_per_pass + 1
    );
}

#[test]
fn hero_model_reaches_the_material_uniform() {
    let hero = Vec3::new(1.0, 2.0, 3.0);
    let (_, _, commands) = one_frame(hero);
    let model = commands.iter().find_map(|c| match c {
        Command::SetUniform { name, value } if name == "M" => Some(*value),
        _ => None,
    });
    let Some(UniformValue::Mat4(model)) = model else {
        panic!("no model matrix uploaded");
    };
    assert_eq!(model.w_axis.truncate(), hero);
}

#[test]
fn rejected_hero_binding_skips_only_that_draw() {
    let mut ctx = RecordingContext::new();
    let mut frames = orchestrator(&mut ctx);
    let draws_per_pass = frames.scene().draw_count();
    let cube_draw =
        |c: &Command| matches!(c, Command::Draw { program, .. } if *program == CUBE_TEXTURED);
    ctx.take_commands();

    ctx.reject_next_uniform("M_it");
    frames.render_frame(&mut ctx, &inputs_at(Vec3::ZERO));
    let skipped = ctx.take_commands();
    assert_eq!(count(&skipped, cube_draw), 0);
    assert_eq!(
        count(&skipped, |c| matches!(c, Command::Draw { .. })),
        7 * draws_per_pass
    );
    assert_eq!(frames.stats().skipped_hero_draws, 1);
    assert_eq!(frames.stats().rendered, 1);

    frames.render_frame(&mut ctx, &inputs_at(Vec3::ZERO));
    let next = ctx.take_commands();
    assert_eq!(count(&next, is_face_bind), 6);
    assert_eq!(
        count(&next, |c| *c == Command::GenerateMipmaps(frames.capture().cubemap())),
        1
    );
    assert_eq!(count(&next, cube_draw), 1);
    assert!(cube_draw(next.last().unwrap()));
    assert_eq!(frames.stats().skipped_hero_draws, 1);
    assert_eq!(frames.stats().rendered, 2);
    assert_eq!(ctx.invalid_uses(), 0);
}

#[test]
fn frozen_frames_issue_no_commands() {
    let mut ctx = RecordingContext::new();
    let mut frames = orchestrator(&mut ctx);
    ctx.take_commands();

    let mut frozen = || -> Option<FrameInputs> { None };
    for _ in 0..3 {
        assert_eq!(frames.run_frame(&mut ctx, &mut frozen), FrameStatus::Frozen);
    }
    assert!(ctx.commands().is_empty());
    assert_eq!(frames.stats().frozen, 3);
    assert_eq!(frames.stats().rendered, 0);
}

#[test]
fn capture_follows_the_race_each_frame() {
    let mut ctx = RecordingContext::new();
    let mut frames = orchestrator(&mut ctx);
    let mut race = Race::new(RaceConfig {
        obstacles: vec![],
        ..RaceConfig::default()
    });
    let input = InputState::from_actions([Action::Engage, Action::Accelerate]);

    for _ in 0..10 {
        let before = race.hero_position();
        let status = frames.run_frame(&mut ctx, &mut || drive(&mut race, &input));
        assert_eq!(status, FrameStatus::Rendered);
        let captured = frames.capture().target(CubeFace::PosZ).camera.position;
        assert_eq!(captured, race.hero_position());
        assert!(captured.z > before.z);
    }
}

/// Inputs for the next frame, or `None` once the race is over.
fn drive(race: &mut Race, input: &InputState) -> Option<FrameInputs> {
    match race.update(input) {
        Step::Advanced if !race.is_over() => Some(FrameInputs {
            hero: race.hero_transform(),
            ..inputs_at(race.hero_position())
        }),
        _ => None,
    }
}

#[test]
fn collision_freezes_rendering_until_restart() {
    let mut ctx = RecordingContext::new();
    let mut frames = orchestrator(&mut ctx);
    let config = RaceConfig::default();
    let mut race = Race::new(RaceConfig {
        obstacles: vec![config.start + Vec3::new(0.0, 0.0, 0.2)],
        ..config
    });
    let mut input = InputState::from_actions([Action::Engage, Action::Accelerate]);

    let statuses: Vec<FrameStatus> = (0..20)
        .map(|_| frames.run_frame(&mut ctx, &mut || drive(&mut race, &input)))
        .collect();
    assert!(race.is_over());
    assert_eq!(statuses[0], FrameStatus::Rendered);
    let first_frozen = statuses
        .iter()
        .position(|s| *s == FrameStatus::Frozen)
        .unwrap();
    assert!(statuses[first_frozen..].iter().all(|s| *s == FrameStatus::Frozen));

    ctx.take_commands();
    frames.run_frame(&mut ctx, &mut || drive(&mut race, &input));
    assert!(ctx.commands().is_empty());

    input.press(Action::Restart);
    input.release(Action::Accelerate);
    let status = frames.run_frame(&mut ctx, &mut || drive(&mut race, &input));
    assert_eq!(status, FrameStatus::Rendered);
    assert!(!ctx.commands().is_empty());
    assert_eq!(race.hero_position(), race.config().start);
}

#[test]
fn incomplete_face_aborts_setup_without_leaks() {
    let mut ctx = RecordingContext::new().with_incomplete_face(CubeFace::PosY);
    let err = FrameOrchestrator::new(
        &mut ctx,
        &common::assets(),
        common::layout(),
        EnvironmentConfig::default(),
        common::WIDTH,
        common::HEIGHT,
    )
    .unwrap_err();

    match err {
        FrameSetupError::Capture(CaptureSetupError::IncompleteTarget { face, reason }) => {
            assert_eq!(face, CubeFace::PosY);
            assert!(matches!(reason, IncompleteReason::Backend(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ctx.live_resources(), 0);
    assert_eq!(ctx.invalid_uses(), 0);
    assert_eq!(count(ctx.commands(), |c| matches!(c, Command::Draw { .. })), 0);
}

#[test]
fn allocation_failure_is_a_setup_error() {
    let mut ctx = RecordingContext::new().with_failing_allocations();
    let err = FrameOrchestrator::new(
        &mut ctx,
        &common::assets(),
        common::layout(),
        EnvironmentConfig::default(),
        common::WIDTH,
        common::HEIGHT,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        FrameSetupError::Capture(CaptureSetupError::Allocation { .. })
    ));
    assert_eq!(ctx.live_resources(), 0);
}

#[test]
fn teardown_releases_each_resource_once() {
    let mut ctx = RecordingContext::new();
    let mut frames = orchestrator(&mut ctx);
    frames.render_frame(&mut ctx, &inputs_at(Vec3::ZERO));
    ctx.take_commands();

    frames.release(&mut ctx);
    let commands = ctx.take_commands();
    assert_eq!(
        count(&commands, |c| matches!(c, Command::DeleteFramebuffer(_))),
        6
    );
    assert_eq!(
        count(&commands, |c| matches!(c, Command::DeleteCubeTexture(_))),
        2
    );
    assert_eq!(
        count(&commands, |c| matches!(c, Command::DeleteSampler(_))),
        1
    );
    assert_eq!(ctx.live_resources(), 0);
    assert_eq!(ctx.invalid_uses(), 0);
}
