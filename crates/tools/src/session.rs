use envprobe_input::{ChaseCamera, InputState};
use envprobe_kernel::{Race, RaceConfig, RaceEvent, Step};
use envprobe_render::{FrameInputs, FrameSource, MaterialSettings};

/// A race plus everything the front end feeds it: held input, the chase
/// camera and material controls.
///
/// Each [`FrameSource::advance`] runs one race update. Frames stop once the
/// race is over and resume after a restart.
#[derive(Debug, Clone)]
pub struct RaceSession {
    pub race: Race,
    pub input: InputState,
    pub camera: ChaseCamera,
    pub material: MaterialSettings,
    events: Vec<RaceEvent>,
}

impl RaceSession {
    pub fn new(config: RaceConfig, material: MaterialSettings) -> Self {
        Self {
            race: Race::new(config),
            input: InputState::new(),
            camera: ChaseCamera::default(),
            material,
            events: Vec::new(),
        }
    }

    /// Inputs for the current race state, regardless of whether it is over.
    pub fn frame_inputs(&self) -> FrameInputs {
        FrameInputs {
            hero: self.race.hero_transform(),
            camera: self.camera.camera_for(self.race.hero_position()),
            material: self.material,
        }
    }

    /// Events raised since the last call.
    pub fn take_events(&mut self) -> Vec<RaceEvent> {
        std::mem::take(&mut self.events)
    }
}

impl FrameSource for RaceSession {
    fn advance(&mut self) -> Option<FrameInputs> {
        let step = self.race.update(&self.input);
        for event in self.race.drain_events() {
            match &event {
                RaceEvent::SecondElapsed { remaining } => {
                    tracing::debug!(remaining, "countdown")
                }
                other => tracing::info!(event = ?other, "race event"),
            }
            self.events.push(event);
        }
        match step {
            Step::Advanced if !self.race.is_over() => Some(self.frame_inputs()),
            _ => None,
        }
    }
}
