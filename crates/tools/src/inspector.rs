use envprobe_kernel::{Outcome, Race};
use glam::Vec3;

/// Read-only queries against race state for logs and the HUD.
pub struct RaceInspector;

impl RaceInspector {
    pub fn summary(race: &Race) -> RaceSummary {
        RaceSummary {
            updates: race.updates(),
            hero: race.hero_position(),
            speed: race.speed(),
            remaining_secs: race.remaining_secs(),
            outcome: race.outcome(),
            pending_events: race.events().len(),
        }
    }

    /// Index of and (x, z) distance to the closest obstacle.
    pub fn nearest_obstacle(race: &Race) -> Option<(usize, f32)> {
        let hero = race.hero_position();
        race.config()
            .obstacles
            .iter()
            .map(|o| (hero.x - o.x).hypot(hero.z - o.z))
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Remaining distance to the finish line along z.
    pub fn distance_to_finish(race: &Race) -> f32 {
        (race.config().finish.z - race.hero_position().z).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RaceSummary {
    pub updates: u64,
    pub hero: Vec3,
    pub speed: f32,
    pub remaining_secs: u32,
    pub outcome: Option<Outcome>,
    pub pending_events: usize,
}

impl std::fmt::Display for RaceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Race: updates={} hero=({:.3}, {:.3}, {:.3}) speed={:.4} remaining={}s",
            self.updates, self.hero.x, self.hero.y, self.hero.z, self.speed, self.remaining_secs
        )?;
        match self.outcome {
            Some(outcome) => write!(f, " outcome=\"{outcome}\""),
            None => write!(f, " running"),
        }
    }
}
