use envprobe_common::Transform;
use envprobe_input::{Action, InputState};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Tunables for a race. Defaults reproduce the reference track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub start: Vec3,
    pub initial_speed: f32,
    pub max_speed: f32,
    /// Speed gained per update while accelerating.
    pub acceleration: f32,
    /// Lateral displacement per update while steering.
    pub steer_step: f32,
    /// Collision window around each obstacle on (x, z). Bounds are exclusive.
    pub obstacle_half_extents: Vec2,
    pub obstacles: Vec<Vec3>,
    pub finish: Vec3,
    pub finish_half_width: f32,
    /// Distance before the finish line at which the race counts as won.
    pub finish_margin: f32,
    pub time_limit_secs: u32,
    pub updates_per_second: u32,
    pub hero_scale: Vec3,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            start: Vec3::new(6.3, 0.1, -8.99),
            initial_speed: 0.008,
            max_speed: 0.1,
            acceleration: 0.00005,
            steer_step: 0.017,
            obstacle_half_extents: Vec2::new(0.12, 0.16),
            obstacles: vec![
                Vec3::new(6.226_348_4, 0.1, 4.342_356_7),
                Vec3::new(6.326_398_4, 0.1, 25.252_802),
                Vec3::new(5.425_948_6, 0.1, 35.958_225),
                Vec3::new(6.326_398_4, 0.1, 49.265_125),
                Vec3::new(6.126_298_4, 0.1, 97.089_92),
                Vec3::new(5.626_048_6, 0.1, 115.399_414),
                Vec3::new(5.891_995_4, 0.1, 8.928_543),
                Vec3::new(6.368_001, 0.1, 14.555_792),
                Vec3::new(5.738_993_6, 0.1, 19.669_142),
                Vec3::new(6.146_998_4, 0.1, 29.843_782),
                Vec3::new(5.908_995_6, 0.1, 61.228_29),
                Vec3::new(5.908_995_6, 0.1, 61.228_29),
            ],
            finish: Vec3::new(5.918_750_3, 0.1, 119.627_49),
            finish_half_width: 0.3,
            finish_margin: 0.16,
            time_limit_secs: 59,
            updates_per_second: 60,
            hero_scale: Vec3::new(0.05, 0.03, 0.04),
        }
    }
}

/// How a race ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Hit the obstacle at this index.
    Collision { obstacle: usize },
    TimedOut,
    Won,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Collision { .. } => write!(f, "GAME OVER"),
            Outcome::TimedOut => write!(f, "Timeout, GAME OVER"),
            Outcome::Won => write!(f, "Congratulations, You Won!"),
        }
    }
}

/// Record of every state transition, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RaceEvent {
    SecondElapsed { remaining: u32 },
    Collided { obstacle: usize, position: Vec3 },
    TimedOut,
    Finished { position: Vec3 },
    Restarted,
}

/// Result of one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The race advanced; the frame should be rendered.
    Advanced,
    /// The race is over and no restart was requested; the frame is skipped.
    Frozen,
}

/// Authoritative race state.
#[derive(Debug, Clone)]
pub struct Race {
    config: RaceConfig,
    hero: Vec3,
    speed: f32,
    remaining_secs: u32,
    updates_until_second: u32,
    outcome: Option<Outcome>,
    updates: u64,
    event_log: Vec<RaceEvent>,
}

impl Default for Race {
    fn default() -> Self {
        Self::new(RaceConfig::default())
    }
}

impl Race {
    pub fn new(config: RaceConfig) -> Self {
        Self {
            hero: config.start,
            speed: config.initial_speed,
            remaining_secs: config.time_limit_secs,
            updates_until_second: config.updates_per_second,
            outcome: None,
            updates: 0,
            event_log: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn hero_position(&self) -> Vec3 {
        self.hero
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    /// Number of updates that advanced the race since construction.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Hero world transform: translation and non-uniform scale.
    pub fn hero_transform(&self) -> Transform {
        Transform::from_position_scale(self.hero, self.config.hero_scale)
    }

    pub fn events(&self) -> &[RaceEvent] {
        &self.event_log
    }

    pub fn drain_events(&mut self) -> Vec<RaceEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Reset position, speed and countdown to their starting values.
    pub fn restart(&mut self) {
        self.hero = self.config.start;
        self.speed = self.config.initial_speed;
        self.remaining_secs = self.config.time_limit_secs;
        self.updates_until_second = self.config.updates_per_second;
        self.outcome = None;
        self.event_log.push(RaceEvent::Restarted);
        tracing::info!("race restarted");
    }

    /// Advance the race by one update.
    ///
    /// While the race is over only [`Action::Restart`] is honoured; a restart
    /// resumes the race within the same update.
    pub fn update(&mut self, input: &InputState) -> Step {
        if self.is_over() {
            if !input.is_held(Action::Restart) {
                return Step::Frozen;
            }
            self.restart();
        }
        self.updates += 1;

        self.tick_countdown();
        if self.is_over() {
            return Step::Advanced;
        }

        if input.is_held(Action::Engage) {
            self.drive(input);
        }

        if let Some(obstacle) = self.colliding_obstacle() {
            self.finish(Outcome::Collision { obstacle });
            self.event_log.push(RaceEvent::Collided {
                obstacle,
                position: self.hero,
            });
        } else if self.crossed_finish() {
            self.finish(Outcome::Won);
            self.event_log.push(RaceEvent::Finished {
                position: self.hero,
            });
        }
        Step::Advanced
    }

    fn tick_countdown(&mut self) {
        self.updates_until_second = self.updates_until_second.saturating_sub(1);
        if self.updates_until_second > 0 {
            return;
        }
        self.updates_until_second = self.config.updates_per_second;
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        self.event_log.push(RaceEvent::SecondElapsed {
            remaining: self.remaining_secs,
        });
        if self.remaining_secs == 0 {
            self.finish(Outcome::TimedOut);
            self.event_log.push(RaceEvent::TimedOut);
        }
    }

    fn drive(&mut self, input: &InputState) {
        if input.is_held(Action::Accelerate) {
            self.hero.z += self.speed;
            if self.speed < self.config.max_speed {
                self.speed += self.config.acceleration;
            }
        }
        if input.is_held(Action::SteerLeft) {
            self.hero.x += self.config.steer_step;
        }
        if input.is_held(Action::SteerRight) {
            self.hero.x -= self.config.steer_step;
        }
    }

    fn colliding_obstacle(&self) -> Option<usize> {
        let half = self.config.obstacle_half_extents;
        self.config.obstacles.iter().position(|o| {
            (self.hero.x - o.x).abs() < half.x && (self.hero.z - o.z).abs() < half.y
        })
    }

    fn crossed_finish(&self) -> bool {
        let finish = self.config.finish;
        (self.hero.x - finish.x).abs() < self.config.finish_half_width
            && self.hero.z > finish.z - self.config.finish_margin
    }

    fn finish(&mut self, outcome: Outcome) {
        tracing::info!(%outcome, x = self.hero.x, z = self.hero.z, "race over");
        self.outcome = Some(outcome);
    }
}
