use envprobe_common::PerspectiveCamera;
use glam::Vec3;

/// Main-camera controller that trails the hero at a fixed offset.
///
/// Orientation is a yaw/pitch pair driven by mouse motion. Camera motion is
/// not part of the race state; the controller only reads the hero position.
#[derive(Debug, Clone)]
pub struct ChaseCamera {
    pub offset: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub sensitivity: f32,
}

impl Default for ChaseCamera {
    fn default() -> Self {
        let mut camera = Self {
            offset: Vec3::new(0.0, 0.16, -0.34),
            yaw: 0.0,
            pitch: 0.0,
            fov: 60.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.01,
            far: 1000.0,
            sensitivity: 0.003,
        };
        camera.look_along(Vec3::new(1.0, 2.0, 100.0));
        camera
    }
}

impl ChaseCamera {
    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    /// Point the camera along `direction`.
    pub fn look_along(&mut self, direction: Vec3) {
        let d = direction.normalize();
        self.yaw = d.z.atan2(d.x);
        self.pitch = d.y.asin();
    }

    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.sensitivity;
        self.pitch -= dy * self.sensitivity;
        self.pitch = self
            .pitch
            .clamp(-89.0_f32.to_radians(), 89.0_f32.to_radians());
    }

    /// The camera for this frame, placed relative to the hero.
    pub fn camera_for(&self, hero: Vec3) -> PerspectiveCamera {
        PerspectiveCamera {
            position: hero + self.offset,
            direction: self.forward(),
            up: Vec3::Y,
            fov_y: self.fov,
            aspect: self.aspect,
            near: self.near,
            far: self.far,
        }
    }
}
