use envprobe_common::PerspectiveCamera;
use glam::Vec3;

/// One of the six cube directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CubeFace {
    NegX,
    NegY,
    NegZ,
    PosX,
    PosY,
    PosZ,
}

impl CubeFace {
    /// Capture order. Also the index order of per-face arrays.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::NegX,
        CubeFace::NegY,
        CubeFace::NegZ,
        CubeFace::PosX,
        CubeFace::PosY,
        CubeFace::PosZ,
    ];

    /// Position in [`CubeFace::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Array layer of this face in a cube image (+X, -X, +Y, -Y, +Z, -Z).
    pub const fn layer(self) -> u32 {
        match self {
            CubeFace::PosX => 0,
            CubeFace::NegX => 1,
            CubeFace::PosY => 2,
            CubeFace::NegY => 3,
            CubeFace::PosZ => 4,
            CubeFace::NegZ => 5,
        }
    }

    pub const fn direction(self) -> Vec3 {
        match self {
            CubeFace::NegX => Vec3::NEG_X,
            CubeFace::NegY => Vec3::NEG_Y,
            CubeFace::NegZ => Vec3::NEG_Z,
            CubeFace::PosX => Vec3::X,
            CubeFace::PosY => Vec3::Y,
            CubeFace::PosZ => Vec3::Z,
        }
    }

    /// Up vector of the capture camera for this face.
    ///
    /// `PosY` uses -Z where the usual cube-map basis has +Z, which turns the
    /// captured top face by 180 degrees. Kept as is; see
    /// [`CubeFace::conventional_up`].
    pub const fn up(self) -> Vec3 {
        match self {
            CubeFace::NegX => Vec3::NEG_Y,
            CubeFace::NegY => Vec3::NEG_Z,
            CubeFace::NegZ => Vec3::NEG_Y,
            CubeFace::PosX => Vec3::NEG_Y,
            CubeFace::PosY => Vec3::NEG_Z,
            CubeFace::PosZ => Vec3::NEG_Y,
        }
    }

    /// Up vector of the standard cube-map face basis.
    pub const fn conventional_up(self) -> Vec3 {
        match self {
            CubeFace::PosY => Vec3::Z,
            CubeFace::NegY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CubeFace::NegX => "negx",
            CubeFace::NegY => "negy",
            CubeFace::NegZ => "negz",
            CubeFace::PosX => "posx",
            CubeFace::PosY => "posy",
            CubeFace::PosZ => "posz",
        }
    }

    /// A 90 degree square camera looking through this face from the origin.
    pub fn capture_camera(self) -> PerspectiveCamera {
        PerspectiveCamera {
            position: Vec3::ZERO,
            direction: self.direction(),
            up: self.up(),
            fov_y: std::f32::consts::FRAC_PI_2,
            aspect: 1.0,
            ..PerspectiveCamera::default()
        }
    }
}

impl std::fmt::Display for CubeFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
