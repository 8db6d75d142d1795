use glam::{Mat4, Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Spatial transform: position, rotation, scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Translation followed by non-uniform scale, no rotation.
    pub fn from_position_scale(position: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            scale,
            ..Self::default()
        }
    }

    /// Rotation from Euler angles in degrees, applied X then Y then Z.
    pub fn with_euler_degrees(mut self, degrees: Vec3) -> Self {
        self.rotation = Quat::from_euler(
            glam::EulerRot::ZYX,
            degrees.z.to_radians(),
            degrees.y.to_radians(),
            degrees.x.to_radians(),
        );
        self
    }

    /// Model matrix `T * R * S`.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// An 8-bit RGB color, as edited in the UI and stored in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb8(pub [u8; 3]);

impl Default for Rgb8 {
    fn default() -> Self {
        Self([255, 255, 255])
    }
}

impl Rgb8 {
    /// Normalized to `[0, 1]` per channel with full opacity.
    pub fn to_rgba(self) -> Vec4 {
        let [r, g, b] = self.0;
        Vec4::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0)
    }
}
