//! Rotation helpers. Euler angles are in degrees and follow the
//! yaw-pitch-roll convention: `rotation = yaw(Y) * pitch(X) * roll(Z)`, with
//! +Z forward and +Y up.

use glam::{EulerRot, Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position and orientation of a body in world space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Transform a point from this pose's local frame into world space.
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }
}

pub fn quat_from_euler_degrees(pitch: f32, yaw: f32, roll: f32) -> Quat {
    Quat::from_euler(
        EulerRot::YXZ,
        yaw.to_radians(),
        pitch.to_radians(),
        roll.to_radians(),
    )
}

/// Returns `(pitch, yaw, roll)` in degrees, each normalised to `[0, 360)`.
pub fn euler_degrees(rotation: Quat) -> (f32, f32, f32) {
    let (yaw, pitch, roll) = rotation.to_euler(EulerRot::YXZ);
    (
        normalize_degrees(pitch.to_degrees()),
        normalize_degrees(yaw.to_degrees()),
        normalize_degrees(roll.to_degrees()),
    )
}

pub fn normalize_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Maps a pitch in `(180, 360]` down by a full turn so the agent never flips
/// over when pitching past the horizon. Other values pass through.
pub fn wrap_pitch(pitch: f32) -> f32 {
    if pitch > 180.0 {
        pitch - 360.0
    } else {
        pitch
    }
}

/// Rotation whose +Z axis points along `forward` and whose +Y axis is as close
/// to `up` as possible.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let z = forward.normalize_or_zero();
    if z == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let x = up.cross(z);
    if x.length_squared() <= f32::EPSILON {
        return Quat::from_rotation_arc(Vec3::Z, z);
    }
    let x = x.normalize();
    let y = z.cross(x);
    Quat::from_mat3(&Mat3::from_cols(x, y, z)).normalize()
}

/// Moves `current` toward `target` by at most `max_delta`.
pub fn move_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    if (target - current).abs() <= max_delta {
        target
    } else {
        current + (target - current).signum() * max_delta
    }
}

pub fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}
