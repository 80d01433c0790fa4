use super::{ActionVector, HummingbirdAgent};
use glam::Vec3;

/// Raw directional input for manual control. When both keys of a pair are
/// held, the first-listed one wins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManualInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub down: bool,
    pub up: bool,
    pub pitch_down: bool,
    pub pitch_up: bool,
    pub turn_left: bool,
    pub turn_right: bool,
}

impl HummingbirdAgent {
    /// Maps manual input onto the same action shape a policy produces. Moves
    /// are relative to the agent's current axes and combined into one unit
    /// world-space direction.
    pub fn heuristic(&self, input: &ManualInput) -> ActionVector {
        let pose = self.pose();
        let forward = if input.forward {
            pose.forward()
        } else if input.backward {
            -pose.forward()
        } else {
            Vec3::ZERO
        };
        let left = if input.left {
            -pose.right()
        } else if input.right {
            pose.right()
        } else {
            Vec3::ZERO
        };
        let up = if input.down {
            -pose.up()
        } else if input.up {
            pose.up()
        } else {
            Vec3::ZERO
        };
        let pitch = if input.pitch_down {
            1.0
        } else if input.pitch_up {
            -1.0
        } else {
            0.0
        };
        let yaw = if input.turn_left {
            -1.0
        } else if input.turn_right {
            1.0
        } else {
            0.0
        };

        let combined = (forward + left + up).normalize_or_zero();
        [combined.x, combined.y, combined.z, pitch, yaw]
    }
}
