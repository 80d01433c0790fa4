use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Deterministic seed for reproducible episodes.
    pub seed: u64,
    /// When true the agent is driven by a learner: flowers are reset every
    /// episode, spawn placement is randomised and rewards are accumulated.
    pub training_mode: bool,
    /// Force applied per unit of move action.
    pub move_force: f32,
    /// Degrees per second of pitch at full smoothed pitch input.
    pub pitch_speed: f32,
    /// Degrees per second of yaw at full smoothed yaw input.
    pub yaw_speed: f32,
    /// Pitch is clamped to `[-max_pitch_angle, max_pitch_angle]` degrees.
    pub max_pitch_angle: f32,
    /// A nectar contact only counts when the beak tip is closer than this.
    pub beak_tip_radius: f32,
    /// Beak tip position in the agent's local frame.
    pub beak_tip_offset: Vec3,
    /// Normalisation constant for the distance observation.
    pub area_diameter: f32,
    /// Fixed tick duration in seconds.
    pub fixed_delta_time: f32,
    /// Fixed ticks per training episode. 0 means unlimited; forced to 0
    /// outside training mode.
    pub max_steps: u32,
    /// Radius of the agent body used for trigger detection.
    pub body_radius: f32,
    /// Agent rigid-body mass.
    pub mass: f32,
    /// Linear velocity damping per second.
    pub linear_drag: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            training_mode: true,
            move_force: 2.0,
            pitch_speed: 100.0,
            yaw_speed: 100.0,
            max_pitch_angle: 80.0,
            beak_tip_radius: 0.008,
            beak_tip_offset: Vec3::new(0.0, 0.0, 0.1),
            area_diameter: 20.0,
            fixed_delta_time: 0.02,
            max_steps: 5000,
            body_radius: 0.08,
            mass: 1.0,
            linear_drag: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimConfigError {
    NonPositive { field: &'static str, value: f32 },
    Negative { field: &'static str, value: f32 },
    InvalidMaxPitch(f32),
    NonFiniteBeakTip,
}

impl fmt::Display for SimConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimConfigError::NonPositive { field, value } => {
                write!(f, "{field} must be positive and finite (got {value})")
            }
            SimConfigError::Negative { field, value } => {
                write!(f, "{field} must be non-negative and finite (got {value})")
            }
            SimConfigError::InvalidMaxPitch(v) => {
                write!(f, "max_pitch_angle must be in (0, 90) degrees (got {v})")
            }
            SimConfigError::NonFiniteBeakTip => write!(f, "beak_tip_offset must be finite"),
        }
    }
}

impl Error for SimConfigError {}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimConfigError> {
        let positive = [
            ("move_force", self.move_force),
            ("pitch_speed", self.pitch_speed),
            ("yaw_speed", self.yaw_speed),
            ("beak_tip_radius", self.beak_tip_radius),
            ("area_diameter", self.area_diameter),
            ("fixed_delta_time", self.fixed_delta_time),
            ("body_radius", self.body_radius),
            ("mass", self.mass),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimConfigError::NonPositive { field, value });
            }
        }
        if !(self.linear_drag.is_finite() && self.linear_drag >= 0.0) {
            return Err(SimConfigError::Negative {
                field: "linear_drag",
                value: self.linear_drag,
            });
        }
        if !(self.max_pitch_angle > 0.0 && self.max_pitch_angle < 90.0) {
            return Err(SimConfigError::InvalidMaxPitch(self.max_pitch_angle));
        }
        if !self.beak_tip_offset.is_finite() {
            return Err(SimConfigError::NonFiniteBeakTip);
        }
        Ok(())
    }

    /// Step limit actually enforced for an episode.
    pub fn effective_max_steps(&self) -> u32 {
        if self.training_mode {
            self.max_steps
        } else {
            0
        }
    }
}
