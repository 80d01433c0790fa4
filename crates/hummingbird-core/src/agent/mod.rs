//! The hummingbird decision loop: observations in, actions out, rewards from
//! feeding and boundary hits.

mod heuristic;
mod placement;
#[cfg(test)]
mod tests;

pub use heuristic::ManualInput;
pub use placement::PlacementError;

use crate::area::FlowerArea;
use crate::config::{SimConfig, SimConfigError};
use crate::math::{
    clamp01, euler_degrees, move_towards, quat_from_euler_degrees, wrap_pitch, Pose,
};
use crate::physics::{ColliderId, ContactEvent, Physics, SurfaceTag};
use glam::Vec3;
use rand::Rng;
use std::{error::Error, fmt};
use tracing::debug;

pub const ACTION_SIZE: usize = 5;
pub const OBSERVATION_SIZE: usize = 10;

/// `[move x, move y, move z, pitch, yaw]`, each nominally in `[-1, 1]`.
pub type ActionVector = [f32; ACTION_SIZE];
pub type Observation = [f32; OBSERVATION_SIZE];

const FEED_AMOUNT: f32 = 0.01;
const NECTAR_REWARD: f32 = 0.01;
const ALIGNMENT_BONUS: f32 = 0.02;
const BOUNDARY_PENALTY: f32 = -0.5;
/// Units per second the smoothed pitch/yaw input may move.
const SMOOTHING_RATE: f32 = 2.0;

/// Physics capability and random source threaded into agent operations.
pub struct SimContext<P, R> {
    pub physics: P,
    pub rng: R,
}

impl<P, R> SimContext<P, R> {
    pub fn new(physics: P, rng: R) -> Self {
        Self { physics, rng }
    }
}

/// Line from the beak tip to the nearest nectar, drawn on frame ticks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DebugLine {
    pub from: Vec3,
    pub to: Vec3,
    pub color: [f32; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentError {
    Config(SimConfigError),
    Placement(PlacementError),
    FreezeInTraining,
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Config(e) => write!(f, "{e}"),
            AgentError::Placement(e) => write!(f, "{e}"),
            AgentError::FreezeInTraining => write!(f, "freeze/unfreeze not supported in training"),
        }
    }
}

impl Error for AgentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AgentError::Config(e) => Some(e),
            AgentError::Placement(e) => Some(e),
            AgentError::FreezeInTraining => None,
        }
    }
}

impl From<SimConfigError> for AgentError {
    fn from(err: SimConfigError) -> Self {
        AgentError::Config(err)
    }
}

impl From<PlacementError> for AgentError {
    fn from(err: PlacementError) -> Self {
        AgentError::Placement(err)
    }
}

/// Next pitch in degrees: wrapped out of `(180, 360]` then clamped.
pub fn next_pitch(current: f32, change: f32, max_pitch: f32) -> f32 {
    wrap_pitch(current + change).clamp(-max_pitch, max_pitch)
}

pub struct HummingbirdAgent {
    config: SimConfig,
    pose: Pose,
    /// Index into the area's flower list; the area owns the flowers.
    nearest_flower: Option<usize>,
    smooth_pitch_change: f32,
    smooth_yaw_change: f32,
    frozen: bool,
    nectar_obtained: f32,
    cumulative_reward: f32,
    pending_reward: f32,
}

impl HummingbirdAgent {
    pub fn new(config: SimConfig) -> Self {
        Self::try_new(config).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_new(config: SimConfig) -> Result<Self, SimConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            pose: Pose::default(),
            nearest_flower: None,
            smooth_pitch_change: 0.0,
            smooth_yaw_change: 0.0,
            frozen: false,
            nectar_obtained: 0.0,
            cumulative_reward: 0.0,
            pending_reward: 0.0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn training_mode(&self) -> bool {
        self.config.training_mode
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn pose_mut(&mut self) -> &mut Pose {
        &mut self.pose
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub fn beak_tip(&self) -> Vec3 {
        self.pose.transform_point(self.config.beak_tip_offset)
    }

    pub fn nearest_flower(&self) -> Option<usize> {
        self.nearest_flower
    }

    pub fn nectar_obtained(&self) -> f32 {
        self.nectar_obtained
    }

    pub fn cumulative_reward(&self) -> f32 {
        self.cumulative_reward
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn smoothed_changes(&self) -> (f32, f32) {
        (self.smooth_pitch_change, self.smooth_yaw_change)
    }

    pub fn add_reward(&mut self, reward: f32) {
        self.cumulative_reward += reward;
        self.pending_reward += reward;
    }

    /// Reward accumulated since the last call.
    pub fn take_step_reward(&mut self) -> f32 {
        std::mem::take(&mut self.pending_reward)
    }

    /// Starts a new episode. Panics if no safe spawn position exists.
    pub fn on_episode_begin<P: Physics, R: Rng>(
        &mut self,
        area: &mut FlowerArea,
        ctx: &mut SimContext<P, R>,
    ) {
        self.try_on_episode_begin(area, ctx)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_on_episode_begin<P: Physics, R: Rng>(
        &mut self,
        area: &mut FlowerArea,
        ctx: &mut SimContext<P, R>,
    ) -> Result<(), PlacementError> {
        if self.config.training_mode {
            area.reset_flowers(&mut ctx.rng);
            ctx.physics.sync_colliders(&area.colliders());
        }

        self.nectar_obtained = 0.0;
        self.cumulative_reward = 0.0;
        self.pending_reward = 0.0;
        ctx.physics.reset_velocity();

        let in_front_of_flower = if self.config.training_mode {
            ctx.rng.random::<f32>() > 0.5
        } else {
            true
        };
        self.move_to_safe_random_position(in_front_of_flower, area, ctx)?;
        self.update_nearest_flower(area);
        debug!(
            in_front_of_flower,
            nearest = ?self.nearest_flower,
            "episode begin"
        );
        Ok(())
    }

    /// Applies one decision. Index 0..3 move along world x/y/z, 3 pitches
    /// (+1 nose down), 4 yaws (+1 turn right).
    pub fn on_action_received<P: Physics + ?Sized>(
        &mut self,
        actions: &ActionVector,
        physics: &mut P,
    ) {
        if self.frozen {
            return;
        }
        let dt = self.config.fixed_delta_time;
        let movement = Vec3::new(actions[0], actions[1], actions[2]);
        physics.apply_force(movement * self.config.move_force);

        let (current_pitch, current_yaw, _) = euler_degrees(self.pose.rotation);
        self.smooth_pitch_change =
            move_towards(self.smooth_pitch_change, actions[3], SMOOTHING_RATE * dt);
        self.smooth_yaw_change =
            move_towards(self.smooth_yaw_change, actions[4], SMOOTHING_RATE * dt);

        let pitch = next_pitch(
            current_pitch,
            self.smooth_pitch_change * dt * self.config.pitch_speed,
            self.config.max_pitch_angle,
        );
        let yaw = current_yaw + self.smooth_yaw_change * dt * self.config.yaw_speed;
        self.pose.rotation = quat_from_euler_degrees(pitch, yaw, 0.0);
    }

    /// Ten observations: rotation (4), direction to nectar (3), alignment of
    /// that direction (1), alignment of the beak (1), relative distance (1).
    /// Without a target every value is zero.
    pub fn collect_observations(&self, area: &FlowerArea) -> Observation {
        let mut obs = [0.0; OBSERVATION_SIZE];
        let Some(nearest) = self.nearest_flower.map(|idx| area.flower(idx)) else {
            return obs;
        };

        let rotation = self.pose.rotation.normalize();
        let to_flower = nearest.center_position() - self.beak_tip();
        let direction = to_flower.normalize_or_zero();
        let facing = -nearest.up_vector().normalize_or_zero();

        obs[..4].copy_from_slice(&rotation.to_array());
        obs[4..7].copy_from_slice(&direction.to_array());
        obs[7] = direction.dot(facing);
        obs[8] = self.pose.forward().normalize_or_zero().dot(facing);
        obs[9] = to_flower.length() / self.config.area_diameter;
        obs
    }

    /// Routes a physics contact to the matching handler.
    pub fn on_contact<P: Physics + ?Sized>(
        &mut self,
        event: ContactEvent,
        area: &mut FlowerArea,
        physics: &P,
    ) {
        match event {
            ContactEvent::TriggerEnter { collider, tag }
            | ContactEvent::TriggerStay { collider, tag } => {
                self.on_trigger_enter_or_stay(collider, tag, area, physics)
            }
            ContactEvent::CollisionEnter { tag, .. } => self.on_collision_enter(tag),
        }
    }

    pub fn on_trigger_enter_or_stay<P: Physics + ?Sized>(
        &mut self,
        collider: ColliderId,
        tag: SurfaceTag,
        area: &mut FlowerArea,
        physics: &P,
    ) {
        if tag != SurfaceTag::Nectar {
            return;
        }
        let beak_tip = self.beak_tip();
        let Some(closest) = physics.closest_point(collider, beak_tip) else {
            return;
        };
        if beak_tip.distance(closest) >= self.config.beak_tip_radius {
            return;
        }

        let fed = area.flower_for_nectar(collider);
        let nectar_received = area.flower_mut(fed).feed(FEED_AMOUNT);
        self.nectar_obtained += nectar_received;

        if self.config.training_mode {
            let target = area.flower(self.nearest_flower.unwrap_or(fed));
            let alignment = self
                .pose
                .forward()
                .normalize_or_zero()
                .dot(-target.up_vector().normalize_or_zero());
            self.add_reward(NECTAR_REWARD + ALIGNMENT_BONUS * clamp01(alignment));
        }

        if !area.flower(fed).has_nectar() {
            debug!(flower = fed, "flower drained");
            self.update_nearest_flower(area);
        }
    }

    pub fn on_collision_enter(&mut self, tag: SurfaceTag) {
        if self.config.training_mode && tag == SurfaceTag::Boundary {
            self.add_reward(BOUNDARY_PENALTY);
        }
    }

    /// Fixed-tick safety check: if the target was drained by someone else,
    /// pick a new one so the agent does not fixate on an empty flower.
    pub fn fixed_update(&mut self, area: &FlowerArea) {
        if let Some(idx) = self.nearest_flower {
            if !area.flower(idx).has_nectar() {
                self.update_nearest_flower(area);
            }
        }
    }

    /// Frame-tick debug line from the beak tip to the target nectar.
    pub fn debug_line(&self, area: &FlowerArea) -> Option<DebugLine> {
        self.nearest_flower.map(|idx| DebugLine {
            from: self.beak_tip(),
            to: area.flower(idx).center_position(),
            color: [0.0, 1.0, 0.0],
        })
    }

    /// Rescans every flower with nectar for the one closest to the beak tip.
    /// Ties go to the earlier flower.
    pub fn update_nearest_flower(&mut self, area: &FlowerArea) {
        let beak_tip = self.beak_tip();
        let mut best: Option<(usize, f32)> = None;
        for (idx, flower) in area.flowers().iter().enumerate() {
            if !flower.has_nectar() {
                continue;
            }
            let distance = flower.position().distance(beak_tip);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((idx, distance));
            }
        }
        let nearest = best.map(|(idx, _)| idx);
        if nearest != self.nearest_flower {
            debug!(from = ?self.nearest_flower, to = ?nearest, "nearest flower changed");
        }
        self.nearest_flower = nearest;
    }

    /// Suspends action processing. Panics in training mode.
    pub fn freeze_agent<P: Physics + ?Sized>(&mut self, physics: &mut P) {
        self.try_freeze_agent(physics)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_freeze_agent<P: Physics + ?Sized>(
        &mut self,
        physics: &mut P,
    ) -> Result<(), AgentError> {
        if self.config.training_mode {
            return Err(AgentError::FreezeInTraining);
        }
        self.frozen = true;
        physics.sleep();
        Ok(())
    }

    /// Resumes action processing. Panics in training mode.
    pub fn unfreeze_agent<P: Physics + ?Sized>(&mut self, physics: &mut P) {
        self.try_unfreeze_agent(physics)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_unfreeze_agent<P: Physics + ?Sized>(
        &mut self,
        physics: &mut P,
    ) -> Result<(), AgentError> {
        if self.config.training_mode {
            return Err(AgentError::FreezeInTraining);
        }
        self.frozen = false;
        physics.wake_up();
        Ok(())
    }
}
