use super::{HummingbirdAgent, SimContext};
use crate::area::FlowerArea;
use crate::math::{look_rotation, quat_from_euler_degrees, Pose};
use crate::physics::Physics;
use glam::Vec3;
use rand::Rng;
use std::{error::Error, fmt};
use tracing::{trace, warn};

pub(crate) const MAX_PLACEMENT_ATTEMPTS: u32 = 100;
/// Clearance radius a spawn point must have.
const SPAWN_CLEARANCE: f32 = 0.05;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    /// Asked to spawn in front of a flower in an area that has none.
    NoFlowers,
    /// Every candidate overlapped a collider.
    Exhausted { attempts: u32 },
}

impl fmt::Display for PlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementError::NoFlowers => {
                write!(f, "cannot spawn in front of a flower: area has no flowers")
            }
            PlacementError::Exhausted { attempts } => write!(
                f,
                "could not find a safe position to spawn after {attempts} attempts"
            ),
        }
    }
}

impl Error for PlacementError {}

impl HummingbirdAgent {
    /// Moves to a random collision-free spot, either hovering in front of a
    /// random flower or somewhere in the open around the area centre.
    pub(crate) fn move_to_safe_random_position<P: Physics, R: Rng>(
        &mut self,
        in_front_of_flower: bool,
        area: &FlowerArea,
        ctx: &mut SimContext<P, R>,
    ) -> Result<(), PlacementError> {
        if in_front_of_flower && area.flowers().is_empty() {
            return Err(PlacementError::NoFlowers);
        }

        let arena = area.arena();
        let lo = arena.min.min(arena.max) + Vec3::splat(SPAWN_CLEARANCE);
        let hi = arena.max.max(arena.min) - Vec3::splat(SPAWN_CLEARANCE);

        for attempt in 1..=MAX_PLACEMENT_ATTEMPTS {
            let candidate = if in_front_of_flower {
                let flowers = area.flowers();
                let flower = &flowers[ctx.rng.random_range(0..flowers.len())];
                let distance_from_flower = ctx.rng.random_range(0.1f32..=0.2);
                let position = flower.position() + flower.up_vector() * distance_from_flower;
                let to_flower = flower.center_position() - position;
                Pose::new(position, look_rotation(to_flower, Vec3::Y))
            } else {
                let height = ctx.rng.random_range(1.2f32..=2.5);
                let radius = ctx.rng.random_range(2.0f32..=7.0);
                let yaw = ctx.rng.random_range(-180.0f32..=180.0);
                let direction = quat_from_euler_degrees(0.0, yaw, 0.0);
                let position = area.center() + Vec3::Y * height + direction * Vec3::Z * radius;
                let pitch = ctx.rng.random_range(-60.0f32..=60.0);
                let yaw = ctx.rng.random_range(-180.0f32..=180.0);
                Pose::new(position, quat_from_euler_degrees(pitch, yaw, 0.0))
            };

            // Outside the arena the body would be snapped onto a wall.
            let inside = candidate.position.cmpge(lo).all() && candidate.position.cmple(hi).all();
            if inside
                && ctx
                    .physics
                    .overlap_sphere(candidate.position, SPAWN_CLEARANCE)
                    .is_empty()
            {
                trace!(attempt, position = ?candidate.position, "spawn position found");
                self.pose = candidate;
                return Ok(());
            }
        }

        warn!(in_front_of_flower, "no safe spawn position");
        Err(PlacementError::Exhausted {
            attempts: MAX_PLACEMENT_ATTEMPTS,
        })
    }
}
