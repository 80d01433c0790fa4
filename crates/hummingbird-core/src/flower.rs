use crate::physics::ColliderId;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Display colour of a flower holding nectar.
pub const FULL_FLOWER_COLOR: [f32; 3] = [1.0, 0.0, 0.3];
/// Display colour of a drained flower.
pub const EMPTY_FLOWER_COLOR: [f32; 3] = [0.5, 0.0, 1.0];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowerColor {
    Full,
    Empty,
}

impl FlowerColor {
    pub fn rgb(self) -> [f32; 3] {
        match self {
            FlowerColor::Full => FULL_FLOWER_COLOR,
            FlowerColor::Empty => EMPTY_FLOWER_COLOR,
        }
    }
}

/// A single flower with a depletable nectar supply in `[0, 1]`.
///
/// The flower owns two colliders: a solid body collider and the nectar
/// trigger the agent's beak feeds from. Both are disabled when the nectar runs
/// out and re-enabled on reset.
#[derive(Clone, Debug)]
pub struct Flower {
    pub(crate) name: String,
    pub(crate) flower_collider: ColliderId,
    pub(crate) nectar_collider: ColliderId,
    pub(crate) position: Vec3,
    pub(crate) up: Vec3,
    pub(crate) nectar_depth: f32,
    nectar_amount: f32,
    flower_collider_active: bool,
    nectar_collider_active: bool,
    color: FlowerColor,
}

impl Flower {
    pub fn new(
        name: impl Into<String>,
        flower_collider: ColliderId,
        nectar_collider: ColliderId,
        position: Vec3,
        up: Vec3,
        nectar_depth: f32,
    ) -> Self {
        Self {
            name: name.into(),
            flower_collider,
            nectar_collider,
            position,
            up: up.normalize_or_zero(),
            nectar_depth,
            nectar_amount: 1.0,
            flower_collider_active: true,
            nectar_collider_active: true,
            color: FlowerColor::Full,
        }
    }

    /// Takes up to `amount` nectar and returns how much was actually taken.
    ///
    /// The stored amount is decremented by the full request before being
    /// floored at zero, so reward accounting only ever sees the clamped value.
    pub fn feed(&mut self, amount: f32) -> f32 {
        let nectar_taken = amount.clamp(0.0, self.nectar_amount);
        self.nectar_amount -= amount;

        if self.nectar_amount <= 0.0 {
            self.nectar_amount = 0.0;
            self.flower_collider_active = false;
            self.nectar_collider_active = false;
            self.color = FlowerColor::Empty;
        }
        nectar_taken
    }

    pub fn reset(&mut self) {
        self.nectar_amount = 1.0;
        self.flower_collider_active = true;
        self.nectar_collider_active = true;
        self.color = FlowerColor::Full;
    }

    pub fn has_nectar(&self) -> bool {
        self.nectar_amount > 0.0
    }

    pub fn nectar_amount(&self) -> f32 {
        self.nectar_amount
    }

    pub fn is_active(&self) -> bool {
        self.flower_collider_active && self.nectar_collider_active
    }

    pub fn flower_collider_active(&self) -> bool {
        self.flower_collider_active
    }

    pub fn nectar_collider_active(&self) -> bool {
        self.nectar_collider_active
    }

    pub fn color(&self) -> FlowerColor {
        self.color
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flower_collider(&self) -> ColliderId {
        self.flower_collider
    }

    pub fn nectar_collider(&self) -> ColliderId {
        self.nectar_collider
    }

    /// World position of the flower base.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Unit normal of the feeding surface.
    pub fn up_vector(&self) -> Vec3 {
        self.up
    }

    /// World position of the nectar trigger centre.
    pub fn center_position(&self) -> Vec3 {
        self.position + self.up * self.nectar_depth
    }

    pub(crate) fn set_world_pose(&mut self, position: Vec3, up: Vec3) {
        self.position = position;
        self.up = up.normalize_or_zero();
    }
}
