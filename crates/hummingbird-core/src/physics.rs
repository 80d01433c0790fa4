//! Physics capability consumed by the agent, plus a small kinematic
//! reference implementation used by the environment driver.

use crate::math::Pose;
use glam::Vec3;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColliderId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceTag {
    Nectar,
    Boundary,
    Flower,
    Untagged,
}

/// Contact notifications delivered to the agent by whoever integrates physics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ContactEvent {
    TriggerEnter {
        collider: ColliderId,
        tag: SurfaceTag,
    },
    TriggerStay {
        collider: ColliderId,
        tag: SurfaceTag,
    },
    CollisionEnter {
        collider: ColliderId,
        tag: SurfaceTag,
    },
}

/// What the agent needs from a physics engine.
pub trait Physics {
    /// Adds a world-space force to the agent body for the next integration.
    fn apply_force(&mut self, force: Vec3);

    /// Zeroes linear and angular velocity of the agent body.
    fn reset_velocity(&mut self);

    fn sleep(&mut self) {}

    fn wake_up(&mut self) {}

    /// Pushes current collider geometry and activation into the engine.
    /// Called after anything in the scene moved or toggled.
    fn sync_colliders(&mut self, _colliders: &[Collider]) {}

    /// Enabled colliders intersecting the sphere.
    fn overlap_sphere(&self, center: Vec3, radius: f32) -> Vec<ColliderId>;

    /// Closest point on `collider` to `point`; `None` if the collider is unknown.
    fn closest_point(&self, collider: ColliderId, point: Vec3) -> Option<Vec3>;
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Sphere { center: Vec3, radius: f32 },
    Cuboid { min: Vec3, max: Vec3 },
}

impl Shape {
    fn bounds(&self) -> (Vec3, Vec3) {
        match *self {
            Shape::Sphere { center, radius } => {
                (center - Vec3::splat(radius), center + Vec3::splat(radius))
            }
            Shape::Cuboid { min, max } => (min, max),
        }
    }

    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        match *self {
            Shape::Sphere { center, radius } => {
                let offset = point - center;
                if offset.length_squared() <= radius * radius {
                    point
                } else {
                    center + offset.normalize() * radius
                }
            }
            Shape::Cuboid { min, max } => point.clamp(min, max),
        }
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.closest_point(center).distance_squared(center) <= radius * radius
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Collider {
    pub id: ColliderId,
    pub tag: SurfaceTag,
    pub shape: Shape,
    pub is_trigger: bool,
    pub enabled: bool,
}

#[derive(Clone, Debug)]
struct IndexedCollider {
    slot: usize,
    min: [f32; 3],
    max: [f32; 3],
}

impl RTreeObject for IndexedCollider {
    type Envelope = AABB<[f32; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

/// Axis-aligned box the agent cannot leave. Touching it is a collision with a
/// `Boundary` surface.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    pub id: ColliderId,
    pub min: Vec3,
    pub max: Vec3,
}

/// Point-mass agent body moving among static colliders.
///
/// Forces accumulate until the next [`KinematicWorld::step`], which integrates
/// velocity with linear drag, confines the body to the arena and reports
/// boundary collisions and trigger overlaps. Solid flower colliders only take
/// part in overlap queries; the body passes through them.
pub struct KinematicWorld {
    colliders: Vec<Collider>,
    slots: HashMap<ColliderId, usize>,
    tree: RTree<IndexedCollider>,
    arena: Arena,
    mass: f32,
    linear_drag: f32,
    velocity: Vec3,
    pending_force: Vec3,
    asleep: bool,
    touching_boundary: bool,
    triggers_inside: HashSet<ColliderId>,
}

impl KinematicWorld {
    pub fn new(arena: Arena, mass: f32, linear_drag: f32) -> Self {
        Self {
            colliders: Vec::new(),
            slots: HashMap::new(),
            tree: RTree::new(),
            arena,
            mass,
            linear_drag,
            velocity: Vec3::ZERO,
            pending_force: Vec3::ZERO,
            asleep: false,
            touching_boundary: false,
            triggers_inside: HashSet::new(),
        }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn is_asleep(&self) -> bool {
        self.asleep
    }

    pub fn collider(&self, id: ColliderId) -> Option<&Collider> {
        self.slots.get(&id).map(|&slot| &self.colliders[slot])
    }

    pub fn colliders(&self) -> &[Collider] {
        &self.colliders
    }

    /// Inserts or replaces a collider. Call [`Self::rebuild_index`] after a
    /// batch of geometry changes.
    pub fn upsert_collider(&mut self, collider: Collider) {
        match self.slots.get(&collider.id) {
            Some(&slot) => self.colliders[slot] = collider,
            None => {
                self.slots.insert(collider.id, self.colliders.len());
                self.colliders.push(collider);
            }
        }
    }

    pub fn set_enabled(&mut self, id: ColliderId, enabled: bool) {
        if let Some(&slot) = self.slots.get(&id) {
            self.colliders[slot].enabled = enabled;
        }
    }

    /// Rebuilds the R*-tree over collider bounds via bulk_load.
    pub fn rebuild_index(&mut self) {
        let entries = self
            .colliders
            .iter()
            .enumerate()
            .map(|(slot, c)| {
                let (min, max) = c.shape.bounds();
                IndexedCollider {
                    slot,
                    min: min.to_array(),
                    max: max.to_array(),
                }
            })
            .collect();
        self.tree = RTree::bulk_load(entries);
    }

    /// Envelope query on the tree, then exact shape test.
    fn query(&self, center: Vec3, radius: f32) -> Vec<&Collider> {
        let envelope = AABB::from_corners(
            (center - Vec3::splat(radius)).to_array(),
            (center + Vec3::splat(radius)).to_array(),
        );
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| &self.colliders[entry.slot])
            .filter(|c| c.enabled && c.shape.intersects_sphere(center, radius))
            .collect()
    }

    /// Integrates one fixed tick and returns the contacts it produced.
    ///
    /// `body` lists the spheres making up the agent, in world space relative
    /// to the pose before integration; they move with the pose.
    pub fn step(
        &mut self,
        pose: &mut Pose,
        body: &[(Vec3, f32)],
        dt: f32,
    ) -> Vec<ContactEvent> {
        let mut events = Vec::new();
        if self.asleep {
            self.pending_force = Vec3::ZERO;
            return events;
        }

        self.velocity += self.pending_force / self.mass * dt;
        self.pending_force = Vec3::ZERO;
        self.velocity *= 1.0 / (1.0 + self.linear_drag * dt);

        let target = pose.position + self.velocity * dt;
        let lo = self.arena.min.min(self.arena.max);
        let hi = self.arena.max.max(self.arena.min);
        let confined = target.clamp(lo, hi);
        let hit_boundary = confined != target;
        if hit_boundary {
            for axis in 0..3 {
                if confined[axis] != target[axis] {
                    self.velocity[axis] = 0.0;
                }
            }
            if !self.touching_boundary {
                events.push(ContactEvent::CollisionEnter {
                    collider: self.arena.id,
                    tag: SurfaceTag::Boundary,
                });
            }
        }
        self.touching_boundary = hit_boundary;

        let moved = confined - pose.position;
        pose.position = confined;

        let mut inside = HashSet::new();
        for &(center, radius) in body {
            for collider in self.query(center + moved, radius) {
                if !collider.is_trigger || !inside.insert(collider.id) {
                    continue;
                }
                events.push(if self.triggers_inside.contains(&collider.id) {
                    ContactEvent::TriggerStay {
                        collider: collider.id,
                        tag: collider.tag,
                    }
                } else {
                    ContactEvent::TriggerEnter {
                        collider: collider.id,
                        tag: collider.tag,
                    }
                });
            }
        }
        self.triggers_inside = inside;
        events
    }
}

impl Physics for KinematicWorld {
    fn apply_force(&mut self, force: Vec3) {
        self.pending_force += force;
    }

    fn reset_velocity(&mut self) {
        // No rotational state: orientation is set directly by the agent.
        self.velocity = Vec3::ZERO;
        self.pending_force = Vec3::ZERO;
    }

    fn sleep(&mut self) {
        self.asleep = true;
    }

    fn wake_up(&mut self) {
        self.asleep = false;
    }

    fn sync_colliders(&mut self, colliders: &[Collider]) {
        for collider in colliders {
            self.upsert_collider(*collider);
        }
        self.rebuild_index();
    }

    fn overlap_sphere(&self, center: Vec3, radius: f32) -> Vec<ColliderId> {
        let mut hits: Vec<ColliderId> = self.query(center, radius).iter().map(|c| c.id).collect();
        hits.sort_unstable();
        hits
    }

    fn closest_point(&self, collider: ColliderId, point: Vec3) -> Option<Vec3> {
        self.collider(collider)
            .map(|c| c.shape.closest_point(point))
    }
}
