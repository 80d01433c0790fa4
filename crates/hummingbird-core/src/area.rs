use crate::flower::Flower;
use crate::math::quat_from_euler_degrees;
use crate::physics::{Arena, Collider, ColliderId, Shape, SurfaceTag};
use glam::{Quat, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::f32::consts::TAU;
use std::{error::Error, fmt};
use tracing::debug;

/// Collider id reserved for the area boundary.
pub const ARENA_COLLIDER: ColliderId = ColliderId(0);

/// Collider wiring and geometry for one flower node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowerSpec {
    pub flower_collider: ColliderId,
    pub nectar_collider: ColliderId,
    /// Feeding-surface normal in the parent's frame.
    #[serde(default = "FlowerSpec::default_up")]
    pub up: Vec3,
    /// Distance from the flower base to the nectar centre along `up`.
    #[serde(default = "FlowerSpec::default_nectar_depth")]
    pub nectar_depth: f32,
    #[serde(default = "FlowerSpec::default_body_radius")]
    pub body_radius: f32,
    #[serde(default = "FlowerSpec::default_nectar_radius")]
    pub nectar_radius: f32,
}

impl FlowerSpec {
    fn default_up() -> Vec3 {
        Vec3::Y
    }

    fn default_nectar_depth() -> f32 {
        0.02
    }

    fn default_body_radius() -> f32 {
        0.04
    }

    fn default_nectar_radius() -> f32 {
        0.015
    }

    pub fn new(flower_collider: ColliderId, nectar_collider: ColliderId, up: Vec3) -> Self {
        Self {
            flower_collider,
            nectar_collider,
            up,
            nectar_depth: Self::default_nectar_depth(),
            body_radius: Self::default_body_radius(),
            nectar_radius: Self::default_nectar_radius(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Plain grouping node; its children are scanned.
    Group,
    /// Rotatable cluster owning the flowers beneath it.
    PlantGroup,
    Flower(FlowerSpec),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub name: String,
    /// Index of the parent node; must precede this node. `None` for children
    /// of the area root.
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub local_position: Vec3,
    pub kind: NodeKind,
}

/// Already-loaded hierarchy description of a flower area.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AreaLayout {
    pub center: Vec3,
    /// Half width of the square arena floor.
    pub half_extent: f32,
    /// Arena ceiling above the centre.
    pub height: f32,
    pub nodes: Vec<SceneNode>,
}

impl AreaLayout {
    /// Ring of plants around the centre, each carrying flowers at staggered
    /// heights facing outward.
    pub fn procedural<R: Rng + ?Sized>(
        rng: &mut R,
        plants: usize,
        flowers_per_plant: usize,
    ) -> Self {
        let mut nodes = vec![SceneNode {
            name: "Flowers".to_string(),
            parent: None,
            local_position: Vec3::ZERO,
            kind: NodeKind::Group,
        }];
        let mut next_collider = ARENA_COLLIDER.0 + 1;
        for p in 0..plants {
            let angle = p as f32 / plants.max(1) as f32 * TAU + rng.random_range(-0.2f32..=0.2);
            let radius = rng.random_range(2.5f32..=6.5);
            let plant_index = nodes.len();
            nodes.push(SceneNode {
                name: format!("FlowerPlant{p}"),
                parent: Some(0),
                local_position: Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius),
                kind: NodeKind::PlantGroup,
            });
            for f in 0..flowers_per_plant {
                let a = f as f32 / flowers_per_plant.max(1) as f32 * TAU;
                let outward = Vec3::new(a.cos(), 0.0, a.sin());
                nodes.push(SceneNode {
                    name: format!("Flower{p}_{f}"),
                    parent: Some(plant_index),
                    local_position: outward * 0.25 + Vec3::Y * (0.6 + 0.15 * f as f32),
                    kind: NodeKind::Flower(FlowerSpec::new(
                        ColliderId(next_collider),
                        ColliderId(next_collider + 1),
                        (outward + Vec3::Y * 0.6).normalize(),
                    )),
                });
                next_collider += 2;
            }
        }
        Self {
            center: Vec3::ZERO,
            half_extent: 10.0,
            height: 6.0,
            nodes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AreaBuildError {
    InvalidParent { node: usize, parent: usize },
    DuplicateCollider(ColliderId),
    ReservedCollider(ColliderId),
    InvalidExtent { half_extent: f32, height: f32 },
    NonFinitePosition { node: usize },
    /// Feeding-surface normal is zero or non-finite.
    InvalidFlowerUp { node: usize },
}

impl fmt::Display for AreaBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AreaBuildError::InvalidParent { node, parent } => write!(
                f,
                "node {node} names parent {parent}, which does not precede it"
            ),
            AreaBuildError::DuplicateCollider(id) => {
                write!(f, "collider {} is wired to more than one surface", id.0)
            }
            AreaBuildError::ReservedCollider(id) => {
                write!(f, "collider {} is reserved for the area boundary", id.0)
            }
            AreaBuildError::InvalidExtent { half_extent, height } => write!(
                f,
                "arena extent must be positive (half_extent {half_extent}, height {height})"
            ),
            AreaBuildError::NonFinitePosition { node } => {
                write!(f, "node {node} has a non-finite local position")
            }
            AreaBuildError::InvalidFlowerUp { node } => {
                write!(f, "flower node {node} needs a finite, non-zero up vector")
            }
        }
    }
}

impl Error for AreaBuildError {}

/// Owns every flower in a region and indexes them by nectar collider.
///
/// The flower list, plant list and lookup are built once from the layout and
/// never change shape afterwards; only plant rotations and flower state do.
pub struct FlowerArea {
    center: Vec3,
    half_extent: f32,
    height: f32,
    nodes: Vec<SceneNode>,
    flowers: Vec<Flower>,
    flower_nodes: Vec<usize>,
    plants: Vec<usize>,
    /// Per-node local rotation; only plant groups are ever non-identity.
    node_rotations: Vec<Quat>,
    nectar_flower_lookup: HashMap<ColliderId, usize>,
}

impl FlowerArea {
    pub fn new(layout: AreaLayout) -> Self {
        Self::try_new(layout).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_new(layout: AreaLayout) -> Result<Self, AreaBuildError> {
        if !(layout.half_extent > 0.0 && layout.height > 0.0) {
            return Err(AreaBuildError::InvalidExtent {
                half_extent: layout.half_extent,
                height: layout.height,
            });
        }
        for (idx, node) in layout.nodes.iter().enumerate() {
            if !node.local_position.is_finite() {
                return Err(AreaBuildError::NonFinitePosition { node: idx });
            }
            if let NodeKind::Flower(spec) = &node.kind {
                if !(spec.up.is_finite() && spec.up.length_squared() > f32::EPSILON) {
                    return Err(AreaBuildError::InvalidFlowerUp { node: idx });
                }
            }
        }
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); layout.nodes.len()];
        let mut roots = Vec::new();
        for (idx, node) in layout.nodes.iter().enumerate() {
            match node.parent {
                Some(parent) if parent >= idx => {
                    return Err(AreaBuildError::InvalidParent { node: idx, parent });
                }
                Some(parent) => children[parent].push(idx),
                None => roots.push(idx),
            }
        }

        let mut area = Self {
            center: layout.center,
            half_extent: layout.half_extent,
            height: layout.height,
            node_rotations: vec![Quat::IDENTITY; layout.nodes.len()],
            nodes: layout.nodes,
            flowers: Vec::new(),
            flower_nodes: Vec::new(),
            plants: Vec::new(),
            nectar_flower_lookup: HashMap::new(),
        };
        let mut seen = HashSet::new();
        area.find_child_flowers(&roots, &children, &mut seen)?;
        area.refresh_flower_poses();
        let (flowers, plants) = (area.flowers.len(), area.plants.len());
        debug!(flowers, plants, "built flower area");
        Ok(area)
    }

    fn find_child_flowers(
        &mut self,
        siblings: &[usize],
        children: &[Vec<usize>],
        seen: &mut HashSet<ColliderId>,
    ) -> Result<(), AreaBuildError> {
        for &idx in siblings {
            let kind = self.nodes[idx].kind.clone();
            match &kind {
                NodeKind::PlantGroup => {
                    self.plants.push(idx);
                    self.find_child_flowers(&children[idx], children, seen)?;
                }
                NodeKind::Flower(spec) => {
                    for id in [spec.flower_collider, spec.nectar_collider] {
                        if id == ARENA_COLLIDER {
                            return Err(AreaBuildError::ReservedCollider(id));
                        }
                        if !seen.insert(id) {
                            return Err(AreaBuildError::DuplicateCollider(id));
                        }
                    }
                    let flower_index = self.flowers.len();
                    self.nectar_flower_lookup
                        .insert(spec.nectar_collider, flower_index);
                    self.flowers.push(Flower::new(
                        self.nodes[idx].name.clone(),
                        spec.flower_collider,
                        spec.nectar_collider,
                        Vec3::ZERO,
                        spec.up,
                        spec.nectar_depth,
                    ));
                    self.flower_nodes.push(idx);
                }
                NodeKind::Group => self.find_child_flowers(&children[idx], children, seen)?,
            }
        }
        Ok(())
    }

    /// Recomputes flower world poses from the node hierarchy.
    fn refresh_flower_poses(&mut self) {
        let mut world_pos = vec![Vec3::ZERO; self.nodes.len()];
        let mut world_rot = vec![Quat::IDENTITY; self.nodes.len()];
        for (idx, node) in self.nodes.iter().enumerate() {
            let (parent_pos, parent_rot) = match node.parent {
                Some(p) => (world_pos[p], world_rot[p]),
                None => (self.center, Quat::IDENTITY),
            };
            world_pos[idx] = parent_pos + parent_rot * node.local_position;
            world_rot[idx] = parent_rot * self.node_rotations[idx];
        }
        for (flower, &node_idx) in self.flowers.iter_mut().zip(&self.flower_nodes) {
            if let NodeKind::Flower(spec) = &self.nodes[node_idx].kind {
                flower.set_world_pose(world_pos[node_idx], world_rot[node_idx] * spec.up);
            }
        }
    }

    /// Gives every plant a fresh random orientation, then refills every flower.
    pub fn reset_flowers<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for &plant in &self.plants {
            let x_rotation = rng.random_range(-5.0f32..=5.0);
            let y_rotation = rng.random_range(-180.0f32..=180.0);
            let z_rotation = rng.random_range(-5.0f32..=5.0);
            self.node_rotations[plant] =
                quat_from_euler_degrees(x_rotation, y_rotation, z_rotation);
        }
        self.refresh_flower_poses();

        for flower in &mut self.flowers {
            flower.reset();
        }
        let (plants, flowers) = (self.plants.len(), self.flowers.len());
        debug!(plants, flowers, "reset flowers");
    }

    /// Index of the flower owning `nectar_collider`.
    ///
    /// Panics if the collider was never registered; every nectar collider is
    /// wired in during discovery, so a miss is a wiring bug.
    pub fn flower_for_nectar(&self, nectar_collider: ColliderId) -> usize {
        let Some(idx) = self.try_flower_for_nectar(nectar_collider) else {
            let id = nectar_collider.0;
            panic!("no flower registered for nectar collider {id}");
        };
        idx
    }

    pub fn try_flower_for_nectar(&self, nectar_collider: ColliderId) -> Option<usize> {
        self.nectar_flower_lookup.get(&nectar_collider).copied()
    }

    pub fn flowers(&self) -> &[Flower] {
        &self.flowers
    }

    pub fn flower(&self, index: usize) -> &Flower {
        &self.flowers[index]
    }

    pub fn flower_mut(&mut self, index: usize) -> &mut Flower {
        &mut self.flowers[index]
    }

    pub fn plant_count(&self) -> usize {
        self.plants.len()
    }

    pub fn plant_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.plants.iter().map(|&idx| self.nodes[idx].name.as_str())
    }

    pub fn plant_rotation(&self, plant: usize) -> Quat {
        self.node_rotations[self.plants[plant]]
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn depleted_count(&self) -> usize {
        self.flowers.iter().filter(|f| !f.has_nectar()).count()
    }

    pub fn arena(&self) -> Arena {
        Arena {
            id: ARENA_COLLIDER,
            min: self.center + Vec3::new(-self.half_extent, 0.0, -self.half_extent),
            max: self.center + Vec3::new(self.half_extent, self.height, self.half_extent),
        }
    }

    /// Physics colliders for every flower at its current pose and activation.
    pub fn colliders(&self) -> Vec<Collider> {
        let mut colliders = Vec::with_capacity(self.flowers.len() * 2);
        for (flower, &node_idx) in self.flowers.iter().zip(&self.flower_nodes) {
            let NodeKind::Flower(spec) = &self.nodes[node_idx].kind else {
                continue;
            };
            colliders.push(Collider {
                id: flower.flower_collider(),
                tag: SurfaceTag::Flower,
                shape: Shape::Sphere {
                    center: flower.position(),
                    radius: spec.body_radius,
                },
                is_trigger: false,
                enabled: flower.flower_collider_active(),
            });
            colliders.push(Collider {
                id: flower.nectar_collider(),
                tag: SurfaceTag::Nectar,
                shape: Shape::Sphere {
                    center: flower.center_position(),
                    radius: spec.nectar_radius,
                },
                is_trigger: true,
                enabled: flower.nectar_collider_active(),
            });
        }
        colliders
    }
}
