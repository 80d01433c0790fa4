use super::*;
use crate::area::{AreaLayout, FlowerSpec, NodeKind, SceneNode};
use crate::math::quat_from_euler_degrees;
use crate::physics::Collider;
use glam::Quat;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::cell::Cell;

const EPS: f32 = 1e-4;

/// Physics stand-in: records forces, optionally blocks every overlap query
/// and treats the beak as touching whichever collider it is asked about.
#[derive(Default)]
struct MockPhysics {
    forces: Vec<Vec3>,
    velocity_resets: usize,
    synced: Vec<usize>,
    asleep: bool,
    blocked: bool,
    overlap_queries: Cell<u32>,
}

impl Physics for MockPhysics {
    fn apply_force(&mut self, force: Vec3) {
        self.forces.push(force);
    }

    fn reset_velocity(&mut self) {
        self.velocity_resets += 1;
    }

    fn sleep(&mut self) {
        self.asleep = true;
    }

    fn wake_up(&mut self) {
        self.asleep = false;
    }

    fn sync_colliders(&mut self, colliders: &[Collider]) {
        self.synced.push(colliders.len());
    }

    fn overlap_sphere(&self, _center: Vec3, _radius: f32) -> Vec<ColliderId> {
        self.overlap_queries.set(self.overlap_queries.get() + 1);
        if self.blocked {
            vec![ColliderId(1)]
        } else {
            Vec::new()
        }
    }

    fn closest_point(&self, _collider: ColliderId, point: Vec3) -> Option<Vec3> {
        Some(point)
    }
}

fn ctx(seed: u64) -> SimContext<MockPhysics, ChaCha12Rng> {
    SimContext::new(MockPhysics::default(), ChaCha12Rng::seed_from_u64(seed))
}

/// Three flowers in a row along x, feeding surfaces facing -Z.
fn three_flower_area() -> FlowerArea {
    let nodes = (0..3)
        .map(|i| SceneNode {
            name: format!("flower{i}"),
            parent: None,
            local_position: Vec3::new(2.0 * i as f32, 1.0, 0.0),
            kind: NodeKind::Flower(FlowerSpec::new(
                ColliderId(10 * i + 1),
                ColliderId(10 * i + 2),
                Vec3::NEG_Z,
            )),
        })
        .collect();
    FlowerArea::new(AreaLayout {
        center: Vec3::ZERO,
        half_extent: 10.0,
        height: 5.0,
        nodes,
    })
}

fn empty_area() -> FlowerArea {
    FlowerArea::new(AreaLayout {
        center: Vec3::ZERO,
        half_extent: 10.0,
        height: 5.0,
        nodes: Vec::new(),
    })
}

fn agent(training_mode: bool) -> HummingbirdAgent {
    HummingbirdAgent::new(SimConfig {
        training_mode,
        ..SimConfig::default()
    })
}

/// Places the agent facing +Z with its beak tip exactly at `point`.
fn put_beak_at(agent: &mut HummingbirdAgent, point: Vec3) {
    let offset = agent.config().beak_tip_offset;
    agent.set_pose(Pose::new(point - offset, Quat::IDENTITY));
}

#[test]
fn observation_without_target_is_ten_zeros() {
    let area = three_flower_area();
    let agent = agent(true);
    for _ in 0..3 {
        let obs = agent.collect_observations(&area);
        assert_eq!(obs.len(), OBSERVATION_SIZE);
        assert_eq!(obs, [0.0; 10]);
    }
}

#[test]
fn observation_describes_nearest_nectar() {
    let area = three_flower_area();
    let mut agent = agent(true);
    let center = area.flower(1).center_position();
    put_beak_at(&mut agent, center - Vec3::Z);
    agent.update_nearest_flower(&area);
    assert_eq!(agent.nearest_flower(), Some(1));

    let obs = agent.collect_observations(&area);
    assert_eq!(&obs[..4], &Quat::IDENTITY.to_array());
    assert!(obs[4].abs() < EPS && obs[5].abs() < EPS);
    assert!((obs[6] - 1.0).abs() < EPS);
    assert!((obs[7] - 1.0).abs() < EPS, "direction faces the nectar");
    assert!((obs[8] - 1.0).abs() < EPS, "beak faces the nectar");
    assert!((obs[9] - 0.05).abs() < EPS, "distance over area diameter");
}

#[test]
fn nearest_flower_is_deterministic_and_breaks_ties_by_order() {
    let area = three_flower_area();
    let mut agent = agent(true);
    // Equidistant from flower 0 and flower 2.
    put_beak_at(&mut agent, Vec3::new(2.0, 1.0, -1.0));
    let mut area = area;
    area.flower_mut(1).feed(1.0);
    agent.update_nearest_flower(&area);
    assert_eq!(agent.nearest_flower(), Some(0));
    agent.update_nearest_flower(&area);
    assert_eq!(agent.nearest_flower(), Some(0));
}

#[test]
fn nearest_flower_is_none_when_everything_is_drained() {
    let mut area = three_flower_area();
    let mut agent = agent(true);
    agent.update_nearest_flower(&area);
    assert!(agent.nearest_flower().is_some());
    for i in 0..3 {
        area.flower_mut(i).feed(1.0);
    }
    agent.update_nearest_flower(&area);
    assert_eq!(agent.nearest_flower(), None);
    assert_eq!(agent.collect_observations(&area), [0.0; 10]);
}

#[test]
fn feeding_drains_flower_and_retargets() {
    let mut area = three_flower_area();
    let physics = MockPhysics::default();
    let mut agent = agent(true);
    let nectar = area.flower(1).nectar_collider();
    put_beak_at(&mut agent, area.flower(1).center_position());
    agent.update_nearest_flower(&area);
    assert_eq!(agent.nearest_flower(), Some(1));

    for _ in 0..10 {
        agent.on_trigger_enter_or_stay(nectar, SurfaceTag::Nectar, &mut area, &physics);
    }
    assert!((area.flower(1).nectar_amount() - 0.9).abs() < EPS);
    assert!((agent.nectar_obtained() - 0.1).abs() < EPS);
    // Beak faces straight into the flower: full alignment bonus.
    assert!((agent.cumulative_reward() - 10.0 * 0.03).abs() < EPS);
    assert_eq!(agent.nearest_flower(), Some(1), "target held");

    let mut ticks = 0;
    while area.flower(1).has_nectar() && ticks < 100 {
        agent.on_trigger_enter_or_stay(nectar, SurfaceTag::Nectar, &mut area, &physics);
        ticks += 1;
    }
    assert!(!area.flower(1).has_nectar());
    assert!(!area.flower(1).is_active());
    assert!((agent.nectar_obtained() - 1.0).abs() < 1e-3);
    assert_eq!(agent.nearest_flower(), Some(0), "drained flower skipped");
}

/// Poses the agent with `rotation` and its beak tip exactly at `point`.
fn put_beak_at_facing(agent: &mut HummingbirdAgent, point: Vec3, rotation: Quat) {
    let offset = agent.config().beak_tip_offset;
    agent.set_pose(Pose::new(point - rotation * offset, rotation));
}

fn single_feed_reward(yaw: f32) -> f32 {
    let mut area = three_flower_area();
    let physics = MockPhysics::default();
    let mut agent = agent(true);
    let rotation = quat_from_euler_degrees(0.0, yaw, 0.0);
    put_beak_at_facing(&mut agent, area.flower(1).center_position(), rotation);
    agent.update_nearest_flower(&area);
    assert_eq!(agent.nearest_flower(), Some(1));
    let nectar = area.flower(1).nectar_collider();
    agent.on_trigger_enter_or_stay(nectar, SurfaceTag::Nectar, &mut area, &physics);
    agent.take_step_reward()
}

#[test]
fn oblique_beak_earns_a_partial_bonus() {
    // Facing +Z at yaw 0; the flower faces -Z, so alignment is cos(yaw).
    // 0.01 + 0.02 * cos(60)
    let reward = single_feed_reward(60.0);
    assert!((reward - 0.02).abs() < EPS, "reward {reward}");
    assert!(reward > 0.01 && reward < 0.03);
}

#[test]
fn beak_facing_away_earns_no_bonus() {
    assert!((single_feed_reward(180.0) - 0.01).abs() < EPS);
    assert!((single_feed_reward(120.0) - 0.01).abs() < EPS);
    assert!((single_feed_reward(90.0) - 0.01).abs() < EPS);
}

#[test]
fn bonus_uses_the_target_flower_not_the_fed_one() {
    let flower = |name: &str, x: f32, id: u32, up: Vec3| SceneNode {
        name: name.to_string(),
        parent: None,
        local_position: Vec3::new(x, 1.0, 0.0),
        kind: NodeKind::Flower(FlowerSpec::new(ColliderId(id), ColliderId(id + 1), up)),
    };
    let mut area = FlowerArea::new(AreaLayout {
        center: Vec3::ZERO,
        half_extent: 10.0,
        height: 5.0,
        nodes: vec![
            flower("target", 0.0, 1, Vec3::NEG_Z),
            flower("fed", 3.0, 3, Vec3::X),
        ],
    });
    let physics = MockPhysics::default();
    let mut agent = agent(true);
    put_beak_at(&mut agent, area.flower(0).center_position());
    agent.update_nearest_flower(&area);
    assert_eq!(agent.nearest_flower(), Some(0));

    // The mock treats any nectar as within reach of the beak.
    let fed_nectar = area.flower(1).nectar_collider();
    agent.on_trigger_enter_or_stay(fed_nectar, SurfaceTag::Nectar, &mut area, &physics);

    assert!((area.flower(1).nectar_amount() - 0.99).abs() < EPS);
    assert_eq!(area.flower(0).nectar_amount(), 1.0);
    // Aligned with the target (-Z up), perpendicular to the fed flower (+X up).
    assert!((agent.take_step_reward() - 0.03).abs() < EPS);
    assert_eq!(agent.nearest_flower(), Some(0));
}

#[test]
fn contact_outside_beak_radius_is_ignored() {
    let mut area = three_flower_area();
    let physics = MockPhysics::default();
    let mut agent = agent(true);
    // KinematicWorld-style closest point from outside the nectar sphere.
    struct FarPhysics;
    impl Physics for FarPhysics {
        fn apply_force(&mut self, _force: Vec3) {}
        fn reset_velocity(&mut self) {}
        fn overlap_sphere(&self, _center: Vec3, _radius: f32) -> Vec<ColliderId> {
            Vec::new()
        }
        fn closest_point(&self, _collider: ColliderId, point: Vec3) -> Option<Vec3> {
            Some(point + Vec3::X * 0.01)
        }
    }
    let nectar = area.flower(0).nectar_collider();
    agent.on_trigger_enter_or_stay(nectar, SurfaceTag::Nectar, &mut area, &FarPhysics);
    agent.on_trigger_enter_or_stay(nectar, SurfaceTag::Flower, &mut area, &physics);
    assert_eq!(area.flower(0).nectar_amount(), 1.0);
    assert_eq!(agent.cumulative_reward(), 0.0);
}

#[test]
fn feeding_outside_training_collects_nectar_without_reward() {
    let mut area = three_flower_area();
    let physics = MockPhysics::default();
    let mut agent = agent(false);
    put_beak_at(&mut agent, area.flower(2).center_position());
    let nectar = area.flower(2).nectar_collider();
    agent.on_contact(
        ContactEvent::TriggerEnter {
            collider: nectar,
            tag: SurfaceTag::Nectar,
        },
        &mut area,
        &physics,
    );
    assert!((agent.nectar_obtained() - 0.01).abs() < EPS);
    assert_eq!(agent.cumulative_reward(), 0.0);
}

#[test]
fn boundary_collision_penalises_only_in_training() {
    let mut trained = agent(true);
    trained.on_collision_enter(SurfaceTag::Boundary);
    trained.on_collision_enter(SurfaceTag::Flower);
    assert!((trained.cumulative_reward() + 0.5).abs() < EPS);
    assert!((trained.take_step_reward() + 0.5).abs() < EPS);
    assert_eq!(trained.take_step_reward(), 0.0);

    let mut manual = agent(false);
    manual.on_collision_enter(SurfaceTag::Boundary);
    assert_eq!(manual.cumulative_reward(), 0.0);
}

#[test]
fn fixed_update_retargets_only_when_target_is_empty() {
    let mut area = three_flower_area();
    let mut agent = agent(true);
    put_beak_at(&mut agent, area.flower(2).center_position());
    agent.update_nearest_flower(&area);
    assert_eq!(agent.nearest_flower(), Some(2));

    // Moving closer to another flower does not switch the target.
    put_beak_at(&mut agent, area.flower(0).center_position());
    agent.fixed_update(&area);
    assert_eq!(agent.nearest_flower(), Some(2));

    area.flower_mut(2).feed(5.0);
    agent.fixed_update(&area);
    assert_eq!(agent.nearest_flower(), Some(0));
}

#[test]
fn pitch_wraps_before_clamping() {
    // 190 wraps to -170, then clamps to -80.
    assert!((next_pitch(185.0, 5.0, 80.0) + 80.0).abs() < EPS);
    assert!((next_pitch(350.0, -30.0, 80.0) + 40.0).abs() < EPS);
    assert_eq!(next_pitch(70.0, 20.0, 80.0), 80.0);
    assert_eq!(next_pitch(-70.0, -20.0, 80.0), -80.0);
    assert!((next_pitch(10.0, 5.0, 80.0) - 15.0).abs() < EPS);
}

#[test]
fn actions_apply_force_and_smoothed_rotation() {
    let mut physics = MockPhysics::default();
    let mut agent = agent(true);
    agent.on_action_received(&[1.0, -0.5, 0.25, 1.0, -1.0], &mut physics);

    assert_eq!(physics.forces, vec![Vec3::new(2.0, -1.0, 0.5)]);
    let (pitch_change, yaw_change) = agent.smoothed_changes();
    assert!((pitch_change - 0.04).abs() < EPS, "rate limited to 2/s");
    assert!((yaw_change + 0.04).abs() < EPS);

    let (pitch, yaw, roll) = euler_degrees(agent.pose().rotation);
    // 0.04 * 0.02 s * 100 degrees/s
    assert!((pitch - 0.08).abs() < EPS, "got {pitch}");
    assert!((yaw - (360.0 - 0.08)).abs() < 1e-3, "got {yaw}");
    assert!(roll.abs() < EPS || (roll - 360.0).abs() < EPS);
}

#[test]
fn sustained_pitch_input_stops_at_limit_with_zero_roll() {
    let mut physics = MockPhysics::default();
    let mut agent = agent(true);
    let rotation = quat_from_euler_degrees(0.0, 30.0, 0.0);
    agent.set_pose(Pose::new(Vec3::ZERO, rotation));
    for _ in 0..2000 {
        agent.on_action_received(&[0.0, 0.0, 0.0, -1.0, 0.5], &mut physics);
    }
    let (pitch, _, roll) = euler_degrees(agent.pose().rotation);
    assert!((pitch - 280.0).abs() < 1e-2, "clamped at -80, got {pitch}");
    assert!(roll.abs() < 1e-3 || (roll - 360.0).abs() < 1e-3);
}

#[test]
fn frozen_agent_discards_actions() {
    let mut physics = MockPhysics::default();
    let mut agent = agent(false);
    agent.freeze_agent(&mut physics);
    assert!(agent.is_frozen());
    assert!(physics.asleep);
    agent.on_action_received(&[1.0, 1.0, 1.0, 1.0, 1.0], &mut physics);
    assert!(physics.forces.is_empty());
    assert_eq!(agent.pose().rotation, Quat::IDENTITY);

    agent.unfreeze_agent(&mut physics);
    assert!(!agent.is_frozen());
    assert!(!physics.asleep);
    agent.on_action_received(&[1.0, 0.0, 0.0, 0.0, 0.0], &mut physics);
    assert_eq!(physics.forces.len(), 1);
}

#[test]
fn freeze_is_rejected_in_training() {
    let mut physics = MockPhysics::default();
    let mut agent = agent(true);
    assert_eq!(
        agent.try_freeze_agent(&mut physics),
        Err(AgentError::FreezeInTraining)
    );
    assert_eq!(
        agent.try_unfreeze_agent(&mut physics),
        Err(AgentError::FreezeInTraining)
    );
    assert!(!agent.is_frozen());
}

#[test]
#[should_panic(expected = "freeze/unfreeze not supported in training")]
fn freeze_in_training_panics() {
    let mut physics = MockPhysics::default();
    agent(true).freeze_agent(&mut physics);
}

#[test]
fn episode_begin_resets_area_and_targets_a_flower() {
    let mut area = three_flower_area();
    let mut ctx = ctx(3);
    let mut agent = agent(true);
    area.flower_mut(0).feed(1.0);
    agent.add_reward(1.0);

    agent.on_episode_begin(&mut area, &mut ctx);

    assert!(area.flowers().iter().all(|f| f.has_nectar()));
    assert_eq!(agent.nectar_obtained(), 0.0);
    assert_eq!(agent.cumulative_reward(), 0.0);
    assert_eq!(agent.take_step_reward(), 0.0);
    assert_eq!(ctx.physics.velocity_resets, 1);
    assert_eq!(ctx.physics.synced, [6], "synced before placement");
    assert!(agent.nearest_flower().is_some());
}

#[test]
fn manual_episode_spawns_in_front_of_a_flower_without_resetting_it() {
    let mut area = three_flower_area();
    area.flower_mut(2).feed(0.5);
    let mut ctx = ctx(11);
    let mut agent = agent(false);
    agent.on_episode_begin(&mut area, &mut ctx);

    let left = area.flower(2).nectar_amount();
    assert!((left - 0.5).abs() < EPS, "no reset outside training");
    let position = agent.pose().position;
    let (idx, flower) = area
        .flowers()
        .iter()
        .enumerate()
        .min_by(|a, b| {
            a.1.position()
                .distance(position)
                .total_cmp(&b.1.position().distance(position))
        })
        .unwrap();
    let offset = position - flower.position();
    let along = offset.dot(flower.up_vector());
    let hover = 0.1 - EPS..=0.2 + EPS;
    assert!(hover.contains(&along), "{along} from flower {idx}");
    assert!((offset - flower.up_vector() * along).length() < EPS);
    let to_center = (flower.center_position() - position).normalize();
    let forward = agent.pose().forward();
    assert!((forward - to_center).length() < 1e-3, "faces the nectar");
}

#[test]
fn open_air_spawn_respects_height_and_radius() {
    let area = three_flower_area();
    for seed in 0..20 {
        let mut ctx = ctx(seed);
        let mut agent = agent(true);
        agent
            .move_to_safe_random_position(false, &area, &mut ctx)
            .unwrap();
        let p = agent.pose().position - area.center();
        assert!((1.2 - EPS..=2.5 + EPS).contains(&p.y), "height {}", p.y);
        let horizontal = Vec3::new(p.x, 0.0, p.z).length();
        let ring = 2.0 - EPS..=7.0 + EPS;
        assert!(ring.contains(&horizontal), "radius {horizontal}");
        let (pitch, _, roll) = euler_degrees(agent.pose().rotation);
        let signed = if pitch > 180.0 { pitch - 360.0 } else { pitch };
        assert!(signed.abs() <= 60.0 + 1e-2);
        assert!(roll.abs() < 1e-3 || (roll - 360.0).abs() < 1e-3);
    }
}

#[test]
fn spawning_in_front_of_a_flower_in_an_empty_area_fails() {
    let area = empty_area();
    for _ in 0..2 {
        let mut ctx = ctx(0);
        let mut agent = agent(true);
        assert_eq!(
            agent.move_to_safe_random_position(true, &area, &mut ctx),
            Err(PlacementError::NoFlowers)
        );
        assert_eq!(ctx.physics.overlap_queries.get(), 0, "no sampling");
    }
}

#[test]
#[should_panic(expected = "area has no flowers")]
fn manual_episode_in_empty_area_is_fatal() {
    let mut area = empty_area();
    let mut ctx = ctx(0);
    agent(false).on_episode_begin(&mut area, &mut ctx);
}

#[test]
fn cluttered_area_exhausts_placement_attempts() {
    let mut area = three_flower_area();
    let mut ctx = ctx(4);
    ctx.physics.blocked = true;
    let mut agent = agent(true);
    let start = *agent.pose();
    assert_eq!(
        agent.try_on_episode_begin(&mut area, &mut ctx),
        Err(PlacementError::Exhausted { attempts: 100 })
    );
    assert_eq!(ctx.physics.overlap_queries.get(), 100);
    assert_eq!(*agent.pose(), start, "no fallback placement");
}

fn small_area(half_extent: f32) -> FlowerArea {
    FlowerArea::new(AreaLayout {
        center: Vec3::ZERO,
        half_extent,
        height: 3.0,
        nodes: vec![SceneNode {
            name: "lone".to_string(),
            parent: None,
            local_position: Vec3::Y,
            kind: NodeKind::Flower(FlowerSpec::new(ColliderId(1), ColliderId(2), Vec3::NEG_Z)),
        }],
    })
}

#[test]
fn open_spawns_stay_inside_a_small_arena() {
    let area = small_area(3.0);
    let arena = area.arena();
    for seed in 0..30 {
        let mut ctx = ctx(seed);
        let mut agent = agent(true);
        agent
            .move_to_safe_random_position(false, &area, &mut ctx)
            .unwrap();
        let p = agent.pose().position;
        assert!(
            p.cmpgt(arena.min).all() && p.cmplt(arena.max).all(),
            "seed {seed}: spawned at {p} outside {arena:?}"
        );
    }
}

#[test]
fn arena_smaller_than_the_spawn_ring_exhausts_placement() {
    let area = small_area(1.0);
    let mut ctx = ctx(2);
    let mut agent = agent(true);
    assert_eq!(
        agent.move_to_safe_random_position(false, &area, &mut ctx),
        Err(PlacementError::Exhausted { attempts: 100 })
    );
    let queries = ctx.physics.overlap_queries.get();
    assert_eq!(queries, 0, "out-of-arena candidates never reach physics");
}

#[test]
fn heuristic_maps_keys_to_actions() {
    let agent = agent(false);
    let idle = agent.heuristic(&ManualInput::default());
    assert_eq!(idle, [0.0; 5]);

    let input = ManualInput {
        forward: true,
        backward: true,
        right: true,
        pitch_down: true,
        pitch_up: true,
        turn_left: true,
        ..ManualInput::default()
    };
    let actions = agent.heuristic(&input);
    let expected = (Vec3::Z + Vec3::X).normalize();
    let movement = Vec3::new(actions[0], actions[1], actions[2]);
    assert!((movement - expected).length() < EPS);
    assert_eq!(actions[3], 1.0, "pitch down wins");
    assert_eq!(actions[4], -1.0, "turn left wins");

    let climb = agent.heuristic(&ManualInput {
        up: true,
        turn_right: true,
        ..ManualInput::default()
    });
    assert_eq!(climb, [0.0, 1.0, 0.0, 0.0, 1.0]);
}

#[test]
fn heuristic_follows_agent_orientation() {
    let mut agent = agent(false);
    let rotation = quat_from_euler_degrees(0.0, 90.0, 0.0);
    agent.set_pose(Pose::new(Vec3::ZERO, rotation));
    let actions = agent.heuristic(&ManualInput {
        forward: true,
        ..ManualInput::default()
    });
    assert!((actions[0] - 1.0).abs() < EPS);
    assert!(actions[2].abs() < EPS);
}

#[test]
fn debug_line_joins_beak_and_target_nectar() {
    let area = three_flower_area();
    let mut agent = agent(true);
    assert_eq!(agent.debug_line(&area), None);
    agent.update_nearest_flower(&area);
    let line = agent.debug_line(&area).unwrap();
    assert_eq!(line.from, agent.beak_tip());
    let target = agent.nearest_flower().unwrap();
    assert_eq!(line.to, area.flower(target).center_position());
}
