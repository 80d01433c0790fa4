//! Single-area driver. Owns the flowers, one agent and the reference physics,
//! and advances them in fixed ticks the way an external learner expects:
//! `reset` to start an episode, `step` per decision.

mod metrics;

pub use metrics::{EpisodeSummary, RunSummary};

use crate::agent::{
    ActionVector, AgentError, DebugLine, HummingbirdAgent, ManualInput, Observation,
    PlacementError, SimContext,
};
use crate::area::{AreaBuildError, AreaLayout, FlowerArea};
use crate::config::{SimConfig, SimConfigError};
use crate::nn::Policy;
use crate::physics::{ContactEvent, KinematicWorld, Physics, SurfaceTag};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::{error::Error, fmt};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum EnvError {
    Config(SimConfigError),
    Area(AreaBuildError),
    Placement(PlacementError),
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvError::Config(e) => write!(f, "{e}"),
            EnvError::Area(e) => write!(f, "{e}"),
            EnvError::Placement(e) => write!(f, "{e}"),
        }
    }
}

impl Error for EnvError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EnvError::Config(e) => Some(e),
            EnvError::Area(e) => Some(e),
            EnvError::Placement(e) => Some(e),
        }
    }
}

impl From<SimConfigError> for EnvError {
    fn from(err: SimConfigError) -> Self {
        EnvError::Config(err)
    }
}

impl From<AreaBuildError> for EnvError {
    fn from(err: AreaBuildError) -> Self {
        EnvError::Area(err)
    }
}

impl From<PlacementError> for EnvError {
    fn from(err: PlacementError) -> Self {
        EnvError::Placement(err)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentError {
    NoEpisodes,
    ZeroStepLimit,
    TooManyEpisodes { max: u32, actual: u32 },
    Env(EnvError),
}

impl fmt::Display for ExperimentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentError::NoEpisodes => write!(f, "episodes must be positive"),
            ExperimentError::ZeroStepLimit => write!(f, "step_limit must be positive"),
            ExperimentError::TooManyEpisodes { max, actual } => {
                write!(f, "episodes ({actual}) exceed supported maximum ({max})")
            }
            ExperimentError::Env(e) => write!(f, "{e}"),
        }
    }
}

impl Error for ExperimentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExperimentError::Env(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EnvError> for ExperimentError {
    fn from(err: EnvError) -> Self {
        ExperimentError::Env(err)
    }
}

impl From<PlacementError> for ExperimentError {
    fn from(err: PlacementError) -> Self {
        ExperimentError::Env(EnvError::Placement(err))
    }
}

/// Outcome of one fixed tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepResult {
    pub observation: Observation,
    /// Reward earned during this tick only.
    pub reward: f32,
    pub done: bool,
    /// `done` because the step budget ran out.
    pub interrupted: bool,
}

/// Out-of-range components are clamped and NaN/inf become zero, so a
/// misbehaving learner cannot inject non-finite forces.
pub fn sanitize_action(action: &ActionVector) -> ActionVector {
    action.map(|a| {
        if a.is_finite() {
            a.clamp(-1.0, 1.0)
        } else {
            0.0
        }
    })
}

pub struct Environment {
    area: FlowerArea,
    agent: HummingbirdAgent,
    ctx: SimContext<KinematicWorld, ChaCha12Rng>,
    step_count: u32,
    episodes_begun: u32,
    boundary_hits: u32,
}

impl Environment {
    pub const MAX_EXPERIMENT_EPISODES: u32 = 100_000;

    pub fn new(config: SimConfig, layout: AreaLayout) -> Self {
        Self::try_new(config, layout).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_new(config: SimConfig, layout: AreaLayout) -> Result<Self, EnvError> {
        config.validate()?;
        let area = FlowerArea::try_new(layout)?;
        let physics = KinematicWorld::new(area.arena(), config.mass, config.linear_drag);
        let rng = ChaCha12Rng::seed_from_u64(config.seed);
        let agent = HummingbirdAgent::try_new(config)?;
        let mut env = Self {
            area,
            agent,
            ctx: SimContext::new(physics, rng),
            step_count: 0,
            episodes_begun: 0,
            boundary_hits: 0,
        };
        env.sync_colliders();
        Ok(env)
    }

    pub fn area(&self) -> &FlowerArea {
        &self.area
    }

    pub fn agent(&self) -> &HummingbirdAgent {
        &self.agent
    }

    pub fn physics(&self) -> &KinematicWorld {
        &self.ctx.physics
    }

    pub fn config(&self) -> &SimConfig {
        self.agent.config()
    }

    /// Fixed ticks since the last reset.
    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn episodes_begun(&self) -> u32 {
        self.episodes_begun
    }

    pub fn boundary_hits(&self) -> u32 {
        self.boundary_hits
    }

    /// Begins a new episode. Panics if no safe spawn position exists.
    pub fn reset(&mut self) -> Observation {
        self.try_reset().unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_reset(&mut self) -> Result<Observation, PlacementError> {
        self.agent.try_on_episode_begin(&mut self.area, &mut self.ctx)?;
        self.sync_colliders();
        self.step_count = 0;
        self.boundary_hits = 0;
        self.episodes_begun += 1;
        Ok(self.observation())
    }

    pub fn observation(&self) -> Observation {
        self.agent.collect_observations(&self.area)
    }

    /// Applies one decision and advances physics by one fixed tick.
    pub fn step(&mut self, action: &ActionVector) -> StepResult {
        let action = sanitize_action(action);
        self.agent.on_action_received(&action, &mut self.ctx.physics);

        let (dt, body) = {
            let config = self.agent.config();
            let body = [
                (self.agent.pose().position, config.body_radius),
                (self.agent.beak_tip(), config.beak_tip_radius),
            ];
            (config.fixed_delta_time, body)
        };
        let events = self.ctx.physics.step(self.agent.pose_mut(), &body, dt);

        let depleted_before = self.area.depleted_count();
        for event in events {
            if let ContactEvent::CollisionEnter {
                tag: SurfaceTag::Boundary,
                ..
            } = event
            {
                self.boundary_hits += 1;
            }
            self.agent.on_contact(event, &mut self.area, &self.ctx.physics);
        }
        // Drained flowers switch their colliders off.
        if self.area.depleted_count() != depleted_before {
            self.sync_colliders();
        }
        self.agent.fixed_update(&self.area);
        self.step_count += 1;

        let max_steps = self.agent.config().effective_max_steps();
        let interrupted = max_steps > 0 && self.step_count >= max_steps;
        let drained = !self.area.flowers().is_empty()
            && self.area.depleted_count() == self.area.flowers().len();
        if interrupted {
            debug!(steps = self.step_count, "episode interrupted at max steps");
        }

        StepResult {
            observation: self.observation(),
            reward: self.agent.take_step_reward(),
            done: interrupted || drained,
            interrupted,
        }
    }

    /// Per-frame work: the beak-to-target debug line, if there is a target.
    pub fn frame(&self) -> Option<DebugLine> {
        self.agent.debug_line(&self.area)
    }

    pub fn heuristic(&self, input: &ManualInput) -> ActionVector {
        self.agent.heuristic(input)
    }

    pub fn freeze(&mut self) -> Result<(), AgentError> {
        self.agent.try_freeze_agent(&mut self.ctx.physics)
    }

    pub fn unfreeze(&mut self) -> Result<(), AgentError> {
        self.agent.try_unfreeze_agent(&mut self.ctx.physics)
    }

    /// Runs one episode from reset until it is done or `step_limit` ticks
    /// have passed.
    pub fn run_episode<P: Policy + ?Sized>(
        &mut self,
        policy: &mut P,
        step_limit: u32,
    ) -> Result<EpisodeSummary, PlacementError> {
        let mut observation = self.try_reset()?;
        // Stays set only if `step_limit` runs out before the episode is done.
        let mut interrupted = true;
        while self.step_count < step_limit {
            let result = self.step(&policy.act(&observation));
            observation = result.observation;
            if result.done {
                interrupted = result.interrupted;
                break;
            }
        }

        let summary = EpisodeSummary {
            episode: self.episodes_begun - 1,
            steps: self.step_count,
            cumulative_reward: self.agent.cumulative_reward(),
            nectar_obtained: self.agent.nectar_obtained(),
            flowers_depleted: self.area.depleted_count(),
            boundary_hits: self.boundary_hits,
            interrupted,
        };
        debug!(?summary, "episode finished");
        Ok(summary)
    }

    pub fn run_experiment<P: Policy + ?Sized>(
        &mut self,
        episodes: u32,
        step_limit: u32,
        policy: &mut P,
    ) -> RunSummary {
        self.try_run_experiment(episodes, step_limit, policy)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_run_experiment<P: Policy + ?Sized>(
        &mut self,
        episodes: u32,
        step_limit: u32,
        policy: &mut P,
    ) -> Result<RunSummary, ExperimentError> {
        if episodes == 0 {
            return Err(ExperimentError::NoEpisodes);
        }
        if step_limit == 0 {
            return Err(ExperimentError::ZeroStepLimit);
        }
        if episodes > Self::MAX_EXPERIMENT_EPISODES {
            return Err(ExperimentError::TooManyEpisodes {
                max: Self::MAX_EXPERIMENT_EPISODES,
                actual: episodes,
            });
        }

        let mut summaries = Vec::with_capacity(episodes as usize);
        for _ in 0..episodes {
            summaries.push(self.run_episode(policy, step_limit)?);
        }
        let summary = RunSummary::from_episodes(self.config().seed, policy.kind(), summaries);
        info!(
            seed = summary.seed,
            policy = %summary.policy,
            episodes,
            mean_reward = summary.mean_reward,
            "run finished"
        );
        Ok(summary)
    }

    fn sync_colliders(&mut self) {
        let colliders = self.area.colliders();
        self.ctx.physics.sync_colliders(&colliders);
    }
}
