//! Independent areas run side by side. Each area is its own `Environment`
//! with its own seed; nothing is shared between them while they run.

use crate::area::AreaLayout;
use crate::config::SimConfig;
use crate::env::{Environment, ExperimentError, RunSummary};
use crate::nn::Policy;
use rayon::prelude::*;

/// Runs one experiment per seed in parallel and returns the summaries in seed
/// order. `make_policy` builds a fresh policy for each area from its seed.
pub fn run_areas_parallel<F, P>(
    base: &SimConfig,
    layout: &AreaLayout,
    seeds: &[u64],
    episodes: u32,
    step_limit: u32,
    make_policy: F,
) -> Result<Vec<RunSummary>, ExperimentError>
where
    F: Fn(u64) -> P + Sync,
    P: Policy,
{
    seeds
        .par_iter()
        .map(|&seed| -> Result<RunSummary, ExperimentError> {
            let config = SimConfig {
                seed,
                ..base.clone()
            };
            let mut env = Environment::try_new(config, layout.clone())?;
            let mut policy = make_policy(seed);
            env.try_run_experiment(episodes, step_limit, &mut policy)
        })
        .collect()
}
