use serde::{Deserialize, Serialize};

fn default_schema_version() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct EpisodeSummary {
    pub episode: u32,
    pub steps: u32,
    pub cumulative_reward: f32,
    pub nectar_obtained: f32,
    pub flowers_depleted: usize,
    pub boundary_hits: u32,
    /// Ended by the step limit rather than by draining every flower.
    pub interrupted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub seed: u64,
    pub policy: String,
    pub mean_reward: f32,
    pub mean_nectar: f32,
    pub total_steps: u64,
    #[serde(default)]
    pub episodes: Vec<EpisodeSummary>,
}

impl RunSummary {
    pub fn from_episodes(seed: u64, policy: &str, episodes: Vec<EpisodeSummary>) -> Self {
        let denom = episodes.len().max(1) as f32;
        let mean_reward = episodes.iter().map(|e| e.cumulative_reward).sum::<f32>() / denom;
        let mean_nectar = episodes.iter().map(|e| e.nectar_obtained).sum::<f32>() / denom;
        let total_steps = episodes.iter().map(|e| u64::from(e.steps)).sum();
        Self {
            schema_version: default_schema_version(),
            seed,
            policy: policy.to_owned(),
            mean_reward,
            mean_nectar,
            total_steps,
            episodes,
        }
    }
}
