use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hummingbird_core::area::AreaLayout;
use hummingbird_core::config::SimConfig;
use hummingbird_core::experiment::run_areas_parallel;
use hummingbird_core::nn::{IdlePolicy, NeuralNet, Policy, RandomPolicy};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "hummingbird",
    version,
    about = "Run hummingbird nectar-foraging episodes and print JSON summaries"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run episodes in one or more independent areas.
    Run {
        /// JSON file with a `SimConfig`; missing fields take defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// JSON file with an `AreaLayout`; a procedural ring is used otherwise.
        #[arg(short, long)]
        layout: Option<PathBuf>,
        /// Overrides the config seed. Area `i` runs with `seed + i`.
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value_t = 5)]
        episodes: u32,
        /// Hard cap on fixed ticks per episode.
        #[arg(long, default_value_t = 5000)]
        step_limit: u32,
        #[arg(long, default_value_t = 1)]
        areas: u32,
        #[arg(long, value_enum, default_value_t = PolicyKind::Random)]
        policy: PolicyKind,
        /// Run in inference mode: no flower resets, no rewards, no step cap.
        #[arg(long)]
        inference: bool,
        #[arg(long, default_value_t = 5)]
        plants: usize,
        #[arg(long, default_value_t = 3)]
        flowers_per_plant: usize,
    },
    /// Print a procedural area layout as JSON, for editing.
    Layout {
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 5)]
        plants: usize,
        #[arg(long, default_value_t = 3)]
        flowers_per_plant: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyKind {
    Random,
    Idle,
    Neural,
}

impl PolicyKind {
    fn build(self, seed: u64) -> Box<dyn Policy> {
        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        match self {
            PolicyKind::Random => Box::new(RandomPolicy::new(rng)),
            PolicyKind::Idle => Box::new(IdlePolicy),
            PolicyKind::Neural => Box::new(NeuralNet::random(&mut rng)),
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            layout,
            seed,
            episodes,
            step_limit,
            areas,
            policy,
            inference,
            plants,
            flowers_per_plant,
        } => {
            if areas == 0 {
                bail!("--areas must be positive");
            }
            let mut config: SimConfig = match config {
                Some(path) => read_json(&path)?,
                None => SimConfig::default(),
            };
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if inference {
                config.training_mode = false;
            }
            config.validate().context("invalid config")?;

            let layout: AreaLayout = match layout {
                Some(path) => read_json(&path)?,
                None => AreaLayout::procedural(
                    &mut ChaCha12Rng::seed_from_u64(config.seed),
                    plants,
                    flowers_per_plant,
                ),
            };

            let seeds: Vec<u64> = (0..u64::from(areas))
                .map(|i| config.seed.wrapping_add(i))
                .collect();
            info!(areas, episodes, ?policy, "starting run");
            let summaries = run_areas_parallel(
                &config,
                &layout,
                &seeds,
                episodes,
                step_limit,
                |seed| policy.build(seed),
            )?;
            print_json(&summaries)
        }
        Command::Layout {
            seed,
            plants,
            flowers_per_plant,
        } => {
            let mut rng = ChaCha12Rng::seed_from_u64(seed);
            let layout = AreaLayout::procedural(&mut rng, plants, flowers_per_plant);
            print_json(&layout)
        }
    }
}
