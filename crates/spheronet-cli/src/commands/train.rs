use super::SplitArgs;
use crate::error::require;
use clap::Args;
use spheronet_io::{discover, partition, BatchFactory};
use spheronet_nn::{device, CubedSphereConfig, Trainer, TrainingConfig};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory of feature file pairs
    #[arg(long)]
    pub input_dir: PathBuf,

    /// Checkpoint directory; training resumes from its latest checkpoint
    #[arg(long)]
    pub checkpoint: PathBuf,

    #[command(flatten)]
    pub split: SplitArgs,

    #[arg(long, default_value_t = 10)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 60_000)]
    pub max_steps: u64,

    /// Probability of keeping a hidden activation during training
    #[arg(long, default_value_t = 1.0)]
    pub keep_prob: f64,

    #[arg(long, default_value_t = 1_000)]
    pub checkpoint_every: u64,

    #[arg(long, default_value_t = 100)]
    pub log_every: u64,

    /// Seeds the weight initialisation and the epoch shuffles
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Network configuration; defaults to `config.json` in the checkpoint directory
    #[arg(long)]
    pub model_config: Option<PathBuf>,
}

pub fn execute(args: TrainArgs, cpu: bool) -> anyhow::Result<()> {
    require(&args.input_dir)?;
    let device = device(cpu)?;
    let model_config = CubedSphereConfig::resolve(&args.checkpoint, args.model_config.as_deref())?;
    let grid_shape = &model_config.input_shape[..];

    let pairs = discover(&args.input_dir)?;
    let split = partition(
        pairs.len(),
        args.split.test_set_fraction,
        args.split.validation_set_size,
    )?;
    tracing::info!(
        "{} structures: {} train, {} validation, {} test",
        pairs.len(),
        split.train.len(),
        split.validation.len(),
        split.test.len()
    );
    let mut train =
        BatchFactory::new(pairs[split.train.clone()].to_vec(), Some(grid_shape))?.with_shuffle(args.seed);
    let mut validation = if split.validation.is_empty() {
        None
    } else {
        Some(BatchFactory::new(
            pairs[split.validation.clone()].to_vec(),
            Some(grid_shape),
        )?)
    };

    let config = TrainingConfig {
        batch_size: args.batch_size,
        max_steps: args.max_steps,
        keep_prob: args.keep_prob,
        checkpoint_every: args.checkpoint_every,
        log_every: args.log_every,
        seed: args.seed,
        ..TrainingConfig::default()
    };
    let mut trainer = Trainer::new(&model_config, config, &args.checkpoint, &device)?;
    let summary = trainer.train(&mut train, validation.as_mut())?;
    println!(
        "step {}: loss {:.4}, accuracy {:.3}",
        summary.steps, summary.loss, summary.accuracy
    );
    if let Some(path) = &summary.checkpoint {
        println!("checkpoint {}", path.display());
    }
    Ok(())
}
