use super::{strictness, SplitArgs};
use crate::error::require;
use clap::Args;
use spheronet_io::{BatchFactory, Split};
use spheronet_nn::{device, CubedSphereConfig, Evaluation, InferenceContext};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InferArgs {
    /// Directory of feature file pairs
    #[arg(long)]
    pub input_dir: PathBuf,

    #[arg(long)]
    pub checkpoint: PathBuf,

    /// Checkpoint step to restore; negative means the latest
    #[arg(long, allow_hyphen_values = true)]
    pub step: Option<i64>,

    /// Which split to evaluate: train, validation or test
    #[arg(long, default_value_t = Split::Test)]
    pub split: Split,

    #[command(flatten)]
    pub partition: SplitArgs,

    #[arg(long, default_value_t = 10)]
    pub batch_size: usize,

    /// Fail instead of using random weights when no checkpoint is found
    #[arg(long)]
    pub strict: bool,

    #[arg(long)]
    pub model_config: Option<PathBuf>,
}

pub fn execute(args: InferArgs, cpu: bool) -> anyhow::Result<()> {
    require(&args.input_dir)?;
    let device = device(cpu)?;
    let config = CubedSphereConfig::resolve(&args.checkpoint, args.model_config.as_deref())?;
    let context = InferenceContext::new(
        &config,
        &args.checkpoint,
        args.step,
        strictness(args.strict),
        &device,
    )?;
    let mut factory = BatchFactory::from_split(
        &args.input_dir,
        Some(&config.input_shape[..]),
        args.partition.test_set_fraction,
        args.partition.validation_set_size,
        args.split,
    )?;

    // one pass over the split, without wrapping into a second epoch
    let residues = factory.data_size();
    let (mut loss, mut correct, mut left) = (0.0, 0.0, residues);
    while left > 0 {
        let take = args.batch_size.max(1).min(left);
        let batch = factory.next_batch(take)?;
        let (batch_loss, batch_correct) = context.evaluate_batch(&batch.data, &batch.model_output)?;
        loss += batch_loss;
        correct += batch_correct;
        left -= take;
    }
    let evaluation = Evaluation::from_totals(loss, correct, residues);
    println!(
        "{} split, {} residues: loss {:.4}, accuracy {:.4}",
        args.split, evaluation.residues, evaluation.loss, evaluation.accuracy
    );
    Ok(())
}
