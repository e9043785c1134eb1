use super::{print_correlation, strictness};
use crate::error::require;
use clap::Args;
use spheronet_ddg::DdgPipeline;
use spheronet_io::read_ddg_csv;
use spheronet_nn::{device, CubedSphereConfig, InferenceContext};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct PredictDdgArgs {
    /// CSV with `pdb_id,mutations,ddg` columns
    #[arg(long)]
    pub ddg_csv: PathBuf,

    /// Directory holding `model.ckpt-<step>.safetensors` files
    #[arg(long)]
    pub checkpoint: PathBuf,

    /// Checkpoint step to restore; negative means the latest
    #[arg(long, allow_hyphen_values = true)]
    pub step: Option<i64>,

    /// Directory of `<id>_protein_features.npz` / `<id>_residue_features.npz` pairs
    #[arg(long)]
    pub input_dir: PathBuf,

    /// Write the JSON result bundle here
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Fail instead of using random weights when no checkpoint is found
    #[arg(long)]
    pub strict: bool,

    /// Network configuration; defaults to `config.json` in the checkpoint directory
    #[arg(long)]
    pub model_config: Option<PathBuf>,
}

pub fn execute(args: PredictDdgArgs, cpu: bool) -> anyhow::Result<()> {
    require(&args.ddg_csv)?;
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

    let records = read_ddg_csv(&args.ddg_csv)?;
    tracing::info!("{} mutation records in {}", records.len(), args.ddg_csv.display());
    let mut pipeline = DdgPipeline::new(&context, &args.input_dir);
    let report = pipeline.run(&records)?;
    println!(
        "scored {} of {} mutations ({} skipped)",
        report.scored(),
        report.total,
        report.skipped()
    );
    if let Some(output) = &args.output {
        report.bundle.write(output)?;
    }
    match report.correlation() {
        Ok(correlation) => print_correlation(&correlation),
        Err(e) => tracing::warn!("no correlation: {e}"),
    }
    Ok(())
}
