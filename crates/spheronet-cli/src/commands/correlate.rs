use super::print_correlation;
use crate::error::require;
use clap::Args;
use spheronet_ddg::{pearson, rescore_bundle};
use spheronet_io::ResultBundle;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CorrelateArgs {
    /// JSON bundle written by `predict-ddg --output`
    #[arg(long)]
    pub results: PathBuf,
}

pub fn execute(args: CorrelateArgs) -> anyhow::Result<()> {
    require(&args.results)?;
    let bundle = rescore_bundle(&ResultBundle::read(&args.results)?);
    if !bundle.skipped.is_empty() {
        tracing::info!("{} records were skipped when scoring", bundle.skipped.len());
    }
    let (predicted, observed) = bundle.pairs();
    print_correlation(&pearson(&predicted, &observed)?);
    Ok(())
}
