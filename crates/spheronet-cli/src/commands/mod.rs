pub mod correlate;
pub mod infer;
pub mod predict_ddg;
pub mod train;

use clap::Args;
use spheronet_ddg::Correlation;
use spheronet_nn::Strictness;

/// How the sorted structures of a feature directory are split.
#[derive(Args, Debug, Clone)]
pub struct SplitArgs {
    /// Fraction of structures held out for testing
    #[arg(long, default_value_t = 0.25)]
    pub test_set_fraction: f64,

    /// Number of structures taken for validation just before the test set
    #[arg(long, default_value_t = 10)]
    pub validation_set_size: usize,
}

pub fn strictness(strict: bool) -> Strictness {
    if strict {
        Strictness::Strict
    } else {
        Strictness::Lenient
    }
}

pub fn print_correlation(correlation: &Correlation) {
    println!(
        "pearson r = {:.4}, p = {:.3e} (n = {})",
        correlation.r, correlation.p_value, correlation.n
    );
}
