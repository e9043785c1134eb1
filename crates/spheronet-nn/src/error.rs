use spheronet_core::GridError;
use spheronet_io::IoError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

fn describe_step(step: &Option<u64>) -> String {
    step.map(|s| format!(" for step {s}")).unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no checkpoint{} found in {dir}", describe_step(.step))]
    CheckpointNotFound { dir: PathBuf, step: Option<u64> },

    #[error("input grid shape {found:?} does not match the network input {expected:?}")]
    IncompatibleGridShape {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("invalid network configuration: {0}")]
    InvalidConfig(String),

    #[error("parameter store is unavailable: {0}")]
    Parameters(String),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Features(#[from] IoError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}
