use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IoError>;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("{path}: missing required array `{key}`")]
    MissingArray { path: PathBuf, key: &'static str },

    #[error("{path}: array `{key}` has shape {found:?}, expected {expected}")]
    ArrayShape {
        path: PathBuf,
        key: &'static str,
        expected: String,
        found: Vec<usize>,
    },

    #[error("{path}: grid shape {found:?} is incompatible with the expected {expected:?}")]
    IncompatibleGridShape {
        path: PathBuf,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("{id}: protein file lists {protein} residues, residue file holds {residue}")]
    ResidueCount {
        id: String,
        protein: usize,
        residue: usize,
    },

    #[error("{0}: no matching protein/residue feature file")]
    UnpairedFeatureFile(PathBuf),

    #[error("no feature files found in {0}")]
    NoFeatures(PathBuf),

    #[error("test fraction must lie in [0, 1], got {0}")]
    InvalidFraction(f64),

    #[error("dataset holds no residues")]
    EmptyDataset,

    #[error("unknown dataset `{0}` (expected `data` or `model_output`)")]
    UnknownDataset(String),

    #[error("invalid mutation `{token}`: {reason}")]
    InvalidMutation { token: String, reason: String },

    #[error("{path}, record {record}: {reason}")]
    InvalidRecord {
        path: PathBuf,
        record: usize,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}
