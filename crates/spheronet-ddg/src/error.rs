use spheronet_io::{IoError, ResidueKey};
use spheronet_nn::ModelError;
use thiserror::Error;

/// Why a single mutation could not be scored. These never abort a run.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("no feature files for structure {0}")]
    MissingStructure(String),

    #[error("residue {residue} not found in {pdb_id}")]
    MissingResidue { pdb_id: String, residue: ResidueKey },

    #[error("{pdb_id} {residue}: structure has {found}, mutation expects {expected}")]
    WildTypeMismatch {
        pdb_id: String,
        residue: ResidueKey,
        expected: char,
        found: char,
    },

    #[error("incompatible grid shape: {0}")]
    IncompatibleGridShape(String),

    #[error("computation failed: {0}")]
    Computation(String),
}

impl ScoreError {
    pub fn is_grid_shape(&self) -> bool {
        matches!(self, Self::IncompatibleGridShape(_))
    }
}

impl From<IoError> for ScoreError {
    fn from(e: IoError) -> Self {
        match e {
            IoError::IncompatibleGridShape { .. } => Self::IncompatibleGridShape(e.to_string()),
            e => Self::Computation(e.to_string()),
        }
    }
}

impl From<ModelError> for ScoreError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::IncompatibleGridShape { .. } | ModelError::Grid(_) => {
                Self::IncompatibleGridShape(e.to_string())
            }
            e => Self::Computation(e.to_string()),
        }
    }
}

impl From<candle_core::Error> for ScoreError {
    fn from(e: candle_core::Error) -> Self {
        Self::Computation(e.to_string())
    }
}

/// Errors that stop a whole scoring or correlation run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("every one of the {attempted} mutations failed on an incompatible grid shape; the feature files do not match the network")]
    SystemicGridMismatch { attempted: usize },

    #[error("correlation needs paired samples, got {predicted} predictions and {observed} observations")]
    LengthMismatch { predicted: usize, observed: usize },

    #[error("correlation needs at least 3 pairs, got {0}")]
    TooFewPairs(usize),

    #[error("correlation is undefined: {0} has zero variance")]
    ZeroVariance(&'static str),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}
