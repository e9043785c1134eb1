//! spheronet-io
//!
//! Everything that crosses the filesystem boundary:
//!
//! - typed `.npz` feature files ([`features`]).
//! - mini-batches and train / validation / test splits ([`batch`]).
//! - experimental ddG tables ([`mutations`]).
//! - the JSON bundle of predictions ([`results`]).
pub mod batch;
pub mod error;
pub mod features;
pub mod mutations;
pub mod results;

pub use batch::{partition, Batch, BatchFactory, Partition, Split, DATA, MODEL_OUTPUT};
pub use error::{IoError, Result};
pub use features::{
    discover, FeaturePair, FeatureStore, ProteinFeatures, ResidueGrids, ResidueKey,
};
pub use mutations::{parse_mutations, read_ddg_csv, MutationRecord, PointMutation};
pub use results::{PredictionRecord, ResultBundle, SitePrediction, SkippedRecord};
