//! spheronet-ddg
//!
//! Turns network class probabilities into stability predictions.
//!
//! A point mutation `wt -> mut` at a residue is scored by comparing the
//! frequency-normalised log-probability of the mutant amino acid against that of
//! the wild type ([`scoring`]). [`DdgPipeline`] walks a table of experimental
//! ddG values, scores every record it can and collects the rest as skipped;
//! [`pearson`] reports how well predictions track the experiment.
pub mod correlation;
pub mod error;
pub mod pipeline;
pub mod scoring;

pub use correlation::{pearson, Correlation};
pub use error::{PipelineError, ScoreError};
pub use pipeline::{ClassPredictor, DdgPipeline, ScoreOutcome, ScoringReport};
pub use scoring::{rescore_bundle, site_ddg};
