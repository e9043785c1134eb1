//! JSON bundle of ddG predictions, written by `predict-ddg` and read back by `correlate`.
use crate::error::Result;
use crate::features::ResidueKey;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Network output at one mutated site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitePrediction {
    pub residue: ResidueKey,
    pub wild_type: char,
    pub mutant: char,
    pub wild_type_probabilities: Vec<f32>,
    pub mutant_probabilities: Vec<f32>,
    /// The mutant probabilities came from a modelled mutant structure rather
    /// than the wild-type environment.
    pub mutant_environment: bool,
    pub ddg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub pdb_id: String,
    pub mutations: String,
    pub sites: Vec<SitePrediction>,
    pub predicted_ddg: f64,
    pub observed_ddg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub pdb_id: String,
    pub mutations: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    pub records: Vec<PredictionRecord>,
    #[serde(default)]
    pub skipped: Vec<SkippedRecord>,
}

impl ResultBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: PredictionRecord) {
        self.records.push(record);
    }

    pub fn push_skipped(&mut self, skipped: SkippedRecord) {
        self.skipped.push(skipped);
    }

    /// `(predicted, observed)` ddG columns.
    pub fn pairs(&self) -> (Vec<f64>, Vec<f64>) {
        self.records
            .iter()
            .map(|r| (r.predicted_ddg, r.observed_ddg))
            .unzip()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        tracing::info!(
            "wrote {} predictions ({} skipped) to {}",
            self.records.len(),
            self.skipped.len(),
            path.display()
        );
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
