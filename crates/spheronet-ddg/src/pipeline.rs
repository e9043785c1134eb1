//! Score a ddG table mutation by mutation.
use crate::correlation::{pearson, Correlation};
use crate::error::{PipelineError, ScoreError};
use crate::scoring::site_ddg;
use candle_core::Tensor;
use spheronet_core::AminoAcid;
use spheronet_io::{
    FeatureStore, MutationRecord, PointMutation, PredictionRecord, ResidueKey, ResultBundle,
    SitePrediction, SkippedRecord,
};
use spheronet_nn::{InferenceContext, ModelError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Maps one residue grid to amino-acid class probabilities.
pub trait ClassPredictor {
    /// Probabilities for a `(1, 6, R, X, Y, C)` grid.
    fn class_probabilities(&self, grid: &Tensor) -> Result<Vec<f32>, ModelError>;

    /// Per-residue grid shape `(6, R, X, Y, C)` the predictor accepts.
    fn grid_shape(&self) -> Vec<usize>;
}

impl ClassPredictor for InferenceContext {
    fn class_probabilities(&self, grid: &Tensor) -> Result<Vec<f32>, ModelError> {
        self.infer_one(grid)
    }

    fn grid_shape(&self) -> Vec<usize> {
        self.config().input_shape.to_vec()
    }
}

#[derive(Debug)]
pub enum ScoreOutcome {
    Scored(PredictionRecord),
    Skipped {
        record: MutationRecord,
        reason: ScoreError,
    },
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct ScoringReport {
    pub bundle: ResultBundle,
    pub total: usize,
    pub grid_failures: usize,
}

impl ScoringReport {
    pub fn scored(&self) -> usize {
        self.bundle.records.len()
    }

    pub fn skipped(&self) -> usize {
        self.total - self.scored()
    }

    /// `(predicted, observed)` ddG columns.
    pub fn pairs(&self) -> (Vec<f64>, Vec<f64>) {
        self.bundle.pairs()
    }

    pub fn correlation(&self) -> Result<Correlation, PipelineError> {
        let (predicted, observed) = self.pairs();
        pearson(&predicted, &observed)
    }
}

/// Sequential ddG scorer.
///
/// Keeps the wild-type structure of the current `pdb_id` in memory and caches
/// wild-type probability vectors per residue, so every wild-type environment is
/// evaluated once however many mutants it has.
pub struct DdgPipeline<'a, P: ClassPredictor> {
    predictor: &'a P,
    feature_dir: PathBuf,
    grid_shape: Vec<usize>,
    structure: Option<FeatureStore>,
    wild_type_cache: HashMap<(String, ResidueKey), (AminoAcid, Vec<f32>)>,
    wild_type_evaluations: usize,
}

impl<'a, P: ClassPredictor> DdgPipeline<'a, P> {
    pub fn new(predictor: &'a P, feature_dir: &Path) -> Self {
        Self {
            predictor,
            feature_dir: feature_dir.to_path_buf(),
            grid_shape: predictor.grid_shape(),
            structure: None,
            wild_type_cache: HashMap::new(),
            wild_type_evaluations: 0,
        }
    }

    /// Number of wild-type environments sent through the predictor.
    pub fn wild_type_evaluations(&self) -> usize {
        self.wild_type_evaluations
    }

    fn wild_type_store(&mut self, pdb_id: &str) -> Result<&FeatureStore, ScoreError> {
        let loaded = matches!(&self.structure, Some(store) if store.id == pdb_id);
        if !loaded {
            self.structure = None;
            let store = FeatureStore::open(&self.feature_dir, pdb_id, Some(self.grid_shape.as_slice()))?
                .ok_or_else(|| ScoreError::MissingStructure(pdb_id.to_string()))?;
            tracing::debug!("loaded {} residues of {pdb_id}", store.protein.len());
            self.structure = Some(store);
        }
        self.structure
            .as_ref()
            .ok_or_else(|| ScoreError::MissingStructure(pdb_id.to_string()))
    }

    fn wild_type_probabilities(
        &mut self,
        pdb_id: &str,
        mutation: &PointMutation,
    ) -> Result<Vec<f32>, ScoreError> {
        let key = mutation.residue_key();
        let mismatch = |found: AminoAcid| ScoreError::WildTypeMismatch {
            pdb_id: pdb_id.to_string(),
            residue: key,
            expected: mutation.wild_type.code1(),
            found: found.code1(),
        };
        let cache_key = (pdb_id.to_string(), key);
        if let Some((found, probs)) = self.wild_type_cache.get(&cache_key) {
            if *found != mutation.wild_type {
                return Err(mismatch(*found));
            }
            return Ok(probs.clone());
        }
        let predictor = self.predictor;
        let store = self.wild_type_store(pdb_id)?;
        let (found, grid) = store
            .residue(&key)?
            .ok_or_else(|| ScoreError::MissingResidue {
                pdb_id: pdb_id.to_string(),
                residue: key,
            })?;
        if found != mutation.wild_type {
            return Err(mismatch(found));
        }
        let probs = predictor.class_probabilities(&grid)?;
        self.wild_type_evaluations += 1;
        self.wild_type_cache.insert(cache_key, (found, probs.clone()));
        Ok(probs)
    }

    /// Probabilities in the modelled mutant structure, if one exists for this site.
    fn mutant_probabilities(
        &self,
        pdb_id: &str,
        mutation: &PointMutation,
    ) -> Result<Option<Vec<f32>>, ScoreError> {
        let id = mutation.mutant_store_id(pdb_id);
        let Some(store) = FeatureStore::open(&self.feature_dir, &id, Some(self.grid_shape.as_slice()))?
        else {
            return Ok(None);
        };
        match store.residue(&mutation.residue_key())? {
            Some((_, grid)) => Ok(Some(self.predictor.class_probabilities(&grid)?)),
            None => {
                tracing::warn!(
                    "{id} lacks residue {}; using the wild-type environment",
                    mutation.residue_key()
                );
                Ok(None)
            }
        }
    }

    fn score_site(
        &mut self,
        pdb_id: &str,
        mutation: &PointMutation,
    ) -> Result<SitePrediction, ScoreError> {
        let wild_type_probabilities = self.wild_type_probabilities(pdb_id, mutation)?;
        let (mutant_probabilities, mutant_environment) =
            match self.mutant_probabilities(pdb_id, mutation)? {
                Some(probs) => (probs, true),
                None => (wild_type_probabilities.clone(), false),
            };
        let ddg = site_ddg(
            &wild_type_probabilities,
            mutation.wild_type,
            &mutant_probabilities,
            mutation.mutant,
        );
        Ok(SitePrediction {
            residue: mutation.residue_key(),
            wild_type: mutation.wild_type.code1(),
            mutant: mutation.mutant.code1(),
            wild_type_probabilities,
            mutant_probabilities,
            mutant_environment,
            ddg,
        })
    }

    fn try_score(&mut self, record: &MutationRecord) -> Result<PredictionRecord, ScoreError> {
        let sites = record
            .mutations
            .iter()
            .map(|m| self.score_site(&record.pdb_id, m))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PredictionRecord {
            pdb_id: record.pdb_id.clone(),
            mutations: record.mutation_list(),
            predicted_ddg: sites.iter().map(|s| s.ddg).sum(),
            sites,
            observed_ddg: record.ddg,
        })
    }

    /// Score one record. Failures are reported as [`ScoreOutcome::Skipped`].
    pub fn score(&mut self, record: &MutationRecord) -> ScoreOutcome {
        match self.try_score(record) {
            Ok(prediction) => {
                tracing::debug!(
                    "{record}: predicted {:.3}, observed {:.3}",
                    prediction.predicted_ddg,
                    prediction.observed_ddg
                );
                ScoreOutcome::Scored(prediction)
            }
            Err(reason) => {
                tracing::warn!("skipping {record}: {reason}");
                ScoreOutcome::Skipped {
                    record: record.clone(),
                    reason,
                }
            }
        }
    }

    /// Score every record in order.
    ///
    /// Fails only when records were given, none could be scored and every one
    /// failed on an incompatible grid shape.
    pub fn run(&mut self, records: &[MutationRecord]) -> Result<ScoringReport, PipelineError> {
        let mut bundle = ResultBundle::new();
        let mut grid_failures = 0;
        for record in records {
            match self.score(record) {
                ScoreOutcome::Scored(prediction) => bundle.push(prediction),
                ScoreOutcome::Skipped { record, reason } => {
                    if reason.is_grid_shape() {
                        grid_failures += 1;
                    }
                    bundle.push_skipped(SkippedRecord {
                        pdb_id: record.pdb_id.clone(),
                        mutations: record.mutation_list(),
                        reason: reason.to_string(),
                    });
                }
            }
        }
        let report = ScoringReport {
            bundle,
            total: records.len(),
            grid_failures,
        };
        if report.total > 0 && report.scored() == 0 && grid_failures == report.total {
            return Err(PipelineError::SystemicGridMismatch {
                attempted: report.total,
            });
        }
        tracing::info!(
            "scored {} of {} mutations ({} skipped, {} wild-type evaluations)",
            report.scored(),
            report.total,
            report.skipped(),
            self.wild_type_evaluations
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::D;
    use spheronet_core::NUM_CLASSES;
    use spheronet_test_data::{FeatureDir, ProteinFixture, SMALL_GRID};
    use std::cell::Cell;

    /// Softmax over the first 21 grid values, counting calls.
    struct GridSoftmax {
        calls: Cell<usize>,
    }

    impl GridSoftmax {
        fn new() -> Self {
            Self {
                calls: Cell::new(0),
            }
        }
    }

    impl ClassPredictor for GridSoftmax {
        fn class_probabilities(&self, grid: &Tensor) -> Result<Vec<f32>, ModelError> {
            self.calls.set(self.calls.get() + 1);
            let logits = grid.flatten_all()?.narrow(0, 0, NUM_CLASSES)?;
            let probs = logits.exp()?;
            let probs = probs.broadcast_div(&probs.sum_keepdim(D::Minus1)?)?;
            Ok(probs.to_vec1::<f32>()?)
        }

        fn grid_shape(&self) -> Vec<usize> {
            SMALL_GRID.to_vec()
        }
    }

    fn record(pdb_id: &str, mutations: &str, ddg: f64) -> MutationRecord {
        MutationRecord {
            pdb_id: pdb_id.to_string(),
            mutations: spheronet_io::parse_mutations(mutations).unwrap(),
            ddg,
        }
    }

    #[test]
    fn test_wild_type_computed_once() -> Result<(), PipelineError> {
        let (dir, _handle) = FeatureDir::small().protein("1abc", "MKVLG").create_temp()?;
        let predictor = GridSoftmax::new();
        let mut pipeline = DdgPipeline::new(&predictor, &dir);
        let records = [
            record("1abc", "V3A", 1.0),
            record("1abc", "V3G", 2.0),
            record("1abc", "V3W", 0.5),
        ];
        let report = pipeline.run(&records)?;
        assert_eq!(report.scored(), 3);
        assert_eq!(pipeline.wild_type_evaluations(), 1);
        assert_eq!(predictor.calls.get(), 1);

        let ddgs: Vec<f64> = report.bundle.records.iter().map(|r| r.predicted_ddg).collect();
        assert!(ddgs[0] != ddgs[1] && ddgs[1] != ddgs[2]);
        let site = &report.bundle.records[0].sites[0];
        assert_eq!(site.wild_type_probabilities.len(), NUM_CLASSES);
        assert!(!site.mutant_environment);
        Ok(())
    }

    #[test]
    fn test_missing_residue_is_skipped() -> Result<(), PipelineError> {
        let (dir, _handle) = FeatureDir::small().protein("1abc", "MKV").create_temp()?;
        let predictor = GridSoftmax::new();
        let mut pipeline = DdgPipeline::new(&predictor, &dir);
        let records = [
            record("1abc", "K2A", 1.0),
            record("1abc", "L40A", 2.0),
            record("9zzz", "K2A", 0.5),
            record("1abc", "G2A", 0.5),
            record("1abc", "M1G", 0.1),
        ];
        let report = pipeline.run(&records)?;
        assert_eq!(report.total, 5);
        assert_eq!(report.scored(), 2);
        assert_eq!(report.skipped(), 3);
        assert_eq!(report.pairs().0.len(), report.total - report.skipped());
        let reasons: Vec<&str> = report.bundle.skipped.iter().map(|s| s.reason.as_str()).collect();
        assert!(reasons[0].contains("not found"), "{reasons:?}");
        assert!(reasons[1].contains("9zzz"), "{reasons:?}");
        assert!(reasons[2].contains("expects G"), "{reasons:?}");
        Ok(())
    }

    #[test]
    fn test_mutant_environment_is_used() -> Result<(), PipelineError> {
        let (dir, _handle) = FeatureDir::small()
            .protein("1abc", "MKV")
            .with(ProteinFixture {
                id: "1abc_A_K2A".into(),
                sequence: "MAV".into(),
                chain: 'A',
                first_number: 1,
                insertion_codes: None,
                metadata: true,
                signal: 0.5,
            })
            .create_temp()?;
        let predictor = GridSoftmax::new();
        let mut pipeline = DdgPipeline::new(&predictor, &dir);
        let report = pipeline.run(&[record("1abc", "K2A", 1.0), record("1abc", "V3A", 1.0)])?;
        let with_mutant = &report.bundle.records[0].sites[0];
        assert!(with_mutant.mutant_environment);
        assert_ne!(
            with_mutant.mutant_probabilities,
            with_mutant.wild_type_probabilities
        );
        assert!(!report.bundle.records[1].sites[0].mutant_environment);
        Ok(())
    }

    #[test]
    fn test_multi_point_sums_sites() -> Result<(), PipelineError> {
        let (dir, _handle) = FeatureDir::small().protein("1abc", "MKVLG").create_temp()?;
        let predictor = GridSoftmax::new();
        let mut pipeline = DdgPipeline::new(&predictor, &dir);
        let report = pipeline.run(&[
            record("1abc", "K2A", 0.0),
            record("1abc", "L4G", 0.0),
            record("1abc", "K2A;L4G", 0.0),
        ])?;
        let ddgs: Vec<f64> = report.bundle.records.iter().map(|r| r.predicted_ddg).collect();
        assert!((ddgs[2] - (ddgs[0] + ddgs[1])).abs() < 1e-9);
        assert_eq!(report.bundle.records[2].sites.len(), 2);
        assert_eq!(report.bundle.records[2].mutations, "A:K2A;A:L4G");
        Ok(())
    }

    #[test]
    fn test_systemic_grid_mismatch() -> Result<(), PipelineError> {
        let (dir, _handle) = FeatureDir::new([6, 5, 3, 3, 2]).protein("1abc", "MKV").create_temp()?;
        let predictor = GridSoftmax::new();
        let mut pipeline = DdgPipeline::new(&predictor, &dir);
        let result = pipeline.run(&[record("1abc", "K2A", 1.0), record("1abc", "V3A", 1.0)]);
        assert!(matches!(
            result,
            Err(PipelineError::SystemicGridMismatch { attempted: 2 })
        ));

        // a single non-grid failure keeps the run alive
        let report = pipeline.run(&[record("1abc", "K2A", 1.0), record("9zzz", "K2A", 1.0)])?;
        assert_eq!(report.scored(), 0);
        assert_eq!(report.grid_failures, 1);
        Ok(())
    }

    #[test]
    fn test_empty_table() -> Result<(), PipelineError> {
        let (dir, _handle) = FeatureDir::small().protein("1abc", "MKV").create_temp()?;
        let predictor = GridSoftmax::new();
        let report = DdgPipeline::new(&predictor, &dir).run(&[])?;
        assert_eq!(report.total, 0);
        assert!(matches!(
            report.correlation(),
            Err(PipelineError::TooFewPairs(0))
        ));
        Ok(())
    }
}
