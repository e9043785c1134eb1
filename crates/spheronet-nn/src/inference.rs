use crate::checkpoint::{self, Strictness};
use crate::config::CubedSphereConfig;
use crate::error::{ModelError, Result};
use crate::model::{accuracy, softmax_cross_entropy, CubedSphereModel};
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use std::path::Path;

/// Seed of the weights used when no checkpoint is restored.
const INIT_SEED: u64 = 0;

/// A network with restored parameters, ready to score residues.
///
/// The context owns the only copy of the parameters and is read-only once
/// built; pass it around by reference.
pub struct InferenceContext {
    varmap: VarMap,
    model: CubedSphereModel,
    device: Device,
    restored: Option<u64>,
}

/// Mean loss and top-1 accuracy over a set of residues.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
    pub residues: usize,
}

impl InferenceContext {
    /// Build the network and restore `step` (`None` or `-1` = latest) from `checkpoint_dir`.
    pub fn new(
        config: &CubedSphereConfig,
        checkpoint_dir: &Path,
        step: Option<i64>,
        strictness: Strictness,
        device: &Device,
    ) -> Result<Self> {
        let (mut varmap, model) = CubedSphereModel::init(config, device, INIT_SEED)?;
        let restored = checkpoint::restore(
            &mut varmap,
            checkpoint_dir,
            checkpoint::requested_step(step),
            strictness,
        )?;
        Ok(Self {
            varmap,
            model,
            device: device.clone(),
            restored,
        })
    }

    /// Step of the restored checkpoint; `None` when running on random weights.
    pub fn restored(&self) -> Option<u64> {
        self.restored
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn config(&self) -> &CubedSphereConfig {
        self.model.config()
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Class probabilities `(batch, classes)` for a `(batch, 6, R, X, Y, C)` grid batch.
    pub fn infer(&self, batch: &Tensor) -> Result<Tensor> {
        let batch = batch.to_device(&self.device)?;
        self.model.probabilities(&batch)
    }

    /// Probability vector of a single residue grid `(1, 6, R, X, Y, C)`.
    pub fn infer_one(&self, grid: &Tensor) -> Result<Vec<f32>> {
        if grid.dims().first() != Some(&1) {
            return Err(ModelError::IncompatibleGridShape {
                expected: [1].into_iter().chain(self.config().input_shape).collect(),
                found: grid.dims().to_vec(),
            });
        }
        let probs = self.infer(grid)?;
        Ok(probs.squeeze(0)?.to_vec1::<f32>()?)
    }

    /// Sum of loss and correct predictions over one batch, to be accumulated
    /// by [`Evaluation::from_totals`].
    pub fn evaluate_batch(&self, data: &Tensor, labels: &Tensor) -> Result<(f64, f64)> {
        let data = data.to_device(&self.device)?;
        let labels = labels.to_device(&self.device)?;
        let logits = self.model.forward(&data)?;
        let n = logits.dim(0)? as f64;
        let loss = softmax_cross_entropy(&logits, &labels)?.to_scalar::<f32>()? as f64;
        let acc = accuracy(&logits, &labels)?.to_scalar::<f32>()? as f64;
        Ok((loss * n, acc * n))
    }
}

impl Evaluation {
    pub fn from_totals(loss: f64, correct: f64, residues: usize) -> Self {
        let n = residues.max(1) as f64;
        Self {
            loss: loss / n,
            accuracy: correct / n,
            residues,
        }
    }
}
