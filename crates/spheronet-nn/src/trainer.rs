//! Supervised training of the residue classifier.
//!
//! Adam with fixed hyper-parameters, softmax cross-entropy against the one-hot
//! residue labels, and periodic checkpoints the inference path can restore.
use crate::checkpoint::{self, Strictness};
use crate::config::CubedSphereConfig;
use crate::error::{ModelError, Result};
use crate::model::{accuracy, softmax_cross_entropy, CubedSphereModel};
use candle_core::Device;
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use serde::{Deserialize, Serialize};
use spheronet_io::{Batch, BatchFactory};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub max_steps: u64,
    /// Probability of keeping an `fc1` activation; 1.0 disables dropout.
    pub keep_prob: f64,
    pub checkpoint_every: u64,
    pub log_every: u64,
    pub seed: u64,
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_steps: 60_000,
            keep_prob: 1.0,
            checkpoint_every: 1_000,
            log_every: 100,
            seed: 0,
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ModelError::InvalidConfig("batch size must be positive".into()));
        }
        if !(self.keep_prob > 0.0 && self.keep_prob <= 1.0) {
            return Err(ModelError::InvalidConfig(format!(
                "keep probability must lie in (0, 1], got {}",
                self.keep_prob
            )));
        }
        if self.checkpoint_every == 0 || self.log_every == 0 {
            return Err(ModelError::InvalidConfig(
                "checkpoint and log intervals must be positive".into(),
            ));
        }
        Ok(())
    }

    fn adam(&self) -> ParamsAdamW {
        ParamsAdamW {
            lr: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.epsilon,
            weight_decay: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub steps: u64,
    pub loss: f64,
    pub accuracy: f64,
    pub checkpoint: Option<PathBuf>,
}

pub struct Trainer {
    varmap: VarMap,
    model: CubedSphereModel,
    optimizer: AdamW,
    config: TrainingConfig,
    checkpoint_dir: PathBuf,
    device: Device,
    step: u64,
}

impl Trainer {
    /// Build the network and resume from the latest checkpoint in
    /// `checkpoint_dir`, if there is one.
    pub fn new(
        model_config: &CubedSphereConfig,
        config: TrainingConfig,
        checkpoint_dir: &Path,
        device: &Device,
    ) -> Result<Self> {
        config.validate()?;
        let (mut varmap, model) = CubedSphereModel::init(model_config, device, config.seed)?;
        let step = checkpoint::restore(&mut varmap, checkpoint_dir, None, Strictness::Lenient)?
            .unwrap_or(0);
        if step > 0 {
            tracing::info!("resuming training at step {step}");
        }
        let optimizer = AdamW::new(varmap.all_vars(), config.adam())?;
        Ok(Self {
            varmap,
            model,
            optimizer,
            config,
            checkpoint_dir: checkpoint_dir.to_path_buf(),
            device: device.clone(),
            step,
        })
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn model(&self) -> &CubedSphereModel {
        &self.model
    }

    /// One optimiser update. Returns the batch loss and accuracy before the update.
    pub fn train_step(&mut self, batch: &Batch) -> Result<(f64, f64)> {
        let data = batch.data.to_device(&self.device)?;
        let labels = batch.model_output.to_device(&self.device)?;
        let logits = self.model.forward_t(&data, self.config.keep_prob)?;
        let loss = softmax_cross_entropy(&logits, &labels)?;
        self.optimizer.backward_step(&loss)?;
        self.step += 1;
        let acc = accuracy(&logits, &labels)?.to_scalar::<f32>()?;
        Ok((loss.to_scalar::<f32>()? as f64, acc as f64))
    }

    /// Loss and accuracy of one batch with dropout disabled.
    pub fn evaluate(&self, batch: &Batch) -> Result<(f64, f64)> {
        let data = batch.data.to_device(&self.device)?;
        let labels = batch.model_output.to_device(&self.device)?;
        let logits = self.model.forward(&data)?;
        let loss = softmax_cross_entropy(&logits, &labels)?.to_scalar::<f32>()?;
        let acc = accuracy(&logits, &labels)?.to_scalar::<f32>()?;
        Ok((loss as f64, acc as f64))
    }

    pub fn save_checkpoint(&self) -> Result<PathBuf> {
        checkpoint::save(
            &self.varmap,
            self.model.config(),
            &self.checkpoint_dir,
            self.step,
        )
    }

    /// Train until `max_steps`, checkpointing every `checkpoint_every` steps
    /// and once more at the end.
    pub fn train(
        &mut self,
        train: &mut BatchFactory,
        mut validation: Option<&mut BatchFactory>,
    ) -> Result<TrainingSummary> {
        let (mut loss, mut acc) = (f64::NAN, f64::NAN);
        let mut saved_at = None;
        let mut last_checkpoint = None;
        while self.step < self.config.max_steps {
            let batch = train.next_batch(self.config.batch_size)?;
            (loss, acc) = self.train_step(&batch)?;
            if self.step % self.config.log_every == 0 {
                tracing::info!(
                    "step {}: loss {loss:.4}, accuracy {acc:.3}, epoch {}",
                    self.step,
                    train.epoch()
                );
            }
            if self.step % self.config.checkpoint_every == 0 {
                last_checkpoint = Some(self.save_checkpoint()?);
                saved_at = Some(self.step);
                if let Some(factory) = validation.as_mut() {
                    let batch = factory.next_batch(self.config.batch_size)?;
                    let (v_loss, v_acc) = self.evaluate(&batch)?;
                    tracing::info!(
                        "step {}: validation loss {v_loss:.4}, accuracy {v_acc:.3}",
                        self.step
                    );
                }
            }
        }
        if saved_at != Some(self.step) {
            last_checkpoint = Some(self.save_checkpoint()?);
        }
        Ok(TrainingSummary {
            steps: self.step,
            loss,
            accuracy: acc,
            checkpoint: last_checkpoint,
        })
    }
}
