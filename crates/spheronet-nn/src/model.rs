//! Cubed-sphere CNN over per-residue atomic environments.
//!
//! Parameters are named after the layers that own them:
//!
//! - `conv{1..}.weights` `(kr, kxi, keta, in, out)` and `conv{1..}.b` `(out)`
//! - `fc1`, `fc2`, `out`: `.weights` `(in, out)` and `.b` `(out)`
use crate::config::{ConvStage, CubedSphereConfig};
use crate::error::{ModelError, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{Init, VarBuilder, VarMap};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use spheronet_core::{avg_pool_spherical_cubed_sphere, conv_spherical_cubed_sphere, Window3};

const ZERO: Init = Init::Const(0.0);

#[derive(Debug, Clone)]
struct SphericalConv {
    weights: Tensor,
    b: Tensor,
    strides: Window3,
}

impl SphericalConv {
    fn load(vb: VarBuilder, in_channels: usize, stage: &ConvStage, stddev: f64) -> Result<Self> {
        let k = stage.conv_kernel;
        let weights = vb.get_with_hints(
            (k.radial, k.xi, k.eta, in_channels, stage.channels),
            "weights",
            Init::Randn {
                mean: 0.0,
                stdev: stddev,
            },
        )?;
        let b = vb.get_with_hints(stage.channels, "b", ZERO)?;
        Ok(Self {
            weights,
            b,
            strides: stage.conv_stride,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let ys = conv_spherical_cubed_sphere(xs, &self.weights, self.strides)?;
        Ok(ys.broadcast_add(&self.b)?.relu()?)
    }
}

/// Fully connected layer storing its weights as `(in, out)`.
#[derive(Debug, Clone)]
struct Dense {
    weights: Tensor,
    b: Tensor,
}

impl Dense {
    fn load(vb: VarBuilder, in_dim: usize, out_dim: usize, stddev: f64) -> Result<Self> {
        let weights = vb.get_with_hints(
            (in_dim, out_dim),
            "weights",
            Init::Randn {
                mean: 0.0,
                stdev: stddev,
            },
        )?;
        let b = vb.get_with_hints(out_dim, "b", ZERO)?;
        Ok(Self { weights, b })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        Ok(xs.matmul(&self.weights)?.broadcast_add(&self.b)?)
    }
}

#[derive(Debug, Clone)]
pub struct CubedSphereModel {
    config: CubedSphereConfig,
    convs: Vec<(SphericalConv, ConvStage)>,
    fc1: Dense,
    fc2: Dense,
    out: Dense,
}

impl CubedSphereModel {
    pub fn load(vb: VarBuilder, config: &CubedSphereConfig) -> Result<Self> {
        config.validate()?;
        let stddev = config.init_stddev;
        let mut in_channels = config.input_shape[4];
        let mut convs = Vec::with_capacity(config.stages.len());
        for (i, stage) in config.stages.iter().enumerate() {
            let conv = SphericalConv::load(
                vb.pp(format!("conv{}", i + 1)),
                in_channels,
                stage,
                stddev,
            )?;
            convs.push((conv, *stage));
            in_channels = stage.channels;
        }
        let flattened = config.flattened_width()?;
        let fc1 = Dense::load(vb.pp("fc1"), flattened, config.fc_width, stddev)?;
        let fc2 = Dense::load(vb.pp("fc2"), config.fc_width, config.fc_width, stddev)?;
        let out = Dense::load(vb.pp("out"), config.fc_width, config.num_classes, stddev)?;
        tracing::debug!(
            "built cubed-sphere network: {} stages, flattened width {flattened}",
            convs.len()
        );
        Ok(Self {
            config: config.clone(),
            convs,
            fc1,
            fc2,
            out,
        })
    }

    /// Build a fresh network whose parameters live in a new [`VarMap`], with
    /// weights drawn from a truncated normal and zero biases.
    pub fn init(config: &CubedSphereConfig, device: &Device, seed: u64) -> Result<(VarMap, Self)> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = Self::load(vb, config)?;
        init_truncated_normal(&varmap, config.init_stddev, seed)?;
        Ok((varmap, model))
    }

    pub fn config(&self) -> &CubedSphereConfig {
        &self.config
    }

    fn check_input(&self, xs: &Tensor) -> Result<()> {
        let dims = xs.dims();
        if dims.len() != 6 || dims[1..] != self.config.input_shape {
            return Err(ModelError::IncompatibleGridShape {
                expected: self.config.input_shape.to_vec(),
                found: dims.get(1..).unwrap_or(dims).to_vec(),
            });
        }
        Ok(())
    }

    /// Logits `(batch, classes)`. `keep_prob < 1` applies dropout after `fc1`
    /// and is only meaningful while training.
    pub fn forward_t(&self, xs: &Tensor, keep_prob: f64) -> Result<Tensor> {
        self.check_input(xs)?;
        let mut hs = xs.clone();
        for (conv, stage) in &self.convs {
            hs = conv.forward(&hs)?;
            hs = avg_pool_spherical_cubed_sphere(&hs, stage.pool_kernel, stage.pool_stride)?;
        }
        let hs = hs.flatten_from(1)?;
        let hs = self.fc1.forward(&hs)?.relu()?;
        let hs = if keep_prob < 1.0 {
            candle_nn::ops::dropout(&hs, (1.0 - keep_prob) as f32)?
        } else {
            hs
        };
        let hs = self.fc2.forward(&hs)?.relu()?;
        self.out.forward(&hs)
    }

    /// Logits with dropout disabled.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.forward_t(xs, 1.0)
    }

    /// Softmax class probabilities `(batch, classes)`.
    pub fn probabilities(&self, xs: &Tensor) -> Result<Tensor> {
        let logits = self.forward(xs)?;
        Ok(candle_nn::ops::softmax_last_dim(&logits)?)
    }
}

/// Mean softmax cross-entropy of `logits` against (one-hot or soft) `labels`.
pub fn softmax_cross_entropy(logits: &Tensor, labels: &Tensor) -> Result<Tensor> {
    let log_probs = candle_nn::ops::log_softmax(logits, D::Minus1)?;
    Ok(log_probs.mul(labels)?.sum(D::Minus1)?.neg()?.mean_all()?)
}

/// Fraction of rows whose arg-max logit matches the arg-max label.
pub fn accuracy(logits: &Tensor, labels: &Tensor) -> Result<Tensor> {
    let predicted = logits.argmax(D::Minus1)?;
    let expected = labels.argmax(D::Minus1)?;
    Ok(predicted.eq(&expected)?.to_dtype(DType::F32)?.mean_all()?)
}

/// Redraw every `*.weights` variable from a normal distribution truncated at two
/// standard deviations.
pub fn init_truncated_normal(varmap: &VarMap, stddev: f64, seed: u64) -> Result<()> {
    let normal =
        Normal::new(0.0f32, stddev as f32).map_err(|e| ModelError::InvalidConfig(e.to_string()))?;
    let bound = 2.0 * stddev as f32;
    let mut rng = StdRng::seed_from_u64(seed);

    let data = varmap
        .data()
        .lock()
        .map_err(|e| ModelError::Parameters(e.to_string()))?;
    let mut names: Vec<&String> = data.keys().filter(|n| n.ends_with(".weights")).collect();
    names.sort();
    for name in names {
        let var = &data[name];
        let values: Vec<f32> = (0..var.elem_count())
            .map(|_| loop {
                let v = normal.sample(&mut rng);
                if v.abs() <= bound {
                    break v;
                }
            })
            .collect();
        let fresh = Tensor::from_vec(values, var.dims(), var.device())?.to_dtype(var.dtype())?;
        var.set(&fresh)?;
    }
    Ok(())
}
