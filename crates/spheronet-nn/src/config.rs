use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use spheronet_core::{GridShape, Window3, NUM_CLASSES, NUM_SIDES};
use std::path::Path;

/// File name of the configuration stored next to checkpoints.
pub const CONFIG_FILE: &str = "config.json";

/// One convolution + pooling stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvStage {
    pub conv_kernel: Window3,
    pub conv_stride: Window3,
    pub channels: usize,
    pub pool_kernel: Window3,
    pub pool_stride: Window3,
}

impl ConvStage {
    pub const fn new(
        conv_kernel: Window3,
        conv_stride: Window3,
        channels: usize,
        pool_kernel: Window3,
        pool_stride: Window3,
    ) -> Self {
        Self {
            conv_kernel,
            conv_stride,
            channels,
            pool_kernel,
            pool_stride,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubedSphereConfig {
    /// Per-residue grid `(6, R, X, Y, C)`.
    pub input_shape: [usize; 5],
    pub stages: Vec<ConvStage>,
    pub fc_width: usize,
    pub num_classes: usize,
    /// Standard deviation of the truncated normal used for weight initialisation.
    pub init_stddev: f64,
}

impl Default for CubedSphereConfig {
    fn default() -> Self {
        Self {
            input_shape: [NUM_SIDES, 24, 38, 38, 2],
            stages: vec![
                ConvStage::new(
                    Window3::new(3, 5, 5),
                    Window3::new(1, 2, 2),
                    16,
                    Window3::new(1, 3, 3),
                    Window3::new(1, 2, 2),
                ),
                ConvStage::new(
                    Window3::cube(3),
                    Window3::cube(1),
                    32,
                    Window3::cube(3),
                    Window3::cube(2),
                ),
                ConvStage::new(
                    Window3::cube(3),
                    Window3::cube(1),
                    64,
                    Window3::new(1, 3, 3),
                    Window3::new(1, 2, 2),
                ),
                ConvStage::new(
                    Window3::cube(3),
                    Window3::cube(1),
                    128,
                    Window3::new(1, 3, 3),
                    Window3::cube(1),
                ),
            ],
            fc_width: 2048,
            num_classes: NUM_CLASSES,
            init_stddev: 0.1,
        }
    }
}

impl CubedSphereConfig {
    /// A single-stage network over `(6, 4, 3, 3, 2)` grids, small enough for tests.
    pub fn tiny() -> Self {
        Self {
            input_shape: [NUM_SIDES, 4, 3, 3, 2],
            stages: vec![ConvStage::new(
                Window3::cube(3),
                Window3::cube(1),
                4,
                Window3::new(1, 3, 3),
                Window3::new(1, 2, 2),
            )],
            fc_width: 16,
            num_classes: NUM_CLASSES,
            init_stddev: 0.1,
        }
    }

    fn input_grid(&self, batch: usize) -> Result<GridShape> {
        let [sides, radial, xi, eta, channels] = self.input_shape;
        if sides != NUM_SIDES {
            return Err(ModelError::InvalidConfig(format!(
                "input must have {NUM_SIDES} sides, got {sides}"
            )));
        }
        if xi != eta {
            return Err(ModelError::InvalidConfig(format!(
                "input sides must be square, got {xi}x{eta}"
            )));
        }
        Ok(GridShape {
            batch,
            radial,
            xi,
            eta,
            channels,
        })
    }

    /// Grid shape after every convolution and every pooling, in order.
    pub fn stage_shapes(&self) -> Result<Vec<GridShape>> {
        let mut shape = self.input_grid(1)?;
        let mut shapes = Vec::with_capacity(2 * self.stages.len());
        for stage in &self.stages {
            shape = shape.windowed(stage.conv_kernel, stage.conv_stride, stage.channels)?;
            shapes.push(shape);
            shape = shape.windowed(stage.pool_kernel, stage.pool_stride, stage.channels)?;
            shapes.push(shape);
        }
        Ok(shapes)
    }

    /// Width of the flattened output of the last pooling stage.
    pub fn flattened_width(&self) -> Result<usize> {
        let last = match self.stage_shapes()?.last() {
            Some(shape) => *shape,
            None => self.input_grid(1)?,
        };
        Ok(last.elem_count_per_item())
    }

    /// Check that every stage fits the grid it is applied to.
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 || self.fc_width == 0 {
            return Err(ModelError::InvalidConfig(
                "fc width and class count must be positive".to_string(),
            ));
        }
        if self.stages.iter().any(|s| s.channels == 0) {
            return Err(ModelError::InvalidConfig(
                "stage channel counts must be positive".to_string(),
            ));
        }
        let width = self.flattened_width()?;
        if width == 0 {
            return Err(ModelError::InvalidConfig(
                "the last stage leaves an empty grid".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_json(path: &Path) -> Result<Self> {
        let config: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// An explicit config file wins, then `config.json` in the checkpoint
    /// directory, then the built-in default.
    pub fn resolve(checkpoint_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            tracing::info!("model configuration from {}", path.display());
            return Self::from_json(path);
        }
        let stored = checkpoint_dir.join(CONFIG_FILE);
        if stored.is_file() {
            tracing::info!("model configuration from {}", stored.display());
            return Self::from_json(&stored);
        }
        tracing::debug!("using the default model configuration");
        Ok(Self::default())
    }
}
