//! spheronet-nn
//!
//! The cubed-sphere convolutional network that predicts a residue's amino-acid
//! class from its atomic environment.
//!
//! - [`CubedSphereConfig`]: stage table and layer widths.
//! - [`CubedSphereModel`]: the network.
//! - [`InferenceContext`]: a restored network for scoring.
//! - [`Trainer`]: Adam training loop producing checkpoints.
//!
//! ```shell
//! cargo test -p spheronet-nn
//! cargo test -p spheronet-nn --features metal
//! ```
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::Device;

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod inference;
pub mod model;
pub mod trainer;

pub use checkpoint::Strictness;
pub use config::{ConvStage, CubedSphereConfig, CONFIG_FILE};
pub use error::{ModelError, Result};
pub use inference::{Evaluation, InferenceContext};
pub use model::CubedSphereModel;
pub use trainer::{Trainer, TrainingConfig, TrainingSummary};

pub fn device(cpu: bool) -> candle_core::Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else if cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            tracing::info!("running on CPU, build with `--features metal` to use the GPU");
        }
        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        {
            tracing::info!("running on CPU, build with `--features cuda` to use the GPU");
        }
        Ok(Device::Cpu)
    }
}
