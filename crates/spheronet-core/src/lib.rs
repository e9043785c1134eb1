//! spheronet-core
//!
//! - the 21-letter amino-acid alphabet used for class labels.
//! - the cubed-sphere grid: six square sides wrapped around a residue.
//! - spherical convolution and average pooling that gather across side edges.
//!
pub mod alphabet;
pub mod error;
pub mod ops;
pub mod topology;

pub use alphabet::{AminoAcid, NUM_CLASSES};
pub use error::{GridError, Result};
pub use ops::{
    avg_pool_spherical_cubed_sphere, conv_spherical_cubed_sphere, GridShape, Window3,
};
pub use topology::{pad_cubed_sphere, resolve_pixel, HaloGather, SidePixel, NUM_SIDES};
