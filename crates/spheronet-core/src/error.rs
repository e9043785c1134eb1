use thiserror::Error;

pub type Result<T> = std::result::Result<T, GridError>;

/// Errors raised while laying kernels over a cubed-sphere grid.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("expected a rank-6 cubed-sphere tensor (batch, side, radial, xi, eta, channel), got shape {0:?}")]
    Rank(Vec<usize>),

    #[error("expected {expected} sides, got {found}")]
    SideCount { expected: usize, found: usize },

    #[error("cube sides must be square, got {xi}x{eta}")]
    NonSquareSide { xi: usize, eta: usize },

    #[error("filter must have rank 5 (radial, xi, eta, in, out), got shape {0:?}")]
    FilterRank(Vec<usize>),

    #[error("filter expects {expected} input channels, tensor has {found}")]
    ChannelMismatch { expected: usize, found: usize },

    #[error("kernel and stride along {0} must be positive")]
    EmptyWindow(&'static str),

    #[error("angular kernel along {axis} must have odd size, got {kernel}")]
    EvenAngularKernel { axis: &'static str, kernel: usize },

    #[error("kernel of size {kernel} along {axis} needs a halo of {halo} pixels, wider than the side ({width} pixels); it cannot traverse a cube edge")]
    HaloExceedsSide {
        axis: &'static str,
        kernel: usize,
        halo: usize,
        width: usize,
    },

    #[error("kernel of size {kernel} along {axis} exceeds the extent {extent}")]
    KernelExceedsExtent {
        axis: &'static str,
        kernel: usize,
        extent: usize,
    },

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}
