//! Spherical convolution and pooling on the cubed-sphere grid.
//!
//! Both operators follow the same recipe:
//!
//! 1. extend every side with a halo of `k / 2` pixels read from the neighbouring
//!    sides ([`HaloGather`]); the radial axis is not padded.
//! 2. collect every kernel window with strided `index_select`s (im2col).
//! 3. reduce the windows: a matmul against the filter for the convolution,
//!    a mean for the pooling.
//!
//! With `in` the halo-extended extent on the angular axes and the raw extent on
//! the radial axis, every output axis has `floor((in - k) / stride) + 1` pixels.
use crate::error::{GridError, Result};
use crate::topology::{HaloGather, NUM_SIDES};
use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

/// Sizes (of a kernel or a stride) along the radial, xi and eta axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window3 {
    pub radial: usize,
    pub xi: usize,
    pub eta: usize,
}

impl Window3 {
    pub const fn new(radial: usize, xi: usize, eta: usize) -> Self {
        Self { radial, xi, eta }
    }

    pub const fn cube(size: usize) -> Self {
        Self::new(size, size, size)
    }

    pub fn volume(&self) -> usize {
        self.radial * self.xi * self.eta
    }
}

/// Shape of a `(batch, side, radial, xi, eta, channel)` tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub batch: usize,
    pub radial: usize,
    pub xi: usize,
    pub eta: usize,
    pub channels: usize,
}

impl GridShape {
    pub fn of(tensor: &Tensor) -> Result<Self> {
        let dims = tensor.dims();
        let &[batch, sides, radial, xi, eta, channels] = dims else {
            return Err(GridError::Rank(dims.to_vec()));
        };
        if sides != NUM_SIDES {
            return Err(GridError::SideCount {
                expected: NUM_SIDES,
                found: sides,
            });
        }
        if xi != eta {
            return Err(GridError::NonSquareSide { xi, eta });
        }
        Ok(Self {
            batch,
            radial,
            xi,
            eta,
            channels,
        })
    }

    pub fn dims(&self) -> Vec<usize> {
        vec![
            self.batch,
            NUM_SIDES,
            self.radial,
            self.xi,
            self.eta,
            self.channels,
        ]
    }

    /// Number of values per batch element.
    pub fn elem_count_per_item(&self) -> usize {
        NUM_SIDES * self.radial * self.xi * self.eta * self.channels
    }

    /// Shape after sliding `kernel` with `stride` over this grid.
    pub fn windowed(&self, kernel: Window3, stride: Window3, channels: usize) -> Result<Self> {
        Ok(WindowPlan::new(self, kernel, stride)?.output(channels))
    }
}

/// Halo sizes and output extents for one kernel/stride over one input grid.
#[derive(Debug, Clone, Copy)]
struct WindowPlan {
    input: GridShape,
    kernel: Window3,
    stride: Window3,
    halo_xi: usize,
    halo_eta: usize,
    out_radial: usize,
    out_xi: usize,
    out_eta: usize,
}

impl WindowPlan {
    fn new(input: &GridShape, kernel: Window3, stride: Window3) -> Result<Self> {
        for (axis, k, s) in [
            ("radial", kernel.radial, stride.radial),
            ("xi", kernel.xi, stride.xi),
            ("eta", kernel.eta, stride.eta),
        ] {
            if k == 0 || s == 0 {
                return Err(GridError::EmptyWindow(axis));
            }
        }
        if input.xi != input.eta {
            return Err(GridError::NonSquareSide {
                xi: input.xi,
                eta: input.eta,
            });
        }
        let width = input.xi;
        for (axis, k) in [("xi", kernel.xi), ("eta", kernel.eta)] {
            if k % 2 == 0 {
                return Err(GridError::EvenAngularKernel { axis, kernel: k });
            }
            if k / 2 > width {
                return Err(GridError::HaloExceedsSide {
                    axis,
                    kernel: k,
                    halo: k / 2,
                    width,
                });
            }
        }
        if kernel.radial > input.radial {
            return Err(GridError::KernelExceedsExtent {
                axis: "radial",
                kernel: kernel.radial,
                extent: input.radial,
            });
        }
        let halo_xi = kernel.xi / 2;
        let halo_eta = kernel.eta / 2;
        let extent = |len: usize, k: usize, s: usize| (len - k) / s + 1;
        Ok(Self {
            input: *input,
            kernel,
            stride,
            halo_xi,
            halo_eta,
            out_radial: extent(input.radial, kernel.radial, stride.radial),
            out_xi: extent(width + 2 * halo_xi, kernel.xi, stride.xi),
            out_eta: extent(width + 2 * halo_eta, kernel.eta, stride.eta),
        })
    }

    fn output(&self, channels: usize) -> GridShape {
        GridShape {
            batch: self.input.batch,
            radial: self.out_radial,
            xi: self.out_xi,
            eta: self.out_eta,
            channels,
        }
    }

    fn rows(&self) -> usize {
        self.input.batch * NUM_SIDES * self.out_radial * self.out_xi * self.out_eta
    }

    /// Every kernel window of the halo-extended input, laid out as
    /// `(batch * side, out_radial, out_xi, out_eta, window * channel)` with the
    /// window offsets ordered radial-major, matching a `(kr, kxi, keta, cin, ...)` filter.
    fn gather_windows(&self, input: &Tensor) -> Result<Tensor> {
        let padded =
            HaloGather::new(self.input.xi, self.halo_xi, self.halo_eta)?.apply(input)?;
        let padded = padded.reshape(vec![
            self.input.batch * NUM_SIDES,
            self.input.radial,
            self.input.xi + 2 * self.halo_xi,
            self.input.eta + 2 * self.halo_eta,
            self.input.channels,
        ])?;
        let device = padded.device();
        let radial_index = offsets(self.kernel.radial, self.stride.radial, self.out_radial, device)?;
        let xi_index = offsets(self.kernel.xi, self.stride.xi, self.out_xi, device)?;
        let eta_index = offsets(self.kernel.eta, self.stride.eta, self.out_eta, device)?;

        let mut columns = Vec::with_capacity(self.kernel.volume());
        for r in radial_index.iter() {
            let by_radial = padded.index_select(r, 1)?;
            for x in xi_index.iter() {
                let by_xi = by_radial.index_select(x, 2)?;
                for e in eta_index.iter() {
                    columns.push(by_xi.index_select(e, 3)?);
                }
            }
        }
        Ok(Tensor::cat(&columns, 4)?)
    }
}

/// Index tensors selecting `offset, offset + stride, ...` for each kernel offset.
fn offsets(kernel: usize, stride: usize, count: usize, device: &Device) -> Result<Vec<Tensor>> {
    (0..kernel)
        .map(|offset| {
            let index: Vec<u32> = (0..count).map(|t| (offset + t * stride) as u32).collect();
            Ok(Tensor::from_vec(index, count, device)?)
        })
        .collect()
}

/// Convolve a cubed-sphere tensor with a filter shared by all six sides.
///
/// * `input`: `(batch, 6, radial, xi, eta, in_channels)`
/// * `filter`: `(k_radial, k_xi, k_eta, in_channels, out_channels)`
///
/// The radial axis uses valid padding. The angular axes are extended with a
/// halo from the neighbouring sides, so kernels near a side edge read across
/// the cube edge instead of seeing zeros. Angular kernel sizes must be odd and
/// their half-width must fit within one side.
pub fn conv_spherical_cubed_sphere(
    input: &Tensor,
    filter: &Tensor,
    strides: Window3,
) -> Result<Tensor> {
    let shape = GridShape::of(input)?;
    let dims = filter.dims();
    let &[k_radial, k_xi, k_eta, in_channels, out_channels] = dims else {
        return Err(GridError::FilterRank(dims.to_vec()));
    };
    if in_channels != shape.channels {
        return Err(GridError::ChannelMismatch {
            expected: in_channels,
            found: shape.channels,
        });
    }
    let plan = WindowPlan::new(&shape, Window3::new(k_radial, k_xi, k_eta), strides)?;
    let depth = plan.kernel.volume() * in_channels;
    let windows = plan.gather_windows(input)?.reshape((plan.rows(), depth))?;
    let weights = filter.reshape((depth, out_channels))?;
    let out = windows.matmul(&weights)?;
    Ok(out.reshape(plan.output(out_channels).dims())?)
}

/// Average pooling over `(radial, xi, eta)` windows of a cubed-sphere tensor.
///
/// Uses the same halo gathering as [`conv_spherical_cubed_sphere`]; every
/// window averages exactly `ksize.volume()` real pixels.
pub fn avg_pool_spherical_cubed_sphere(
    input: &Tensor,
    ksize: Window3,
    strides: Window3,
) -> Result<Tensor> {
    let shape = GridShape::of(input)?;
    let plan = WindowPlan::new(&shape, ksize, strides)?;
    let windows = plan
        .gather_windows(input)?
        .reshape((plan.rows(), ksize.volume(), shape.channels))?;
    let out = windows.mean(1)?;
    Ok(out.reshape(plan.output(shape.channels).dims())?)
}
