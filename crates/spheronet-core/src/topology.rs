//! Cubed-sphere topology
//!
//! The sphere around a residue is covered by the six faces of a cube. Each
//! side is an `N x N` patch with angular coordinates `(xi, eta)`:
//!
//! ```text
//!            +-----+
//!            |  4  |
//!      +-----+-----+-----+-----+
//!      |  3  |  0  |  1  |  2  |  -> +xi
//!      +-----+-----+-----+-----+
//!            |  5  |
//!            +-----+
//! ```
//!
//! The equatorial sides 0..4 follow each other along `+xi`; all of them touch
//! side 4 along `+eta` and side 5 along `-eta`. Orientation of the polar sides
//! follows from the frames in [`SIDE_FRAMES`].
//!
//! A kernel that hangs over the edge of a side reads from the neighbouring
//! side. [`resolve_pixel`] folds an out-of-range pixel over the cube edge to
//! find the pixel that covers the same spot, and [`HaloGather`] turns that
//! into a single `index_select` that extends every side with a halo.
use crate::error::{GridError, Result};
use candle_core::{Device, Tensor};

/// Number of sides of the cubed sphere.
pub const NUM_SIDES: usize = 6;

/// Orientation of a side: outward normal and the directions of increasing
/// `xi` and `eta`, as signed unit vectors.
#[derive(Debug, Clone, Copy)]
struct SideFrame {
    normal: [i64; 3],
    xi: [i64; 3],
    eta: [i64; 3],
}

#[rustfmt::skip]
const SIDE_FRAMES: [SideFrame; NUM_SIDES] = [
    SideFrame { normal: [ 1,  0,  0], xi: [ 0,  1,  0], eta: [ 0,  0,  1] },
    SideFrame { normal: [ 0,  1,  0], xi: [-1,  0,  0], eta: [ 0,  0,  1] },
    SideFrame { normal: [-1,  0,  0], xi: [ 0, -1,  0], eta: [ 0,  0,  1] },
    SideFrame { normal: [ 0, -1,  0], xi: [ 1,  0,  0], eta: [ 0,  0,  1] },
    SideFrame { normal: [ 0,  0,  1], xi: [ 0,  1,  0], eta: [-1,  0,  0] },
    SideFrame { normal: [ 0,  0, -1], xi: [ 0,  1,  0], eta: [ 1,  0,  0] },
];

/// A pixel on one side of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SidePixel {
    pub side: usize,
    pub xi: usize,
    pub eta: usize,
}

fn dot(a: [i64; 3], b: [i64; 3]) -> i64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn normal_axis(normal: [i64; 3]) -> usize {
    normal.iter().position(|&c| c != 0).unwrap_or(0)
}

fn side_with_normal(normal: [i64; 3]) -> usize {
    SIDE_FRAMES
        .iter()
        .position(|frame| frame.normal == normal)
        .unwrap_or(0)
}

/// Resolve a pixel of `side` that may lie outside `0..width` on either axis.
///
/// Pixel centres are tracked in doubled integer coordinates on the surface of
/// a cube of half-width `width`, so the centre of pixel `i` sits at
/// `2i + 1 - width` and never on an edge. Every out-of-range pixel therefore
/// lands on exactly one real pixel. A pixel beyond a corner is folded twice.
///
/// Offsets must stay within one side width of the patch (`-width <= xi < 2 * width`).
pub fn resolve_pixel(width: usize, side: usize, xi: isize, eta: isize) -> SidePixel {
    let n = width as i64;
    let frame = &SIDE_FRAMES[side % NUM_SIDES];
    let c_xi = 2 * xi as i64 + 1 - n;
    let c_eta = 2 * eta as i64 + 1 - n;

    let mut point = [0i64; 3];
    for (k, p) in point.iter_mut().enumerate() {
        *p = n * frame.normal[k] + c_xi * frame.xi[k] + c_eta * frame.eta[k];
    }

    let mut normal = frame.normal;
    loop {
        let axis = normal_axis(normal);
        let overflow = (0..3)
            .filter(|&k| k != axis && point[k].abs() > n)
            .max_by_key(|&k| point[k].abs());
        let Some(k) = overflow else { break };
        // Walk over the edge: the excess along `k` turns into depth along the old normal.
        let excess = point[k].abs() - n;
        let sign = point[k].signum();
        point[k] = sign * n;
        point[axis] = normal[axis] * (n - excess);
        normal = [0; 3];
        normal[k] = sign;
    }

    let target = side_with_normal(normal);
    let frame = &SIDE_FRAMES[target];
    let to_index = |c: i64| ((c + n - 1) / 2) as usize;
    SidePixel {
        side: target,
        xi: to_index(dot(point, frame.xi)),
        eta: to_index(dot(point, frame.eta)),
    }
}

/// Gather table extending every side with `halo_xi` / `halo_eta` pixels
/// borrowed from the neighbouring sides.
#[derive(Debug, Clone)]
pub struct HaloGather {
    width: usize,
    halo_xi: usize,
    halo_eta: usize,
    indices: Vec<u32>,
}

impl HaloGather {
    pub fn new(width: usize, halo_xi: usize, halo_eta: usize) -> Result<Self> {
        for (axis, halo) in [("xi", halo_xi), ("eta", halo_eta)] {
            if halo > width {
                return Err(GridError::HaloExceedsSide {
                    axis,
                    kernel: 2 * halo + 1,
                    halo,
                    width,
                });
            }
        }
        let padded_xi = width + 2 * halo_xi;
        let padded_eta = width + 2 * halo_eta;
        let mut indices = Vec::with_capacity(NUM_SIDES * padded_xi * padded_eta);
        for side in 0..NUM_SIDES {
            for i in 0..padded_xi {
                for j in 0..padded_eta {
                    let pixel = resolve_pixel(
                        width,
                        side,
                        i as isize - halo_xi as isize,
                        j as isize - halo_eta as isize,
                    );
                    let flat = (pixel.side * width + pixel.xi) * width + pixel.eta;
                    indices.push(flat as u32);
                }
            }
        }
        Ok(Self {
            width,
            halo_xi,
            halo_eta,
            indices,
        })
    }

    pub fn padded_xi(&self) -> usize {
        self.width + 2 * self.halo_xi
    }

    pub fn padded_eta(&self) -> usize {
        self.width + 2 * self.halo_eta
    }

    /// Flat source index (`(side * width + xi) * width + eta`) for every padded pixel.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Apply the gather to a `(batch, side, radial, xi, eta, channel)` tensor.
    pub fn apply(&self, input: &Tensor) -> Result<Tensor> {
        let dims = input.dims();
        let &[batch, sides, radial, xi, eta, channels] = dims else {
            return Err(GridError::Rank(dims.to_vec()));
        };
        if sides != NUM_SIDES {
            return Err(GridError::SideCount {
                expected: NUM_SIDES,
                found: sides,
            });
        }
        if xi != self.width || eta != self.width {
            return Err(GridError::NonSquareSide { xi, eta });
        }
        if self.halo_xi == 0 && self.halo_eta == 0 {
            return Ok(input.clone());
        }
        let index = self.index_tensor(input.device())?;
        let flat = input
            .permute([0, 2, 1, 3, 4, 5])?
            .contiguous()?
            .reshape(vec![batch, radial, NUM_SIDES * xi * eta, channels])?;
        let padded = flat
            .index_select(&index, 2)?
            .reshape(vec![
                batch,
                radial,
                NUM_SIDES,
                self.padded_xi(),
                self.padded_eta(),
                channels,
            ])?
            .permute([0, 2, 1, 3, 4, 5])?
            .contiguous()?;
        Ok(padded)
    }

    fn index_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_slice(&self.indices, self.indices.len(), device)?)
    }
}

/// Extend each side of a cubed-sphere tensor with halos taken from its neighbours.
pub fn pad_cubed_sphere(input: &Tensor, halo_xi: usize, halo_eta: usize) -> Result<Tensor> {
    let dims = input.dims();
    if dims.len() != 6 {
        return Err(GridError::Rank(dims.to_vec()));
    }
    let (xi, eta) = (dims[3], dims[4]);
    if xi != eta {
        return Err(GridError::NonSquareSide { xi, eta });
    }
    HaloGather::new(xi, halo_xi, halo_eta)?.apply(input)
}
