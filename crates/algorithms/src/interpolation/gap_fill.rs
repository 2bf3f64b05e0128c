//! Gaussian gap filling
//!
//! Undefined (NaN) cells are replaced by the Gaussian-weighted average of
//! the defined cells within reach of the kernel. Cells with no defined
//! neighbour within reach stay NaN for that pass, so large holes close from
//! their rims inwards over successive passes. Defined cells never change.
//!
//! `fill_hand` applies this to HAND indirectly: it interpolates the height
//! of the nearest drainage (HOND = elevation - HAND), which varies smoothly
//! along the drainage network, and derives HAND back from the elevation.

use crate::hydrology::assemble;
use crate::maybe_rayon::*;
use drainhand_core::raster::Raster;
use drainhand_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Parameters for Gaussian gap filling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GapFillParams {
    /// Standard deviation of the Gaussian kernel, in cells
    pub sigma: f64,
    /// Maximum number of passes before giving up
    pub max_iterations: usize,
}

impl Default for GapFillParams {
    fn default() -> Self {
        Self {
            sigma: 3.0,
            max_iterations: 100,
        }
    }
}

impl GapFillParams {
    /// Reject a non-positive sigma or a zero iteration bound
    pub fn validate(&self) -> Result<()> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(Error::InvalidParameter {
                name: "sigma",
                value: self.sigma.to_string(),
                reason: "must be a positive number".to_string(),
            });
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidParameter {
                name: "max_iterations",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Normalised 1D Gaussian kernel with half-width ⌈4σ⌉
fn make_gaussian_kernel(sigma: f64) -> Vec<f64> {
    let half = (4.0 * sigma).ceil() as isize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (-half..=half)
        .map(|i| {
            let x = i as f64;
            (-x * x / denom).exp()
        })
        .collect();

    let sum: f64 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Replace every NaN cell of `grid` with a Gaussian-weighted average of
/// defined cells, repeating until none remain.
///
/// Fails with [`Error::Convergence`] if NaN cells remain after
/// `max_iterations` passes or a pass fills nothing.
pub fn fill_nan(grid: &Raster<f64>, params: &GapFillParams) -> Result<Raster<f64>> {
    let targets: Vec<bool> = grid.data().iter().map(|v| v.is_nan()).collect();
    fill_targets(grid, &targets, params)
}

/// Fill the NaN cells flagged in `targets`; other NaN cells are left alone
/// and never used as support.
fn fill_targets(grid: &Raster<f64>, targets: &[bool], params: &GapFillParams) -> Result<Raster<f64>> {
    params.validate()?;
    let (rows, cols) = grid.shape();
    let kernel = make_gaussian_kernel(params.sigma);
    let half = (kernel.len() / 2) as isize;

    let mut values = grid.try_to_vec()?;
    let mut remaining = targets
        .iter()
        .zip(values.iter())
        .filter(|(t, v)| **t && v.is_nan())
        .count();
    let mut iterations = 0usize;

    while remaining > 0 {
        if iterations == params.max_iterations {
            return Err(Error::Convergence {
                iterations,
                remaining,
            });
        }
        iterations += 1;

        let current = &values;
        let next: Vec<f64> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = Vec::with_capacity(cols);
                for col in 0..cols {
                    let idx = row * cols + col;
                    let v = current[idx];
                    if !(targets[idx] && v.is_nan()) {
                        row_data.push(v);
                        continue;
                    }

                    let mut sum = 0.0;
                    let mut weight = 0.0;
                    for (ki, &kr) in kernel.iter().enumerate() {
                        let r = row as isize + ki as isize - half;
                        if r < 0 || r >= rows as isize {
                            continue;
                        }
                        let base = r as usize * cols;
                        for (kj, &kc) in kernel.iter().enumerate() {
                            let c = col as isize + kj as isize - half;
                            if c < 0 || c >= cols as isize {
                                continue;
                            }
                            let sample = current[base + c as usize];
                            if sample.is_nan() {
                                continue;
                            }
                            let w = kr * kc;
                            sum += w * sample;
                            weight += w;
                        }
                    }

                    row_data.push(if weight > 0.0 { sum / weight } else { f64::NAN });
                }
                row_data
            })
            .collect();

        let still = targets
            .iter()
            .zip(next.iter())
            .filter(|(t, v)| **t && v.is_nan())
            .count();
        if still == remaining {
            return Err(Error::Convergence {
                iterations,
                remaining,
            });
        }

        tracing::debug!(iteration = iterations, filled = remaining - still, remaining = still, "gap fill pass");
        remaining = still;
        values = next;
    }

    assemble(grid, values, grid.nodata())
}

/// Fill undefined HAND cells through the height of the nearest drainage.
///
/// On defined cells HOND = `dem - hand`; HOND is gap filled and missing
/// HAND is set to `dem - HOND`, clamped at zero. Only cells with a valid
/// elevation are filled; defined HAND cells are returned unchanged.
pub fn fill_hand(hand: &Raster<f64>, dem: &Raster<f64>, params: &GapFillParams) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    hand.ensure_shape((rows, cols))?;

    let elevation: Vec<f64> = dem
        .data()
        .iter()
        .map(|&z| if dem.is_nodata(z) { f64::NAN } else { z })
        .collect();

    let hond: Vec<f64> = elevation
        .iter()
        .zip(hand.data().iter())
        .map(|(&z, &h)| if h.is_nan() { f64::NAN } else { z - h })
        .collect();
    let targets: Vec<bool> = elevation
        .iter()
        .zip(hand.data().iter())
        .map(|(z, h)| !z.is_nan() && h.is_nan())
        .collect();

    let missing = targets.iter().filter(|&&t| t).count();
    if missing == 0 {
        return Ok(hand.clone());
    }

    let hond = assemble(dem, hond, None)?;
    let filled = fill_targets(&hond, &targets, params)?;

    let data: Vec<f64> = hand
        .data()
        .iter()
        .zip(filled.data().iter())
        .zip(elevation.iter())
        .zip(targets.iter())
        .map(|(((&h, &f), &z), &t)| if t { (z - f).max(0.0) } else { h })
        .collect();

    tracing::debug!(filled = missing, "HAND gaps filled");

    assemble(hand, data, hand.nodata())
}
