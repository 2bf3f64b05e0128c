//! D8 flow direction algorithm
//!
//! Calculates the direction of flow from each cell to its steepest
//! downslope neighbour using the D8 (deterministic eight-node) method.
//!
//! Flow direction encoding (ESRI):
//! ```text
//!   32  64  128
//!   16   0    1
//!    8   4    2
//! ```
//! 0 = no outflow (outlet, or flow leaves the grid), 255 = nodata.

use super::assemble;
use super::conditioning::ConditionedDem;
use crate::maybe_rayon::*;
use drainhand_core::raster::{d8, Raster};
use drainhand_core::{Algorithm, Error, Result};

/// Flow direction algorithm (D8)
#[derive(Debug, Clone, Default)]
pub struct FlowDirection;

impl Algorithm for FlowDirection {
    type Input = ConditionedDem;
    type Output = Raster<u8>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Direction (D8)"
    }

    fn description(&self) -> &'static str {
        "Calculate D8 flow direction from a conditioned DEM"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        flow_direction(&input.dem, Some(&input.gradient))
    }
}

/// Calculate D8 flow direction.
///
/// For each valid cell the drop to each neighbour is divided by the
/// planar distance (diagonals × √2) and the largest positive drop wins;
/// neighbours are scanned E, SE, S, SW, W, NW, N, NE and the first maximum
/// is kept. When no neighbour is lower, equal-elevation neighbours are
/// compared by their `gradient` drop with the same rule. Cells with
/// neither route off the grid (`0`). Nodata neighbours are never targets.
///
/// # Arguments
/// * `dem` - Input DEM (ideally conditioned)
/// * `gradient` - Optional flat gradient from [`resolve_flats`](super::resolve_flats)
///
/// # Returns
/// Raster<u8> with ESRI direction codes, nodata = 255
pub fn flow_direction(dem: &Raster<f64>, gradient: Option<&Raster<u32>>) -> Result<Raster<u8>> {
    let (rows, cols) = dem.shape();
    if let Some(g) = gradient {
        g.ensure_shape((rows, cols))?;
    }
    let cell_size = dem.cell_size();

    let output_data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![d8::NO_FLOW; cols];

            for (col, out) in row_data.iter_mut().enumerate() {
                let center = unsafe { dem.get_unchecked(row, col) };
                if dem.is_nodata(center) {
                    *out = d8::NODATA;
                    continue;
                }

                let mut max_drop = 0.0_f64;
                let mut best_dir = d8::NO_FLOW;
                let mut flat_neighbors = [false; 8];

                for k in 0..8 {
                    let Some((nr, nc)) = d8::neighbor(row, col, k, rows, cols) else {
                        continue;
                    };
                    let neighbor = unsafe { dem.get_unchecked(nr, nc) };
                    if dem.is_nodata(neighbor) {
                        continue;
                    }
                    if neighbor == center {
                        flat_neighbors[k] = true;
                        continue;
                    }

                    let drop = (center - neighbor) / (d8::DISTANCES[k] * cell_size);
                    if drop > max_drop {
                        max_drop = drop;
                        best_dir = d8::CODES[k];
                    }
                }

                if best_dir == d8::NO_FLOW {
                    if let Some(g) = gradient {
                        best_dir = steepest_gradient(g, row, col, &flat_neighbors);
                    }
                }

                *out = best_dir;
            }

            row_data
        })
        .collect();

    assemble(dem, output_data, Some(d8::NODATA))
}

/// Direction of the largest gradient drop among equal-elevation neighbours
fn steepest_gradient(gradient: &Raster<u32>, row: usize, col: usize, flat: &[bool; 8]) -> u8 {
    let (rows, cols) = gradient.shape();
    let g = f64::from(unsafe { gradient.get_unchecked(row, col) });

    let mut max_drop = 0.0_f64;
    let mut best_dir = d8::NO_FLOW;
    for k in 0..8 {
        if !flat[k] {
            continue;
        }
        let Some((nr, nc)) = d8::neighbor(row, col, k, rows, cols) else {
            continue;
        };
        let ng = f64::from(unsafe { gradient.get_unchecked(nr, nc) });
        let drop = (g - ng) / d8::DISTANCES[k];
        if drop > max_drop {
            max_drop = drop;
            best_dir = d8::CODES[k];
        }
    }
    best_dir
}
