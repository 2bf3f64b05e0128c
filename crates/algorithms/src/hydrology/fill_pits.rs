//! Single-cell pit filling
//!
//! A pit is an interior cell strictly lower than all 8 of its neighbours.
//! Pits are raised to the elevation of their lowest neighbour before the
//! Priority-Flood pass, which removes most one-cell artefacts from
//! photogrammetric DEMs cheaply.

use super::{assemble, validate_dem};
use crate::maybe_rayon::*;
use drainhand_core::raster::{d8, Raster};
use drainhand_core::{Algorithm, Error, Result};

/// Pit filling algorithm
#[derive(Debug, Clone, Default)]
pub struct FillPits;

impl Algorithm for FillPits {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Fill Pits"
    }

    fn description(&self) -> &'static str {
        "Raise single-cell pits to their lowest neighbour"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        fill_pits(&input)
    }
}

/// Raise every single-cell pit to its lowest neighbour's elevation.
///
/// Border cells, nodata cells and cells touching nodata are never pits:
/// all 8 neighbours must exist and be valid.
pub fn fill_pits(dem: &Raster<f64>) -> Result<Raster<f64>> {
    validate_dem(dem)?;
    let (rows, cols) = dem.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = Vec::with_capacity(cols);
            for col in 0..cols {
                let z = unsafe { dem.get_unchecked(row, col) };
                row_data.push(pit_spill(dem, row, col, z).unwrap_or(z));
            }
            row_data
        })
        .collect();

    assemble(dem, data, dem.nodata())
}

/// Lowest neighbour elevation when (row, col) is a pit
fn pit_spill(dem: &Raster<f64>, row: usize, col: usize, z: f64) -> Option<f64> {
    let (rows, cols) = dem.shape();
    if dem.is_nodata(z) || d8::is_border(row, col, rows, cols) {
        return None;
    }

    let mut lowest = f64::INFINITY;
    for k in 0..8 {
        let (nr, nc) = d8::neighbor(row, col, k, rows, cols)?;
        let nz = unsafe { dem.get_unchecked(nr, nc) };
        if dem.is_nodata(nz) || nz <= z {
            return None;
        }
        lowest = lowest.min(nz);
    }
    Some(lowest)
}
