//! Hydrological conditioning: pits, depressions, flats

use super::{fill_depressions, fill_pits, resolve_flats, PriorityFloodParams};
use drainhand_core::raster::Raster;
use drainhand_core::{Algorithm, Error, Result};
use serde::{Deserialize, Serialize};

/// Parameters shared by the conditioning stages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionParams {
    /// Cells next to nodata drain out of the grid like border cells
    pub nodata_is_outlet: bool,
    /// Run the single-cell pit pass before depression filling
    pub fill_pits: bool,
}

impl Default for ConditionParams {
    fn default() -> Self {
        Self {
            nodata_is_outlet: true,
            fill_pits: true,
        }
    }
}

/// A depression-filled DEM and its flat-drainage gradient.
///
/// Every valid cell that is not an outlet has a strictly lower neighbour,
/// or a neighbour of equal elevation with a strictly lower gradient.
#[derive(Debug, Clone)]
pub struct ConditionedDem {
    pub dem: Raster<f64>,
    pub gradient: Raster<u32>,
}

/// Full conditioning chain as one algorithm
#[derive(Debug, Clone, Default)]
pub struct TerrainConditioner;

impl Algorithm for TerrainConditioner {
    type Input = Raster<f64>;
    type Output = ConditionedDem;
    type Params = ConditionParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Terrain Conditioner"
    }

    fn description(&self) -> &'static str {
        "Fill pits and depressions, then resolve flats"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        condition_dem(&input, &params)
    }
}

/// Fill pits, fill depressions and resolve flats.
///
/// Fails with an input error for grids smaller than 3x3 or entirely
/// nodata, [`Error::Conditioning`] when a valid region has no path to an
/// outlet and [`Error::Routing`] when a flat cannot drain.
pub fn condition_dem(dem: &Raster<f64>, params: &ConditionParams) -> Result<ConditionedDem> {
    let pitless = if params.fill_pits {
        fill_pits(dem)?
    } else {
        dem.clone()
    };

    let filled = fill_depressions(
        &pitless,
        &PriorityFloodParams {
            nodata_is_outlet: params.nodata_is_outlet,
        },
    )?;
    let gradient = resolve_flats(&filled, params)?;

    Ok(ConditionedDem {
        dem: filled,
        gradient,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::test_dems::{depression_with_outlet, from_rows, v_valley};
    use drainhand_core::raster::d8;

    /// After conditioning, no valid non-outlet cell is a local minimum
    /// under (elevation, gradient) ordering
    fn assert_no_interior_minimum(cond: &ConditionedDem) {
        let (rows, cols) = cond.dem.shape();
        for row in 1..rows - 1 {
            for col in 1..cols - 1 {
                let z = cond.dem.get(row, col).unwrap();
                let g = cond.gradient.get(row, col).unwrap();
                let drains = (0..8).any(|k| {
                    let (nr, nc) = d8::neighbor(row, col, k, rows, cols).unwrap();
                    let nz = cond.dem.get(nr, nc).unwrap();
                    nz < z || (nz == z && cond.gradient.get(nr, nc).unwrap() < g)
                });
                assert!(drains, "local minimum at ({}, {})", row, col);
            }
        }
    }

    #[test]
    fn test_condition_depression() {
        let cond = condition_dem(&depression_with_outlet(), &ConditionParams::default()).unwrap();
        assert_eq!(cond.dem.get(4, 4).unwrap(), 10.0);
        assert_no_interior_minimum(&cond);
    }

    #[test]
    fn test_condition_noisy_valley() {
        let mut dem = v_valley();
        // Knock a few pits and a dam into the channel
        dem.set(3, 5, -2.0).unwrap();
        dem.set(6, 5, 4.0).unwrap();
        dem.set(7, 2, 0.0).unwrap();
        let cond = condition_dem(&dem, &ConditionParams::default()).unwrap();
        assert_no_interior_minimum(&cond);
    }

    #[test]
    fn test_condition_flat_grid() {
        let dem = from_rows(6, 6, &[3.0; 36]);
        let cond = condition_dem(&dem, &ConditionParams::default()).unwrap();
        assert_no_interior_minimum(&cond);
        // Border cells are outlets and carry no gradient
        assert_eq!(cond.gradient.get(0, 3).unwrap(), 0);
        assert!(cond.gradient.get(2, 2).unwrap() > 0);
    }

    #[test]
    fn test_condition_rejects_all_nodata() {
        let dem = from_rows(3, 3, &[f64::NAN; 9]);
        assert!(matches!(
            condition_dem(&dem, &ConditionParams::default()),
            Err(Error::AllNoData)
        ));
    }
}
