//! Hydrological analysis algorithms
//!
//! The stages that turn a DEM into HAND:
//! - Fill pits: raise single-cell pits to their lowest neighbour
//! - Priority-Flood: depression filling to the spill elevation (Barnes 2014)
//! - Resolve flats: integer drainage gradient over flat areas (Barnes 2014)
//! - Flow direction: D8 single flow direction (ESRI codes)
//! - Flow accumulation: upstream cell counts by topological wavefronts
//! - Drainage: thresholded accumulation
//! - HAND: Height Above Nearest Drainage

mod conditioning;
mod drainage;
mod fill_pits;
mod flow_accumulation;
mod flow_direction;
mod hand;
mod priority_flood;
mod resolve_flats;

pub use conditioning::{condition_dem, ConditionParams, ConditionedDem, TerrainConditioner};
pub use drainage::{drainage_mask, Drainage, DrainageClassifier, DrainageThreshold};
pub use fill_pits::{fill_pits, FillPits};
pub use flow_accumulation::{flow_accumulation, FlowAccumulation};
pub use flow_direction::{flow_direction, FlowDirection};
pub use hand::{hand, Hand};
pub use priority_flood::{fill_depressions, PriorityFlood, PriorityFloodParams};
pub use resolve_flats::{resolve_flats, ResolveFlats};

use drainhand_core::raster::{d8, Raster, RasterElement};
use drainhand_core::{Error, Result};

/// Reject grids the conditioning stages cannot work on
pub(crate) fn validate_dem(dem: &Raster<f64>) -> Result<()> {
    let (rows, cols) = dem.shape();
    if rows < 3 || cols < 3 {
        return Err(Error::GridTooSmall { rows, cols });
    }
    if dem.valid_count() == 0 {
        return Err(Error::AllNoData);
    }
    Ok(())
}

/// Build a raster from row-major cell values, copying `like`'s georeferencing
pub(crate) fn assemble<T, U>(like: &Raster<U>, data: Vec<T>, nodata: Option<T>) -> Result<Raster<T>>
where
    T: RasterElement,
    U: RasterElement,
{
    let (rows, cols) = like.shape();
    let array = ndarray::Array2::from_shape_vec((rows, cols), data)
        .map_err(|_| Error::InvalidDimensions { width: cols, height: rows })?;
    like.derive(array, nodata)
}

/// Cell index that (row, col) drains into, or `None` for outlets, nodata,
/// directions leaving the grid and directions pointing at nodata.
///
/// Unknown codes are a routing error.
#[inline]
pub(crate) fn downstream_index(flow_dir: &Raster<u8>, row: usize, col: usize) -> Result<Option<usize>> {
    let (rows, cols) = flow_dir.shape();
    let code = unsafe { flow_dir.get_unchecked(row, col) };
    if code == d8::NO_FLOW || code == d8::NODATA {
        return Ok(None);
    }
    if d8::index_of(code).is_none() {
        return Err(Error::Routing(format!(
            "invalid direction code {} at ({}, {})",
            code, row, col
        )));
    }
    Ok(d8::downstream(row, col, code, rows, cols)
        .filter(|&(r, c)| unsafe { flow_dir.get_unchecked(r, c) } != d8::NODATA)
        .map(|(r, c)| r * cols + c))
}
