//! HAND: Height Above Nearest Drainage
//!
//! For each cell, follows the D8 flow path downstream until reaching a
//! drainage cell, then takes the elevation difference between the cell and
//! that drainage cell.
//!
//! HAND = 0 on drainage cells and grows with height above the drainage
//! network; it is a standard flood-mapping terrain index.
//!
//! Reference:
//! Nobre, A.D. et al. (2011). Height Above the Nearest Drainage, a
//! hydrologically relevant new terrain model. *Journal of Hydrology*,
//! 404(1–2), 13–29.

use super::{assemble, downstream_index};
use drainhand_core::raster::{try_buffer, Raster};
use drainhand_core::{Algorithm, Error, Result};

/// Resolution state of a cell's downstream search
#[derive(Debug, Clone, Copy, PartialEq)]
enum Reach {
    Pending,
    /// The flow path reaches drainage at this elevation
    Drains(f64),
    /// The flow path leaves the grid or hits nodata first
    Undrained,
}

/// HAND algorithm over (elevation, flow direction, drainage mask)
#[derive(Debug, Clone, Default)]
pub struct Hand;

impl Algorithm for Hand {
    type Input = (Raster<f64>, Raster<u8>, Raster<u8>);
    type Output = Raster<f64>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "HAND"
    }

    fn description(&self) -> &'static str {
        "Height Above Nearest Drainage along D8 flow paths"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        let (dem, flow_dir, drainage) = input;
        hand(&dem, &flow_dir, &drainage)
    }
}

/// Compute Height Above Nearest Drainage.
///
/// Each flow path is traced once: every cell on a traced path caches where
/// it ends (drainage elevation, or undrained), so later traces stop at the
/// first cached cell.
///
/// # Arguments
/// * `dem` - Elevation the routing was computed on
/// * `flow_dir` - D8 flow direction raster (ESRI codes)
/// * `drainage` - Drainage mask, 1 on drainage cells
///
/// # Returns
/// Raster<f64> with HAND in elevation units. Drainage cells hold 0; cells
/// whose path never reaches drainage, and nodata cells, hold NaN. Negative
/// differences are clamped to 0.
pub fn hand(dem: &Raster<f64>, flow_dir: &Raster<u8>, drainage: &Raster<u8>) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    flow_dir.ensure_shape((rows, cols))?;
    drainage.ensure_shape((rows, cols))?;

    let total = rows * cols;
    let mut reach = try_buffer(total, Reach::Pending)?;

    for (idx, (&z, &d)) in dem.data().iter().zip(drainage.data().iter()).enumerate() {
        if dem.is_nodata(z) {
            reach[idx] = Reach::Undrained;
        } else if d == 1 {
            reach[idx] = Reach::Drains(z);
        }
    }

    let mut path: Vec<usize> = Vec::new();
    for start in 0..total {
        if reach[start] != Reach::Pending {
            continue;
        }

        // Trace downstream until a resolved cell or the end of the path
        path.clear();
        let mut current = start;
        let outcome = loop {
            if reach[current] != Reach::Pending {
                break reach[current];
            }
            path.push(current);
            if path.len() > total {
                return Err(Error::Routing(format!(
                    "flow path from cell ({}, {}) does not terminate",
                    start / cols,
                    start % cols
                )));
            }
            match downstream_index(flow_dir, current / cols, current % cols)? {
                Some(next) => current = next,
                None => break Reach::Undrained,
            }
        };

        for &idx in &path {
            reach[idx] = outcome;
        }
    }

    let mut clamped = 0usize;
    let data: Vec<f64> = dem
        .data()
        .iter()
        .zip(reach.iter())
        .map(|(&z, r)| match *r {
            Reach::Drains(base) => {
                let h = z - base;
                if h < 0.0 {
                    clamped += 1;
                    0.0
                } else {
                    h
                }
            }
            _ => f64::NAN,
        })
        .collect();

    let undrained = data.iter().filter(|v| v.is_nan()).count();
    tracing::debug!(clamped, undrained, "HAND computed");

    assemble(dem, data, None)
}
