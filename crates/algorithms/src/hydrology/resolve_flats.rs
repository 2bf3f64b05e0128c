//! Drainage over flat areas
//!
//! After depression filling with ε = 0, filled depressions and genuine
//! plateaus are exactly flat and D8 cannot route across them. This module
//! assigns an integer gradient to every flat cell so that each one has a
//! neighbour of equal elevation with a strictly lower gradient, leading
//! towards the flat's draining edge and away from higher terrain.
//!
//! The gradient is kept beside the elevation (it is not added to it), so
//! conditioned elevations stay exact.
//!
//! Reference:
//! Barnes, R., Lehman, C., & Mulla, D. (2014). An efficient assignment of
//! drainage direction over flat surfaces in raster digital elevation models.
//! *Computers & Geosciences*, 62, 128–135.

use super::conditioning::ConditionParams;
use super::priority_flood::is_outlet;
use super::{assemble, validate_dem};
use drainhand_core::raster::{d8, try_buffer, Raster};
use drainhand_core::{Algorithm, Error, Result};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellClass {
    NoData,
    /// Has a lower neighbour or drains out of the grid
    Drains,
    /// No lower neighbour and not an outlet
    Flat,
}

/// Flat resolution algorithm
#[derive(Debug, Clone, Default)]
pub struct ResolveFlats;

impl Algorithm for ResolveFlats {
    type Input = Raster<f64>;
    type Output = Raster<u32>;
    type Params = ConditionParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Resolve Flats"
    }

    fn description(&self) -> &'static str {
        "Assign a drainage gradient to flat areas (Barnes, Lehman & Mulla 2014)"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        resolve_flats(&input, &params)
    }
}

/// Compute the flat gradient of a depression-filled DEM.
///
/// Non-flat cells get 0. A flat cell gets
/// `(flat_height - away) + 2 * towards`, where `towards` is the BFS distance
/// (1-based) to the nearest draining edge cell of equal elevation, `away` the
/// BFS distance from the nearest cell bordering higher terrain, and
/// `flat_height` the largest `away` of its flat (the `away` term is 0 for
/// flats with no higher border).
///
/// A flat with no draining edge (a pit or an enclosed plateau, impossible
/// after [`fill_depressions`](super::fill_depressions)) fails with
/// [`Error::Routing`].
pub fn resolve_flats(dem: &Raster<f64>, params: &ConditionParams) -> Result<Raster<u32>> {
    validate_dem(dem)?;
    let (rows, cols) = dem.shape();
    let total = rows * cols;
    let elev = dem.try_to_vec()?;

    let neighbors = move |idx: usize| {
        let (row, col) = (idx / cols, idx % cols);
        (0..8).filter_map(move |k| d8::neighbor(row, col, k, rows, cols).map(|(r, c)| r * cols + c))
    };

    let class: Vec<CellClass> = (0..total)
        .map(|idx| {
            if dem.is_nodata(elev[idx]) {
                return CellClass::NoData;
            }
            let has_lower = neighbors(idx)
                .any(|n| !dem.is_nodata(elev[n]) && elev[n] < elev[idx]);
            if has_lower || is_outlet(dem, idx / cols, idx % cols, params.nodata_is_outlet) {
                CellClass::Drains
            } else {
                CellClass::Flat
            }
        })
        .collect();

    let mut gradient = try_buffer(total, 0u32)?;
    if !class.contains(&CellClass::Flat) {
        return assemble(dem, gradient, None);
    }

    // Distance towards the draining edge
    let mut towards = try_buffer(total, 0u32)?;
    let mut queue = VecDeque::new();
    for idx in 0..total {
        if class[idx] != CellClass::Flat {
            continue;
        }
        let touches_drain =
            neighbors(idx).any(|n| class[n] == CellClass::Drains && elev[n] == elev[idx]);
        if touches_drain {
            towards[idx] = 1;
            queue.push_back(idx);
        }
    }
    bfs_within_flat(&mut towards, &mut queue, &class, &elev, neighbors);

    let undrained = (0..total)
        .filter(|&i| class[i] == CellClass::Flat && towards[i] == 0)
        .count();
    if undrained > 0 {
        return Err(Error::Routing(format!(
            "{} flat cells have no draining edge",
            undrained
        )));
    }

    // Distance away from higher terrain
    let mut away = try_buffer(total, 0u32)?;
    for idx in 0..total {
        if class[idx] != CellClass::Flat {
            continue;
        }
        let touches_higher = neighbors(idx).any(|n| !dem.is_nodata(elev[n]) && elev[n] > elev[idx]);
        if touches_higher {
            away[idx] = 1;
            queue.push_back(idx);
        }
    }
    bfs_within_flat(&mut away, &mut queue, &class, &elev, neighbors);

    // Label flats to find each one's largest away distance
    let mut label = try_buffer(total, u32::MAX)?;
    let mut flat_height: Vec<u32> = Vec::new();
    for start in 0..total {
        if class[start] != CellClass::Flat || label[start] != u32::MAX {
            continue;
        }
        let id = flat_height.len() as u32;
        let mut height = 0;
        label[start] = id;
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            height = height.max(away[idx]);
            for n in neighbors(idx) {
                if class[n] == CellClass::Flat && label[n] == u32::MAX && elev[n] == elev[idx] {
                    label[n] = id;
                    queue.push_back(n);
                }
            }
        }
        flat_height.push(height);
    }

    for idx in 0..total {
        if class[idx] != CellClass::Flat {
            continue;
        }
        let away_term = if away[idx] > 0 {
            flat_height[label[idx] as usize] - away[idx]
        } else {
            0
        };
        gradient[idx] = away_term + 2 * towards[idx];
    }

    let flats = flat_height.len();
    tracing::debug!(flats, "resolved flat areas");

    assemble(dem, gradient, None)
}

/// Multi-source BFS over flat cells of equal elevation; seeds hold 1
fn bfs_within_flat<I>(
    dist: &mut [u32],
    queue: &mut VecDeque<usize>,
    class: &[CellClass],
    elev: &[f64],
    neighbors: impl Fn(usize) -> I,
) where
    I: Iterator<Item = usize>,
{
    while let Some(idx) = queue.pop_front() {
        for n in neighbors(idx) {
            if class[n] == CellClass::Flat && dist[n] == 0 && elev[n] == elev[idx] {
                dist[n] = dist[idx] + 1;
                queue.push_back(n);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::test_dems::{corner_plane, from_rows};

    #[test]
    fn test_no_flats_gives_zero_gradient() {
        let dem = corner_plane();
        let gradient = resolve_flats(&dem, &ConditionParams::default()).unwrap();
        assert!(gradient.data().iter().all(|&g| g == 0));
    }

    #[test]
    fn test_flat_drains_towards_low_edge() {
        // 3x5 interior plateau at 5 behind a rim of 9, draining through (2, 6)
        #[rustfmt::skip]
        let dem = from_rows(5, 7, &[
            9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0,
            9.0, 5.0, 5.0, 5.0, 5.0, 5.0, 9.0,
            9.0, 5.0, 5.0, 5.0, 5.0, 5.0, 1.0,
            9.0, 5.0, 5.0, 5.0, 5.0, 5.0, 9.0,
            9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0,
        ]);
        let gradient = resolve_flats(&dem, &ConditionParams::default()).unwrap();

        // (1..4, 5) have the outlet as lower neighbour: not flat
        assert_eq!(gradient.get(2, 5).unwrap(), 0);
        // Gradient strictly decreases towards the outlet along row 2
        let row: Vec<u32> = (1..5).map(|c| gradient.get(2, c).unwrap()).collect();
        assert!(row.windows(2).all(|w| w[0] > w[1]), "{:?}", row);
        assert!(row.iter().all(|&g| g >= 2));
        // Rim cells drain into the plateau and carry no gradient
        assert_eq!(gradient.get(0, 0).unwrap(), 0);
    }

    #[test]
    fn test_undrained_flat_is_routing_error() {
        #[rustfmt::skip]
        let dem = from_rows(5, 5, &[
            9.0, 9.0, 9.0, 9.0, 9.0,
            9.0, 2.0, 2.0, 2.0, 9.0,
            9.0, 2.0, 2.0, 2.0, 9.0,
            9.0, 2.0, 2.0, 2.0, 9.0,
            9.0, 9.0, 9.0, 9.0, 9.0,
        ]);
        assert!(matches!(
            resolve_flats(&dem, &ConditionParams::default()),
            Err(Error::Routing(_))
        ));
    }
}
