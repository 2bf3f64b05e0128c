//! Priority-Flood depression filling
//!
//! O(n log n) depression filling: cells are processed in elevation order
//! from a min-heap seeded with the outlets of the grid, and every cell is
//! raised to at least the level of the cell it was reached from. Filling
//! uses ε = 0, so depressions become exactly flat at their spill elevation
//! and the flats are resolved separately.
//!
//! Reference:
//! Barnes, R., Lehman, C., & Mulla, D. (2014). Priority-Flood: An optimal
//! depression-filling and watershed-labeling algorithm for digital elevation
//! models. *Computers & Geosciences*, 62, 117–127.

use super::{assemble, validate_dem};
use drainhand_core::raster::{d8, try_buffer, Raster};
use drainhand_core::{Algorithm, Error, Result};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A cell in the priority queue, ordered by elevation (min-heap via reversed Ord).
#[derive(Debug, Clone)]
struct Cell {
    elevation: f64,
    index: usize,
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse: lower elevation first, then lower index for determinism
        other
            .elevation
            .total_cmp(&self.elevation)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Parameters for Priority-Flood filling
#[derive(Debug, Clone)]
pub struct PriorityFloodParams {
    /// Treat cells next to nodata as outlets, like the grid border.
    /// When false, only the border drains and valid regions enclosed by
    /// nodata make the fill fail.
    pub nodata_is_outlet: bool,
}

impl Default for PriorityFloodParams {
    fn default() -> Self {
        Self {
            nodata_is_outlet: true,
        }
    }
}

/// Priority-Flood fill algorithm
#[derive(Debug, Clone, Default)]
pub struct PriorityFlood;

impl Algorithm for PriorityFlood {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = PriorityFloodParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Priority-Flood"
    }

    fn description(&self) -> &'static str {
        "Fill depressions to their spill elevation using Priority-Flood (Barnes 2014)"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        fill_depressions(&input, &params)
    }
}

/// Whether (row, col) drains out of the grid when it has no lower neighbour
pub(crate) fn is_outlet(dem: &Raster<f64>, row: usize, col: usize, nodata_is_outlet: bool) -> bool {
    let (rows, cols) = dem.shape();
    if d8::is_border(row, col, rows, cols) {
        return true;
    }
    nodata_is_outlet
        && (0..8).any(|k| {
            d8::neighbor(row, col, k, rows, cols)
                .is_some_and(|(nr, nc)| dem.is_nodata(unsafe { dem.get_unchecked(nr, nc) }))
        })
}

/// Fill every depression of a DEM to its spill elevation (Barnes 2014, ε = 0).
///
/// # Algorithm
/// 1. Seed a min-heap with the outlet cells (border, and nodata-adjacent
///    cells when `nodata_is_outlet`), marking them visited
/// 2. Pop the lowest cell
/// 3. For each unvisited valid neighbour: raise it to the popped level if
///    lower, mark it visited and push it
/// 4. Repeat until the heap is empty
///
/// Every valid cell must be reached from a seed; otherwise the fill fails
/// with [`Error::Conditioning`]. Filled elevations are never lower than the
/// input and nodata cells are copied unchanged.
pub fn fill_depressions(dem: &Raster<f64>, params: &PriorityFloodParams) -> Result<Raster<f64>> {
    validate_dem(dem)?;
    let (rows, cols) = dem.shape();

    let mut output = dem.try_to_vec()?;
    let mut visited = try_buffer(rows * cols, false)?;
    let mut heap = BinaryHeap::new();

    // Step 1: seed the queue with outlet cells
    for row in 0..rows {
        for col in 0..cols {
            let idx = row * cols + col;
            let z = output[idx];
            if dem.is_nodata(z) {
                visited[idx] = true;
                continue;
            }
            if is_outlet(dem, row, col, params.nodata_is_outlet) {
                visited[idx] = true;
                heap.push(Cell { elevation: z, index: idx });
            }
        }
    }

    // Step 2: process cells in order of increasing elevation
    while let Some(cell) = heap.pop() {
        let (row, col) = (cell.index / cols, cell.index % cols);
        for k in 0..8 {
            let Some((nr, nc)) = d8::neighbor(row, col, k, rows, cols) else {
                continue;
            };
            let n_idx = nr * cols + nc;
            if visited[n_idx] {
                continue;
            }
            visited[n_idx] = true;

            if output[n_idx] < cell.elevation {
                output[n_idx] = cell.elevation;
            }
            heap.push(Cell {
                elevation: output[n_idx],
                index: n_idx,
            });
        }
    }

    let unreached = visited.iter().filter(|&&v| !v).count();
    if unreached > 0 {
        return Err(Error::Conditioning(format!(
            "{} valid cells have no path to an outlet",
            unreached
        )));
    }

    assemble(dem, output, dem.nodata())
}
