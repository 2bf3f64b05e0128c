//! Flow accumulation algorithm
//!
//! Counts, for each cell, the cells whose flow path passes through it,
//! itself included. Cells are evaluated in topological order (Kahn's
//! algorithm) one wavefront at a time: every cell of a wavefront has all
//! of its upstream cells already computed, so a wavefront is evaluated in
//! parallel by pulling from the neighbours that point at each cell.

use super::{assemble, downstream_index};
use crate::maybe_rayon::*;
use drainhand_core::raster::{d8, try_buffer, Raster};
use drainhand_core::{Algorithm, Error, Result};

/// Flow accumulation algorithm
#[derive(Debug, Clone, Default)]
pub struct FlowAccumulation;

impl Algorithm for FlowAccumulation {
    type Input = Raster<u8>;
    type Output = Raster<u32>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Accumulation"
    }

    fn description(&self) -> &'static str {
        "Count upstream contributing cells from D8 flow direction"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        flow_accumulation(&input)
    }
}

/// Calculate flow accumulation from a D8 flow direction raster.
///
/// Every valid cell counts itself, so headwaters hold 1 and each cell holds
/// at least as much as any of its direct upstream neighbours. Nodata cells
/// (direction 255) hold 0, the output's nodata value.
///
/// # Algorithm
/// 1. Count incoming flows for each cell (in-degree)
/// 2. The first wavefront is every valid cell with in-degree 0
/// 3. Evaluate a wavefront in parallel: 1 + Σ upstream accumulation
/// 4. Decrement the in-degree of each downstream cell; cells reaching 0
///    form the next wavefront
///
/// A cycle in the direction grid leaves cells unprocessed and is reported
/// as [`Error::Routing`].
pub fn flow_accumulation(flow_dir: &Raster<u8>) -> Result<Raster<u32>> {
    let (rows, cols) = flow_dir.shape();
    let total = rows * cols;

    // Step 1: downstream target and in-degree of every cell
    let mut downstream: Vec<Option<usize>> = try_buffer(total, None)?;
    let mut in_degree = try_buffer(total, 0u32)?;
    let mut valid = 0usize;
    for row in 0..rows {
        for col in 0..cols {
            let idx = row * cols + col;
            if unsafe { flow_dir.get_unchecked(row, col) } == d8::NODATA {
                continue;
            }
            valid += 1;
            downstream[idx] = downstream_index(flow_dir, row, col)?;
            if let Some(target) = downstream[idx] {
                in_degree[target] += 1;
            }
        }
    }

    // Step 2: headwaters
    let mut frontier: Vec<usize> = flow_dir
        .data()
        .iter()
        .enumerate()
        .filter(|&(idx, &code)| code != d8::NODATA && in_degree[idx] == 0)
        .map(|(idx, _)| idx)
        .collect();

    let mut accumulation = try_buffer(total, 0u32)?;
    let mut processed = 0usize;
    let mut wavefronts = 0usize;

    while !frontier.is_empty() {
        // Step 3: evaluate the wavefront
        let values: Vec<u32> = (&frontier)
            .into_par_iter()
            .map(|&idx| {
                let (row, col) = (idx / cols, idx % cols);
                let mut sum = 1u32;
                for k in 0..8 {
                    let Some((nr, nc)) = d8::neighbor(row, col, k, rows, cols) else {
                        continue;
                    };
                    let n_idx = nr * cols + nc;
                    if downstream[n_idx] == Some(idx) {
                        sum = sum.saturating_add(accumulation[n_idx]);
                    }
                }
                sum
            })
            .collect();

        // Step 4: release downstream cells
        let mut next = Vec::new();
        for (&idx, &value) in frontier.iter().zip(values.iter()) {
            accumulation[idx] = value;
            if let Some(target) = downstream[idx] {
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    next.push(target);
                }
            }
        }

        processed += frontier.len();
        wavefronts += 1;
        frontier = next;
    }

    if processed < valid {
        return Err(Error::Routing(format!(
            "flow directions contain a cycle through {} cells",
            valid - processed
        )));
    }

    tracing::debug!(wavefronts, cells = processed, "flow accumulation done");

    assemble(flow_dir, accumulation, Some(0))
}
