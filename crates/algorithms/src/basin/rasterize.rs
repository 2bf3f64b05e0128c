//! All-touched polygon rasterisation
//!
//! A cell is inside a basin when any part of a basin polygon touches the
//! cell rectangle: either its centre is inside one of the polygons (even-odd
//! rule along the row's centre line) or a ring segment crosses it. Work is done in pixel
//! space, so rotated geotransforms are handled the same way as north-up
//! ones.

use crate::hydrology::assemble;
use crate::maybe_rayon::*;
use drainhand_core::raster::{Raster, RasterElement};
use drainhand_core::{Error, Result};
use geo::{Coord, Intersects, Line, MultiPolygon, Rect};

/// Value of a [`rasterize_basin_mask`] cell outside the basin
pub const OUTSIDE: u8 = 1;
/// Value of a [`rasterize_basin_mask`] cell inside the basin
pub const INSIDE: u8 = 0;

/// Rasterise `geometry` onto the grid of `like`.
///
/// Returns a mask with [`OUTSIDE`] (1) for cells the geometry does not
/// touch and [`INSIDE`] (0) for the rest. The geometry must be in the
/// raster's CRS.
pub fn rasterize_basin_mask<T: RasterElement>(geometry: &MultiPolygon<f64>, like: &Raster<T>) -> Result<Raster<u8>> {
    if geometry.0.is_empty() {
        return Err(Error::EmptyGeometry("basin has no polygons".to_string()));
    }

    let (rows, cols) = like.shape();
    let transform = like.transform();

    // Ring segments in fractional (col, row) pixel coordinates, per polygon
    let polygons: Vec<Vec<Line<f64>>> = geometry
        .0
        .iter()
        .map(|poly| {
            std::iter::once(poly.exterior())
                .chain(poly.interiors())
                .flat_map(|ring| ring.lines())
                .map(|line| {
                    let (sx, sy) = transform.geo_to_pixel(line.start.x, line.start.y);
                    let (ex, ey) = transform.geo_to_pixel(line.end.x, line.end.y);
                    Line::new(Coord { x: sx, y: sy }, Coord { x: ex, y: ey })
                })
                .filter(|line| line.start.x.is_finite() && line.start.y.is_finite() && line.end.x.is_finite() && line.end.y.is_finite())
                .collect::<Vec<_>>()
        })
        .filter(|segments| !segments.is_empty())
        .collect();

    if polygons.is_empty() {
        return Err(Error::EmptyGeometry(
            "basin rings have no usable segments".to_string(),
        ));
    }

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![OUTSIDE; cols];
            let top = row as f64;
            let bottom = top + 1.0;
            let centre_y = top + 0.5;

            // Cell centres inside any polygon (even-odd per polygon, then union)
            for segments in &polygons {
                let mut crossings: Vec<f64> = segments
                    .iter()
                    .filter(|s| (s.start.y > centre_y) != (s.end.y > centre_y))
                    .map(|s| s.start.x + (centre_y - s.start.y) * (s.end.x - s.start.x) / (s.end.y - s.start.y))
                    .collect();
                crossings.sort_by(|a, b| a.total_cmp(b));
                for pair in crossings.chunks_exact(2) {
                    let first = (pair[0] - 0.5).ceil().max(0.0) as usize;
                    let last = ((pair[1] - 0.5).ceil().max(0.0) as usize).min(cols);
                    for cell in row_data.iter_mut().take(last).skip(first) {
                        *cell = INSIDE;
                    }
                }
            }

            // Cells crossed by a segment
            for s in polygons.iter().flatten() {
                let (y0, y1) = (s.start.y.min(s.end.y), s.start.y.max(s.end.y));
                if y1 < top || y0 > bottom {
                    continue;
                }
                let x0 = s.start.x.min(s.end.x).floor().max(0.0) as usize;
                let x1 = (s.start.x.max(s.end.x).floor().max(-1.0) + 1.0) as usize;
                for col in x0..x1.min(cols) {
                    if row_data[col] == INSIDE {
                        continue;
                    }
                    let cell = Rect::new(
                        Coord { x: col as f64, y: top },
                        Coord { x: col as f64 + 1.0, y: bottom },
                    );
                    if s.intersects(&cell) {
                        row_data[col] = INSIDE;
                    }
                }
            }

            row_data
        })
        .collect();

    assemble(like, data, None)
}
