//! Pixel windows for cropping rasters to an area of interest

use super::GeoTransform;
use serde::{Deserialize, Serialize};

/// A rectangular block of pixels inside a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Window {
    pub fn new(row_off: usize, col_off: usize, rows: usize, cols: usize) -> Self {
        Self { row_off, col_off, rows, cols }
    }

    /// Window covering the pixels touched by a geographic bounding box,
    /// grown by `pad` cells on every side and clipped to `shape`.
    ///
    /// Returns `None` when the box lies entirely outside the raster.
    pub fn from_bounds(
        transform: &GeoTransform,
        shape: (usize, usize),
        bounds: (f64, f64, f64, f64),
        pad: usize,
    ) -> Option<Self> {
        let (rows, cols) = shape;
        let (min_x, min_y, max_x, max_y) = bounds;

        let corners = [
            transform.geo_to_pixel(min_x, min_y),
            transform.geo_to_pixel(min_x, max_y),
            transform.geo_to_pixel(max_x, min_y),
            transform.geo_to_pixel(max_x, max_y),
        ];
        if corners.iter().any(|(c, r)| c.is_nan() || r.is_nan()) {
            return None;
        }

        let col_min = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min).floor();
        let col_max = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max).ceil();
        let row_min = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min).floor();
        let row_max = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max).ceil();

        let pad = pad as f64;
        let r0 = (row_min - pad).max(0.0);
        let c0 = (col_min - pad).max(0.0);
        let r1 = (row_max + pad).min(rows as f64);
        let c1 = (col_max + pad).min(cols as f64);

        if r1 <= r0 || c1 <= c0 {
            return None;
        }

        Some(Self::new(
            r0 as usize,
            c0 as usize,
            (r1 - r0) as usize,
            (c1 - c0) as usize,
        ))
    }

    /// Whether this window fits inside a raster of the given shape
    pub fn fits(&self, shape: (usize, usize)) -> bool {
        self.row_off + self.rows <= shape.0 && self.col_off + self.cols <= shape.1
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }
}
