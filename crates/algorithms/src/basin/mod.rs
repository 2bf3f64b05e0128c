//! Basin clipping: windowing, masking and output encoding
//!
//! A basin tile is the DEM cropped to the basin's bounding box (plus a
//! small pad), with a mask marking cells outside the basin polygons.

mod encode;
mod rasterize;

pub use encode::{encode_accumulation, encode_hand, MAX_ENCODED};
pub use rasterize::{rasterize_basin_mask, INSIDE, OUTSIDE};

use drainhand_core::raster::{GeoTransform, Window};
use geo::{BoundingRect, MultiPolygon};

/// Pixel window covering `geometry`'s bounding box, grown by `pad` cells
/// and clipped to a raster of `shape`.
///
/// Returns `None` for empty geometry or geometry outside the raster.
pub fn basin_window(
    transform: &GeoTransform,
    shape: (usize, usize),
    geometry: &MultiPolygon<f64>,
    pad: usize,
) -> Option<Window> {
    let rect = geometry.bounding_rect()?;
    let bounds = (rect.min().x, rect.min().y, rect.max().x, rect.max().y);
    Window::from_bounds(transform, shape, bounds, pad)
}
