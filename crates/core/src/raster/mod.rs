//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;
mod neighborhood;
mod window;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::{try_buffer, Raster, RasterStatistics};
pub use neighborhood::d8;
pub use window::Window;
