//! I/O for elevation rasters, products and basin boundaries

mod basins;
mod geotiff;
mod sink;

pub use basins::{parse_basins, read_basins, DEFAULT_ID_PROPERTY};
pub use geotiff::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer, Compression,
    GeoTiffOptions, TiffPixel,
};
pub use sink::{DirectorySink, ElevationSource, GeoTiffSource, MemorySink, RasterSink};
