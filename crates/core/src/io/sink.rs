//! Elevation sources and raster sinks
//!
//! The batch runner reads the DEM through [`ElevationSource`] and hands
//! encoded products to a [`RasterSink`], so it can run against files or
//! in-memory rasters alike.

use super::geotiff::{read_geotiff, write_geotiff, GeoTiffOptions};
use crate::error::{Error, Result};
use crate::raster::Raster;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Something that yields an elevation raster in a known CRS
pub trait ElevationSource: Send + Sync {
    fn read_elevation(&self) -> Result<Raster<f64>>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

/// DEM stored as a GeoTIFF file
#[derive(Debug, Clone)]
pub struct GeoTiffSource {
    path: PathBuf,
}

impl GeoTiffSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ElevationSource for GeoTiffSource {
    fn read_elevation(&self) -> Result<Raster<f64>> {
        read_geotiff(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

impl ElevationSource for Raster<f64> {
    fn read_elevation(&self) -> Result<Raster<f64>> {
        Ok(self.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory {}x{} raster", self.cols(), self.rows())
    }
}

/// Destination for encoded 16-bit products.
///
/// The raster carries its own transform, CRS and nodata value.
pub trait RasterSink: Send + Sync {
    /// Whether an output with this name already exists
    fn exists(&self, name: &str) -> bool;

    fn write(&self, name: &str, raster: &Raster<u16>) -> Result<()>;
}

/// Writes each product as a GeoTIFF in a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    options: GeoTiffOptions,
}

impl DirectorySink {
    /// Sink writing into `dir`, creating it when missing
    pub fn new(dir: impl Into<PathBuf>, options: GeoTiffOptions) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, options })
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl RasterSink for DirectorySink {
    fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    fn write(&self, name: &str, raster: &Raster<u16>) -> Result<()> {
        write_geotiff(raster, self.path_for(name), Some(self.options.clone()))
    }
}

/// Keeps products in memory, keyed by name
#[derive(Debug, Default)]
pub struct MemorySink {
    products: Mutex<HashMap<String, Raster<u16>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Raster<u16>> {
        self.products.lock().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .products
            .lock()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl RasterSink for MemorySink {
    fn exists(&self, name: &str) -> bool {
        self.products
            .lock()
            .map(|p| p.contains_key(name))
            .unwrap_or(false)
    }

    fn write(&self, name: &str, raster: &Raster<u16>) -> Result<()> {
        let mut products = self
            .products
            .lock()
            .map_err(|_| Error::Io(std::io::Error::other(format!("memory sink poisoned while writing {}", name))))?;
        products.insert(name.to_string(), raster.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_sink_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("out"), GeoTiffOptions::default()).unwrap();

        let mut raster: Raster<u16> = Raster::filled(5, 4, 12);
        raster.set_nodata(Some(u16::MAX));

        assert!(!sink.exists("a.tif"));
        sink.write("a.tif", &raster).unwrap();
        assert!(sink.exists("a.tif"));

        let back: Raster<u16> = GeoTiffSource::new(sink.path_for("a.tif"))
            .read_elevation()
            .map(|r| r.derive(r.data().mapv(|v| v as u16), Some(u16::MAX)).unwrap())
            .unwrap();
        assert_eq!(back.get(4, 3).unwrap(), 12);
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        sink.write("b.tif", &Raster::filled(2, 2, 1)).unwrap();
        sink.write("a.tif", &Raster::filled(2, 2, 2)).unwrap();
        assert!(sink.exists("a.tif"));
        assert_eq!(sink.names(), vec!["a.tif", "b.tif"]);
        assert_eq!(sink.get("b.tif").unwrap().get(0, 0).unwrap(), 1);
    }

    #[test]
    fn test_memory_sink_poisoned_write_fails() {
        let sink = MemorySink::new();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = sink.products.lock().unwrap();
            panic!("writer died");
        }));

        let result = sink.write("a.tif", &Raster::filled(2, 2, 1));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
