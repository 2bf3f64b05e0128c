//! Vector area-of-interest types
//!
//! A [`Basin`] is a watershed polygon (one or more parts) with an
//! identifier and an optional CRS. Basins bound the HAND computation: the
//! DEM is cropped to the basin's bounding box and every cell outside the
//! polygons is masked in the outputs.

use crate::crs::CRS;
use geo::BoundingRect;
use geo_types::{MultiPolygon, Polygon};

/// A watershed boundary used as the area of interest of one tile
#[derive(Debug, Clone)]
pub struct Basin {
    /// Identifier used to name outputs and report failures (e.g. a HydroBASINS id)
    pub id: String,
    /// Basin polygons, in the same CRS as the DEM
    pub geometry: MultiPolygon<f64>,
    /// CRS declared by the geometry source, if any
    pub crs: Option<CRS>,
}

impl Basin {
    pub fn new(id: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            id: id.into(),
            geometry,
            crs: None,
        }
    }

    /// Basin from a single polygon
    pub fn from_polygon(id: impl Into<String>, polygon: Polygon<f64>) -> Self {
        Self::new(id, MultiPolygon::new(vec![polygon]))
    }

    pub fn with_crs(mut self, crs: Option<CRS>) -> Self {
        self.crs = crs;
        self
    }

    /// Bounding box (min_x, min_y, max_x, max_y), `None` for empty geometry
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        self.geometry
            .bounding_rect()
            .map(|r| (r.min().x, r.min().y, r.max().x, r.max().y))
    }

    pub fn is_empty(&self) -> bool {
        self.geometry.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    #[test]
    fn test_basin_bounds() {
        let poly = polygon![
            (x: 1.0, y: 2.0),
            (x: 5.0, y: 2.0),
            (x: 5.0, y: 7.0),
            (x: 1.0, y: 7.0),
        ];
        let basin = Basin::from_polygon("6050000740", poly);
        assert_eq!(basin.bounds(), Some((1.0, 2.0, 5.0, 7.0)));
        assert!(!basin.is_empty());

        let empty = Basin::new("none", MultiPolygon::new(vec![]));
        assert!(empty.bounds().is_none());
    }
}
