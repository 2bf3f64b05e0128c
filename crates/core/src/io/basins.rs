//! GeoJSON basin reader
//!
//! Reads a FeatureCollection of Polygon / MultiPolygon watershed boundaries
//! (e.g. HydroBASINS exported to GeoJSON). The basin identifier comes from a
//! configurable property, falling back to the feature id.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::Basin;
use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{feature::Id, Feature, GeoJson, Value};
use serde_json::Value as JsonValue;
use std::path::Path;

/// Property holding the basin identifier in HydroBASINS layers
pub const DEFAULT_ID_PROPERTY: &str = "HYBAS_ID";

/// Read basins from a GeoJSON file
pub fn read_basins<P: AsRef<Path>>(path: P, id_property: &str) -> Result<Vec<Basin>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_basins(&text, id_property)
}

/// Parse basins from GeoJSON text.
///
/// Features without a polygonal geometry are skipped; a collection that
/// yields no basin at all is an error.
pub fn parse_basins(text: &str, id_property: &str) -> Result<Vec<Basin>> {
    let gj: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| Error::Format(format!("GeoJSON: {}", e)))?;

    let (features, crs) = match gj {
        GeoJson::FeatureCollection(fc) => {
            let crs = fc.foreign_members.as_ref().and_then(|m| crs_member(m.get("crs")));
            (fc.features, crs)
        }
        GeoJson::Feature(f) => {
            let crs = f.foreign_members.as_ref().and_then(|m| crs_member(m.get("crs")));
            (vec![f], crs)
        }
        GeoJson::Geometry(_) => {
            return Err(Error::Format(
                "expected a Feature or FeatureCollection of basins".to_string(),
            ))
        }
    };

    let mut basins = Vec::with_capacity(features.len());
    for (index, feature) in features.into_iter().enumerate() {
        let id = feature_id(&feature, id_property).unwrap_or_else(|| index.to_string());
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let multi = match geometry.value {
            Value::Polygon(rings) => MultiPolygon::new(vec![to_polygon(&rings)?]),
            Value::MultiPolygon(parts) => MultiPolygon::new(
                parts
                    .iter()
                    .map(|rings| to_polygon(rings))
                    .collect::<Result<Vec<_>>>()?,
            ),
            _ => continue,
        };
        basins.push(Basin::new(id, multi).with_crs(crs.clone()));
    }

    if basins.is_empty() {
        return Err(Error::EmptyGeometry(
            "no Polygon or MultiPolygon features found".to_string(),
        ));
    }

    Ok(basins)
}

fn feature_id(feature: &Feature, id_property: &str) -> Option<String> {
    let from_props = feature
        .properties
        .as_ref()
        .and_then(|p| p.get(id_property))
        .and_then(json_to_id);

    from_props.or_else(|| match &feature.id {
        Some(Id::String(s)) => Some(s.clone()),
        Some(Id::Number(n)) => json_to_id(&JsonValue::Number(n.clone())),
        None => None,
    })
}

fn json_to_id(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                // Shapefile exports often store integer ids as doubles
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 {
                        format!("{}", f as i64)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        _ => None,
    }
}

/// Legacy GeoJSON `"crs": {"type": "name", "properties": {"name": ...}}`
fn crs_member(value: Option<&JsonValue>) -> Option<CRS> {
    let name = value?.get("properties")?.get("name")?.as_str()?;
    CRS::from_identifier(name).ok()
}

fn to_ring(positions: &[Vec<f64>]) -> Result<LineString<f64>> {
    let coords = positions
        .iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(Error::Format(
                "GeoJSON position with fewer than 2 coordinates".to_string(),
            )),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::new(coords))
}

fn to_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    let mut iter = rings.iter();
    let exterior = match iter.next() {
        Some(r) => to_ring(r)?,
        None => return Err(Error::EmptyGeometry("polygon without rings".to_string())),
    };
    let interiors = iter.map(|r| to_ring(r)).collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::4326"}},
        "features": [
            {
                "type": "Feature",
                "properties": {"HYBAS_ID": 6050000740, "UP_AREA": 12.5},
                "geometry": {"type": "Polygon", "coordinates": [[[0,0],[4,0],[4,4],[0,4],[0,0]]]}
            },
            {
                "type": "Feature",
                "id": "outlet-b",
                "properties": {},
                "geometry": {"type": "MultiPolygon", "coordinates": [
                    [[[10,10],[12,10],[12,12],[10,12],[10,10]]],
                    [[[20,20],[21,20],[21,21],[20,21],[20,20]]]
                ]}
            },
            {
                "type": "Feature",
                "properties": {"HYBAS_ID": 1},
                "geometry": {"type": "Point", "coordinates": [1, 1]}
            }
        ]
    }"#;

    #[test]
    fn test_parse_basins() {
        let basins = parse_basins(COLLECTION, DEFAULT_ID_PROPERTY).unwrap();
        assert_eq!(basins.len(), 2);

        assert_eq!(basins[0].id, "6050000740");
        assert_eq!(basins[0].bounds(), Some((0.0, 0.0, 4.0, 4.0)));
        assert_eq!(basins[0].crs.as_ref().and_then(|c| c.epsg()), Some(4326));

        assert_eq!(basins[1].id, "outlet-b");
        assert_eq!(basins[1].geometry.0.len(), 2);
        assert_eq!(basins[1].bounds(), Some((10.0, 10.0, 21.0, 21.0)));
    }

    #[test]
    fn test_float_id_property() {
        let text = r#"{"type": "Feature", "properties": {"HYBAS_ID": 42.0},
            "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}}"#;
        let basins = parse_basins(text, "HYBAS_ID").unwrap();
        assert_eq!(basins[0].id, "42");
        assert!(basins[0].crs.is_none());
    }

    #[test]
    fn test_no_polygons_is_error() {
        let text = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(matches!(
            parse_basins(text, DEFAULT_ID_PROPERTY),
            Err(Error::EmptyGeometry(_))
        ));
        assert!(parse_basins("not json", DEFAULT_ID_PROPERTY).is_err());
    }
}
