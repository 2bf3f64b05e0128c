//! Coordinate Reference System handling
//!
//! Only identification is supported: rasters and basin geometries carry a
//! CRS so that mismatches are caught before masking. No reprojection.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation, when read from a file that stores one
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
        }
    }

    /// Create a CRS from a WKT string.
    ///
    /// The EPSG code is taken from the outermost `AUTHORITY["EPSG", ...]`
    /// (WKT1) or `ID["EPSG", ...]` (WKT2) clause when present.
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        let wkt = wkt.into();
        let epsg = last_epsg_authority(&wkt);
        Self {
            wkt: Some(wkt),
            epsg,
        }
    }

    /// Parse a short identifier: `EPSG:4326`, `epsg:32633`, or an OGC URN
    /// such as `urn:ogc:def:crs:EPSG::4326`.
    pub fn from_identifier(id: &str) -> Result<Self> {
        let upper = id.trim().to_ascii_uppercase();
        if upper == "URN:OGC:DEF:CRS:OGC:1.3:CRS84" || upper == "CRS84" {
            return Ok(Self::wgs84());
        }

        let code = upper
            .rsplit(':')
            .next()
            .filter(|_| upper.contains("EPSG"))
            .and_then(|c| c.parse::<u32>().ok())
            .ok_or_else(|| Error::InvalidParameter {
                name: "crs",
                value: id.to_string(),
                reason: "expected an EPSG identifier".to_string(),
            })?;

        Ok(Self::from_epsg(code))
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }

        // Textual comparison is imperfect but never gives false positives
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }

        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            let head: String = wkt.chars().take(50).collect();
            return format!("WKT:{}", head);
        }
        "Unknown".to_string()
    }
}

/// Fail with [`Error::CrsMismatch`] when both sides declare a CRS and they
/// differ. A missing CRS on either side is accepted.
pub fn ensure_compatible(a: Option<&CRS>, b: Option<&CRS>) -> Result<()> {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_equivalent(b) => {
            Err(Error::CrsMismatch(a.identifier(), b.identifier()))
        }
        _ => Ok(()),
    }
}

fn last_epsg_authority(wkt: &str) -> Option<u32> {
    // The last authority clause belongs to the outermost CRS node
    let upper = wkt.to_ascii_uppercase();
    let pos = upper.rfind("\"EPSG\"")?;
    let rest = &upper[pos + 6..];
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(4326);
        assert_eq!(crs.epsg(), Some(4326));
        assert_eq!(crs.identifier(), "EPSG:4326");
    }

    #[test]
    fn test_crs_equivalence() {
        let a = CRS::from_epsg(4326);
        let b = CRS::wgs84();
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&CRS::from_epsg(32633)));
    }

    #[test]
    fn test_crs_from_identifier() {
        assert_eq!(CRS::from_identifier("EPSG:32633").unwrap().epsg(), Some(32633));
        assert_eq!(
            CRS::from_identifier("urn:ogc:def:crs:EPSG::4326").unwrap().epsg(),
            Some(4326)
        );
        assert_eq!(
            CRS::from_identifier("urn:ogc:def:crs:OGC:1.3:CRS84").unwrap().epsg(),
            Some(4326)
        );
        assert!(CRS::from_identifier("+proj=longlat").is_err());
    }

    #[test]
    fn test_crs_from_wkt_authority() {
        let wkt = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],AUTHORITY["EPSG","4326"]]"#;
        assert_eq!(CRS::from_wkt(wkt).epsg(), Some(4326));
    }

    #[test]
    fn test_ensure_compatible() {
        let a = CRS::from_epsg(4326);
        let b = CRS::from_epsg(3857);
        assert!(ensure_compatible(Some(&a), Some(&a.clone())).is_ok());
        assert!(ensure_compatible(Some(&a), None).is_ok());
        assert!(matches!(
            ensure_compatible(Some(&a), Some(&b)),
            Err(Error::CrsMismatch(_, _))
        ));
    }
}
