//! Drainage network classification
//!
//! Drainage cells are those whose accumulation exceeds a threshold. The
//! threshold is either fixed (in cells) or derived from the accumulation
//! itself.

use super::assemble;
use drainhand_core::raster::Raster;
use drainhand_core::{Algorithm, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Accumulation threshold separating drainage cells from hillslopes.
///
/// Serialised as a positive integer or the string `"auto"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ThresholdValue", into = "ThresholdValue")]
pub enum DrainageThreshold {
    /// Fixed number of contributing cells
    Fixed(u32),
    /// Mean accumulation over all valid cells
    Auto,
}

impl Default for DrainageThreshold {
    fn default() -> Self {
        DrainageThreshold::Fixed(100)
    }
}

impl fmt::Display for DrainageThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrainageThreshold::Fixed(n) => write!(f, "{}", n),
            DrainageThreshold::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for DrainageThreshold {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(DrainageThreshold::Auto);
        }
        match s.parse::<u32>() {
            Ok(n) if n > 0 => Ok(DrainageThreshold::Fixed(n)),
            _ => Err(Error::InvalidParameter {
                name: "threshold",
                value: s.to_string(),
                reason: "expected a positive integer or \"auto\"".to_string(),
            }),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ThresholdValue {
    Cells(u64),
    Text(String),
}

impl TryFrom<ThresholdValue> for DrainageThreshold {
    type Error = Error;

    fn try_from(value: ThresholdValue) -> Result<Self> {
        match value {
            ThresholdValue::Cells(n) => match u32::try_from(n) {
                Ok(n) if n > 0 => Ok(DrainageThreshold::Fixed(n)),
                _ => Err(Error::InvalidParameter {
                    name: "threshold",
                    value: n.to_string(),
                    reason: "must be between 1 and 4294967295 cells".to_string(),
                }),
            },
            ThresholdValue::Text(text) => text.parse(),
        }
    }
}

impl From<DrainageThreshold> for ThresholdValue {
    fn from(threshold: DrainageThreshold) -> Self {
        match threshold {
            DrainageThreshold::Fixed(n) => ThresholdValue::Cells(u64::from(n)),
            DrainageThreshold::Auto => ThresholdValue::Text("auto".to_string()),
        }
    }
}

/// Drainage mask and the threshold it was built with
#[derive(Debug, Clone)]
pub struct Drainage {
    /// 1 on drainage cells, 0 elsewhere
    pub mask: Raster<u8>,
    /// Threshold actually applied (the mean for `Auto`)
    pub threshold: f64,
}

/// Drainage classification algorithm
#[derive(Debug, Clone, Default)]
pub struct DrainageClassifier;

impl Algorithm for DrainageClassifier {
    type Input = Raster<u32>;
    type Output = Drainage;
    type Params = DrainageThreshold;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Drainage Classifier"
    }

    fn description(&self) -> &'static str {
        "Mark cells whose flow accumulation exceeds a threshold"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        drainage_mask(&input, params)
    }
}

/// Mark cells with accumulation strictly greater than the threshold.
///
/// Nodata accumulation cells are never drainage.
pub fn drainage_mask(accumulation: &Raster<u32>, threshold: DrainageThreshold) -> Result<Drainage> {
    let resolved = match threshold {
        DrainageThreshold::Fixed(0) => {
            return Err(Error::InvalidParameter {
                name: "threshold",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            })
        }
        DrainageThreshold::Fixed(n) => f64::from(n),
        DrainageThreshold::Auto => accumulation
            .statistics()
            .mean
            .ok_or(Error::AllNoData)?,
    };

    let mask: Vec<u8> = accumulation
        .data()
        .iter()
        .map(|&acc| u8::from(!accumulation.is_nodata(acc) && f64::from(acc) > resolved))
        .collect();

    let drainage_cells = mask.iter().filter(|&&m| m == 1).count();
    tracing::debug!(threshold = resolved, drainage_cells, "drainage classified");

    Ok(Drainage {
        mask: assemble(accumulation, mask, None)?,
        threshold: resolved,
    })
}
