//! Quantisation of HAND and accumulation to 16-bit outputs

use crate::hydrology::assemble;
use drainhand_core::raster::{Raster, RasterElement};
use drainhand_core::{Error, Result};

/// Largest valid encoded value when the nodata sentinel is 65535
pub const MAX_ENCODED: u16 = u16::MAX - 1;

/// Per-cell "outside" flags of an optional basin mask
fn outside_flags<T: RasterElement>(like: &Raster<T>, mask: Option<&Raster<u8>>) -> Result<Vec<bool>> {
    match mask {
        Some(m) => {
            m.ensure_shape(like.shape())?;
            Ok(m.data().iter().map(|&v| v != 0).collect())
        }
        None => Ok(vec![false; like.len()]),
    }
}

/// Encode HAND as `u16` = ⌊hand × scale⌋.
///
/// Undefined (NaN) cells and cells with a non-zero `mask` value become
/// `nodata`; valid values saturate at `nodata - 1` so they never collide
/// with the sentinel.
pub fn encode_hand(hand: &Raster<f64>, mask: Option<&Raster<u8>>, scale: f64, nodata: u16) -> Result<Raster<u16>> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(Error::InvalidParameter {
            name: "hand_scale",
            value: scale.to_string(),
            reason: "must be a positive number".to_string(),
        });
    }
    let outside = outside_flags(hand, mask)?;
    let ceiling = f64::from(nodata.saturating_sub(1));

    let data: Vec<u16> = hand
        .data()
        .iter()
        .zip(outside.iter())
        .map(|(&h, &out)| {
            if h.is_nan() || out {
                nodata
            } else {
                (h.max(0.0) * scale).floor().min(ceiling) as u16
            }
        })
        .collect();

    assemble(hand, data, Some(nodata))
}

/// Encode flow accumulation as `u16`.
///
/// Zero (nodata) accumulation and masked cells become `nodata`; counts
/// saturate at `nodata - 1`.
pub fn encode_accumulation(accumulation: &Raster<u32>, mask: Option<&Raster<u8>>, nodata: u16) -> Result<Raster<u16>> {
    let outside = outside_flags(accumulation, mask)?;
    let ceiling = u32::from(nodata.saturating_sub(1));

    let data: Vec<u16> = accumulation
        .data()
        .iter()
        .zip(outside.iter())
        .map(|(&a, &out)| {
            if a == 0 || out {
                nodata
            } else {
                a.min(ceiling) as u16
            }
        })
        .collect();

    assemble(accumulation, data, Some(nodata))
}
