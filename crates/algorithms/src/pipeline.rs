//! End-to-end HAND pipeline
//!
//! [`compute_hand`] runs every stage on one grid; [`process_basin`] crops
//! the DEM to a basin, masks it and writes the encoded products;
//! [`run_batch`] processes many basins concurrently, each one independent
//! of the others, and reports a typed outcome per basin.

use crate::basin::{basin_window, encode_accumulation, encode_hand, rasterize_basin_mask, OUTSIDE};
use crate::hydrology::{
    condition_dem, drainage_mask, flow_accumulation, flow_direction, hand, ConditionParams,
    DrainageThreshold,
};
use crate::interpolation::{fill_hand, GapFillParams};
use crate::maybe_rayon::*;
use drainhand_core::crs::ensure_compatible;
use drainhand_core::io::{ElevationSource, RasterSink};
use drainhand_core::raster::Raster;
use drainhand_core::{Basin, Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandConfig {
    /// Accumulation threshold for drainage cells
    pub threshold: DrainageThreshold,
    /// Gaussian sigma for gap filling, in cells
    pub sigma: f64,
    /// Gap-fill pass bound
    pub max_iterations: usize,
    /// HAND is stored as ⌊hand × hand_scale⌋
    pub hand_scale: f64,
    /// Sentinel for undefined and out-of-basin cells in the encoded outputs
    pub nodata: u16,
    /// Cells added around a basin's bounding box
    pub pad: usize,
    /// Working-set budget in bytes, unlimited when `None`
    pub memory_budget: Option<usize>,
    /// Cells next to nodata drain out of the grid
    pub nodata_is_outlet: bool,
}

impl Default for HandConfig {
    fn default() -> Self {
        Self {
            threshold: DrainageThreshold::default(),
            sigma: 3.0,
            max_iterations: 100,
            hand_scale: 10.0,
            nodata: u16::MAX,
            pad: 1,
            memory_budget: None,
            nodata_is_outlet: true,
        }
    }
}

impl HandConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| Error::Format(format!("config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threshold == DrainageThreshold::Fixed(0) {
            return Err(Error::InvalidParameter {
                name: "threshold",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if !(self.hand_scale.is_finite() && self.hand_scale > 0.0) {
            return Err(Error::InvalidParameter {
                name: "hand_scale",
                value: self.hand_scale.to_string(),
                reason: "must be a positive number".to_string(),
            });
        }
        if self.nodata == 0 {
            return Err(Error::InvalidParameter {
                name: "nodata",
                value: "0".to_string(),
                reason: "0 is a valid encoded value".to_string(),
            });
        }
        self.gap_fill_params().validate()
    }

    pub fn condition_params(&self) -> ConditionParams {
        ConditionParams {
            nodata_is_outlet: self.nodata_is_outlet,
            ..Default::default()
        }
    }

    pub fn gap_fill_params(&self) -> GapFillParams {
        GapFillParams {
            sigma: self.sigma,
            max_iterations: self.max_iterations,
        }
    }

    /// Output name of a basin's HAND product
    pub fn hand_name(&self, basin_id: &str) -> String {
        format!("hand_{}_basin_{}.tif", self.threshold, basin_id)
    }

    /// Output name of a basin's accumulation product
    pub fn accumulation_name(&self, basin_id: &str) -> String {
        format!("flow_acc_basin_{}.tif", basin_id)
    }
}

/// Up-front memory check for a tile
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceLimits {
    pub budget: Option<usize>,
}

impl ResourceLimits {
    /// Approximate peak bytes per cell across the stages: the input and
    /// conditioned elevations, flat-resolution scratch, direction,
    /// accumulation with its topology, HAND and its memo cache.
    pub const BYTES_PER_CELL: usize = 96;

    pub fn new(budget: Option<usize>) -> Self {
        Self { budget }
    }

    pub fn estimate_bytes(rows: usize, cols: usize) -> usize {
        rows.saturating_mul(cols).saturating_mul(Self::BYTES_PER_CELL)
    }

    /// Fail with [`Error::Resource`] if a grid of this shape exceeds the budget
    pub fn check(&self, rows: usize, cols: usize) -> Result<()> {
        let Some(budget) = self.budget else {
            return Ok(());
        };
        let required = Self::estimate_bytes(rows, cols);
        if required > budget {
            return Err(Error::Resource { required, budget });
        }
        Ok(())
    }
}

/// Unencoded products of one tile
#[derive(Debug, Clone)]
pub struct HandProducts {
    /// HAND in elevation units, NaN where undefined
    pub hand: Raster<f64>,
    pub accumulation: Raster<u32>,
    /// Drainage threshold actually applied
    pub threshold: f64,
}

/// 16-bit products ready to be written
#[derive(Debug, Clone)]
pub struct EncodedProducts {
    pub hand: Raster<u16>,
    pub accumulation: Raster<u16>,
}

/// Run every stage on `dem`.
///
/// `basin_mask` marks cells outside the area of interest (non-zero). When
/// HAND has undefined cells they are gap filled; cells outside the basin are
/// first seeded with a near-zero HAND so the fill stays inside the basin.
pub fn compute_hand(dem: &Raster<f64>, basin_mask: Option<&Raster<u8>>, config: &HandConfig) -> Result<HandProducts> {
    let (rows, cols) = dem.shape();
    ResourceLimits::new(config.memory_budget).check(rows, cols)?;
    if let Some(mask) = basin_mask {
        mask.ensure_shape((rows, cols))?;
    }

    info!(rows, cols, "Conditioning DEM");
    let conditioned = condition_dem(dem, &config.condition_params())?;

    info!("Obtaining flow direction");
    let flow_dir = flow_direction(&conditioned.dem, Some(&conditioned.gradient))?;

    info!("Calculating flow accumulation");
    let accumulation = flow_accumulation(&flow_dir)?;

    let drainage = drainage_mask(&accumulation, config.threshold)?;
    info!(threshold = drainage.threshold, "Calculating HAND");
    let mut hand_grid = hand(&conditioned.dem, &flow_dir, &drainage.mask)?;
    drop(conditioned);
    drop(flow_dir);

    if hand_grid.data().iter().any(|h| h.is_nan()) {
        info!("Filling undefined HAND cells");
        if let Some(mask) = basin_mask {
            for (h, &m) in hand_grid.data_mut().iter_mut().zip(mask.data().iter()) {
                if m == OUTSIDE {
                    *h = f64::EPSILON;
                }
            }
        }
        hand_grid = fill_hand(&hand_grid, dem, &config.gap_fill_params())?;
    }

    Ok(HandProducts {
        hand: hand_grid,
        accumulation,
        threshold: drainage.threshold,
    })
}

/// Quantise products to `u16`, masking cells outside the basin
pub fn encode_products(products: &HandProducts, basin_mask: Option<&Raster<u8>>, config: &HandConfig) -> Result<EncodedProducts> {
    Ok(EncodedProducts {
        hand: encode_hand(&products.hand, basin_mask, config.hand_scale, config.nodata)?,
        accumulation: encode_accumulation(&products.accumulation, basin_mask, config.nodata)?,
    })
}

/// Names of the products written for one basin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenProducts {
    pub hand: String,
    /// `None` when the accumulation product already existed
    pub accumulation: Option<String>,
}

/// Compute and write the products of one basin.
///
/// The DEM is cropped to the basin's bounding box grown by `config.pad`
/// cells; cells the basin polygons do not touch are nodata in both outputs.
/// The accumulation product is only written if the sink lacks it.
pub fn process_basin<S>(dem: &Raster<f64>, basin: &Basin, config: &HandConfig, sink: &S) -> Result<WrittenProducts>
where
    S: RasterSink + ?Sized,
{
    ensure_compatible(dem.crs(), basin.crs.as_ref())?;

    let window = basin_window(dem.transform(), dem.shape(), &basin.geometry, config.pad)
        .ok_or_else(|| Error::EmptyGeometry(format!("basin {} does not overlap the DEM", basin.id)))?;
    ResourceLimits::new(config.memory_budget).check(window.rows, window.cols)?;
    debug!(basin = %basin.id, ?window, "basin window");

    let tile = dem.window(&window)?;
    let mask = rasterize_basin_mask(&basin.geometry, &tile)?;

    let products = compute_hand(&tile, Some(&mask), config)?;
    let encoded = encode_products(&products, Some(&mask), config)?;

    let hand_name = config.hand_name(&basin.id);
    sink.write(&hand_name, &encoded.hand)?;

    let acc_name = config.accumulation_name(&basin.id);
    let accumulation = if sink.exists(&acc_name) {
        debug!(name = %acc_name, "accumulation output exists, skipping");
        None
    } else {
        sink.write(&acc_name, &encoded.accumulation)?;
        Some(acc_name)
    };

    Ok(WrittenProducts {
        hand: hand_name,
        accumulation,
    })
}

/// What the batch does after a basin fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and carry on
    #[default]
    Skip,
    /// Stop starting new basins
    Abort,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Skip => write!(f, "skip"),
            FailurePolicy::Abort => write!(f, "abort"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(FailurePolicy::Skip),
            "abort" => Ok(FailurePolicy::Abort),
            _ => Err(Error::InvalidParameter {
                name: "policy",
                value: s.to_string(),
                reason: "expected \"skip\" or \"abort\"".to_string(),
            }),
        }
    }
}

/// Result of one basin
#[derive(Debug, Clone, PartialEq)]
pub enum TileOutcome {
    Written(WrittenProducts),
    Failed { kind: ErrorKind, message: String },
    /// Not started because an earlier basin failed under [`FailurePolicy::Abort`]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct BasinReport {
    pub id: String,
    pub outcome: TileOutcome,
    pub elapsed: Duration,
}

impl BasinReport {
    pub fn is_written(&self) -> bool {
        matches!(self.outcome, TileOutcome::Written(_))
    }
}

/// Options of [`run_batch`]
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub policy: FailurePolicy,
    /// File to which failing basin ids are appended
    pub error_log: Option<PathBuf>,
}

/// Process every basin against one elevation source.
///
/// Basins run concurrently. A failing basin never affects the others'
/// outputs; under [`FailurePolicy::Abort`] basins not yet started are
/// reported as [`TileOutcome::Cancelled`]. Reports come back in input order.
pub fn run_batch<S>(
    source: &dyn ElevationSource,
    basins: &[Basin],
    config: &HandConfig,
    sink: &S,
    options: &BatchOptions,
) -> Result<Vec<BasinReport>>
where
    S: RasterSink + ?Sized,
{
    config.validate()?;
    let error_log: Mutex<Option<File>> = Mutex::new(match &options.error_log {
        Some(path) => Some(OpenOptions::new().create(true).append(true).open(path)?),
        None => None,
    });

    info!(source = %source.describe(), "Reading elevation");
    let dem = source.read_elevation()?;
    info!(basins = basins.len(), policy = %options.policy, "Processing basins");

    let abort = AtomicBool::new(false);
    let reports: Vec<BasinReport> = basins
        .into_par_iter()
        .map(|basin| {
            if abort.load(Ordering::Relaxed) {
                return BasinReport {
                    id: basin.id.clone(),
                    outcome: TileOutcome::Cancelled,
                    elapsed: Duration::ZERO,
                };
            }

            let start = Instant::now();
            let outcome = match process_basin(&dem, basin, config, sink) {
                Ok(written) => {
                    info!(basin = %basin.id, hand = %written.hand, "basin done");
                    TileOutcome::Written(written)
                }
                Err(e) => {
                    let kind = e.kind();
                    warn!(basin = %basin.id, %kind, "failed to process basin: {}", e);
                    log_failure(&error_log, &basin.id, kind);
                    if options.policy == FailurePolicy::Abort {
                        abort.store(true, Ordering::Relaxed);
                    }
                    TileOutcome::Failed {
                        kind,
                        message: e.to_string(),
                    }
                }
            };

            BasinReport {
                id: basin.id.clone(),
                outcome,
                elapsed: start.elapsed(),
            }
        })
        .collect();

    let written = reports.iter().filter(|r| r.is_written()).count();
    let cancelled = reports
        .iter()
        .filter(|r| r.outcome == TileOutcome::Cancelled)
        .count();
    info!(
        written,
        failed = reports.len() - written - cancelled,
        cancelled,
        "Batch finished"
    );

    Ok(reports)
}

fn log_failure(log: &Mutex<Option<File>>, id: &str, kind: ErrorKind) {
    let Ok(mut guard) = log.lock() else {
        return;
    };
    if let Some(file) = guard.as_mut() {
        if let Err(e) = writeln!(file, "{}\t{}", id, kind) {
            warn!(basin = %id, "could not record failure: {}", e);
        }
    }
}
