//! # Drainhand Algorithms
//!
//! The HAND pipeline stages for drainhand.
//!
//! ## Modules
//!
//! - **hydrology**: pit and depression filling, flat resolution, D8 flow
//!   direction, flow accumulation, drainage classification, HAND
//! - **interpolation**: Gaussian gap filling of undefined HAND cells
//! - **basin**: basin windows, all-touched masks, 16-bit encoding
//! - **pipeline**: per-basin processing and the concurrent batch runner

pub mod basin;
pub mod hydrology;
pub mod interpolation;
pub(crate) mod maybe_rayon;
pub mod pipeline;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::basin::{basin_window, encode_accumulation, encode_hand, rasterize_basin_mask};
    pub use crate::hydrology::{
        condition_dem, drainage_mask, fill_depressions, fill_pits, flow_accumulation,
        flow_direction, hand, resolve_flats, ConditionParams, ConditionedDem, Drainage,
        DrainageThreshold, FlowAccumulation, FlowDirection, Hand, PriorityFloodParams,
        TerrainConditioner,
    };
    pub use crate::interpolation::{fill_hand, fill_nan, GapFillParams};
    pub use crate::pipeline::{
        compute_hand, process_basin, run_batch, BasinReport, BatchOptions, FailurePolicy,
        HandConfig, HandProducts, ResourceLimits, TileOutcome,
    };
    pub use drainhand_core::prelude::*;
}
