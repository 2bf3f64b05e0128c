//! Gap filling of undefined cells
//!
//! - Gaussian NaN filling with bounded iterations
//! - HAND filling through the height of the nearest drainage

mod gap_fill;

pub use gap_fill::{fill_hand, fill_nan, GapFillParams};
