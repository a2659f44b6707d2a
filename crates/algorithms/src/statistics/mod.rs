//! Statistical operations on rasters
//!
//! - **focal**: moving window median

pub mod focal;

pub use focal::focal_median;
