//! # polsar core
//!
//! Core types, traits and I/O for the polsar change-detection workspace.
//!
//! This crate provides:
//! - `Raster<T>`: Generic raster grid type
//! - `GeoTransform`: Affine transformation carried through to outputs
//! - `BandLayout`, `CovarianceImage`, `Series`: per-pixel polarimetric
//!   covariance matrices and their pointwise algebra
//! - Algorithm traits for consistent API
//! - Minimal single-band GeoTIFF I/O

pub mod error;
pub mod io;
pub mod polsar;
pub mod raster;

pub use error::{Error, Result};
pub use polsar::{BandLayout, CovarianceImage, Definiteness, Series};
pub use raster::{GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::polsar::{BandLayout, CovarianceImage, Definiteness, Series};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::Algorithm;
}

/// Core trait for all algorithms in polsar.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
