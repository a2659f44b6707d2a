//! # polsar algorithms
//!
//! Change detection algorithms for polarimetric SAR covariance time series.
//!
//! ## Available Algorithm Categories
//!
//! - **sar**: Sequential omnibus Wishart change detection, change direction,
//!   adaptive temporal speckle filtering, ML estimation of the number of looks
//! - **statistics**: Focal median used to smooth p-value rasters

pub mod sar;
pub mod statistics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::sar::{
        adaptive_filter, estimate_enl, hybrid_filter, omnibus_test, pairwise_tests,
        sequential_omnibus, ChangeDiagnostics, ChangeDirection, ChangeMapSet, EnlEstimate,
        EnlParams, HybridThreshold, OmnibusParams, SequentialOmnibus,
    };
    pub use crate::statistics::focal_median;
    pub use polsar_core::prelude::*;
    pub use polsar_parallel::ProcessingMode;
}
