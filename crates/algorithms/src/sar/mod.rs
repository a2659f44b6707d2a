//! Change detection for polarimetric SAR time series
//!
//! - **chi_square**: Bartlett corrections and the chi-square mixture
//! - **pairwise**: Wishart likelihood-ratio tests between consecutive images
//! - **omnibus**: aggregate test over a sub-series
//! - **sequential**: accumulation of change intervals over start indices
//! - **direction**: increase / decrease / indefinite classification
//! - **enl**: maximum-likelihood equivalent number of looks
//! - **adaptive**: adaptive temporal speckle filter and hybrid ATSF
//! - **detector**: the complete sequential omnibus run

pub mod adaptive;
pub mod chi_square;
pub mod detector;
pub mod direction;
pub mod enl;
pub mod maps;
pub mod omnibus;
pub mod pairwise;
pub mod sequential;

pub use adaptive::{adaptive_filter, hybrid_filter, AdaptiveOutput, AdaptiveState, HybridThreshold};
pub use chi_square::{Bartlett, MixedChiSquare};
pub use detector::{sequential_omnibus, OmnibusParams, SequentialOmnibus};
pub use direction::{classify, direction_maps, ChangeDirection};
pub use enl::{enl_map, estimate_enl, EnlEstimate, EnlParams};
pub use maps::{ChangeDiagnostics, ChangeMapSet, OutputRaster};
pub use omnibus::{omnibus_test, OmnibusTest};
pub use pairwise::{pairwise_test, pairwise_tests, wishart_statistic, PairwiseTest, PairwiseTests};
pub use sequential::{degenerate_mask, SequentialMaps, SequentialState};
