//! Polarimetric covariance data model

mod image;
mod layout;
mod series;

pub use image::CovarianceImage;
pub use layout::{BandLayout, Definiteness, LOG_DET_SENTINEL, MAX_BANDS};
pub use series::{interval_label, Series};
