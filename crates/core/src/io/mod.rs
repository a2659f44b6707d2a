//! I/O operations for reading and writing single-band GeoTIFF rasters
//!
//! A covariance image is stored as one file per band.

mod covariance;
mod native;

pub use covariance::{read_covariance_image, write_covariance_image};
pub use native::{read_geotiff, write_geotiff, GeoTiffOptions};
