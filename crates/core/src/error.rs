//! Error types for polsar

use thiserror::Error;

/// Main error type for polsar operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Unsupported band count {0}: expected 1, 2, 3, 4 or 9 bands")]
    UnsupportedBandCount(usize),

    #[error("Band layout mismatch at image {index}: expected {expected} bands, got {actual}")]
    LayoutMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Series too short: {len} image(s), at least 2 are required")]
    SeriesTooShort { len: usize },

    #[error("Label count mismatch: {images} images but {labels} labels")]
    LabelCountMismatch { images: usize, labels: usize },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for polsar operations
pub type Result<T> = std::result::Result<T, Error>;
