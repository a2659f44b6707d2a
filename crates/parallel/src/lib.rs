//! # polsar parallel
//!
//! Row-parallel execution for per-pixel kernels.
//!
//! Kernels compute one output row per index and the strategy decides whether
//! rows run on the caller's thread, on the global Rayon pool or on a pool of
//! a fixed size. Results always come back in row order, so outputs do not
//! depend on the mode.

pub mod strategy;

pub use strategy::{ParallelStrategy, ProcessingMode};
