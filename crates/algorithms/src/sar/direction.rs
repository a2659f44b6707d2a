//! Direction of a detected change
//!
//! The difference between the new covariance and the reference is
//! classified by the signs of its leading principal minors.

use polsar_core::polsar::MAX_BANDS;
use polsar_core::{BandLayout, Definiteness, Raster, Result, Series};
use polsar_parallel::{ParallelStrategy, ProcessingMode};

/// Code written to a `bmap` band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChangeDirection {
    None = 0,
    /// Difference is positive definite
    Increase = 1,
    /// Difference is negative definite
    Decrease = 2,
    Indefinite = 3,
}

impl ChangeDirection {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ChangeDirection::None),
            1 => Some(ChangeDirection::Increase),
            2 => Some(ChangeDirection::Decrease),
            3 => Some(ChangeDirection::Indefinite),
            _ => None,
        }
    }
}

impl From<Definiteness> for ChangeDirection {
    fn from(d: Definiteness) -> Self {
        match d {
            Definiteness::Positive => ChangeDirection::Increase,
            Definiteness::Negative => ChangeDirection::Decrease,
            Definiteness::Indefinite => ChangeDirection::Indefinite,
        }
    }
}

/// Classify a matrix difference `after - before`
#[inline]
pub fn classify(layout: BandLayout, diff: &[f64]) -> ChangeDirection {
    layout.definiteness(diff).into()
}

/// Direction codes of every consecutive pair `X(t+1) - X(t)`, one raster per
/// interval.
///
/// Codes are computed for all pixels; the sequential filter copies them only
/// where it records a change.
pub fn direction_maps(series: &Series, mode: ProcessingMode) -> Result<Vec<Raster<u8>>> {
    let layout = series.layout();
    let b = layout.band_count();
    let (rows, cols) = series.shape();
    let images = series.images();
    let intervals = series.len() - 1;

    let row_results: Vec<Vec<u8>> = mode.par_map(0..rows, |row| {
        let mut codes = vec![0u8; intervals * cols];
        let mut before = [0.0; MAX_BANDS];
        let mut after = [0.0; MAX_BANDS];
        for col in 0..cols {
            images[0].pixel(row, col, &mut before);
            for t in 0..intervals {
                images[t + 1].pixel(row, col, &mut after);
                let mut diff = [0.0; MAX_BANDS];
                for i in 0..b {
                    diff[i] = after[i] - before[i];
                }
                codes[t * cols + col] = classify(layout, &diff[..b]).code();
                before = after;
            }
        }
        codes
    });

    let template = &images[0].bands()[0];
    (0..intervals)
        .map(|t| {
            let data = row_results
                .iter()
                .flat_map(|codes| codes[t * cols..(t + 1) * cols].iter().copied())
                .collect();
            template.with_data(data)
        })
        .collect()
}
