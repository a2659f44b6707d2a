//! Omnibus test for "no change anywhere in the sub-series"
//!
//! `Z_Q` is the sum of the pairwise statistics of one start index and is
//! compared against a chi-square mixture with `(k - ell) b` degrees of
//! freedom.

use crate::sar::chi_square::{Bartlett, MixedChiSquare};
use crate::sar::pairwise::PairwiseTests;
use polsar_core::{BandLayout, Error, Raster, Result};
use polsar_parallel::{ParallelStrategy, ProcessingMode};

/// Omnibus statistic and p-value of one start index
#[derive(Debug, Clone)]
pub struct OmnibusTest {
    pub ell: usize,
    pub statistic: Raster<f64>,
    pub p_value: Raster<f64>,
}

/// Aggregate the pairwise statistics of one start index into the omnibus test.
///
/// A pixel with any undefined pairwise statistic gets a NaN omnibus p-value.
pub fn omnibus_test(
    tests: &PairwiseTests,
    layout: BandLayout,
    enl: f64,
    mode: ProcessingMode,
) -> Result<OmnibusTest> {
    let first = tests.statistics.first().ok_or_else(|| {
        Error::Algorithm(format!("no pairwise statistics for start index {}", tests.ell))
    })?;
    let n_tests = tests.statistics.len();
    let m = n_tests + 1;
    let dist = MixedChiSquare::new(n_tests * layout.degrees_of_freedom(), Bartlett::omnibus(layout, m, enl))?;
    let (rows, cols) = first.shape();

    let row_results: Vec<Vec<(f64, f64)>> = mode.par_map(0..rows, |row| {
        (0..cols)
            .map(|col| {
                let z: f64 = tests.statistics.iter().map(|s| s.data()[(row, col)]).sum();
                let z = if z.is_finite() { z } else { f64::NAN };
                (z, dist.p_value(z))
            })
            .collect()
    });

    let (z, p): (Vec<f64>, Vec<f64>) = row_results.into_iter().flatten().unzip();
    tracing::debug!(ell = tests.ell, m, "omnibus test computed");
    Ok(OmnibusTest {
        ell: tests.ell,
        statistic: first.with_data(z)?,
        p_value: first.with_data(p)?,
    })
}
