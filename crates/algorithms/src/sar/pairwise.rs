//! Pairwise Wishart likelihood-ratio tests
//!
//! For the sub-series starting at image `ell` (1-based) and a local index
//! `j >= 2`, the test asks whether image `j` of the sub-series comes from the
//! same covariance as the `j - 1` images before it:
//!
//! ```text
//! Zj = -2L { (j-1) ln|S(j-1)| + ln|Xj| + d j ln j - d (j-1) ln(j-1) - j ln|S(j)| }
//! ```
//!
//! with `S(n)` the sum of the first `n` images of the sub-series. `Zj` is
//! invariant to a common scaling of the images, so ENL pre-multiplied input
//! gives the same statistic as raw input.

use crate::sar::chi_square::{Bartlett, MixedChiSquare};
use polsar_core::polsar::MAX_BANDS;
use polsar_core::{BandLayout, Error, Raster, Result, Series};
use polsar_parallel::{ParallelStrategy, ProcessingMode};

/// All pairwise tests of one start index
#[derive(Debug, Clone)]
pub struct PairwiseTests {
    /// 1-based start index of the sub-series
    pub ell: usize,
    /// `Zj` rasters for `j = 2 ..= k - ell + 1`
    pub statistics: Vec<Raster<f64>>,
    /// P-values matching `statistics`; NaN where the test is undefined
    pub p_values: Vec<Raster<f64>>,
}

impl PairwiseTests {
    /// Number of tests, `k - ell`
    pub fn len(&self) -> usize {
        self.p_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.p_values.is_empty()
    }
}

/// One pairwise test
#[derive(Debug, Clone)]
pub struct PairwiseTest {
    pub statistic: Raster<f64>,
    pub p_value: Raster<f64>,
}

/// Likelihood-ratio statistic from the three log-determinants of one test.
///
/// Any degenerate log-determinant, or a non-finite result, gives NaN.
#[inline]
pub fn wishart_statistic(
    layout: BandLayout,
    j: usize,
    enl: f64,
    ln_prev_sum: f64,
    ln_image: f64,
    ln_sum: f64,
) -> f64 {
    if BandLayout::is_degenerate_log_det(ln_prev_sum)
        || BandLayout::is_degenerate_log_det(ln_image)
        || BandLayout::is_degenerate_log_det(ln_sum)
    {
        return f64::NAN;
    }
    let d = layout.dimension() as f64;
    let j = j as f64;
    let prev = j - 1.0;
    let z = -2.0
        * enl
        * (prev * ln_prev_sum + ln_image + d * j * j.ln() - d * prev * prev.ln() - j * ln_sum);
    if z.is_finite() { z } else { f64::NAN }
}

fn check_start(series: &Series, ell: usize) -> Result<()> {
    if ell == 0 || ell >= series.len() {
        return Err(Error::InvalidParameter {
            name: "ell",
            value: ell.to_string(),
            reason: format!("start index must be in 1..{}", series.len()),
        });
    }
    Ok(())
}

/// Compute every pairwise test of the sub-series starting at `ell`.
///
/// Images are visited once per pixel, keeping the running sum in a stack
/// buffer, so the cost is `O((k - ell) N)`.
pub fn pairwise_tests(
    series: &Series,
    ell: usize,
    enl: f64,
    mode: ProcessingMode,
) -> Result<PairwiseTests> {
    check_start(series, ell)?;

    let layout = series.layout();
    let b = layout.band_count();
    let start = ell - 1;
    let n_tests = series.len() - ell;
    let (rows, cols) = series.shape();
    let images = series.images();

    let distributions = (2..=n_tests + 1)
        .map(|j| MixedChiSquare::new(layout.degrees_of_freedom(), Bartlett::pairwise(layout, j, enl)))
        .collect::<Result<Vec<_>>>()?;

    let row_results: Vec<(Vec<f64>, Vec<f64>)> = mode.par_map(0..rows, |row| {
        let mut z_row = vec![f64::NAN; n_tests * cols];
        let mut p_row = vec![f64::NAN; n_tests * cols];
        let mut sum = [0.0; MAX_BANDS];
        let mut x = [0.0; MAX_BANDS];

        for col in 0..cols {
            images[start].pixel(row, col, &mut sum);
            let mut ln_prev = layout.log_determinant(&sum[..b]);

            for t in 0..n_tests {
                images[start + t + 1].pixel(row, col, &mut x);
                for (s, v) in sum[..b].iter_mut().zip(&x[..b]) {
                    *s += v;
                }
                let ln_image = layout.log_determinant(&x[..b]);
                let ln_sum = layout.log_determinant(&sum[..b]);

                let z = wishart_statistic(layout, t + 2, enl, ln_prev, ln_image, ln_sum);
                z_row[t * cols + col] = z;
                p_row[t * cols + col] = distributions[t].p_value(z);
                ln_prev = ln_sum;
            }
        }

        (z_row, p_row)
    });

    let template = &series.images()[0].bands()[0];
    let mut statistics = Vec::with_capacity(n_tests);
    let mut p_values = Vec::with_capacity(n_tests);
    for t in 0..n_tests {
        let range = t * cols..(t + 1) * cols;
        let z: Vec<f64> = row_results.iter().flat_map(|(z, _)| z[range.clone()].iter().copied()).collect();
        let p: Vec<f64> = row_results.iter().flat_map(|(_, p)| p[range.clone()].iter().copied()).collect();
        statistics.push(template.with_data(z)?);
        p_values.push(template.with_data(p)?);
    }

    tracing::debug!(ell, tests = n_tests, "pairwise tests computed");
    Ok(PairwiseTests {
        ell,
        statistics,
        p_values,
    })
}

/// Compute the single test of local index `j` (`2 ..= k - ell + 1`) of the
/// sub-series starting at `ell`.
pub fn pairwise_test(
    series: &Series,
    ell: usize,
    j: usize,
    enl: f64,
    mode: ProcessingMode,
) -> Result<PairwiseTest> {
    check_start(series, ell)?;
    let m = series.len() - ell + 1;
    if j < 2 || j > m {
        return Err(Error::InvalidParameter {
            name: "j",
            value: j.to_string(),
            reason: format!("test index must be in 2..={}", m),
        });
    }

    let layout = series.layout();
    let start = ell - 1;
    let prev_sum = series.sum_images(start..start + j - 1)?;
    let image = &series.images()[start + j - 1];
    let sum = prev_sum.add(image)?;

    let ln_prev = prev_sum.log_determinant();
    let ln_image = image.log_determinant();
    let ln_sum = sum.log_determinant();

    let dist = MixedChiSquare::new(layout.degrees_of_freedom(), Bartlett::pairwise(layout, j, enl))?;
    let (rows, cols) = series.shape();

    let row_results: Vec<Vec<(f64, f64)>> = mode.par_map(0..rows, |row| {
        (0..cols)
            .map(|col| {
                let z = wishart_statistic(
                    layout,
                    j,
                    enl,
                    ln_prev.data()[(row, col)],
                    ln_image.data()[(row, col)],
                    ln_sum.data()[(row, col)],
                );
                (z, dist.p_value(z))
            })
            .collect()
    });

    let (z, p): (Vec<f64>, Vec<f64>) = row_results.into_iter().flatten().unzip();
    Ok(PairwiseTest {
        statistic: ln_sum.with_data(z)?,
        p_value: ln_sum.with_data(p)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use polsar_core::CovarianceImage;

    /// `v * I` in the given layout
    fn identity_pixel(layout: BandLayout, v: f64) -> Vec<f64> {
        match layout {
            BandLayout::DualFull => vec![v, 0.0, 0.0, v],
            BandLayout::QuadFull => vec![v, 0.0, 0.0, 0.0, 0.0, v, 0.0, 0.0, v],
            other => vec![v; other.band_count()],
        }
    }

    fn constant_series(layout: BandLayout, values: &[f64]) -> Series {
        let images = values
            .iter()
            .map(|&v| {
                let pixels = identity_pixel(layout, v).repeat(3 * 4);
                CovarianceImage::from_interleaved(layout, 3, 4, &pixels).unwrap()
            })
            .collect();
        Series::new(images).unwrap()
    }

    #[test]
    fn test_constant_series_has_zero_statistic() {
        for layout in [BandLayout::Scalar, BandLayout::DualDiag, BandLayout::DualFull, BandLayout::QuadFull] {
            let series = constant_series(layout, &[2.0, 2.0, 2.0, 2.0]);
            let tests = pairwise_tests(&series, 1, 4.4, ProcessingMode::Sequential).unwrap();
            assert_eq!(tests.len(), 3);
            for (z, p) in tests.statistics.iter().zip(&tests.p_values) {
                assert_relative_eq!(z.get(1, 2).unwrap(), 0.0, epsilon = 1e-9);
                assert_relative_eq!(p.get(1, 2).unwrap(), 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_scalar_statistic_closed_form() {
        // two scalar images a, b: Z = -2L { ln a + ln b + 2 ln 2 - 2 ln(a + b) }
        let series = constant_series(BandLayout::Scalar, &[1.0, 4.0]);
        let tests = pairwise_tests(&series, 1, 5.0, ProcessingMode::Sequential).unwrap();
        let expected = -2.0 * 5.0 * (0.0 + 4.0f64.ln() + 2.0 * 2.0f64.ln() - 2.0 * 5.0f64.ln());
        assert_relative_eq!(tests.statistics[0].get(0, 0).unwrap(), expected, epsilon = 1e-10);
    }

    #[test]
    fn test_statistic_invariant_to_scaling() {
        let series = constant_series(BandLayout::DualFull, &[1.0, 1.5, 6.0]);
        let scaled = Series::new(series.images().iter().map(|img| img.scaled(4.4)).collect()).unwrap();

        let a = pairwise_tests(&series, 1, 4.4, ProcessingMode::Sequential).unwrap();
        let b = pairwise_tests(&scaled, 1, 4.4, ProcessingMode::Parallel).unwrap();
        for (za, zb) in a.statistics.iter().zip(&b.statistics) {
            assert_relative_eq!(za.get(2, 3).unwrap(), zb.get(2, 3).unwrap(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_single_test_matches_batch() {
        let series = constant_series(BandLayout::QuadDiag, &[1.0, 1.2, 3.0, 2.9, 0.7]);
        let batch = pairwise_tests(&series, 2, 6.0, ProcessingMode::Sequential).unwrap();
        assert_eq!(batch.ell, 2);
        assert_eq!(batch.len(), 3);
        for j in 2..=4 {
            let single = pairwise_test(&series, 2, j, 6.0, ProcessingMode::Sequential).unwrap();
            assert_relative_eq!(
                single.statistic.get(0, 0).unwrap(),
                batch.statistics[j - 2].get(0, 0).unwrap(),
                epsilon = 1e-9
            );
            assert_relative_eq!(
                single.p_value.get(0, 0).unwrap(),
                batch.p_values[j - 2].get(0, 0).unwrap(),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_degenerate_pixel_is_nan() {
        let mut series_images = constant_series(BandLayout::DualDiag, &[1.0, 1.0, 1.0]).images().to_vec();
        series_images[1].set_pixel(0, 0, &[0.0, 1.0]);
        let series = Series::new(series_images).unwrap();

        let tests = pairwise_tests(&series, 1, 4.4, ProcessingMode::Sequential).unwrap();
        assert!(tests.statistics[0].get(0, 0).unwrap().is_nan());
        assert!(tests.p_values[0].get(0, 0).unwrap().is_nan());
        // sum of first three images is still positive definite, but X2 enters
        // only the j = 2 test
        assert!(tests.p_values[1].get(0, 0).unwrap().is_finite());
        // neighbours are unaffected
        assert_relative_eq!(tests.p_values[0].get(0, 1).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_indices() {
        let series = constant_series(BandLayout::Scalar, &[1.0, 2.0, 3.0]);
        assert!(pairwise_tests(&series, 0, 4.4, ProcessingMode::Sequential).is_err());
        assert!(pairwise_tests(&series, 3, 4.4, ProcessingMode::Sequential).is_err());
        assert!(pairwise_test(&series, 2, 3, 4.4, ProcessingMode::Sequential).is_err());
        assert!(pairwise_test(&series, 1, 1, 4.4, ProcessingMode::Sequential).is_err());
    }
}
