//! Maximum-likelihood estimation of the equivalent number of looks
//!
//! For `L`-look sample covariance matrices of dimension `p` over a
//! homogeneous window, the ML estimate of `L` solves
//!
//! ```text
//! <ln det C> - ln det <C> + p ln L - ψ(L) - ψ(L-1) - ... - ψ(L-p+1) = 0
//! ```
//!
//! where `<·>` is the window mean and `ψ` the digamma function. Diagonal
//! layouts are estimated from their first band alone (`p = 1`). Every pixel
//! gets its own estimate and the scene ENL is the mode of their histogram.
//! The estimate does not depend on a constant scaling of the image.

use polsar_core::polsar::MAX_BANDS;
use polsar_core::raster::{Neighborhood, Raster};
use polsar_core::{BandLayout, CovarianceImage, Error, Result};
use polsar_parallel::{ParallelStrategy, ProcessingMode};
use serde::{Deserialize, Serialize};
use statrs::function::gamma::digamma;
use tracing::info;

/// Width of one histogram bin, in looks
pub const ENL_BIN_WIDTH: f64 = 0.1;

/// Parameters for ENL estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnlParams {
    /// Window over which the matrix and log-determinant means are taken
    pub window: Neighborhood,
    /// Largest estimate, also the upper end of the histogram
    pub max_enl: f64,
    /// Row scheduling
    pub mode: ProcessingMode,
}

impl Default for EnlParams {
    fn default() -> Self {
        Self {
            window: Neighborhood::Square(3),
            max_enl: 50.0,
            mode: ProcessingMode::Parallel,
        }
    }
}

impl EnlParams {
    pub fn validate(&self) -> Result<()> {
        if self.window.radius() == 0 {
            return Err(Error::InvalidParameter {
                name: "window",
                value: format!("{:?}", self.window),
                reason: "window radius must be > 0".into(),
            });
        }
        if !(self.max_enl.is_finite() && self.max_enl > 1.0) {
            return Err(Error::InvalidParameter {
                name: "max_enl",
                value: self.max_enl.to_string(),
                reason: "must be finite and > 1".into(),
            });
        }
        Ok(())
    }
}

/// Scene-level ENL estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnlEstimate {
    /// Centre of the most populated bin, `None` if no pixel has an estimate
    pub enl: Option<f64>,
    /// Per-pixel estimates counted in bins of [`ENL_BIN_WIDTH`] starting at 0
    pub histogram: Vec<u64>,
    /// Pixels that have an estimate
    pub estimated_pixels: usize,
}

/// `p ln L - Σ_{i<p} ψ(L - i)`, positive and decreasing in `L > p - 1`
pub fn look_term(p: usize, enl: f64) -> f64 {
    p as f64 * enl.ln() - (0..p).map(|i| digamma(enl - i as f64)).sum::<f64>()
}

/// Solve `look_term(p, L) + gap = 0` for `L` in `(p - 1, max_enl]`.
///
/// `gap = <ln det C> - ln det <C>` is never positive. Returns `None` when
/// the root lies beyond `max_enl`, which includes a window without speckle.
pub fn solve_enl(p: usize, gap: f64, max_enl: f64) -> Option<f64> {
    let mut lo = p.saturating_sub(1) as f64;
    let mut hi = max_enl;
    if !gap.is_finite() || gap >= 0.0 || hi <= lo {
        return None;
    }
    let f = |enl: f64| look_term(p, enl) + gap;
    if f(hi) > 0.0 {
        return None;
    }
    // f(lo+) = +inf
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if f(mid) > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-10 {
            break;
        }
    }
    Some(0.5 * (lo + hi))
}

/// Per-pixel ML estimate of the ENL.
///
/// Window cells with a non-positive determinant are skipped. Pixels that are
/// degenerate themselves, see fewer than two usable cells, or whose estimate
/// exceeds `max_enl` are NaN.
pub fn enl_map(image: &CovarianceImage, params: &EnlParams) -> Result<Raster<f64>> {
    params.validate()?;

    let layout = if image.layout().is_diagonal() {
        BandLayout::Scalar
    } else {
        image.layout()
    };
    let b = layout.band_count();
    let p = layout.dimension();
    let bands = &image.bands()[..b];
    let (rows, cols) = image.shape();
    let offsets = params.window.offsets();

    let determinant = |row: usize, col: usize, m: &mut [f64; MAX_BANDS]| -> f64 {
        for (slot, band) in m.iter_mut().zip(bands) {
            *slot = band.data()[(row, col)];
        }
        layout.determinant(&m[..b])
    };
    let usable = |det: f64| det > 0.0 && det.is_finite();

    let output_rows: Vec<Vec<f64>> = params.mode.par_map(0..rows, |row| {
        let mut row_data = vec![f64::NAN; cols];
        let mut m = [0.0; MAX_BANDS];

        for (col, out) in row_data.iter_mut().enumerate() {
            if !usable(determinant(row, col, &mut m)) {
                continue;
            }

            let mut mean = [0.0; MAX_BANDS];
            let mut sum_ln_det = 0.0;
            let mut n = 0usize;
            for &(dr, dc) in &offsets {
                let nr = row as isize + dr;
                let nc = col as isize + dc;
                if nr < 0 || nc < 0 || nr as usize >= rows || nc as usize >= cols {
                    continue;
                }
                let det = determinant(nr as usize, nc as usize, &mut m);
                if !usable(det) {
                    continue;
                }
                for (acc, &v) in mean.iter_mut().zip(&m[..b]) {
                    *acc += v;
                }
                sum_ln_det += det.ln();
                n += 1;
            }
            if n < 2 {
                continue;
            }

            for v in &mut mean[..b] {
                *v /= n as f64;
            }
            let det_of_mean = layout.determinant(&mean[..b]);
            if !usable(det_of_mean) {
                continue;
            }
            let gap = sum_ln_det / n as f64 - det_of_mean.ln();
            if let Some(enl) = solve_enl(p, gap, params.max_enl) {
                *out = enl;
            }
        }

        row_data
    });

    let mut output = bands[0].with_data(output_rows.concat())?;
    output.set_nodata(Some(f64::NAN));
    Ok(output)
}

/// Histogram of the per-pixel estimates and its mode
pub fn estimate_enl(image: &CovarianceImage, params: &EnlParams) -> Result<EnlEstimate> {
    let map = enl_map(image, params)?;

    let bins = (params.max_enl / ENL_BIN_WIDTH).ceil() as usize;
    let mut histogram = vec![0u64; bins];
    let mut estimated_pixels = 0;
    for &enl in map.data().iter().filter(|v| v.is_finite()) {
        let bin = ((enl / ENL_BIN_WIDTH) as usize).min(bins - 1);
        histogram[bin] += 1;
        estimated_pixels += 1;
    }

    let enl = histogram
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count > 0)
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
        .map(|(bin, _)| (bin as f64 + 0.5) * ENL_BIN_WIDTH);

    info!(?enl, estimated_pixels, layout = %image.layout(), "ENL estimate");
    Ok(EnlEstimate {
        enl,
        histogram,
        estimated_pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params() -> EnlParams {
        EnlParams {
            mode: ProcessingMode::Sequential,
            ..Default::default()
        }
    }

    #[test]
    fn test_look_term_recurrence() {
        for l in [2.5f64, 4.4, 12.0] {
            let dual: f64 = 2.0 * l.ln() - 2.0 * digamma(l - 1.0) - 1.0 / (l - 1.0);
            assert_relative_eq!(look_term(2, l), dual, epsilon = 1e-10);
            let quad: f64 = 3.0 * l.ln() - 3.0 * digamma(l - 2.0) - 2.0 / (l - 2.0) - 1.0 / (l - 1.0);
            assert_relative_eq!(look_term(3, l), quad, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_look_term_positive_and_decreasing() {
        for p in 1..=3 {
            let values: Vec<f64> = (1..200).map(|i| look_term(p, (p - 1) as f64 + 0.25 * i as f64)).collect();
            assert!(values.iter().all(|&v| v > 0.0));
            assert!(values.windows(2).all(|w| w[1] < w[0]));
        }
    }

    #[test]
    fn test_solve_inverts_look_term() {
        for (p, l) in [(1, 4.4), (2, 7.3), (3, 12.0), (3, 2.2)] {
            let solved = solve_enl(p, -look_term(p, l), 50.0).unwrap();
            assert_relative_eq!(solved, l, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_solve_out_of_range() {
        assert_eq!(solve_enl(1, 0.0, 50.0), None);
        assert_eq!(solve_enl(1, 1e-3, 50.0), None);
        assert_eq!(solve_enl(1, f64::NAN, 50.0), None);
        assert_eq!(solve_enl(1, -look_term(1, 80.0), 50.0), None);
        assert_eq!(solve_enl(3, -0.5, 1.5), None);
    }

    #[test]
    fn test_window_moments() {
        // checkerboard of 1 and 4: the full window at (1, 1) holds five 1s and four 4s
        let values: Vec<f64> = (0..9).map(|i| if (i / 3 + i % 3) % 2 == 0 { 1.0 } else { 4.0 }).collect();
        let image = CovarianceImage::from_interleaved(BandLayout::Scalar, 3, 3, &values).unwrap();
        let params = EnlParams {
            window: Neighborhood::Queen3x3,
            ..params()
        };
        let map = enl_map(&image, &params).unwrap();

        let gap = 4.0 * 4f64.ln() / 9.0 - (21.0f64 / 9.0).ln();
        let expected = solve_enl(1, gap, 50.0).unwrap();
        assert_relative_eq!(map.get(1, 1).unwrap(), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_diagonal_uses_first_band() {
        let values: Vec<f64> = (0..9)
            .flat_map(|i| [if (i / 3 + i % 3) % 2 == 0 { 1.0 } else { 4.0 }, 7.0])
            .collect();
        let dual = CovarianceImage::from_interleaved(BandLayout::DualDiag, 3, 3, &values).unwrap();
        let c11: Vec<f64> = values.iter().step_by(2).copied().collect();
        let scalar = CovarianceImage::from_interleaved(BandLayout::Scalar, 3, 3, &c11).unwrap();
        let params = EnlParams {
            window: Neighborhood::Queen3x3,
            ..params()
        };
        let a = enl_map(&dual, &params).unwrap();
        let b = enl_map(&scalar, &params).unwrap();
        assert_relative_eq!(a.get(1, 1).unwrap(), b.get(1, 1).unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn test_constant_image_has_no_estimate() {
        let image = CovarianceImage::filled(BandLayout::DualFull, 8, 8, 1.0);
        // det = 1 - 1 - 1 < 0 for an all-ones matrix
        let estimate = estimate_enl(&image, &params()).unwrap();
        assert_eq!(estimate.estimated_pixels, 0);
        assert_eq!(estimate.enl, None);
        assert_eq!(estimate.histogram.len(), 500);

        let image = CovarianceImage::filled(BandLayout::QuadDiag, 8, 8, 3.0);
        let estimate = estimate_enl(&image, &params()).unwrap();
        assert_eq!(estimate.enl, None);
    }

    #[test]
    fn test_validate() {
        assert!(params().validate().is_ok());
        let bad = EnlParams {
            window: Neighborhood::Square(0),
            ..params()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidParameter { name: "window", .. })));
        let bad = EnlParams {
            max_enl: 1.0,
            ..params()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidParameter { name: "max_enl", .. })));
    }
}
