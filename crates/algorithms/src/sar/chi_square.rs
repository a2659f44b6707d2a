//! Bartlett-corrected chi-square approximations for Wishart likelihood-ratio tests
//!
//! A statistic `-2 ln Q` is approximately distributed as
//!
//! ```text
//! P(ρ(-2 ln Q) <= z) ≈ (1 - ω²) F(z; f) + ω² F(z; f + 4)
//! ```
//!
//! where `F(·; f)` is the chi-square CDF with `f` degrees of freedom and
//! `ρ`, `ω²` depend on the matrix dimension, the number of looks and the
//! number of images in the test.

use polsar_core::{BandLayout, Error, Result};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Finite-sample correction factors `ρ` and `ω²`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bartlett {
    pub rho: f64,
    pub omega2: f64,
}

impl Bartlett {
    /// Correction for the pairwise test of image `j` (`j >= 2`) against the
    /// `j - 1` images before it.
    ///
    /// Diagonal layouts treat every channel as an independent scalar Wishart
    /// variable, so only the scalar terms remain.
    pub fn pairwise(layout: BandLayout, j: usize, enl: f64) -> Self {
        debug_assert!(j >= 2);
        let j = j as f64;
        let f = layout.degrees_of_freedom() as f64;
        let pair = 1.0 + 1.0 / (j * (j - 1.0));

        if layout.is_diagonal() {
            let rho = 1.0 - pair / (6.0 * enl);
            let omega2 = -(f / 4.0) * (1.0 - 1.0 / rho).powi(2);
            return Self { rho, omega2 };
        }

        let p = layout.dimension() as f64;
        let p2 = p * p;
        let rho = 1.0 - (2.0 * p2 - 1.0) * pair / (6.0 * p * enl);
        let omega2 = -(p2 / 4.0) * (1.0 - 1.0 / rho).powi(2)
            + p2 * (p2 - 1.0) * (1.0 + (2.0 * j - 1.0) / (j * j * (j - 1.0) * (j - 1.0)))
                / (24.0 * enl * enl * rho * rho);
        Self { rho, omega2 }
    }

    /// Correction for the omnibus test over `m` images (`m >= 2`)
    pub fn omnibus(layout: BandLayout, m: usize, enl: f64) -> Self {
        debug_assert!(m >= 2);
        let m = m as f64;
        let f = layout.degrees_of_freedom() as f64;

        if layout.is_diagonal() {
            let rho = 1.0 - (m - 1.0 / m) / (6.0 * (m - 1.0) * enl);
            let omega2 = -f * (m - 1.0) * (1.0 - 1.0 / rho).powi(2) / 4.0;
            return Self { rho, omega2 };
        }

        let p = layout.dimension() as f64;
        let p2 = p * p;
        let rho = 1.0 - (2.0 * p2 - 1.0) * (m - 1.0 / m) / (6.0 * (m - 1.0) * p * enl);
        let omega2 = p2 * (p2 - 1.0) * (m - 1.0 / (m * m)) / (24.0 * enl * enl * rho * rho)
            - p2 * (m - 1.0) * (1.0 - 1.0 / rho).powi(2) / 4.0;
        Self { rho, omega2 }
    }
}

/// Two-component chi-square mixture for one test, built once and applied to
/// every pixel.
#[derive(Debug, Clone)]
pub struct MixedChiSquare {
    correction: Bartlett,
    low: ChiSquared,
    high: ChiSquared,
}

impl MixedChiSquare {
    pub fn new(dof: usize, correction: Bartlett) -> Result<Self> {
        let f = dof as f64;
        let low = ChiSquared::new(f).map_err(|e| Error::Algorithm(format!("chi-square({}): {}", f, e)))?;
        let high =
            ChiSquared::new(f + 4.0).map_err(|e| Error::Algorithm(format!("chi-square({}): {}", f + 4.0, e)))?;
        Ok(Self {
            correction,
            low,
            high,
        })
    }

    pub fn correction(&self) -> Bartlett {
        self.correction
    }

    /// P-value of a statistic, clamped to `[0, 1]`. Non-finite input gives NaN.
    pub fn p_value(&self, statistic: f64) -> f64 {
        if !statistic.is_finite() {
            return f64::NAN;
        }
        let Bartlett { rho, omega2 } = self.correction;
        let z = (rho * statistic).max(0.0);
        let cdf = (1.0 - omega2) * self.low.cdf(z) + omega2 * self.high.cdf(z);
        (1.0 - cdf).clamp(0.0, 1.0)
    }
}
