//! Band layouts of per-pixel polarimetric covariance matrices
//!
//! A pixel of a covariance image holds the independent real entries of a
//! Hermitian positive semi-definite `d×d` matrix. The layout fixes which band
//! holds which element and therefore the closed-form determinant.
//!
//! | layout | bands | matrix |
//! |---|---|---|
//! | `Scalar` | `C11` | 1×1 |
//! | `DualDiag` | `C11 C22` | 2×2 diagonal |
//! | `QuadDiag` | `C11 C22 C33` | 3×3 diagonal |
//! | `DualFull` | `C11 ReC12 ImC12 C22` | 2×2 |
//! | `QuadFull` | `C11 ReC12 ImC12 ReC13 ImC13 C22 ReC23 ImC23 C33` | 3×3 |

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Largest number of bands any layout uses
pub const MAX_BANDS: usize = 9;

/// Value returned by [`BandLayout::log_determinant`] for a matrix whose
/// determinant is not strictly positive and finite.
pub const LOG_DET_SENTINEL: f64 = -1.0e30;

/// Band layout of a covariance image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BandLayout {
    /// Single intensity channel
    Scalar,
    /// Dual-pol, diagonal only
    DualDiag,
    /// Quad-pol, diagonal only
    QuadDiag,
    /// Dual-pol, full complex covariance
    DualFull,
    /// Quad-pol, full complex covariance
    QuadFull,
}

/// Sign pattern of a Hermitian matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Definiteness {
    Positive,
    Negative,
    Indefinite,
}

impl BandLayout {
    /// Resolve the layout from a band count
    pub fn from_band_count(bands: usize) -> Result<Self> {
        match bands {
            1 => Ok(BandLayout::Scalar),
            2 => Ok(BandLayout::DualDiag),
            3 => Ok(BandLayout::QuadDiag),
            4 => Ok(BandLayout::DualFull),
            9 => Ok(BandLayout::QuadFull),
            other => Err(Error::UnsupportedBandCount(other)),
        }
    }

    /// Number of bands per pixel
    pub fn band_count(self) -> usize {
        match self {
            BandLayout::Scalar => 1,
            BandLayout::DualDiag => 2,
            BandLayout::QuadDiag => 3,
            BandLayout::DualFull => 4,
            BandLayout::QuadFull => 9,
        }
    }

    /// Matrix dimension `d`
    pub fn dimension(self) -> usize {
        match self {
            BandLayout::Scalar => 1,
            BandLayout::DualDiag | BandLayout::DualFull => 2,
            BandLayout::QuadDiag | BandLayout::QuadFull => 3,
        }
    }

    /// Whether only the diagonal of the matrix is stored.
    ///
    /// Diagonal layouts are treated as `d` independent scalar Wishart
    /// channels by the test statistics.
    pub fn is_diagonal(self) -> bool {
        matches!(self, BandLayout::DualDiag | BandLayout::QuadDiag)
    }

    /// Degrees of freedom of one pairwise test: the number of real parameters
    pub fn degrees_of_freedom(self) -> usize {
        self.band_count()
    }

    /// Conventional band names
    pub fn band_names(self) -> &'static [&'static str] {
        match self {
            BandLayout::Scalar => &["C11"],
            BandLayout::DualDiag => &["C11", "C22"],
            BandLayout::QuadDiag => &["C11", "C22", "C33"],
            BandLayout::DualFull => &["C11", "C12re", "C12im", "C22"],
            BandLayout::QuadFull => &[
                "C11", "C12re", "C12im", "C13re", "C13im", "C22", "C23re", "C23im", "C33",
            ],
        }
    }

    /// Determinant of one pixel's matrix
    pub fn determinant(self, m: &[f64]) -> f64 {
        debug_assert_eq!(m.len(), self.band_count());
        match self {
            BandLayout::Scalar => m[0],
            BandLayout::DualDiag => m[0] * m[1],
            BandLayout::QuadDiag => m[0] * m[1] * m[2],
            BandLayout::DualFull => m[0] * m[3] - m[1] * m[1] - m[2] * m[2],
            BandLayout::QuadFull => {
                let (c11, c22, c33) = (m[0], m[5], m[8]);
                let (ar, ai) = (m[1], m[2]);
                let (pr, pi) = (m[3], m[4]);
                let (br, bi) = (m[6], m[7]);
                // 2 Re(C12 C23 conj(C13))
                let cross = 2.0 * (ar * br * pr - ai * bi * pr + ai * br * pi + ar * bi * pi);
                c11 * c22 * c33 + cross
                    - c22 * (pr * pr + pi * pi)
                    - c11 * (br * br + bi * bi)
                    - c33 * (ar * ar + ai * ai)
            }
        }
    }

    /// Natural log of the determinant.
    ///
    /// Returns [`LOG_DET_SENTINEL`] instead of `-inf` or NaN when the
    /// determinant is not strictly positive and finite.
    pub fn log_determinant(self, m: &[f64]) -> f64 {
        let det = self.determinant(m);
        if det > 0.0 && det.is_finite() {
            det.ln()
        } else {
            LOG_DET_SENTINEL
        }
    }

    /// Whether a log-determinant came from a degenerate matrix
    pub fn is_degenerate_log_det(value: f64) -> bool {
        !value.is_finite() || value <= LOG_DET_SENTINEL
    }

    /// Leading principal minors, the first `dimension()` entries are valid
    pub fn leading_minors(self, m: &[f64]) -> [f64; 3] {
        debug_assert_eq!(m.len(), self.band_count());
        match self {
            BandLayout::Scalar => [m[0], 0.0, 0.0],
            BandLayout::DualDiag => [m[0], m[0] * m[1], 0.0],
            BandLayout::QuadDiag => [m[0], m[0] * m[1], m[0] * m[1] * m[2]],
            BandLayout::DualFull => [m[0], self.determinant(m), 0.0],
            BandLayout::QuadFull => [
                m[0],
                m[0] * m[5] - m[1] * m[1] - m[2] * m[2],
                self.determinant(m),
            ],
        }
    }

    /// Definiteness by Sylvester's criterion with strict inequalities.
    ///
    /// Positive: every leading minor > 0. Negative: minors alternate in sign
    /// starting below zero. A zero minor is always indefinite.
    pub fn definiteness(self, m: &[f64]) -> Definiteness {
        let minors = self.leading_minors(m);
        let minors = &minors[..self.dimension()];

        if minors.iter().all(|&v| v > 0.0) {
            return Definiteness::Positive;
        }
        let alternating = minors.iter().enumerate().all(|(i, &v)| {
            if i % 2 == 0 { v < 0.0 } else { v > 0.0 }
        });
        if alternating {
            Definiteness::Negative
        } else {
            Definiteness::Indefinite
        }
    }
}

impl std::fmt::Display for BandLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BandLayout::Scalar => "scalar",
            BandLayout::DualDiag => "dual-pol diagonal",
            BandLayout::QuadDiag => "quad-pol diagonal",
            BandLayout::DualFull => "dual-pol full",
            BandLayout::QuadFull => "quad-pol full",
        };
        write!(f, "{} ({} bands)", name, self.band_count())
    }
}
