//! Sequential omnibus change detection
//!
//! Drives the start index loop `ell = 1 .. k-1`: for every start index the
//! pairwise tests (and optionally the omnibus gate) are computed, smoothed
//! if requested, folded into the [`SequentialState`] and dropped. The
//! adaptive filter then runs once over the series with the final `bmap`.

use crate::sar::adaptive::adaptive_filter;
use crate::sar::chi_square::Bartlett;
use crate::sar::direction::direction_maps;
use crate::sar::maps::{ChangeDiagnostics, ChangeMapSet};
use crate::sar::omnibus::omnibus_test;
use crate::sar::pairwise::pairwise_tests;
use crate::sar::sequential::{degenerate_mask, SequentialState};
use crate::statistics::focal_median;
use polsar_core::raster::Neighborhood;
use polsar_core::{Algorithm, BandLayout, Error, Raster, Result, Series};
use polsar_parallel::ProcessingMode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Parameters for sequential omnibus change detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OmnibusParams {
    /// Significance level, in (0, 1)
    pub significance: f64,
    /// Equivalent number of looks
    pub enl: f64,
    /// Median-smooth every p-value raster before thresholding
    pub median_smoothing: bool,
    /// Window of the median filter
    pub median_window: Neighborhood,
    /// Require the omnibus p-value to be significant as well
    pub use_omnibus_gate: bool,
    /// Classify directions from consecutive images before filtering instead
    /// of against the running mean
    pub directional_prepass: bool,
    /// Row scheduling
    pub mode: ProcessingMode,
}

impl Default for OmnibusParams {
    fn default() -> Self {
        Self {
            significance: 0.0001,
            enl: 4.4,
            median_smoothing: false,
            median_window: Neighborhood::Queen3x3,
            use_omnibus_gate: false,
            directional_prepass: false,
            mode: ProcessingMode::Parallel,
        }
    }
}

impl OmnibusParams {
    /// Check the numeric parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.significance > 0.0 && self.significance < 1.0) {
            return Err(Error::InvalidParameter {
                name: "significance",
                value: self.significance.to_string(),
                reason: "must be in (0, 1)".into(),
            });
        }
        if !(self.enl.is_finite() && self.enl > 0.0) {
            return Err(Error::InvalidParameter {
                name: "enl",
                value: self.enl.to_string(),
                reason: "must be positive and finite".into(),
            });
        }
        if self.median_smoothing && self.median_window.radius() == 0 {
            return Err(Error::InvalidParameter {
                name: "median_window",
                value: format!("{:?}", self.median_window),
                reason: "window radius must be > 0".into(),
            });
        }
        Ok(())
    }

    /// [`validate`](Self::validate), then check that the number of looks
    /// leaves every test of `layout` with a positive Bartlett factor.
    ///
    /// The two-image tests have the smallest factor, so they decide.
    pub fn validate_for(&self, layout: BandLayout) -> Result<()> {
        self.validate()?;
        let rho = Bartlett::pairwise(layout, 2, self.enl).rho;
        if rho <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "enl",
                value: self.enl.to_string(),
                reason: format!("too few looks for a {} series (rho = {:.3})", layout, rho),
            });
        }
        Ok(())
    }
}

fn smooth(raster: Raster<f64>, params: &OmnibusParams) -> Result<Raster<f64>> {
    if params.median_smoothing {
        focal_median(&raster, params.median_window, params.mode)
    } else {
        Ok(raster)
    }
}

/// Detect changes in a series of ENL-scaled covariance images.
///
/// # Arguments
/// * `series` - Images in acquisition order
/// * `params` - Detection parameters
///
/// # Returns
/// The change maps, the ATSF image and run diagnostics. A pixel with a
/// non-positive determinant in any image is excluded from testing for the
/// whole run and reports no change; such pixels are counted in
/// [`ChangeDiagnostics::degenerate_pixels`].
pub fn sequential_omnibus(series: &Series, params: &OmnibusParams) -> Result<ChangeMapSet> {
    let k = series.len();
    let layout = series.layout();
    params.validate_for(layout)?;

    let (rows, cols) = series.shape();
    info!(images = k, layout = %layout, rows, cols, "sequential omnibus change detection");

    let directions = if params.directional_prepass {
        debug!("classifying consecutive pairs");
        Some(direction_maps(series, params.mode)?)
    } else {
        None
    };

    let mut state = SequentialState::new(k, rows, cols);
    let excluded = state.exclude(&degenerate_mask(series, params.mode))?;
    if excluded > 0 {
        debug!(excluded, "pixels with degenerate matrices");
    }
    for ell in 1..k {
        let tests = pairwise_tests(series, ell, params.enl, params.mode)?;

        let gate = if params.use_omnibus_gate {
            let omnibus = omnibus_test(&tests, layout, params.enl, params.mode)?;
            Some(smooth(omnibus.p_value, params)?)
        } else {
            None
        };

        let p_values = tests
            .p_values
            .into_iter()
            .map(|p| smooth(p, params))
            .collect::<Result<Vec<_>>>()?;

        state.apply(
            ell,
            &p_values,
            gate.as_ref(),
            params.significance,
            directions.as_deref(),
            params.mode,
        )?;
    }

    let template = &series.images()[0].bands()[0];
    let maps = state.into_maps(template)?;
    let adaptive = adaptive_filter(series, &maps.bmap, !params.directional_prepass, params.mode)?;

    let changed_pixels = maps.fmap.data().iter().filter(|&&f| f > 0).count();
    let total_changes = maps.fmap.data().iter().map(|&f| u64::from(f)).sum();
    let diagnostics = ChangeDiagnostics {
        degenerate_pixels: maps.degenerate_pixels,
        changed_pixels,
        total_changes,
        tests_evaluated: maps.tests_evaluated,
    };

    if diagnostics.degenerate_pixels > 0 {
        warn!(
            pixels = diagnostics.degenerate_pixels,
            "pixels with non-positive determinants were excluded from testing"
        );
    }
    info!(changed_pixels, total_changes, "change detection finished");

    Ok(ChangeMapSet {
        cmap: maps.cmap,
        smap: maps.smap,
        fmap: maps.fmap,
        bmap: adaptive.bmap,
        avimg: adaptive.avimg,
        avimglog: adaptive.avimglog,
        labels: series.labels().to_vec(),
        diagnostics,
    })
}

/// Sequential omnibus change detection as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct SequentialOmnibus;

impl Algorithm for SequentialOmnibus {
    type Input = Series;
    type Output = ChangeMapSet;
    type Params = OmnibusParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "SequentialOmnibus"
    }

    fn description(&self) -> &'static str {
        "Sequential omnibus Wishart change detection with adaptive temporal speckle filtering"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        sequential_omnibus(&input, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polsar_core::{BandLayout, CovarianceImage};

    #[test]
    fn test_default_params() {
        let params = OmnibusParams::default();
        assert_eq!(params.significance, 0.0001);
        assert_eq!(params.enl, 4.4);
        assert!(!params.median_smoothing && !params.use_omnibus_gate && !params.directional_prepass);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        for significance in [0.0, 1.0, -0.1, f64::NAN] {
            let params = OmnibusParams { significance, ..Default::default() };
            assert!(matches!(params.validate(), Err(Error::InvalidParameter { name: "significance", .. })));
        }
        for enl in [0.0, -4.4, f64::INFINITY, f64::NAN] {
            let params = OmnibusParams { enl, ..Default::default() };
            assert!(matches!(params.validate(), Err(Error::InvalidParameter { name: "enl", .. })));
        }
        let params = OmnibusParams {
            median_smoothing: true,
            median_window: Neighborhood::Square(0),
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(Error::InvalidParameter { name: "median_window", .. })));
    }

    #[test]
    fn test_validate_for_rejects_too_few_looks() {
        // full 3x3 needs more than 25.5 / 18 looks, diagonal more than 0.25
        let params = OmnibusParams { enl: 1.0, ..Default::default() };
        assert!(matches!(
            params.validate_for(BandLayout::QuadFull),
            Err(Error::InvalidParameter { name: "enl", .. })
        ));
        assert!(params.validate_for(BandLayout::DualFull).is_ok());
        assert!(params.validate_for(BandLayout::QuadDiag).is_ok());

        let params = OmnibusParams { enl: 0.25, ..Default::default() };
        assert!(params.validate_for(BandLayout::Scalar).is_err());
        let params = OmnibusParams { enl: 1.5, ..Default::default() };
        assert!(params.validate_for(BandLayout::QuadFull).is_ok());
    }

    #[test]
    fn test_algorithm_trait() {
        let img = |v: f64| CovarianceImage::filled(BandLayout::Scalar, 3, 3, v);
        let series = Series::new(vec![img(1.0), img(1.0), img(1.0)]).unwrap();
        let algo = SequentialOmnibus;
        assert_eq!(algo.name(), "SequentialOmnibus");
        let maps = algo.execute_default(series).unwrap();
        assert_eq!(maps.diagnostics().changed_pixels, 0);
        assert_eq!(maps.bmap().len(), 2);
        assert_eq!(maps.avimglog().get(1, 1).unwrap(), 3);
        maps.check_invariants().unwrap();
    }
}
