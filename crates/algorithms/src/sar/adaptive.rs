//! Adaptive temporal speckle filter (ATSF)
//!
//! A running mean over the series that restarts from the current image
//! wherever a change was recorded, so averaging never mixes pre- and
//! post-change observations. The number of images in the current average is
//! kept per pixel (`avimglog`); pixels with a short history can later be
//! replaced by a spatially filtered image ([`hybrid_filter`]).

use crate::sar::direction::{classify, ChangeDirection};
use polsar_core::polsar::MAX_BANDS;
use polsar_core::{BandLayout, CovarianceImage, Error, Raster, Result, Series};
use polsar_parallel::{ParallelStrategy, ProcessingMode};
use serde::{Deserialize, Serialize};

/// Running mean of one pixel
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveState {
    avg: [f64; MAX_BANDS],
    count: u16,
}

impl AdaptiveState {
    /// Start from the first image of the series
    pub fn new(first: &[f64]) -> Self {
        let mut avg = [0.0; MAX_BANDS];
        avg[..first.len()].copy_from_slice(first);
        Self { avg, count: 1 }
    }

    /// Advance by one image.
    ///
    /// With `changed` the direction of `next - avg` is returned when
    /// `classify_change` is set, and the average restarts at `next`.
    pub fn step(
        &mut self,
        layout: BandLayout,
        next: &[f64],
        changed: bool,
        classify_change: bool,
    ) -> ChangeDirection {
        let b = layout.band_count();
        let direction = if changed && classify_change {
            let mut diff = [0.0; MAX_BANDS];
            for ((d, &x), &a) in diff[..b].iter_mut().zip(next).zip(&self.avg[..b]) {
                *d = x - a;
            }
            classify(layout, &diff[..b])
        } else {
            ChangeDirection::None
        };

        self.count = self.count.saturating_add(1);
        let n = f64::from(self.count);
        for (a, &x) in self.avg[..b].iter_mut().zip(next) {
            *a += (x - *a) / n;
        }

        if changed {
            self.avg[..b].copy_from_slice(&next[..b]);
            self.count = 1;
        }
        direction
    }

    pub fn mean(&self, bands: usize) -> &[f64] {
        &self.avg[..bands]
    }

    /// Images in the current average
    pub fn count(&self) -> u16 {
        self.count
    }
}

/// Output of [`adaptive_filter`]
#[derive(Debug, Clone)]
pub struct AdaptiveOutput {
    /// Filtered image, same layout as the series
    pub avimg: CovarianceImage,
    /// Images in the final average per pixel
    pub avimglog: Raster<u16>,
    /// Interval bands, with directions filled in when reclassified
    pub bmap: Vec<Raster<u8>>,
}

/// Run the ATSF over a series given the interval change bands.
///
/// With `reclassify` every nonzero `bmap` entry is replaced by the direction
/// of `X(t+1) - avg`; otherwise `bmap` is passed through unchanged.
pub fn adaptive_filter(
    series: &Series,
    bmap: &[Raster<u8>],
    reclassify: bool,
    mode: ProcessingMode,
) -> Result<AdaptiveOutput> {
    let intervals = series.len() - 1;
    if bmap.len() != intervals {
        return Err(Error::Algorithm(format!(
            "{} interval bands for a series of {} images",
            bmap.len(),
            series.len()
        )));
    }
    let template = &series.images()[0].bands()[0];
    for band in bmap {
        template.check_same_shape(band)?;
    }

    let layout = series.layout();
    let b = layout.band_count();
    let (rows, cols) = series.shape();
    let images = series.images();

    struct RowOutput {
        means: Vec<f64>,
        counts: Vec<u16>,
        codes: Vec<u8>,
    }

    let row_results: Vec<RowOutput> = mode.par_map(0..rows, |row| {
        let mut out = RowOutput {
            means: vec![0.0; b * cols],
            counts: vec![0; cols],
            codes: vec![0; intervals * cols],
        };
        let mut x = [0.0; MAX_BANDS];

        for col in 0..cols {
            images[0].pixel(row, col, &mut x);
            let mut state = AdaptiveState::new(&x[..b]);

            for t in 0..intervals {
                images[t + 1].pixel(row, col, &mut x);
                let code = bmap[t].data()[(row, col)];
                let direction = state.step(layout, &x[..b], code != 0, reclassify);
                out.codes[t * cols + col] = if reclassify && code != 0 { direction.code() } else { code };
            }

            for (band, &v) in state.mean(b).iter().enumerate() {
                out.means[band * cols + col] = v;
            }
            out.counts[col] = state.count();
        }
        out
    });

    let mut bands = Vec::with_capacity(b);
    for band in 0..b {
        let data = row_results
            .iter()
            .flat_map(|r| r.means[band * cols..(band + 1) * cols].iter().copied())
            .collect();
        bands.push(template.with_data(data)?);
    }
    let bmap = (0..intervals)
        .map(|t| {
            let data = row_results
                .iter()
                .flat_map(|r| r.codes[t * cols..(t + 1) * cols].iter().copied())
                .collect();
            template.with_data(data)
        })
        .collect::<Result<Vec<_>>>()?;
    let counts = row_results.into_iter().flat_map(|r| r.counts).collect();

    tracing::debug!(intervals, reclassify, "adaptive filter finished");
    Ok(AdaptiveOutput {
        avimg: CovarianceImage::new(bands)?,
        avimglog: template.with_data(counts)?,
        bmap,
    })
}

/// Threshold on `avimglog` below which [`hybrid_filter`] falls back to the
/// spatially filtered image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HybridThreshold {
    /// Fixed number of images
    Fixed(u16),
    /// Fraction of the largest `avimglog` value
    FractionOfMax(f64),
    /// Fraction of the series length
    FractionOfSeries { fraction: f64, series_len: usize },
}

impl Default for HybridThreshold {
    fn default() -> Self {
        HybridThreshold::FractionOfMax(0.25)
    }
}

impl HybridThreshold {
    /// Resolve to a count threshold for a given `avimglog`
    pub fn resolve(&self, avimglog: &Raster<u16>) -> Result<f64> {
        let fraction_ok = |f: f64| f.is_finite() && f > 0.0;
        match *self {
            HybridThreshold::Fixed(n) => Ok(f64::from(n)),
            HybridThreshold::FractionOfMax(f) if fraction_ok(f) => {
                let max = avimglog.data().iter().copied().max().unwrap_or(0);
                Ok(f64::from(max) * f)
            }
            HybridThreshold::FractionOfSeries { fraction, series_len } if fraction_ok(fraction) => {
                Ok(series_len as f64 * fraction)
            }
            HybridThreshold::FractionOfMax(f) | HybridThreshold::FractionOfSeries { fraction: f, .. } => {
                Err(Error::InvalidParameter {
                    name: "threshold",
                    value: f.to_string(),
                    reason: "fraction must be positive and finite".into(),
                })
            }
        }
    }
}

/// Replace the ATSF image by `fallback` wherever `avimglog < threshold`.
pub fn hybrid_filter(
    atsf: &CovarianceImage,
    fallback: &CovarianceImage,
    avimglog: &Raster<u16>,
    threshold: HybridThreshold,
) -> Result<CovarianceImage> {
    if atsf.layout() != fallback.layout() {
        return Err(Error::LayoutMismatch {
            index: 1,
            expected: atsf.layout().band_count(),
            actual: fallback.layout().band_count(),
        });
    }
    atsf.bands()[0].check_same_shape(&fallback.bands()[0])?;
    atsf.bands()[0].check_same_shape(avimglog)?;

    let limit = threshold.resolve(avimglog)?;
    let replace = avimglog.data().mapv(|n| f64::from(n) < limit);

    let bands = atsf
        .bands()
        .iter()
        .zip(fallback.bands())
        .map(|(a, f)| {
            let mut out = a.clone();
            ndarray::Zip::from(out.data_mut())
                .and(f.data())
                .and(&replace)
                .for_each(|o, &fv, &r| {
                    if r {
                        *o = fv;
                    }
                });
            out
        })
        .collect();

    let replaced = replace.iter().filter(|&&r| r).count();
    tracing::info!(threshold = limit, replaced, "hybrid ATSF");
    CovarianceImage::new(bands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_running_mean_resets_at_change() {
        let layout = BandLayout::Scalar;
        let mut state = AdaptiveState::new(&[1.0]);
        state.step(layout, &[3.0], false, true);
        assert_relative_eq!(state.mean(1)[0], 2.0);
        assert_eq!(state.count(), 2);

        let direction = state.step(layout, &[10.0], true, true);
        assert_eq!(direction, ChangeDirection::Increase);
        assert_relative_eq!(state.mean(1)[0], 10.0);
        assert_eq!(state.count(), 1);

        state.step(layout, &[12.0], false, true);
        assert_relative_eq!(state.mean(1)[0], 11.0);
        assert_eq!(state.count(), 2);
    }

    #[test]
    fn test_adaptive_filter_passes_codes_without_reclassify() {
        let img = |v: f64| CovarianceImage::filled(BandLayout::DualDiag, 2, 2, v);
        let series = Series::new(vec![img(1.0), img(5.0), img(0.5)]).unwrap();
        let bmap = vec![Raster::filled(2, 2, 3u8), Raster::filled(2, 2, 0u8)];

        let out = adaptive_filter(&series, &bmap, false, ProcessingMode::Sequential).unwrap();
        assert_eq!(out.bmap[0].get(0, 0).unwrap(), 3);
        assert_relative_eq!(out.avimg.band(1).unwrap().get(1, 1).unwrap(), 2.75);
        assert_eq!(out.avimglog.get(1, 1).unwrap(), 2);

        let out = adaptive_filter(&series, &bmap, true, ProcessingMode::Sequential).unwrap();
        assert_eq!(out.bmap[0].get(0, 0).unwrap(), 1);
    }

    #[test]
    fn test_hybrid_threshold_resolve() {
        let log = Raster::from_vec(vec![1u16, 2, 8, 4], 2, 2).unwrap();
        assert_relative_eq!(HybridThreshold::default().resolve(&log).unwrap(), 2.0);
        assert_relative_eq!(HybridThreshold::Fixed(3).resolve(&log).unwrap(), 3.0);
        let third = HybridThreshold::FractionOfSeries { fraction: 1.0 / 3.0, series_len: 9 };
        assert_relative_eq!(third.resolve(&log).unwrap(), 3.0, epsilon = 1e-12);
        assert!(HybridThreshold::FractionOfMax(-1.0).resolve(&log).is_err());
    }

    #[test]
    fn test_hybrid_filter_replaces_short_histories() {
        let atsf = CovarianceImage::filled(BandLayout::DualDiag, 2, 2, 1.0);
        let lee = CovarianceImage::filled(BandLayout::DualDiag, 2, 2, 7.0);
        let log = Raster::from_vec(vec![1u16, 2, 8, 4], 2, 2).unwrap();

        let out = hybrid_filter(&atsf, &lee, &log, HybridThreshold::default()).unwrap();
        let c11 = out.band(0).unwrap();
        // threshold 8 / 4 = 2: only the pixel with 1 image is replaced
        assert_relative_eq!(c11.get(0, 0).unwrap(), 7.0);
        assert_relative_eq!(c11.get(0, 1).unwrap(), 1.0);
        assert_relative_eq!(c11.get(1, 0).unwrap(), 1.0);

        let quad = CovarianceImage::filled(BandLayout::QuadDiag, 2, 2, 7.0);
        assert!(hybrid_filter(&atsf, &quad, &log, HybridThreshold::default()).is_err());
    }
}
