//! Multi-band covariance image

use crate::error::{Error, Result};
use crate::polsar::layout::{BandLayout, MAX_BANDS};
use crate::raster::{GeoTransform, Raster};

/// A covariance image: one `Raster<f64>` per band, all on the same grid.
///
/// Each pixel holds the real entries of a Hermitian covariance matrix in the
/// order given by [`BandLayout::band_names`]. Pointwise algebra (sum,
/// difference, scaling) acts on the bands independently.
#[derive(Debug, Clone)]
pub struct CovarianceImage {
    layout: BandLayout,
    bands: Vec<Raster<f64>>,
}

impl CovarianceImage {
    /// Build an image from its bands.
    ///
    /// The layout is inferred from the number of bands, and every band must
    /// share the shape of the first.
    pub fn new(bands: Vec<Raster<f64>>) -> Result<Self> {
        let layout = BandLayout::from_band_count(bands.len())?;
        let first = &bands[0];
        for band in &bands[1..] {
            first.check_same_shape(band)?;
        }
        Ok(Self { layout, bands })
    }

    /// Image of the given layout with every band set to `value`
    pub fn filled(layout: BandLayout, rows: usize, cols: usize, value: f64) -> Self {
        let bands = (0..layout.band_count())
            .map(|_| Raster::filled(rows, cols, value))
            .collect();
        Self { layout, bands }
    }

    /// Build an image from pixel-interleaved values (`rows * cols * bands`)
    pub fn from_interleaved(
        layout: BandLayout,
        rows: usize,
        cols: usize,
        values: &[f64],
    ) -> Result<Self> {
        let b = layout.band_count();
        if values.len() != rows * cols * b {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let mut image = Self::filled(layout, rows, cols, 0.0);
        for (idx, pixel) in values.chunks_exact(b).enumerate() {
            image.set_pixel(idx / cols, idx % cols, pixel);
        }
        Ok(image)
    }

    pub fn layout(&self) -> BandLayout {
        self.layout
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.bands[0].shape()
    }

    pub fn rows(&self) -> usize {
        self.bands[0].rows()
    }

    pub fn cols(&self) -> usize {
        self.bands[0].cols()
    }

    /// Affine transform shared by all bands
    pub fn transform(&self) -> &GeoTransform {
        self.bands[0].transform()
    }

    /// Set the transform on every band
    pub fn set_transform(&mut self, transform: GeoTransform) {
        for band in &mut self.bands {
            band.set_transform(transform);
        }
    }

    pub fn band(&self, index: usize) -> Option<&Raster<f64>> {
        self.bands.get(index)
    }

    pub fn bands(&self) -> &[Raster<f64>] {
        &self.bands
    }

    pub fn into_bands(self) -> Vec<Raster<f64>> {
        self.bands
    }

    /// Copy one pixel's matrix entries into `out`
    ///
    /// `out` must hold at least `layout().band_count()` values.
    #[inline]
    pub fn pixel(&self, row: usize, col: usize, out: &mut [f64]) {
        for (slot, band) in out.iter_mut().zip(&self.bands) {
            *slot = band.data()[(row, col)];
        }
    }

    /// Pixel values as a fixed-size buffer, only the first `band_count()` are used
    #[inline]
    pub fn pixel_array(&self, row: usize, col: usize) -> [f64; MAX_BANDS] {
        let mut buf = [0.0; MAX_BANDS];
        self.pixel(row, col, &mut buf);
        buf
    }

    /// Overwrite one pixel's matrix entries
    #[inline]
    pub fn set_pixel(&mut self, row: usize, col: usize, values: &[f64]) {
        for (band, &v) in self.bands.iter_mut().zip(values) {
            band.data_mut()[(row, col)] = v;
        }
    }

    /// Multiply every band by a constant
    pub fn scaled(&self, factor: f64) -> Self {
        let bands = self
            .bands
            .iter()
            .map(|band| {
                let mut out = band.clone();
                out.data_mut().mapv_inplace(|v| v * factor);
                out
            })
            .collect();
        Self {
            layout: self.layout,
            bands,
        }
    }

    fn check_compatible(&self, other: &CovarianceImage) -> Result<()> {
        if self.layout != other.layout {
            return Err(Error::LayoutMismatch {
                index: 0,
                expected: self.layout.band_count(),
                actual: other.layout.band_count(),
            });
        }
        self.bands[0].check_same_shape(&other.bands[0])
    }

    /// Pointwise sum of two images of the same layout
    pub fn add(&self, other: &CovarianceImage) -> Result<Self> {
        self.check_compatible(other)?;
        let bands = self
            .bands
            .iter()
            .zip(&other.bands)
            .map(|(a, b)| {
                let mut out = a.clone();
                *out.data_mut() += b.data();
                out
            })
            .collect();
        Ok(Self {
            layout: self.layout,
            bands,
        })
    }

    /// Add `other` into this image in place
    pub fn add_assign(&mut self, other: &CovarianceImage) -> Result<()> {
        self.check_compatible(other)?;
        for (a, b) in self.bands.iter_mut().zip(&other.bands) {
            *a.data_mut() += b.data();
        }
        Ok(())
    }

    /// Pointwise difference `self - other`
    pub fn subtract(&self, other: &CovarianceImage) -> Result<Self> {
        self.check_compatible(other)?;
        let bands = self
            .bands
            .iter()
            .zip(&other.bands)
            .map(|(a, b)| {
                let mut out = a.clone();
                *out.data_mut() -= b.data();
                out
            })
            .collect();
        Ok(Self {
            layout: self.layout,
            bands,
        })
    }

    /// Per-pixel determinant
    pub fn determinant(&self) -> Raster<f64> {
        self.map_pixels(|layout, m| layout.determinant(m))
    }

    /// Per-pixel log-determinant, with the degenerate sentinel where det <= 0
    pub fn log_determinant(&self) -> Raster<f64> {
        self.map_pixels(|layout, m| layout.log_determinant(m))
    }

    fn map_pixels<F>(&self, f: F) -> Raster<f64>
    where
        F: Fn(BandLayout, &[f64]) -> f64,
    {
        let (rows, cols) = self.shape();
        let b = self.layout.band_count();
        let mut out = self.bands[0].clone();
        out.set_nodata(None);
        let mut buf = [0.0; MAX_BANDS];
        for row in 0..rows {
            for col in 0..cols {
                self.pixel(row, col, &mut buf);
                out.data_mut()[(row, col)] = f(self.layout, &buf[..b]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_new_rejects_bad_bands() {
        let bands = vec![Raster::filled(2, 2, 1.0); 5];
        assert!(matches!(
            CovarianceImage::new(bands),
            Err(Error::UnsupportedBandCount(5))
        ));

        let bands = vec![Raster::filled(2, 2, 1.0), Raster::filled(2, 3, 1.0)];
        assert!(matches!(
            CovarianceImage::new(bands),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_from_interleaved() {
        let values = [1.0, 0.1, 0.2, 2.0, 3.0, 0.0, 0.0, 4.0];
        let img = CovarianceImage::from_interleaved(BandLayout::DualFull, 1, 2, &values).unwrap();
        assert_eq!(img.layout(), BandLayout::DualFull);

        let mut px = [0.0; 4];
        img.pixel(0, 1, &mut px);
        assert_eq!(px, [3.0, 0.0, 0.0, 4.0]);

        let det = img.determinant();
        assert_relative_eq!(det.get(0, 0).unwrap(), 2.0 - 0.01 - 0.04, epsilon = 1e-12);
        assert_relative_eq!(det.get(0, 1).unwrap(), 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pointwise_algebra() {
        let a = CovarianceImage::filled(BandLayout::QuadDiag, 3, 3, 2.0);
        let b = CovarianceImage::filled(BandLayout::QuadDiag, 3, 3, 0.5);

        let sum = a.add(&b).unwrap();
        assert_relative_eq!(sum.band(2).unwrap().get(1, 1).unwrap(), 2.5);

        let diff = a.subtract(&b).unwrap();
        assert_relative_eq!(diff.band(0).unwrap().get(0, 0).unwrap(), 1.5);

        let scaled = a.scaled(4.4);
        assert_relative_eq!(scaled.band(1).unwrap().get(2, 2).unwrap(), 8.8, epsilon = 1e-12);

        let other = CovarianceImage::filled(BandLayout::DualDiag, 3, 3, 1.0);
        assert!(matches!(a.add(&other), Err(Error::LayoutMismatch { .. })));
    }

    #[test]
    fn test_log_determinant_marks_degenerate() {
        let mut img = CovarianceImage::filled(BandLayout::DualDiag, 2, 2, 1.0);
        img.set_pixel(1, 1, &[0.0, 1.0]);
        let logdet = img.log_determinant();
        assert_relative_eq!(logdet.get(0, 0).unwrap(), 0.0);
        assert!(BandLayout::is_degenerate_log_det(logdet.get(1, 1).unwrap()));
    }
}
