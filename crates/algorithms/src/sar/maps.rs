//! Change map outputs

use polsar_core::polsar::interval_label;
use polsar_core::{CovarianceImage, Error, Raster, Result};
use serde::{Deserialize, Serialize};

/// Run summary of a change detection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDiagnostics {
    /// Pixels with at least one undefined test (non-positive determinant)
    pub degenerate_pixels: usize,
    /// Pixels with `fmap > 0`
    pub changed_pixels: usize,
    /// Sum of `fmap`
    pub total_changes: u64,
    /// Pairwise p-values compared against the significance level
    pub tests_evaluated: u64,
}

/// Borrowed output raster of one of the supported cell types
#[derive(Debug, Clone, Copy)]
pub enum OutputRaster<'a> {
    U8(&'a Raster<u8>),
    U16(&'a Raster<u16>),
    F64(&'a Raster<f64>),
}

/// All outputs of one run of the sequential omnibus detector
#[derive(Debug, Clone)]
pub struct ChangeMapSet {
    pub(crate) cmap: Raster<u16>,
    pub(crate) smap: Raster<u16>,
    pub(crate) fmap: Raster<u16>,
    pub(crate) bmap: Vec<Raster<u8>>,
    pub(crate) avimg: CovarianceImage,
    pub(crate) avimglog: Raster<u16>,
    pub(crate) labels: Vec<String>,
    pub(crate) diagnostics: ChangeDiagnostics,
}

impl ChangeMapSet {
    /// Last change interval per pixel, 0 when unchanged
    pub fn cmap(&self) -> &Raster<u16> {
        &self.cmap
    }

    /// First change interval per pixel, 0 when unchanged
    pub fn smap(&self) -> &Raster<u16> {
        &self.smap
    }

    /// Number of changes per pixel
    pub fn fmap(&self) -> &Raster<u16> {
        &self.fmap
    }

    /// One band per interval with codes 0 none, 1 increase, 2 decrease, 3 indefinite
    pub fn bmap(&self) -> &[Raster<u8>] {
        &self.bmap
    }

    pub fn avimg(&self) -> &CovarianceImage {
        &self.avimg
    }

    pub fn avimglog(&self) -> &Raster<u16> {
        &self.avimglog
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn diagnostics(&self) -> &ChangeDiagnostics {
        &self.diagnostics
    }

    /// Name of `bmap` band `index`, e.g. `T1_T2`
    pub fn interval_name(&self, index: usize) -> Option<String> {
        interval_label(&self.labels, index)
    }

    /// Every output raster with a file-friendly name
    ///
    /// `bmap` bands are numbered from 1 (`bmap_01`), `avimg` bands likewise
    /// (`avimg_b1`).
    pub fn named_rasters(&self) -> Vec<(String, OutputRaster<'_>)> {
        let mut out = vec![
            ("cmap".to_string(), OutputRaster::U16(&self.cmap)),
            ("smap".to_string(), OutputRaster::U16(&self.smap)),
            ("fmap".to_string(), OutputRaster::U16(&self.fmap)),
        ];
        for (i, band) in self.bmap.iter().enumerate() {
            out.push((format!("bmap_{:02}", i + 1), OutputRaster::U8(band)));
        }
        for (i, band) in self.avimg.bands().iter().enumerate() {
            out.push((format!("avimg_b{}", i + 1), OutputRaster::F64(band)));
        }
        out.push(("avimglog".to_string(), OutputRaster::U16(&self.avimglog)));
        out
    }

    /// Copy with every output cleared where `mask` is zero.
    ///
    /// Categorical maps become 0 and `avimg` becomes NaN outside the mask.
    /// Diagnostics describe the unmasked run and are kept as they are.
    pub fn masked(&self, mask: &Raster<u8>) -> Result<Self> {
        self.cmap.check_same_shape(mask)?;
        let keep = mask.data();

        fn clear<T: polsar_core::RasterElement>(
            raster: &Raster<T>,
            keep: &ndarray::Array2<u8>,
            fill: T,
        ) -> Raster<T> {
            let mut out = raster.clone();
            ndarray::Zip::from(out.data_mut()).and(keep).for_each(|v, &k| {
                if k == 0 {
                    *v = fill;
                }
            });
            out
        }

        let avimg_bands = self
            .avimg
            .bands()
            .iter()
            .map(|band| {
                let mut band = clear(band, keep, f64::NAN);
                band.set_nodata(Some(f64::NAN));
                band
            })
            .collect();

        Ok(Self {
            cmap: clear(&self.cmap, keep, 0),
            smap: clear(&self.smap, keep, 0),
            fmap: clear(&self.fmap, keep, 0),
            bmap: self.bmap.iter().map(|b| clear(b, keep, 0)).collect(),
            avimg: CovarianceImage::new(avimg_bands)?,
            avimglog: clear(&self.avimglog, keep, 0),
            labels: self.labels.clone(),
            diagnostics: self.diagnostics,
        })
    }

    /// Verify `fmap = Σ 1[bmap ≠ 0]` and `smap ≤ cmap` for every pixel
    pub fn check_invariants(&self) -> Result<()> {
        let (rows, cols) = self.cmap.shape();
        for row in 0..rows {
            for col in 0..cols {
                let f = self.fmap.data()[(row, col)];
                let s = self.smap.data()[(row, col)];
                let c = self.cmap.data()[(row, col)];
                let flagged = self.bmap.iter().filter(|b| b.data()[(row, col)] != 0).count();
                let consistent = usize::from(f) == flagged
                    && if f > 0 { s <= c && c > 0 } else { s == 0 && c == 0 };
                if !consistent {
                    return Err(Error::Algorithm(format!(
                        "inconsistent change maps at ({}, {}): cmap {}, smap {}, fmap {}, flagged intervals {}",
                        row, col, c, s, f, flagged
                    )));
                }
            }
        }
        Ok(())
    }
}
