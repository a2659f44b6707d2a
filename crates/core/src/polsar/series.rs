//! Ordered time series of covariance images

use crate::error::{Error, Result};
use crate::polsar::image::CovarianceImage;
use crate::polsar::layout::BandLayout;
use std::ops::Range;

/// A validated, chronologically ordered series of `k >= 2` covariance
/// images sharing one layout and one grid.
///
/// Every image carries a label used to name per-interval outputs. The
/// default labels are `T1 .. Tk`.
#[derive(Debug, Clone)]
pub struct Series {
    images: Vec<CovarianceImage>,
    labels: Vec<String>,
}

/// `"{from}_{to}"` for the interval between acquisitions `index` and
/// `index + 1`, or `None` past the last interval.
pub fn interval_label(labels: &[String], index: usize) -> Option<String> {
    let from = labels.get(index)?;
    let to = labels.get(index.checked_add(1)?)?;
    Some(format!("{}_{}", from, to))
}

impl Series {
    /// Build a series with default labels
    pub fn new(images: Vec<CovarianceImage>) -> Result<Self> {
        let labels = (1..=images.len()).map(|i| format!("T{}", i)).collect();
        Self::with_labels(images, labels)
    }

    /// Build a series with explicit labels, one per image
    pub fn with_labels(images: Vec<CovarianceImage>, labels: Vec<String>) -> Result<Self> {
        if images.len() < 2 {
            return Err(Error::SeriesTooShort { len: images.len() });
        }
        if labels.len() != images.len() {
            return Err(Error::LabelCountMismatch {
                images: images.len(),
                labels: labels.len(),
            });
        }

        let layout = images[0].layout();
        let shape = images[0].shape();
        for (index, image) in images.iter().enumerate().skip(1) {
            if image.layout() != layout {
                return Err(Error::LayoutMismatch {
                    index,
                    expected: layout.band_count(),
                    actual: image.layout().band_count(),
                });
            }
            if image.shape() != shape {
                return Err(Error::SizeMismatch {
                    er: shape.0,
                    ec: shape.1,
                    ar: image.rows(),
                    ac: image.cols(),
                });
            }
        }

        Ok(Self { images, labels })
    }

    /// Number of images `k`
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Always false: a series holds at least two images
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn layout(&self) -> BandLayout {
        self.images[0].layout()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.images[0].shape()
    }

    pub fn images(&self) -> &[CovarianceImage] {
        &self.images
    }

    /// Image at a zero-based index
    pub fn image(&self, index: usize) -> Option<&CovarianceImage> {
        self.images.get(index)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Label of the interval between image `index` and `index + 1`, e.g. `T1_T2`
    pub fn interval_name(&self, index: usize) -> Option<String> {
        interval_label(&self.labels, index)
    }

    /// Pointwise sum of the images in a zero-based index range
    pub fn sum_images(&self, range: Range<usize>) -> Result<CovarianceImage> {
        if range.is_empty() || range.end > self.len() {
            return Err(Error::InvalidParameter {
                name: "range",
                value: format!("{:?}", range),
                reason: format!("must be a non-empty range within 0..{}", self.len()),
            });
        }
        let mut sum = self.images[range.start].clone();
        for image in &self.images[range.start + 1..range.end] {
            sum.add_assign(image)?;
        }
        Ok(sum)
    }
}
