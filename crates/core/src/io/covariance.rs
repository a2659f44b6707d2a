//! Covariance images stored as one GeoTIFF per band

use crate::error::{Error, Result};
use crate::io::native::{read_geotiff, write_geotiff};
use crate::polsar::CovarianceImage;
use crate::raster::Raster;
use std::path::{Path, PathBuf};

/// Read a covariance image from single-band files given in layout order.
///
/// The layout follows from the number of paths (1, 2, 3, 4 or 9).
pub fn read_covariance_image<P: AsRef<Path>>(paths: &[P]) -> Result<CovarianceImage> {
    let bands = paths
        .iter()
        .map(|p| read_geotiff::<f64, _>(p))
        .collect::<Result<Vec<Raster<f64>>>>()?;
    if bands.is_empty() {
        return Err(Error::UnsupportedBandCount(0));
    }
    CovarianceImage::new(bands)
}

/// Write every band of an image to `dir` as `{prefix}_b{n}.tif` (n from 1).
///
/// Returns the written paths in band order.
pub fn write_covariance_image<P: AsRef<Path>>(
    image: &CovarianceImage,
    dir: P,
    prefix: &str,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    image
        .bands()
        .iter()
        .enumerate()
        .map(|(i, band)| {
            let path = dir.join(format!("{}_b{}.tif", prefix, i + 1));
            write_geotiff(band, &path, None)?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polsar::BandLayout;
    use crate::raster::GeoTransform;
    use approx::assert_relative_eq;

    #[test]
    fn test_write_then_read_dual_full() {
        let dir = tempfile::tempdir().unwrap();
        let values: Vec<f64> = (0..3 * 2)
            .flat_map(|i| [4.0 + i as f64, 0.5, -0.25, 3.0])
            .collect();
        let mut image =
            CovarianceImage::from_interleaved(BandLayout::DualFull, 3, 2, &values).unwrap();
        image.set_transform(GeoTransform::new(500.0, 1000.0, 10.0, -10.0));

        let paths = write_covariance_image(&image, dir.path(), "avimg").unwrap();
        assert_eq!(paths.len(), 4);
        assert!(paths[3].ends_with("avimg_b4.tif"));

        let back = read_covariance_image(&paths).unwrap();
        assert_eq!(back.layout(), BandLayout::DualFull);
        assert_eq!(back.shape(), (3, 2));
        // stored as f32
        assert_relative_eq!(back.band(0).unwrap().get(2, 1).unwrap(), 9.0, epsilon = 1e-6);
        assert_relative_eq!(back.band(2).unwrap().get(0, 0).unwrap(), -0.25, epsilon = 1e-6);
        assert_relative_eq!(back.transform().origin_x, 500.0, epsilon = 1e-9);
        assert_relative_eq!(back.transform().pixel_height, -10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_read_requires_files() {
        let none: [&str; 0] = [];
        assert!(matches!(
            read_covariance_image(&none),
            Err(Error::UnsupportedBandCount(0))
        ));
        assert!(read_covariance_image(&["/nonexistent/c11.tif"]).is_err());
    }
}
