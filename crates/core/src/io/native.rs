//! Native single-band GeoTIFF reading/writing
//!
//! Uses the `tiff` crate for basic TIFF I/O. Only the pixel-scale and
//! tiepoint tags are interpreted; projections are not carried.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;

/// Known codes are decoded into their named `Tag` variant, which does not
/// compare equal to `Tag::Unknown` of the same code.
fn geotiff_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// Compression (only "NONE" is written natively)
    pub compression: String,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            compression: "NONE".to_string(),
        }
    }
}

/// Read a single-band GeoTIFF file into a Raster
///
/// Any integer or float sample format is cast to `T`; values that do not fit
/// become `T::default_nodata()`.
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    let mut decoder =
        Decoder::new(file).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;
    let (rows, cols) = (height as usize, width as usize);

    let decoded = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    macro_rules! cast_all {
        ($buf:expr) => {
            $buf.iter()
                .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
                .collect::<Vec<T>>()
        };
    }

    let data = match decoded {
        DecodingResult::F32(buf) => cast_all!(buf),
        DecodingResult::F64(buf) => cast_all!(buf),
        DecodingResult::U8(buf) => cast_all!(buf),
        DecodingResult::U16(buf) => cast_all!(buf),
        DecodingResult::U32(buf) => cast_all!(buf),
        DecodingResult::I8(buf) => cast_all!(buf),
        DecodingResult::I16(buf) => cast_all!(buf),
        DecodingResult::I32(buf) => cast_all!(buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    if data.len() != rows * cols {
        // multi-sample TIFFs land here: one band per file is expected
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;
    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    Ok(raster)
}

/// GeoTransform from ModelPixelScale + ModelTiepoint, if both are present
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(geotiff_tag(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(geotiff_tag(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// Write a Raster to a GeoTIFF file as 32-bit float
pub fn write_geotiff<T, P>(
    raster: &Raster<T>,
    path: P,
    _options: Option<GeoTiffOptions>,
) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = BufWriter::new(File::create(path.as_ref())?);
    let mut encoder = TiffEncoder::new(file)
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();
    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    // GTModelTypeGeoKey = projected, GTRasterTypeGeoKey = pixel-is-area
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];

    let tag_error = |e: tiff::TiffError| Error::Other(format!("Cannot write GeoTIFF tag: {}", e));
    image
        .encoder()
        .write_tag(geotiff_tag(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tag_error)?;
    image
        .encoder()
        .write_tag(geotiff_tag(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tag_error)?;
    image
        .encoder()
        .write_tag(geotiff_tag(GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(tag_error)?;

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_geotransform_survives_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmap.tif");

        let mut cmap = Raster::from_vec(vec![0u16, 1, 2, 3, 0, 5], 2, 3).unwrap();
        cmap.set_transform(GeoTransform::new(631_000.0, 4_100_000.0, 10.0, -10.0));
        write_geotiff(&cmap, &path, None).unwrap();

        let back: Raster<u16> = read_geotiff(&path).unwrap();
        assert_eq!(back.shape(), (2, 3));
        assert_eq!(back.get(1, 2).unwrap(), 5);
        let gt = back.transform();
        assert_relative_eq!(gt.origin_x, 631_000.0, epsilon = 1e-6);
        assert_relative_eq!(gt.origin_y, 4_100_000.0, epsilon = 1e-6);
        assert_relative_eq!(gt.pixel_width, 10.0, epsilon = 1e-12);
        assert_relative_eq!(gt.pixel_height, -10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_geotiff_tags_use_decoder_variants() {
        assert_eq!(geotiff_tag(MODEL_PIXEL_SCALE).to_u16(), MODEL_PIXEL_SCALE);
        assert_eq!(geotiff_tag(MODEL_TIEPOINT), Tag::from_u16_exhaustive(MODEL_TIEPOINT));
    }
}
