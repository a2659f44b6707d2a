//! Focal (moving window) median
//!
//! Used to denoise p-value rasters before thresholding. Cells outside the
//! raster and NaN cells are skipped as neighbours; a NaN centre stays NaN so
//! that an undefined test never becomes defined through smoothing.

use polsar_core::raster::{Neighborhood, Raster};
use polsar_core::{Error, Result};
use polsar_parallel::{ParallelStrategy, ProcessingMode};

/// Compute the focal median of a raster over a moving window
///
/// # Arguments
/// * `raster` - Input raster
/// * `window` - Window shape, radius must be > 0
/// * `mode` - Row scheduling
///
/// # Returns
/// Raster with the median of the valid window cells at each cell
pub fn focal_median(
    raster: &Raster<f64>,
    window: Neighborhood,
    mode: ProcessingMode,
) -> Result<Raster<f64>> {
    if window.radius() == 0 {
        return Err(Error::InvalidParameter {
            name: "median_window",
            value: format!("{:?}", window),
            reason: "window radius must be > 0".into(),
        });
    }

    let (rows, cols) = raster.shape();
    let offsets = window.offsets();
    let data = raster.data();

    let output_rows: Vec<Vec<f64>> = mode.par_map(0..rows, |row| {
        let mut row_data = vec![f64::NAN; cols];
        let mut values: Vec<f64> = Vec::with_capacity(offsets.len());

        for (col, out) in row_data.iter_mut().enumerate() {
            if data[(row, col)].is_nan() {
                continue;
            }

            values.clear();
            for &(dr, dc) in &offsets {
                let nr = row as isize + dr;
                let nc = col as isize + dc;
                if nr >= 0 && nc >= 0 && (nr as usize) < rows && (nc as usize) < cols {
                    let v = data[(nr as usize, nc as usize)];
                    if !v.is_nan() {
                        values.push(v);
                    }
                }
            }

            *out = median(&mut values);
        }

        row_data
    });

    let mut output = raster.with_data(output_rows.concat())?;
    output.set_nodata(Some(f64::NAN));
    Ok(output)
}

/// Median of a non-empty slice, averaging the two middle values for even lengths
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
