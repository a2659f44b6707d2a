//! Sequential change accumulation over start indices
//!
//! The filter runs `ell = 1 .. k-1`. A pixel is tested at `ell` only if the
//! last change recorded for it is the interval just before `ell` (or none
//! at `ell = 1`). The first significant interval is recorded and the pixel
//! stays frozen until the loop reaches the start index right after it.
//!
//! A pixel whose matrix is degenerate in any image, or that produces an
//! undefined p-value, is excluded for the whole run: it is never tested
//! again and its maps are cleared when the state is finished.

use polsar_core::polsar::MAX_BANDS;
use polsar_core::{BandLayout, Error, Raster, RasterElement, Result, Series};
use polsar_parallel::{ParallelStrategy, ProcessingMode};
use tracing::debug;

/// Per-pixel accumulators of the sequential filter, stored row-major.
#[derive(Debug, Clone)]
pub struct SequentialState {
    series_len: usize,
    rows: usize,
    cols: usize,
    /// Last change interval, doubles as the freeze marker
    cmap: Vec<u16>,
    smap: Vec<u16>,
    fmap: Vec<u16>,
    /// `k - 1` interval bands
    bmap: Vec<Vec<u8>>,
    degenerate: Vec<bool>,
    tests_evaluated: u64,
}

/// Raster form of a finished [`SequentialState`]
#[derive(Debug, Clone)]
pub struct SequentialMaps {
    pub cmap: Raster<u16>,
    pub smap: Raster<u16>,
    pub fmap: Raster<u16>,
    pub bmap: Vec<Raster<u8>>,
    pub degenerate_pixels: usize,
    pub tests_evaluated: u64,
}

/// What one row contributes at a start index
#[derive(Debug, Default)]
struct RowOutcome {
    tested: u64,
    excluded: Vec<usize>,
    /// `(col, interval)`
    changes: Vec<(usize, usize)>,
}

/// Pixels whose matrix has a non-positive determinant in at least one image,
/// row-major.
pub fn degenerate_mask(series: &Series, mode: ProcessingMode) -> Vec<bool> {
    let layout = series.layout();
    let b = layout.band_count();
    let (rows, cols) = series.shape();

    let flags: Vec<Vec<bool>> = mode.par_map(0..rows, |row| {
        let mut buf = [0.0; MAX_BANDS];
        (0..cols)
            .map(|col| {
                series.images().iter().any(|image| {
                    image.pixel(row, col, &mut buf);
                    BandLayout::is_degenerate_log_det(layout.log_determinant(&buf[..b]))
                })
            })
            .collect()
    });
    flags.into_iter().flatten().collect()
}

impl SequentialState {
    pub fn new(series_len: usize, rows: usize, cols: usize) -> Self {
        let n = rows * cols;
        Self {
            series_len,
            rows,
            cols,
            cmap: vec![0; n],
            smap: vec![0; n],
            fmap: vec![0; n],
            bmap: vec![vec![0; n]; series_len.saturating_sub(1)],
            degenerate: vec![false; n],
            tests_evaluated: 0,
        }
    }

    /// Exclude pixels from every remaining start index.
    ///
    /// Returns the number of excluded pixels so far.
    pub fn exclude(&mut self, mask: &[bool]) -> Result<usize> {
        if mask.len() != self.degenerate.len() {
            return Err(Error::Algorithm(format!(
                "exclusion mask of {} pixels for a {} x {} grid",
                mask.len(),
                self.rows,
                self.cols
            )));
        }
        for (flag, &masked) in self.degenerate.iter_mut().zip(mask) {
            *flag |= masked;
        }
        Ok(self.degenerate.iter().filter(|&&d| d).count())
    }

    /// Fold the p-values of start index `ell` into the state.
    ///
    /// `p_values[j - 1]` belongs to calendar interval `ell + j - 1`. `gate`
    /// is the omnibus p-value of `ell`; without it every pixel passes the
    /// gate. `directions` holds the pre-computed interval codes, otherwise a
    /// recorded change is written as code 1. Rows are scanned according to
    /// `mode`; the result does not depend on it.
    ///
    /// Returns the number of changes recorded at this start index.
    pub fn apply(
        &mut self,
        ell: usize,
        p_values: &[Raster<f64>],
        gate: Option<&Raster<f64>>,
        significance: f64,
        directions: Option<&[Raster<u8>]>,
        mode: ProcessingMode,
    ) -> Result<usize> {
        if ell == 0 || ell >= self.series_len || p_values.len() != self.series_len - ell {
            return Err(Error::Algorithm(format!(
                "start index {} with {} p-value rasters does not fit a series of {} images",
                ell,
                p_values.len(),
                self.series_len
            )));
        }
        if let Some(codes) = directions
            && codes.len() + 1 != self.series_len
        {
            return Err(Error::Algorithm(format!(
                "{} direction rasters for a series of {} images",
                codes.len(),
                self.series_len
            )));
        }
        let shapes = p_values
            .iter()
            .chain(gate)
            .map(Raster::shape)
            .chain(directions.into_iter().flatten().map(Raster::shape));
        for (rows, cols) in shapes {
            if (rows, cols) != (self.rows, self.cols) {
                return Err(Error::SizeMismatch {
                    er: self.rows,
                    ec: self.cols,
                    ar: rows,
                    ac: cols,
                });
            }
        }

        let outcomes = mode.par_map(0..self.rows, |row| {
            self.scan_row(row, ell, p_values, gate, significance)
        });

        let mut recorded = 0;
        for (row, outcome) in outcomes.into_iter().enumerate() {
            self.tests_evaluated += outcome.tested;
            for col in outcome.excluded {
                self.degenerate[row * self.cols + col] = true;
            }
            for (col, interval) in outcome.changes {
                let idx = row * self.cols + col;
                self.cmap[idx] = interval as u16;
                self.fmap[idx] += 1;
                if ell == 1 {
                    self.smap[idx] = interval as u16;
                }
                self.bmap[interval - 1][idx] = match directions {
                    Some(codes) => codes[interval - 1].data()[(row, col)],
                    None => 1,
                };
                recorded += 1;
            }
        }

        debug!(ell, recorded, "sequential filter step");
        Ok(recorded)
    }

    fn scan_row(
        &self,
        row: usize,
        ell: usize,
        p_values: &[Raster<f64>],
        gate: Option<&Raster<f64>>,
        significance: f64,
    ) -> RowOutcome {
        let mut outcome = RowOutcome::default();
        for col in 0..self.cols {
            let idx = row * self.cols + col;
            if self.degenerate[idx] {
                continue;
            }

            let gate_value = gate.map_or(0.0, |g| g.data()[(row, col)]);
            if gate_value.is_nan() || p_values.iter().any(|p| p.data()[(row, col)].is_nan()) {
                outcome.excluded.push(col);
                continue;
            }
            // frozen
            if usize::from(self.cmap[idx]) != ell - 1 {
                continue;
            }

            let hit = p_values
                .iter()
                .position(|p| p.data()[(row, col)] < significance);
            match hit {
                Some(offset) if gate_value < significance => {
                    outcome.tested += offset as u64 + 1;
                    outcome.changes.push((col, ell + offset));
                }
                _ => outcome.tested += p_values.len() as u64,
            }
        }
        outcome
    }

    /// Current `cmap` value of a pixel
    pub fn last_change(&self, row: usize, col: usize) -> u16 {
        self.cmap[row * self.cols + col]
    }

    /// Convert to rasters sharing the grid of `template`.
    ///
    /// Excluded pixels come out with no change recorded.
    pub fn into_maps<T: RasterElement>(mut self, template: &Raster<T>) -> Result<SequentialMaps> {
        let mut degenerate_pixels = 0;
        for (idx, _) in self.degenerate.iter().enumerate().filter(|&(_, &d)| d) {
            degenerate_pixels += 1;
            self.cmap[idx] = 0;
            self.smap[idx] = 0;
            self.fmap[idx] = 0;
            for band in &mut self.bmap {
                band[idx] = 0;
            }
        }

        let bmap = self
            .bmap
            .into_iter()
            .map(|band| template.with_data(band))
            .collect::<Result<Vec<_>>>()?;
        Ok(SequentialMaps {
            cmap: template.with_data(self.cmap)?,
            smap: template.with_data(self.smap)?,
            fmap: template.with_data(self.fmap)?,
            bmap,
            degenerate_pixels,
            tests_evaluated: self.tests_evaluated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polsar_core::CovarianceImage;

    const SEQ: ProcessingMode = ProcessingMode::Sequential;

    fn p(values: &[f64]) -> Raster<f64> {
        Raster::from_vec(values.to_vec(), 1, values.len()).unwrap()
    }

    #[test]
    fn test_records_earliest_interval_and_freezes() {
        let mut state = SequentialState::new(4, 1, 2);
        // pixel 0 significant at intervals 2 and 3, pixel 1 never
        let recorded = state
            .apply(1, &[p(&[0.5, 0.5]), p(&[0.001, 0.5]), p(&[0.001, 0.5])], None, 0.01, None, SEQ)
            .unwrap();
        assert_eq!(recorded, 1);
        assert_eq!(state.last_change(0, 0), 2);

        // frozen: cmap = 2 is not ell - 1 = 1
        let recorded = state
            .apply(2, &[p(&[0.001, 0.5]), p(&[0.001, 0.5])], None, 0.01, None, SEQ)
            .unwrap();
        assert_eq!(recorded, 0);

        // re-entry at ell = cmap + 1
        let recorded = state.apply(3, &[p(&[0.001, 0.5])], None, 0.01, None, SEQ).unwrap();
        assert_eq!(recorded, 1);

        let template: Raster<f64> = Raster::new(1, 2);
        let maps = state.into_maps(&template).unwrap();
        assert_eq!(maps.cmap.get(0, 0).unwrap(), 3);
        assert_eq!(maps.smap.get(0, 0).unwrap(), 2);
        assert_eq!(maps.fmap.get(0, 0).unwrap(), 2);
        let bands: Vec<u8> = maps.bmap.iter().map(|b| b.get(0, 0).unwrap()).collect();
        assert_eq!(bands, vec![0, 1, 1]);
        assert_eq!(maps.fmap.get(0, 1).unwrap(), 0);
        assert_eq!(maps.degenerate_pixels, 0);
        // 2 + 1 comparisons on pixel 0, 3 on pixel 1
        assert_eq!(maps.tests_evaluated, 6);
    }

    #[test]
    fn test_gate_blocks_changes() {
        let mut state = SequentialState::new(3, 1, 2);
        let gate = p(&[0.5, 0.001]);
        state
            .apply(1, &[p(&[0.001, 0.001]), p(&[0.5, 0.5])], Some(&gate), 0.01, None, SEQ)
            .unwrap();
        assert_eq!(state.last_change(0, 0), 0);
        assert_eq!(state.last_change(0, 1), 1);
    }

    #[test]
    fn test_nan_never_passes_and_is_counted() {
        let mut state = SequentialState::new(2, 1, 2);
        state.apply(1, &[p(&[f64::NAN, 0.001])], None, 0.01, None, SEQ).unwrap();
        assert_eq!(state.last_change(0, 0), 0);
        assert_eq!(state.last_change(0, 1), 1);
        let maps = state.into_maps(&Raster::<f64>::new(1, 2)).unwrap();
        assert_eq!(maps.degenerate_pixels, 1);
    }

    #[test]
    fn test_undefined_interval_discards_defined_ones() {
        let mut state = SequentialState::new(3, 1, 1);
        // interval 1 is undefined, interval 2 would be significant
        let recorded = state
            .apply(1, &[p(&[f64::NAN]), p(&[0.001])], None, 0.01, None, SEQ)
            .unwrap();
        assert_eq!(recorded, 0);
        let maps = state.into_maps(&Raster::<f64>::new(1, 1)).unwrap();
        assert_eq!(maps.fmap.get(0, 0).unwrap(), 0);
        assert_eq!(maps.degenerate_pixels, 1);
        assert_eq!(maps.tests_evaluated, 0);
    }

    #[test]
    fn test_late_exclusion_clears_earlier_changes() {
        let mut state = SequentialState::new(3, 1, 2);
        state.apply(1, &[p(&[0.001, 0.001]), p(&[0.5, 0.5])], None, 0.01, None, SEQ).unwrap();
        assert_eq!(state.last_change(0, 0), 1);
        state.apply(2, &[p(&[f64::NAN, 0.001])], None, 0.01, None, SEQ).unwrap();

        let maps = state.into_maps(&Raster::<f64>::new(1, 2)).unwrap();
        assert_eq!(maps.degenerate_pixels, 1);
        assert_eq!(maps.cmap.get(0, 0).unwrap(), 0);
        assert_eq!(maps.smap.get(0, 0).unwrap(), 0);
        assert_eq!(maps.fmap.get(0, 0).unwrap(), 0);
        assert!(maps.bmap.iter().all(|b| b.get(0, 0).unwrap() == 0));
        assert_eq!(maps.fmap.get(0, 1).unwrap(), 2);
    }

    #[test]
    fn test_excluded_pixels_are_never_tested() {
        let mut state = SequentialState::new(2, 1, 3);
        assert_eq!(state.exclude(&[false, true, false]).unwrap(), 1);
        let recorded = state
            .apply(1, &[p(&[0.001, 0.001, 0.5])], None, 0.01, None, SEQ)
            .unwrap();
        assert_eq!(recorded, 1);
        assert_eq!(state.last_change(0, 1), 0);
        let maps = state.into_maps(&Raster::<f64>::new(1, 3)).unwrap();
        assert_eq!(maps.tests_evaluated, 2);
        assert_eq!(maps.degenerate_pixels, 1);

        let mut state = SequentialState::new(2, 1, 3);
        assert!(state.exclude(&[false; 2]).is_err());
    }

    #[test]
    fn test_degenerate_mask_flags_any_image() {
        let mut bad = CovarianceImage::filled(BandLayout::DualDiag, 2, 2, 1.0);
        bad.set_pixel(1, 0, &[1.0, 0.0]);
        let good = CovarianceImage::filled(BandLayout::DualDiag, 2, 2, 1.0);
        let series = Series::new(vec![good.clone(), bad, good]).unwrap();
        for mode in [ProcessingMode::Sequential, ProcessingMode::Parallel] {
            assert_eq!(degenerate_mask(&series, mode), vec![false, false, true, false]);
        }
    }

    #[test]
    fn test_row_scheduling_does_not_change_result() {
        let (rows, cols) = (7, 5);
        let grid = |seed: usize| {
            let values = (0..rows * cols)
                .map(|i| match (i * 7 + seed * 3) % 5 {
                    0 => 0.001,
                    1 => f64::NAN,
                    _ => 0.4,
                })
                .collect();
            Raster::from_vec(values, rows, cols).unwrap()
        };
        let run = |mode: ProcessingMode| {
            let mut state = SequentialState::new(4, rows, cols);
            for ell in 1..4 {
                let p_values: Vec<_> = (ell..4).map(|j| grid(ell * 10 + j)).collect();
                state.apply(ell, &p_values, None, 0.01, None, mode).unwrap();
            }
            state.into_maps(&Raster::<f64>::new(rows, cols)).unwrap()
        };

        let serial = run(ProcessingMode::Sequential);
        for mode in [ProcessingMode::Parallel, ProcessingMode::ParallelWith(3)] {
            let maps = run(mode);
            assert_eq!(maps.cmap.data(), serial.cmap.data());
            assert_eq!(maps.smap.data(), serial.smap.data());
            assert_eq!(maps.fmap.data(), serial.fmap.data());
            for (a, b) in maps.bmap.iter().zip(&serial.bmap) {
                assert_eq!(a.data(), b.data());
            }
            assert_eq!(maps.degenerate_pixels, serial.degenerate_pixels);
            assert_eq!(maps.tests_evaluated, serial.tests_evaluated);
        }
    }

    #[test]
    fn test_prepass_codes_are_copied() {
        let mut state = SequentialState::new(3, 1, 1);
        let codes = vec![Raster::filled(1, 1, 2u8), Raster::filled(1, 1, 3u8)];
        state.apply(1, &[p(&[0.001]), p(&[0.001])], None, 0.01, Some(&codes), SEQ).unwrap();
        state.apply(2, &[p(&[0.001])], None, 0.01, Some(&codes), SEQ).unwrap();
        let maps = state.into_maps(&Raster::<f64>::new(1, 1)).unwrap();
        assert_eq!(maps.bmap[0].get(0, 0).unwrap(), 2);
        assert_eq!(maps.bmap[1].get(0, 0).unwrap(), 3);
        assert_eq!(maps.fmap.get(0, 0).unwrap(), 2);
    }

    #[test]
    fn test_rejects_wrong_raster_count() {
        let mut state = SequentialState::new(4, 1, 1);
        assert!(state.apply(1, &[p(&[0.5])], None, 0.01, None, SEQ).is_err());
        assert!(state.apply(4, &[], None, 0.01, None, SEQ).is_err());
    }
}
