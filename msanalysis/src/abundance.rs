//! Binned intensity extraction over a series of scans.
use nalgebra::DMatrix;
use thiserror::Error;
use tracing::debug;

use crate::spectrum::Spectrum;

/// The half-width of the m/z window summed around each target unless told otherwise
pub const DEFAULT_BIN_WIDTH: f64 = 0.45;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanSeriesError {
    #[error("The intensity block has {columns} columns but the m/z axis has {mz} entries")]
    AxisMismatch { mz: usize, columns: usize },
    #[error("The intensity block has {rows} scans but {times} acquisition times were given")]
    TimeMismatch { rows: usize, times: usize },
    #[error("Scan {index} has {len} points where {expected} were expected")]
    RaggedScan {
        index: usize,
        len: usize,
        expected: usize,
    },
}

/// A run of scans sampled on a shared m/z axis.
///
/// Intensities are stored as an `n_scans x n_mz` matrix, one row per scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSeries {
    mz: Vec<f64>,
    intensities: DMatrix<f64>,
    times: Vec<f64>,
}

impl ScanSeries {
    pub fn new(
        mz: Vec<f64>,
        intensities: DMatrix<f64>,
        times: Vec<f64>,
    ) -> Result<Self, ScanSeriesError> {
        if intensities.ncols() != mz.len() {
            return Err(ScanSeriesError::AxisMismatch {
                mz: mz.len(),
                columns: intensities.ncols(),
            });
        }
        if intensities.nrows() != times.len() {
            return Err(ScanSeriesError::TimeMismatch {
                rows: intensities.nrows(),
                times: times.len(),
            });
        }
        Ok(Self {
            mz,
            intensities,
            times,
        })
    }

    /// Stack `spectra` that share the m/z axis of the first spectrum. Times are
    /// shifted so the first scan is at zero.
    pub fn from_spectra(spectra: &[Spectrum], times: &[f64]) -> Result<Self, ScanSeriesError> {
        let mz = spectra.first().map(|s| s.mz().to_vec()).unwrap_or_default();
        let width = mz.len();
        for (index, spec) in spectra.iter().enumerate() {
            if spec.len() != width {
                return Err(ScanSeriesError::RaggedScan {
                    index,
                    len: spec.len(),
                    expected: width,
                });
            }
        }
        let intensities = DMatrix::from_fn(spectra.len(), width, |i, j| spectra[i].intensity()[j]);
        let t0 = times.first().copied().unwrap_or_default();
        let times = times.iter().map(|t| t - t0).collect();
        Self::new(mz, intensities, times)
    }

    pub fn mz(&self) -> &[f64] {
        &self.mz
    }

    pub fn intensities(&self) -> &DMatrix<f64> {
        &self.intensities
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn n_scans(&self) -> usize {
        self.intensities.nrows()
    }

    /// Copy out scan `index` as a [`Spectrum`]
    pub fn scan(&self, index: usize) -> Option<Spectrum> {
        if index >= self.n_scans() {
            return None;
        }
        let row = self.intensities.row(index);
        Some(self.mz.iter().copied().zip(row.iter().copied()).collect())
    }

    /// The summed intensity within `bin_width` of `target` in every scan
    pub fn extracted_ion_trace(&self, target: f64, bin_width: f64) -> Vec<f64> {
        let columns: Vec<usize> = self
            .mz
            .iter()
            .enumerate()
            .filter(|(_, mz)| (*mz - target).abs() < bin_width)
            .map(|(j, _)| j)
            .collect();
        self.intensities
            .row_iter()
            .map(|row| columns.iter().map(|j| row[*j]).sum())
            .collect()
    }
}

/// Sum the intensity of each spectrum within `bin_width` of every target m/z.
///
/// The result has one row per spectrum and one column per target.
pub fn relative_abundance(spectra: &[Spectrum], targets: &[f64], bin_width: f64) -> Vec<Vec<f64>> {
    debug!(
        "Binning {} spectra around {} targets with width {bin_width}",
        spectra.len(),
        targets.len()
    );
    spectra
        .iter()
        .map(|spec| {
            targets
                .iter()
                .map(|target| {
                    spec.iter()
                        .filter(|(mz, _)| (**mz - target).abs() < bin_width)
                        .map(|(_, int)| *int)
                        .sum()
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn series() -> ScanSeries {
        let spectra = vec![
            Spectrum::new(vec![27.6, 28.0, 28.5, 44.0], vec![1.0, 2.0, 4.0, 8.0]).unwrap(),
            Spectrum::new(vec![27.6, 28.0, 28.5, 44.0], vec![0.5, 1.0, 1.5, 2.0]).unwrap(),
        ];
        ScanSeries::from_spectra(&spectra, &[10.0, 10.5]).unwrap()
    }

    #[test]
    fn test_relative_abundance() {
        let spectra = vec![
            Spectrum::new(vec![27.6, 28.0, 28.5, 44.0], vec![1.0, 2.0, 4.0, 8.0]).unwrap(),
            Spectrum::new(vec![43.7, 44.3], vec![3.0, 5.0]).unwrap(),
        ];
        let table = relative_abundance(&spectra, &[28.0, 44.0], DEFAULT_BIN_WIDTH);
        assert_eq!(table.len(), 2);
        // 28.5 is outside the window around 28.0
        assert_eq!(table[0], vec![3.0, 8.0]);
        assert_eq!(table[1], vec![0.0, 8.0]);
    }

    #[test]
    fn test_extracted_ion_trace() {
        let series = series();
        assert_eq!(series.times(), &[0.0, 0.5]);
        assert_eq!(series.extracted_ion_trace(28.0, DEFAULT_BIN_WIDTH), vec![3.0, 1.5]);
        assert_eq!(series.extracted_ion_trace(100.0, DEFAULT_BIN_WIDTH), vec![0.0, 0.0]);
        assert_eq!(series.scan(1).unwrap().intensity(), &[0.5, 1.0, 1.5, 2.0]);
        assert!(series.scan(2).is_none());
    }

    #[test]
    fn test_shape_validation() {
        let ragged = vec![
            Spectrum::new(vec![1.0, 2.0], vec![1.0, 1.0]).unwrap(),
            Spectrum::new(vec![1.0], vec![1.0]).unwrap(),
        ];
        assert_eq!(
            ScanSeries::from_spectra(&ragged, &[0.0, 1.0]),
            Err(ScanSeriesError::RaggedScan {
                index: 1,
                len: 1,
                expected: 2
            })
        );
        assert_eq!(
            ScanSeries::new(vec![1.0], DMatrix::zeros(2, 1), vec![0.0]),
            Err(ScanSeriesError::TimeMismatch { rows: 2, times: 1 })
        );
        assert_eq!(
            ScanSeries::new(vec![1.0, 2.0], DMatrix::zeros(1, 1), vec![0.0]),
            Err(ScanSeriesError::AxisMismatch { mz: 2, columns: 1 })
        );
    }
}
