//! Reduce a [`ScanSeries`] to the axes and intensity block of a contour plot.
use nalgebra::DMatrix;

use crate::abundance::ScanSeries;

/// A down-sampled, m/z-windowed view of a scan series ready for contouring
#[derive(Debug, Clone, PartialEq)]
pub struct ContourGrid {
    /// Position of each kept scan among the kept scans
    pub scan_axis: Vec<usize>,
    /// The m/z values strictly inside the requested window
    pub mz_axis: Vec<f64>,
    /// Intensities with one row per m/z value and one column per kept scan
    pub intensities: DMatrix<f64>,
}

impl ContourGrid {
    pub fn shape(&self) -> (usize, usize) {
        self.intensities.shape()
    }
}

/// Keep the m/z values strictly between `mz_lower` and `mz_upper`, and every
/// `keep_ith_scan`-th scan starting from the first. A step of zero is treated as one.
pub fn contour_grid(
    series: &ScanSeries,
    mz_lower: f64,
    mz_upper: f64,
    keep_ith_scan: usize,
) -> ContourGrid {
    let step = keep_ith_scan.max(1);
    let columns: Vec<usize> = series
        .mz()
        .iter()
        .enumerate()
        .filter(|(_, mz)| **mz > mz_lower && **mz < mz_upper)
        .map(|(j, _)| j)
        .collect();
    let rows: Vec<usize> = (0..series.n_scans()).step_by(step).collect();

    let block = series.intensities();
    let intensities = DMatrix::from_fn(columns.len(), rows.len(), |i, j| block[(rows[j], columns[i])]);

    ContourGrid {
        scan_axis: (0..rows.len()).collect(),
        mz_axis: columns.iter().map(|j| series.mz()[*j]).collect(),
        intensities,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_contour_grid() {
        let mz: Vec<f64> = (0..20).map(|i| 20.0 + i as f64).collect();
        let block = DMatrix::from_fn(120, 20, |i, j| (i * 100 + j) as f64);
        let times = (0..120).map(|i| i as f64).collect();
        let series = ScanSeries::new(mz, block, times).unwrap();

        let grid = contour_grid(&series, 25.0, 30.0, 50);
        assert_eq!(grid.mz_axis, vec![26.0, 27.0, 28.0, 29.0]);
        assert_eq!(grid.scan_axis, vec![0, 1, 2]);
        assert_eq!(grid.shape(), (4, 3));
        // Row 0 is m/z 26 (column 6), column 2 is scan 100
        assert_eq!(grid.intensities[(0, 2)], 10006.0);

        let all = contour_grid(&series, 0.0, 100.0, 0);
        assert_eq!(all.shape(), (20, 120));
    }
}
