//! A paired m/z and intensity array representation of a mass spectrum, and
//! the operations for re-embedding one onto another m/z grid.
use std::iter::Zip;
use std::slice::Iter;

use mzpeaks::{prelude::*, CentroidPeak, MZPeakSetType};
use thiserror::Error;

/// An error that might occur while constructing a [`Spectrum`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpectrumError {
    #[error("The m/z array has {mz} entries but the intensity array has {intensity}")]
    LengthMismatch { mz: usize, intensity: usize },
}

/// Round `value` to `decimals` decimal places, breaking ties towards the even
/// neighbor. Negative `decimals` round to powers of ten.
#[inline]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// How two m/z values are compared when testing for membership in a grid.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MassMatch {
    /// The values must be identical. Callers are expected to round both sides
    /// to the same precision first.
    #[default]
    Exact,
    /// The values may differ by at most this many m/z units
    Tolerance(f64),
}

impl MassMatch {
    #[inline]
    pub fn test(&self, query: f64, reference: f64) -> bool {
        match self {
            Self::Exact => query == reference,
            Self::Tolerance(tol) => (query - reference).abs() <= *tol,
        }
    }

    /// Check whether `query` matches any value in `sorted_grid`, which must be
    /// sorted in ascending order.
    pub fn contained_in(&self, query: f64, sorted_grid: &[f64]) -> bool {
        match self {
            Self::Exact => sorted_grid
                .binary_search_by(|mz| mz.total_cmp(&query))
                .is_ok(),
            Self::Tolerance(tol) => {
                let start = sorted_grid.partition_point(|v| *v < query - tol);
                sorted_grid[start..]
                    .iter()
                    .take_while(|v| **v <= query + tol)
                    .next()
                    .is_some()
            }
        }
    }
}

/// A mass spectrum as two equal-length arrays.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Spectrum {
    mz: Vec<f64>,
    intensity: Vec<f64>,
}

impl Spectrum {
    pub fn new(mz: Vec<f64>, intensity: Vec<f64>) -> Result<Self, SpectrumError> {
        if mz.len() != intensity.len() {
            return Err(SpectrumError::LengthMismatch {
                mz: mz.len(),
                intensity: intensity.len(),
            });
        }
        Ok(Self { mz, intensity })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn mz(&self) -> &[f64] {
        &self.mz
    }

    #[inline]
    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mz.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    /// Iterate over `(mz, intensity)` pairs
    pub fn iter(&self) -> Zip<Iter<'_, f64>, Iter<'_, f64>> {
        self.mz.iter().zip(self.intensity.iter())
    }

    pub fn into_parts(self) -> (Vec<f64>, Vec<f64>) {
        (self.mz, self.intensity)
    }

    /// Round every m/z value in place to `decimals` decimal places
    pub fn round_mz(&mut self, decimals: i32) {
        self.mz
            .iter_mut()
            .for_each(|mz| *mz = round_to(*mz, decimals));
    }

    /// Multiply every intensity in place by `factor`
    pub fn scale(&mut self, factor: f64) {
        self.intensity.iter_mut().for_each(|i| *i *= factor);
    }

    pub fn scaled(mut self, factor: f64) -> Self {
        self.scale(factor);
        self
    }

    pub fn max_intensity(&self) -> Option<f64> {
        self.intensity.iter().copied().reduce(f64::max)
    }

    pub fn min_mz(&self) -> Option<f64> {
        self.mz.iter().copied().reduce(f64::min)
    }

    pub fn max_mz(&self) -> Option<f64> {
        self.mz.iter().copied().reduce(f64::max)
    }

    /// Copy out the points whose m/z lies strictly between `lower` and `upper`
    pub fn select_mz_range(&self, lower: f64, upper: f64) -> Spectrum {
        let (mz, intensity) = self
            .iter()
            .filter(|(mz, _)| **mz > lower && **mz < upper)
            .map(|(mz, i)| (*mz, *i))
            .unzip();
        Self { mz, intensity }
    }

    /// Collect the entries at `indices`, in the order given
    pub fn select_indices(&self, indices: &[usize]) -> Spectrum {
        let (mz, intensity) = indices
            .iter()
            .map(|i| (self.mz[*i], self.intensity[*i]))
            .unzip();
        Self { mz, intensity }
    }

    /// Convert the spectrum into a centroid peak list, as used by `mzpeaks`
    pub fn to_peak_set(&self) -> MZPeakSetType<CentroidPeak> {
        let peaks: Vec<_> = self
            .iter()
            .map(|(mz, intensity)| CentroidPeak::new(*mz, *intensity as f32, 0))
            .collect();
        MZPeakSetType::new(peaks)
    }
}

impl FromIterator<(f64, f64)> for Spectrum {
    fn from_iter<T: IntoIterator<Item = (f64, f64)>>(iter: T) -> Self {
        let (mz, intensity) = iter.into_iter().unzip();
        Self { mz, intensity }
    }
}

impl<C: CentroidLike> From<&MZPeakSetType<C>> for Spectrum {
    fn from(peaks: &MZPeakSetType<C>) -> Self {
        peaks
            .iter()
            .map(|p| (p.mz(), p.intensity() as f64))
            .collect()
    }
}

/// Project `source` onto the m/z values in `target`.
///
/// The returned spectrum's m/z array is `target` verbatim. Each position holds the
/// sum of every `source` intensity whose m/z matches it under `rule`, or `0.0` if
/// nothing matches. Repeated values in `target` are each filled independently.
pub fn embed_spectrum(source: &Spectrum, target: &[f64], rule: MassMatch) -> Spectrum {
    let intensity = target
        .iter()
        .map(|t| {
            source
                .iter()
                .filter(|(mz, _)| rule.test(**mz, *t))
                .map(|(_, i)| *i)
                .sum()
        })
        .collect();
    Spectrum {
        mz: target.to_vec(),
        intensity,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
        let step = (stop - start) / (num - 1) as f64;
        (0..num).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn test_length_invariant() {
        let err = Spectrum::new(vec![1.0, 2.0], vec![1.0]).unwrap_err();
        assert_eq!(err, SpectrumError::LengthMismatch { mz: 2, intensity: 1 });
        assert!(Spectrum::new(vec![], vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_embed_spectrum() {
        let n = 10;
        let mz = linspace(0.0, 10.0, n);
        let intensity: Vec<f64> = (0..n).map(|i| i as f64 * 100.0).collect();
        let source = Spectrum::new(mz.clone(), intensity.clone()).unwrap();

        let mut target = mz.clone();
        target.extend([1.334, 3.71]);
        let embedded = embed_spectrum(&source, &target, MassMatch::Exact);

        assert_eq!(embedded.len(), n + 2);
        assert_eq!(embedded.mz(), target.as_slice());
        assert_eq!(embedded.intensity().len(), embedded.mz().len());
        for (i, v) in intensity.iter().enumerate() {
            assert_eq!(embedded.intensity()[i], *v);
        }
        assert_eq!(embedded.intensity()[n], 0.0);
        assert_eq!(embedded.intensity()[n + 1], 0.0);
    }

    #[test]
    fn test_embed_with_tolerance() {
        let source = Spectrum::new(vec![100.02, 101.0], vec![5.0, 2.0]).unwrap();
        let target = [100.0, 101.0, 102.0];
        let exact = embed_spectrum(&source, &target, MassMatch::Exact);
        assert_eq!(exact.intensity(), &[0.0, 2.0, 0.0]);

        let loose = embed_spectrum(&source, &target, MassMatch::Tolerance(0.05));
        assert_eq!(loose.intensity(), &[5.0, 2.0, 0.0]);
    }

    #[test]
    fn test_embed_duplicates() {
        let source = Spectrum::new(vec![100.0, 100.0, 101.0], vec![1.0, 2.0, 4.0]).unwrap();
        let target = [100.0, 100.0, 101.0];
        let embedded = embed_spectrum(&source, &target, MassMatch::Exact);
        assert_eq!(embedded.intensity(), &[3.0, 3.0, 4.0]);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(27.9949, 0), 28.0);
        assert_eq!(round_to(27.9949, 2), 27.99);
        assert_eq!(round_to(0.5, 0), 0.0);
        assert_eq!(round_to(1.5, 0), 2.0);
        assert!((round_to(1234.0, -2) - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn test_contained_in() {
        let grid = [26.0, 27.0, 28.0, 29.0];
        assert!(MassMatch::Exact.contained_in(28.0, &grid));
        assert!(!MassMatch::Exact.contained_in(28.01, &grid));
        assert!(MassMatch::Tolerance(0.02).contained_in(28.01, &grid));
        assert!(!MassMatch::Tolerance(0.02).contained_in(30.0, &grid));
    }

    #[test]
    fn test_peak_set_conversion() {
        let spec = Spectrum::new(vec![201.0, 200.0], vec![10.0, 20.0]).unwrap();
        let peaks = spec.to_peak_set();
        assert_eq!(peaks.len(), 2);
        let back = Spectrum::from(&peaks);
        assert_eq!(back.mz(), &[200.0, 201.0]);
        assert_eq!(back.intensity(), &[20.0, 10.0]);
    }

    #[test]
    fn test_select_mz_range() {
        let spec = Spectrum::new(vec![1.0, 2.0, 3.0, 4.0], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let sub = spec.select_mz_range(1.0, 4.0);
        assert_eq!(sub.mz(), &[2.0, 3.0]);
        assert_eq!(spec.max_intensity(), Some(4.0));
    }
}
