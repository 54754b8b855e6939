//! Noise reduction along the scan axis of a [`ScanSeries`](crate::abundance::ScanSeries)
//! and along the m/z axis of a single spectrum.
use std::str::FromStr;

use nalgebra::DMatrix;
use thiserror::Error;
use tracing::trace;

use crate::spectrum::Spectrum;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmoothingError {
    #[error("A window of {window} cannot be applied to {len} samples")]
    InvalidWindow { window: usize, len: usize },
    #[error("A frame of length {frame_length} cannot fit a polynomial of order {polynomial_order}, it must be odd and longer than the order")]
    InvalidFrame {
        frame_length: usize,
        polynomial_order: usize,
    },
    #[error("Failed to compute smoothing coefficients: {0}")]
    Coefficients(String),
    #[error("Filter type {0:?} is not implemented")]
    UnknownFilter(String),
}

/// Average each m/z column over a sliding window of `n` consecutive scans.
///
/// `intensities` is `n_scans x n_mz`; the result has `n_scans - n + 1` rows.
pub fn moving_average(intensities: &DMatrix<f64>, n: usize) -> Result<DMatrix<f64>, SmoothingError> {
    let n_scans = intensities.nrows();
    if n == 0 || n > n_scans {
        return Err(SmoothingError::InvalidWindow {
            window: n,
            len: n_scans,
        });
    }
    let n_out = n_scans - n + 1;
    let width = n as f64;
    Ok(DMatrix::from_fn(n_out, intensities.ncols(), |i, j| {
        intensities.view((i, j), (n, 1)).sum() / width
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SavitzkyGolayParams {
    pub frame_length: usize,
    pub polynomial_order: usize,
}

impl Default for SavitzkyGolayParams {
    fn default() -> Self {
        Self {
            frame_length: 11,
            polynomial_order: 4,
        }
    }
}

impl SavitzkyGolayParams {
    /// The convolution weights that evaluate the least squares polynomial fit of a
    /// frame at its center.
    pub fn coefficients(&self) -> Result<Vec<f64>, SmoothingError> {
        let Self {
            frame_length,
            polynomial_order,
        } = *self;
        if frame_length % 2 == 0 || frame_length <= polynomial_order {
            return Err(SmoothingError::InvalidFrame {
                frame_length,
                polynomial_order,
            });
        }
        let half = (frame_length / 2) as f64;
        let vandermonde = DMatrix::from_fn(frame_length, polynomial_order + 1, |i, k| {
            (i as f64 - half).powi(k as i32)
        });
        let pinv = vandermonde
            .pseudo_inverse(f64::EPSILON)
            .map_err(|e| SmoothingError::Coefficients(e.to_string()))?;
        Ok(pinv.row(0).iter().copied().collect())
    }
}

/// Smooth the intensities of `spectrum` with a Savitzky-Golay filter, assuming evenly
/// spaced m/z samples. Points within half a frame of either end are left unchanged.
pub fn savitzky_golay(spectrum: &Spectrum, params: SavitzkyGolayParams) -> Result<Spectrum, SmoothingError> {
    let coefs = params.coefficients()?;
    let data = spectrum.intensity();
    if params.frame_length > data.len() {
        return Err(SmoothingError::InvalidWindow {
            window: params.frame_length,
            len: data.len(),
        });
    }
    trace!("Savitzky-Golay coefficients {coefs:?}");

    let half = params.frame_length / 2;
    let mut smoothed = data.to_vec();
    for (i, window) in data.windows(params.frame_length).enumerate() {
        smoothed[i + half] = window.iter().zip(coefs.iter()).map(|(y, c)| y * c).sum();
    }
    Ok(spectrum.mz().iter().copied().zip(smoothed).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterType {
    SavitzkyGolay(SavitzkyGolayParams),
}

impl Default for FilterType {
    fn default() -> Self {
        Self::SavitzkyGolay(SavitzkyGolayParams::default())
    }
}

impl FromStr for FilterType {
    type Err = SmoothingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "savitzkygolay" | "sg" => Ok(Self::default()),
            _ => Err(SmoothingError::UnknownFilter(s.to_string())),
        }
    }
}

pub fn filter_spectrum(spectrum: &Spectrum, filter: FilterType) -> Result<Spectrum, SmoothingError> {
    match filter {
        FilterType::SavitzkyGolay(params) => savitzky_golay(spectrum, params),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_moving_average() {
        let (n_scans, scan_size) = (111, 22);
        let intensities = DMatrix::from_fn(n_scans, scan_size, |i, _| i as f64);
        let averaged = moving_average(&intensities, 3).unwrap();
        assert_eq!(averaged.shape(), (n_scans - 2, scan_size));
        assert_eq!(averaged, intensities.rows(1, n_scans - 2).into_owned());

        assert_eq!(
            moving_average(&intensities, 0),
            Err(SmoothingError::InvalidWindow { window: 0, len: n_scans })
        );
        assert!(moving_average(&intensities, n_scans + 1).is_err());
        assert_eq!(moving_average(&intensities, n_scans).unwrap().nrows(), 1);
    }

    #[test]
    fn test_coefficients() {
        let coefs = SavitzkyGolayParams {
            frame_length: 5,
            polynomial_order: 2,
        }
        .coefficients()
        .unwrap();
        let expected = [-3.0, 12.0, 17.0, 12.0, -3.0].map(|c| c / 35.0);
        for (c, e) in coefs.iter().zip(expected) {
            assert!((c - e).abs() < 1e-12);
        }
        assert!(SavitzkyGolayParams {
            frame_length: 4,
            polynomial_order: 2
        }
        .coefficients()
        .is_err());
    }

    #[test]
    fn test_preserves_polynomials() {
        let mz: Vec<f64> = (0..40).map(|i| 100.0 + i as f64 * 0.1).collect();
        let intensity: Vec<f64> = (0..40)
            .map(|i| {
                let x = i as f64;
                0.01 * x.powi(4) - x.powi(3) + 2.0 * x + 1.0
            })
            .collect();
        let spectrum = Spectrum::new(mz, intensity.clone()).unwrap();
        let smoothed = filter_spectrum(&spectrum, FilterType::default()).unwrap();
        assert_eq!(smoothed.mz(), spectrum.mz());
        for (s, y) in smoothed.intensity().iter().zip(intensity.iter()) {
            assert!((s - y).abs() < 1e-4, "{s} != {y}");
        }
    }

    #[test]
    fn test_smooths_noise() {
        let mz: Vec<f64> = (0..31).map(|i| i as f64).collect();
        let intensity: Vec<f64> = (0..31).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let spectrum = Spectrum::new(mz, intensity).unwrap();
        let smoothed = savitzky_golay(&spectrum, SavitzkyGolayParams::default()).unwrap();
        // Edges are untouched
        assert_eq!(smoothed.intensity()[0], 1.0);
        assert_eq!(smoothed.intensity()[30], 1.0);
        assert!(smoothed.intensity()[15].abs() < 1.0);

        let short = Spectrum::new(vec![1.0, 2.0], vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            savitzky_golay(&short, SavitzkyGolayParams::default()),
            Err(SmoothingError::InvalidWindow { .. })
        ));
        assert_eq!("SavitzkyGolay".parse::<FilterType>(), Ok(FilterType::default()));
        assert!("Gaussian".parse::<FilterType>().is_err());
    }
}
