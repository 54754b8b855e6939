//! Detect local maxima in profile spectra and reduce them to stick spectra.
//!
//! A peak is a sample strictly higher than both neighbors, or the midpoint of a flat
//! run whose edges are both strictly lower. Its prominence is its height above the
//! higher of the two lowest points reached on either side before the signal climbs
//! above the peak again or runs out. Filters are applied in the order height,
//! prominence, distance.
use tracing::trace;

use crate::spectrum::Spectrum;

/// The prominence used by [`crate::api::DeconvolutionEngine`] unless configured otherwise
pub const DEFAULT_PROMINENCE: f64 = 0.05;

/// A detected local maximum
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectedPeak {
    /// Index of the peak in the input array
    pub index: usize,
    /// The value at `index`
    pub height: f64,
    /// Height above the higher of the two surrounding valleys
    pub prominence: f64,
    pub left_base: usize,
    pub right_base: usize,
}

/// Configuration for peak detection
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeakParams {
    /// Minimum absolute peak height
    pub min_height: Option<f64>,
    /// Minimum prominence
    pub min_prominence: Option<f64>,
    /// Minimum separation between retained peaks, in samples. The taller peak wins.
    pub distance: usize,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self {
            min_height: None,
            min_prominence: None,
            distance: 1,
        }
    }
}

impl PeakParams {
    pub fn with_prominence(prominence: f64) -> Self {
        Self {
            min_prominence: Some(prominence),
            ..Default::default()
        }
    }
}

/// Find the peaks of `data` that pass `params`, sorted by index
pub fn find_peaks(data: &[f64], params: &PeakParams) -> Vec<DetectedPeak> {
    if data.len() < 3 {
        return Vec::new();
    }

    let mut candidates = local_maxima(data);

    if let Some(min_h) = params.min_height {
        candidates.retain(|&idx| data[idx] >= min_h);
    }

    let mut peaks: Vec<DetectedPeak> = candidates
        .into_iter()
        .map(|idx| peak_prominence(data, idx))
        .collect();

    if let Some(min_p) = params.min_prominence {
        peaks.retain(|p| p.prominence >= min_p);
    }

    if params.distance > 1 {
        peaks = filter_by_distance(peaks, params.distance);
    }

    trace!("Detected {} peaks in {} points", peaks.len(), data.len());
    peaks
}

/// Reduce `spectrum` to the stick spectrum of its detected peaks, preserving input order
pub fn find_ms_peaks(spectrum: &Spectrum, params: &PeakParams) -> Spectrum {
    let indices: Vec<usize> = find_peaks(spectrum.intensity(), params)
        .into_iter()
        .map(|p| p.index)
        .collect();
    spectrum.select_indices(&indices)
}

fn local_maxima(data: &[f64]) -> Vec<usize> {
    let mut maxima = Vec::new();
    let n = data.len();
    let mut i = 1;
    while i < n - 1 {
        if data[i - 1] < data[i] {
            let start = i;
            // Walk across a plateau
            let mut end = i;
            while end + 1 < n - 1 && data[end + 1] == data[i] {
                end += 1;
            }
            if data[end + 1] < data[end] {
                maxima.push((start + end) / 2);
            }
            i = end + 1;
        } else {
            i += 1;
        }
    }
    maxima
}

fn peak_prominence(data: &[f64], peak_idx: usize) -> DetectedPeak {
    let height = data[peak_idx];

    let mut left_min = height;
    let mut left_base = peak_idx;
    for i in (0..peak_idx).rev() {
        if data[i] > height {
            break;
        }
        if data[i] < left_min {
            left_min = data[i];
            left_base = i;
        }
    }

    let mut right_min = height;
    let mut right_base = peak_idx;
    for (i, &val) in data.iter().enumerate().skip(peak_idx + 1) {
        if val > height {
            break;
        }
        if val < right_min {
            right_min = val;
            right_base = i;
        }
    }

    DetectedPeak {
        index: peak_idx,
        height,
        prominence: height - left_min.max(right_min),
        left_base,
        right_base,
    }
}

fn filter_by_distance(peaks: Vec<DetectedPeak>, distance: usize) -> Vec<DetectedPeak> {
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|a, b| peaks[*b].height.total_cmp(&peaks[*a].height));

    let mut keep = vec![true; peaks.len()];
    for (pos, &i) in order.iter().enumerate() {
        if !keep[i] {
            continue;
        }
        for &j in order[pos + 1..].iter() {
            if keep[j] && peaks[i].index.abs_diff(peaks[j].index) < distance {
                keep[j] = false;
            }
        }
    }

    peaks
        .into_iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(p))
        .collect()
}
