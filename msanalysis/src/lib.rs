//! Isotopic pattern generation, peak detection and linear deconvolution of mass spectra
//! into the contributions of known chemical species.
pub mod spectrum;
pub mod isotopic_model;
pub mod peak_picking;
pub mod nnls;
pub mod deconvoluter;
pub mod api;

pub mod abundance;
pub mod smoothing;
pub mod contour;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::api::{deconvolute_spectrum, DeconvolutionEngine};
pub use crate::deconvoluter::{
    DeconvolutionError, DeconvolutionParams, DeconvolutionResult, ZeroCoefficientCause,
};
pub use crate::isotopic_model::{
    calculate_abundance, FormulaIsotopicModel, IsotopicModelError, IsotopicPatternParams,
    IsotopicPatternProvider,
};
pub use crate::peak_picking::{find_ms_peaks, find_peaks, PeakParams};
pub use crate::spectrum::{embed_spectrum, MassMatch, Spectrum, SpectrumError};
