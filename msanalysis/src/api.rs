//! * High level APIs for running deconvolution operations
use crate::deconvoluter::{deconvolute, DeconvolutionError, DeconvolutionParams, DeconvolutionResult};
use crate::isotopic_model::{FormulaIsotopicModel, IsotopicPatternProvider};
use crate::spectrum::Spectrum;

/// A single-shot deconvolution of `spectrum` against the candidate `species`,
/// generating isotopic patterns with a [`FormulaIsotopicModel`] configured from
/// `params.isotopic_params`.
///
/// # Arguments
/// - `spectrum`: The composite profile spectrum to decompose
/// - `species`: The chemical formulae of every species expected in the mass window, e.g. `["AlF3", "AlOF2"]`
/// - `params`: The rounding precision, matching rule, peak detection and solver parameters
///
/// # Note
/// If you are calling this function with the same parameters on many spectra, it
/// may be preferable to create a [`DeconvolutionEngine`] and call its identically named method.
pub fn deconvolute_spectrum<S: AsRef<str>>(
    spectrum: &Spectrum,
    species: &[S],
    params: DeconvolutionParams,
) -> Result<DeconvolutionResult, DeconvolutionError> {
    let mut engine = DeconvolutionEngine::new(params);
    engine.deconvolute_spectrum(spectrum, species)
}

/// Owns a set of [`DeconvolutionParams`] and the [`IsotopicPatternProvider`] used
/// to generate candidate patterns, so that many spectra can be processed with the
/// same configuration.
#[derive(Debug, Clone)]
pub struct DeconvolutionEngine<P: IsotopicPatternProvider> {
    /// The parameters applied to every spectrum
    pub params: DeconvolutionParams,
    provider: P,
}

impl DeconvolutionEngine<FormulaIsotopicModel> {
    /// Create an engine backed by a [`FormulaIsotopicModel`] using `params.isotopic_params`
    pub fn new(params: DeconvolutionParams) -> Self {
        let provider = FormulaIsotopicModel::new(params.isotopic_params);
        Self { params, provider }
    }
}

impl Default for DeconvolutionEngine<FormulaIsotopicModel> {
    fn default() -> Self {
        Self::new(DeconvolutionParams::default())
    }
}

impl<P: IsotopicPatternProvider> DeconvolutionEngine<P> {
    pub fn with_provider(provider: P, params: DeconvolutionParams) -> Self {
        Self { params, provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Decompose `spectrum` into the scaled isotopic patterns of `species`
    ///
    /// # See also
    /// [`deconvolute`](crate::deconvoluter::deconvolute)
    pub fn deconvolute_spectrum<S: AsRef<str>>(
        &mut self,
        spectrum: &Spectrum,
        species: &[S],
    ) -> Result<DeconvolutionResult, DeconvolutionError> {
        deconvolute(&mut self.provider, spectrum, species, &self.params)
    }
}
