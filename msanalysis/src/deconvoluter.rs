//! Linear deconvolution of a composite spectrum into the contributions of a set of
//! candidate species.
//!
//! Every candidate's isotopic pattern is rounded onto a common mass grid. The peaks
//! detected in the composite spectrum that land on that grid become the observations
//! `b`, each candidate's pattern embedded on those peaks becomes a column of `A`, and
//! the non-negative solution of `A x = b` gives the abundance of each candidate.
use std::fmt::Display;

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::isotopic_model::{IsotopicModelError, IsotopicPatternParams, IsotopicPatternProvider};
use crate::nnls::{condition_number, nnls, NnlsError, DEFAULT_MAX_ITER};
use crate::peak_picking::{find_ms_peaks, PeakParams, DEFAULT_PROMINENCE};
use crate::spectrum::{embed_spectrum, MassMatch, Spectrum};

/// The condition number of the coefficient matrix above which a warning is emitted
pub const DEFAULT_CONDITION_THRESHOLD: f64 = 1000.0;

/// Parameters controlling [`deconvolute`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeconvolutionParams {
    /// The number of decimal places isotope and peak masses are rounded to before matching
    pub decimals: i32,
    /// How rounded peak masses are matched against rounded isotope masses
    pub mass_match: MassMatch,
    /// Peak detection parameters applied to the composite spectrum
    pub peak_params: PeakParams,
    /// Parameters for generating each species' isotopic pattern
    pub isotopic_params: IsotopicPatternParams,
    /// A coefficient matrix with a larger condition number is reported as ill-conditioned
    pub condition_threshold: f64,
    /// The iteration budget of the NNLS solver
    pub max_iter: usize,
    /// Return each species' spectrum embedded on the observed peaks instead of its
    /// full isotopic pattern
    pub return_embedded: bool,
}

impl Default for DeconvolutionParams {
    fn default() -> Self {
        Self {
            decimals: 0,
            mass_match: MassMatch::Exact,
            peak_params: PeakParams::with_prominence(DEFAULT_PROMINENCE),
            isotopic_params: IsotopicPatternParams::default(),
            condition_threshold: DEFAULT_CONDITION_THRESHOLD,
            max_iter: DEFAULT_MAX_ITER,
            return_embedded: false,
        }
    }
}

impl DeconvolutionParams {
    pub fn new(decimals: i32, return_embedded: bool) -> Self {
        Self {
            decimals,
            return_embedded,
            ..Default::default()
        }
    }
}

/// Why a species was assigned no abundance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ZeroCoefficientCause {
    /// None of the species' isotopes matched an observed peak, so it was not in the
    /// sampled mass window or its peaks were not detected
    NotObserved,
    /// Some of the species' isotopes were observed but the fit gave it no weight
    Unresolved,
}

impl Display for ZeroCoefficientCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotObserved => write!(f, "none of its isotopes were among the observed peaks"),
            Self::Unresolved => write!(f, "its observed isotopes are explained by the other species"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeconvolutionError {
    #[error("No candidate species were provided")]
    NoSpecies,
    #[error("Failed to generate an isotopic pattern: {0}")]
    IsotopicModel(#[from] IsotopicModelError),
    #[error("No detected peak matched an isotopic peak of any candidate species")]
    NoObservedPeaks,
    #[error("Species {species} (#{index}) has a linear coefficient of 0: {cause}")]
    ZeroCoefficient {
        species: String,
        index: usize,
        cause: ZeroCoefficientCause,
    },
    #[error("Failed to solve the least squares problem: {0}")]
    Solver(#[from] NnlsError),
}

/// The outcome of a successful deconvolution
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeconvolutionResult {
    /// The candidate species, in the order they were given
    pub species: Vec<String>,
    /// Each species' coefficient divided by the largest coefficient
    pub ratios: Vec<f64>,
    /// The raw NNLS coefficients
    pub coefficients: Vec<f64>,
    /// The residual norm of the fit
    pub residual: f64,
    /// The 2-norm condition number of the coefficient matrix
    pub condition_number: f64,
    /// The rounded masses of the detected peaks that were used as observations
    pub observed_mz: Vec<f64>,
    /// One spectrum per species, scaled by its coefficient
    pub spectra: Vec<Spectrum>,
}

impl DeconvolutionResult {
    /// Iterate over `(species, ratio)` pairs
    pub fn iter_ratios(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.species
            .iter()
            .map(|s| s.as_str())
            .zip(self.ratios.iter().copied())
    }

    /// Sum the per-species spectra into a single stick spectrum on their shared grid
    pub fn reconstructed(&self) -> Spectrum {
        let grid = unified_mass_grid(&self.spectra);
        let mut total = vec![0.0; grid.len()];
        for spec in self.spectra.iter() {
            let embedded = embed_spectrum(spec, &grid, MassMatch::Exact);
            total
                .iter_mut()
                .zip(embedded.intensity())
                .for_each(|(t, i)| *t += i);
        }
        Spectrum::new(grid, total).unwrap_or_default()
    }
}

/// The sorted, de-duplicated union of the m/z values of every pattern
pub fn unified_mass_grid(patterns: &[Spectrum]) -> Vec<f64> {
    patterns
        .iter()
        .flat_map(|p| p.mz().iter().copied())
        .sorted_by(f64::total_cmp)
        .dedup()
        .collect()
}

/// Detect the peaks of `spectrum`, round their masses, and keep those on `grid`,
/// preserving detection order.
pub fn observed_peaks(spectrum: &Spectrum, grid: &[f64], params: &DeconvolutionParams) -> Spectrum {
    let mut peaks = find_ms_peaks(spectrum, &params.peak_params);
    peaks.round_mz(params.decimals);
    debug!("Detected peaks {:?}", peaks.mz());
    peaks
        .iter()
        .filter(|(mz, _)| params.mass_match.contained_in(**mz, grid))
        .map(|(mz, i)| (*mz, *i))
        .collect()
}

/// Assemble the coefficient matrix whose columns are `embedded` spectra's intensities
fn coefficient_matrix(embedded: &[Spectrum], n_rows: usize) -> DMatrix<f64> {
    let mut a = DMatrix::zeros(n_rows, embedded.len());
    for (j, spec) in embedded.iter().enumerate() {
        a.set_column(j, &DVector::from_column_slice(spec.intensity()));
    }
    a
}

/// Decompose `spectrum` into the scaled isotopic patterns of `species`.
///
/// Every species must receive a non-zero coefficient, otherwise the first species
/// without one is reported as a [`DeconvolutionError::ZeroCoefficient`].
pub fn deconvolute<P: IsotopicPatternProvider, S: AsRef<str>>(
    provider: &mut P,
    spectrum: &Spectrum,
    species: &[S],
    params: &DeconvolutionParams,
) -> Result<DeconvolutionResult, DeconvolutionError> {
    if species.is_empty() {
        return Err(DeconvolutionError::NoSpecies);
    }

    let patterns: Vec<Spectrum> = species
        .iter()
        .map(|sp| {
            provider.isotopic_pattern(sp.as_ref()).map(|mut pattern| {
                pattern.round_mz(params.decimals);
                pattern
            })
        })
        .collect::<Result<_, _>>()?;

    let grid = unified_mass_grid(&patterns);
    debug!("Unified mass grid {grid:?}");

    let observed = observed_peaks(spectrum, &grid, params);
    if observed.is_empty() {
        return Err(DeconvolutionError::NoObservedPeaks);
    }
    debug!("Peaks from the composite spectrum {:?}", observed.mz());

    let embedded: Vec<Spectrum> = patterns
        .iter()
        .map(|p| embed_spectrum(p, observed.mz(), params.mass_match))
        .collect();

    let a = coefficient_matrix(&embedded, observed.len());
    let b = DVector::from_column_slice(observed.intensity());
    debug!("Coefficient matrix A: {a}");

    let cond = condition_number(&a);
    debug!("Condition number of A {cond:.3}");
    if cond > params.condition_threshold {
        warn!(
            "The coefficient matrix is ill-conditioned (condition number {cond:.3} > {})",
            params.condition_threshold
        );
    }

    let solution = nnls(&a, &b, params.max_iter)?;
    let x = solution.x;

    let max_coef = x.max();
    let ratios: Vec<f64> = x.iter().map(|v| v / max_coef).collect();
    for (i, sp) in species.iter().enumerate() {
        debug!(
            "Species: {:18} Relative ratio: {:.3}  Abs. ratio {:.3}",
            sp.as_ref(),
            ratios[i],
            x[i]
        );
    }
    debug!("Error residual from fitting {:.4}", solution.residual);

    let mut first_zero = None;
    for (i, sp) in species.iter().enumerate() {
        if x[i] != 0.0 {
            continue;
        }
        let cause = if a.column(i).iter().all(|v| *v == 0.0) {
            ZeroCoefficientCause::NotObserved
        } else {
            ZeroCoefficientCause::Unresolved
        };
        error!(
            "Species {} has a linear coefficient of 0: {cause}",
            sp.as_ref()
        );
        if first_zero.is_none() {
            first_zero = Some(DeconvolutionError::ZeroCoefficient {
                species: sp.as_ref().to_string(),
                index: i,
                cause,
            });
        }
    }
    if let Some(err) = first_zero {
        return Err(err);
    }

    let retained = if params.return_embedded {
        embedded
    } else {
        patterns
    };
    let spectra = retained
        .into_iter()
        .zip(x.iter())
        .map(|(spec, coef)| spec.scaled(*coef))
        .collect();

    Ok(DeconvolutionResult {
        species: species.iter().map(|s| s.as_ref().to_string()).collect(),
        ratios,
        coefficients: x.iter().copied().collect(),
        residual: solution.residual,
        condition_number: cond,
        observed_mz: observed.mz().to_vec(),
        spectra,
    })
}
