/*! Isotopic models for generating isotopic patterns from chemical formulae */
use std::collections::HashMap;

use chemical_elements::{mass_charge_ratio, ChemicalComposition, Element, PERIODIC_TABLE, PROTON as _PROTON};
use thiserror::Error;
use tracing::debug;

use crate::spectrum::Spectrum;

/// The mass of H+, a hydrogen atom minus an electron
pub const PROTON: f64 = _PROTON;

/// The mass difference between 13C and 12C, used as the spacing between
/// aggregated isotopic peaks
pub const ISOTOPIC_SPACING: f64 = 1.0033548378;

/// The number of isotopic peaks computed unless told otherwise
pub const DEFAULT_ISOTOPE_COUNT: u32 = 100;

/// The default minimum relative intensity an isotopic peak must exceed to be kept
pub const DEFAULT_IGNORE_BELOW: f64 = 1e-4;

/// An error that might occur while generating an isotopic pattern
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IsotopicModelError {
    #[error("Could not interpret {formula:?} as a chemical formula: {reason}")]
    InvalidFormula { formula: String, reason: String },
    #[error("No isotopic peak of {formula:?} exceeded the intensity threshold {ignore_below}")]
    EmptyPattern { formula: String, ignore_below: f64 },
}

/// A package of parameters used to generate isotopic patterns
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsotopicPatternParams {
    /// The number of aggregated isotopic peaks to compute, starting from the lightest
    pub max_isotopes: u32,
    /// The relative intensity a peak must exceed to be kept
    pub ignore_below: f64,
    /// The charge state to compute m/z for, `0` meaning neutral masses
    pub charge: i32,
    /// The mass of the charge carrier, e.g. proton mass
    pub charge_carrier: f64,
}

impl Default for IsotopicPatternParams {
    fn default() -> Self {
        Self {
            max_isotopes: DEFAULT_ISOTOPE_COUNT,
            ignore_below: DEFAULT_IGNORE_BELOW,
            charge: 0,
            charge_carrier: PROTON,
        }
    }
}

impl IsotopicPatternParams {
    pub fn new(max_isotopes: u32, ignore_below: f64, charge: i32, charge_carrier: f64) -> Self {
        Self {
            max_isotopes,
            ignore_below,
            charge,
            charge_carrier,
        }
    }
}

/// The capability to produce the theoretical isotopic pattern of a chemical species
pub trait IsotopicPatternProvider {
    /// Generate the isotopic pattern for `formula`, e.g. `"AlCl3"`.
    ///
    /// The returned spectrum is sorted by ascending m/z and its intensities are relative
    /// abundances.
    fn isotopic_pattern(&mut self, formula: &str) -> Result<Spectrum, IsotopicModelError>;
}

/// The coarse isotopic distribution of a single element or composition.
///
/// `abundance[k]` is the probability of the species weighing `k` nominal mass units more
/// than its lightest form, whose mass is `lightest_mass`.
#[derive(Debug, Clone, PartialEq)]
struct NominalDistribution {
    lightest_mass: f64,
    abundance: Vec<f64>,
}

impl NominalDistribution {
    fn unit() -> Self {
        Self {
            lightest_mass: 0.0,
            abundance: vec![1.0],
        }
    }

    /// Build the distribution of `element`, or of only its `isotope` when non-zero
    fn from_element(element: &Element, isotope: u16) -> Option<Self> {
        if isotope != 0 {
            return element.isotopes.get(&isotope).map(|iso| Self {
                lightest_mass: iso.mass,
                abundance: vec![1.0],
            });
        }
        let mut isotopes: Vec<(u16, f64, f64)> = element
            .isotopes
            .iter()
            .filter(|(number, iso)| **number != 0 && iso.abundance > 0.0)
            .map(|(number, iso)| (*number, iso.mass, iso.abundance))
            .collect();
        isotopes.sort_by_key(|(number, _, _)| *number);

        let (Some(lightest), Some(heaviest)) = (isotopes.first(), isotopes.last()) else {
            return Some(Self {
                lightest_mass: element.most_abundant_mass,
                abundance: vec![1.0],
            });
        };
        let mut abundance = vec![0.0; (heaviest.0 - lightest.0) as usize + 1];
        let total: f64 = isotopes.iter().map(|(_, _, a)| a).sum();
        for (number, _, a) in isotopes.iter() {
            abundance[(number - lightest.0) as usize] = a / total;
        }
        Some(Self {
            lightest_mass: lightest.1,
            abundance,
        })
    }

    /// The distribution of two independent species combined, truncated to `limit` peaks
    fn convolve(&self, other: &Self, limit: usize) -> Self {
        let len = (self.abundance.len() + other.abundance.len() - 1).min(limit);
        let mut abundance = vec![0.0; len];
        for (i, a) in self.abundance.iter().enumerate().take(len) {
            for (j, b) in other.abundance.iter().enumerate().take(len - i) {
                abundance[i + j] += a * b;
            }
        }
        Self {
            lightest_mass: self.lightest_mass + other.lightest_mass,
            abundance,
        }
    }

    /// The distribution of `count` copies of this species
    fn power(&self, mut count: u32, limit: usize) -> Self {
        let mut result = Self::unit();
        let mut base = self.clone();
        while count > 0 {
            if count & 1 == 1 {
                result = result.convolve(&base, limit);
            }
            count >>= 1;
            if count > 0 {
                base = base.convolve(&base, limit);
            }
        }
        result
    }
}

/// An [`IsotopicPatternProvider`] that parses a formula into an elemental composition and
/// computes its coarse isotopic distribution.
///
/// Isotopes are aggregated by nominal mass: peak `k` sits at the mass of the lightest
/// isotopic form plus `k` times [`ISOTOPIC_SPACING`], and the intensities are probabilities
/// summing to one before thresholding.
#[derive(Debug, Clone, Default)]
pub struct FormulaIsotopicModel {
    pub params: IsotopicPatternParams,
    element_cache: HashMap<(String, u16), NominalDistribution>,
}

impl FormulaIsotopicModel {
    pub fn new(params: IsotopicPatternParams) -> Self {
        Self {
            params,
            element_cache: HashMap::new(),
        }
    }

    /// Parse `formula` into an elemental composition
    pub fn parse_formula(formula: &str) -> Result<ChemicalComposition<'static>, IsotopicModelError> {
        let formula_text = formula.trim();
        if formula_text.is_empty() {
            return Err(IsotopicModelError::InvalidFormula {
                formula: formula.to_string(),
                reason: "the formula is empty".to_string(),
            });
        }
        if let Some(symbol) = unknown_element_symbol(formula_text) {
            return Err(IsotopicModelError::InvalidFormula {
                formula: formula.to_string(),
                reason: format!("unknown element {symbol:?}"),
            });
        }
        formula_text
            .parse::<ChemicalComposition>()
            .map_err(|e| IsotopicModelError::InvalidFormula {
                formula: formula.to_string(),
                reason: format!("{e:?}"),
            })
    }

    fn element_distribution(
        &mut self,
        element: &Element,
        isotope: u16,
    ) -> Option<&NominalDistribution> {
        let key = (element.symbol.clone(), isotope);
        if !self.element_cache.contains_key(&key) {
            let dist = NominalDistribution::from_element(element, isotope)?;
            self.element_cache.insert(key.clone(), dist);
        }
        self.element_cache.get(&key)
    }

    fn coarse_distribution(
        &mut self,
        formula: &str,
        composition: &ChemicalComposition<'static>,
    ) -> Result<NominalDistribution, IsotopicModelError> {
        let limit = self.params.max_isotopes.max(1) as usize;
        let mut elements: Vec<(&Element, u16, i32)> = composition
            .iter()
            .map(|(spec, count)| (spec.element, spec.isotope, *count))
            .collect();
        elements.sort_by(|a, b| a.0.symbol.cmp(&b.0.symbol).then(a.1.cmp(&b.1)));

        let mut total = NominalDistribution::unit();
        for (element, isotope, count) in elements {
            if count < 0 {
                return Err(IsotopicModelError::InvalidFormula {
                    formula: formula.to_string(),
                    reason: format!("{} has a negative count {count}", element.symbol),
                });
            }
            let part = self
                .element_distribution(element, isotope)
                .ok_or_else(|| IsotopicModelError::InvalidFormula {
                    formula: formula.to_string(),
                    reason: format!("{} has no isotope {isotope}", element.symbol),
                })?
                .power(count as u32, limit);
            total = total.convolve(&part, limit);
        }

        let norm: f64 = total.abundance.iter().sum();
        if norm > 0.0 {
            total.abundance.iter_mut().for_each(|a| *a /= norm);
        }
        Ok(total)
    }
}

/// The first element symbol in `formula` missing from the periodic table
fn unknown_element_symbol(formula: &str) -> Option<&str> {
    let bytes = formula.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_uppercase() {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_lowercase() {
                i += 1;
            }
            let symbol = &formula[start..i];
            if PERIODIC_TABLE.get(symbol).is_none() {
                return Some(symbol);
            }
        } else {
            i += 1;
        }
    }
    None
}

impl IsotopicPatternProvider for FormulaIsotopicModel {
    fn isotopic_pattern(&mut self, formula: &str) -> Result<Spectrum, IsotopicModelError> {
        let composition = Self::parse_formula(formula)?;
        let dist = self.coarse_distribution(formula, &composition)?;
        let IsotopicPatternParams {
            ignore_below,
            charge,
            charge_carrier,
            ..
        } = self.params;

        let peaks: Vec<(f64, f64)> = dist
            .abundance
            .iter()
            .enumerate()
            .filter(|(_, a)| **a > ignore_below)
            .map(|(k, a)| {
                let mass = dist.lightest_mass + k as f64 * ISOTOPIC_SPACING;
                let mz = if charge == 0 {
                    mass
                } else {
                    mass_charge_ratio(mass, charge, charge_carrier)
                };
                (mz, *a)
            })
            .collect();

        if peaks.is_empty() {
            return Err(IsotopicModelError::EmptyPattern {
                formula: formula.to_string(),
                ignore_below,
            });
        }

        debug!("Isotopes for {formula}");
        for (mz, intensity) in peaks.iter() {
            debug!("{mz:>10.4}  {intensity:6.4}");
        }

        Ok(peaks.into_iter().collect())
    }
}

impl<P: IsotopicPatternProvider + ?Sized> IsotopicPatternProvider for &mut P {
    fn isotopic_pattern(&mut self, formula: &str) -> Result<Spectrum, IsotopicModelError> {
        (**self).isotopic_pattern(formula)
    }
}

/// Compute the isotopic pattern of `formula` using the default [`FormulaIsotopicModel`]
/// with the given intensity threshold.
pub fn calculate_abundance(formula: &str, ignore_below: f64) -> Result<Spectrum, IsotopicModelError> {
    let params = IsotopicPatternParams {
        ignore_below,
        ..Default::default()
    };
    FormulaIsotopicModel::new(params).isotopic_pattern(formula)
}
