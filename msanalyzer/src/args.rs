use std::fmt::Display;
use std::path::Path;

use clap::ValueEnum;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use msanalysis::{
    abundance::DEFAULT_BIN_WIDTH,
    deconvoluter::{DeconvolutionParams, DEFAULT_CONDITION_THRESHOLD},
    isotopic_model::{IsotopicPatternParams, DEFAULT_IGNORE_BELOW, DEFAULT_ISOTOPE_COUNT, PROTON},
    nnls::DEFAULT_MAX_ITER,
    peak_picking::{PeakParams, DEFAULT_PROMINENCE},
    smoothing::{FilterType, SavitzkyGolayParams},
    spectrum::MassMatch,
};

/// The configuration file read from the working directory if present
pub const DEFAULT_CONFIG_FILE: &str = "msanalyzer.toml";
/// The prefix of environment variables read into an [`AnalysisConfig`]
pub const ENV_PREFIX: &str = "MSANALYZER_";

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgFilter {
    /// Savitzky-Golay smoothing using the configured frame length and polynomial order
    SavitzkyGolay,
}

impl ArgFilter {
    pub fn with_params(self, params: SavitzkyGolayParams) -> FilterType {
        match self {
            ArgFilter::SavitzkyGolay => FilterType::SavitzkyGolay(params),
        }
    }
}

impl Display for ArgFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => write!(f, "{:?}", self),
        }
    }
}

/// The numerical parameters shared by every command.
///
/// Values are layered from the defaults, then [`DEFAULT_CONFIG_FILE`] or an explicit
/// configuration file, then [`ENV_PREFIX`] environment variables, and finally any
/// command line flag that was passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Decimal places isotope and peak masses are rounded to before matching
    pub decimals: i32,
    /// Match rounded masses within this many m/z units instead of exactly
    pub tolerance: Option<f64>,
    pub prominence: f64,
    pub min_height: Option<f64>,
    pub distance: usize,
    pub max_isotopes: u32,
    pub ignore_below: f64,
    pub charge: i32,
    pub charge_carrier: f64,
    pub condition_threshold: f64,
    pub max_iter: usize,
    pub return_embedded: bool,
    pub bin_width: f64,
    /// Smooth profile spectra before peak picking
    pub filter: Option<ArgFilter>,
    pub savitzky_golay: SavitzkyGolayParams,
    /// The number of scans to average abundance traces and contour blocks over
    pub moving_average: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            decimals: 0,
            tolerance: None,
            prominence: DEFAULT_PROMINENCE,
            min_height: None,
            distance: 1,
            max_isotopes: DEFAULT_ISOTOPE_COUNT,
            ignore_below: DEFAULT_IGNORE_BELOW,
            charge: 0,
            charge_carrier: PROTON,
            condition_threshold: DEFAULT_CONDITION_THRESHOLD,
            max_iter: DEFAULT_MAX_ITER,
            return_embedded: false,
            bin_width: DEFAULT_BIN_WIDTH,
            filter: None,
            savitzky_golay: SavitzkyGolayParams::default(),
            moving_average: None,
        }
    }
}

impl AnalysisConfig {
    /// Build the layered configuration source, reading `config_file` after
    /// [`DEFAULT_CONFIG_FILE`] when given.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(DEFAULT_CONFIG_FILE));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file_exact(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(config_file: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(config_file).extract()
    }

    pub fn mass_match(&self) -> MassMatch {
        match self.tolerance {
            Some(tol) => MassMatch::Tolerance(tol),
            None => MassMatch::Exact,
        }
    }

    pub fn peak_params(&self) -> PeakParams {
        PeakParams {
            min_height: self.min_height,
            min_prominence: Some(self.prominence),
            distance: self.distance.max(1),
        }
    }

    pub fn isotopic_params(&self) -> IsotopicPatternParams {
        IsotopicPatternParams::new(
            self.max_isotopes,
            self.ignore_below,
            self.charge,
            self.charge_carrier,
        )
    }

    pub fn filter_type(&self) -> Option<FilterType> {
        self.filter.map(|f| f.with_params(self.savitzky_golay))
    }

    pub fn deconvolution_params(&self) -> DeconvolutionParams {
        DeconvolutionParams {
            decimals: self.decimals,
            mass_match: self.mass_match(),
            peak_params: self.peak_params(),
            isotopic_params: self.isotopic_params(),
            condition_threshold: self.condition_threshold,
            max_iter: self.max_iter,
            return_embedded: self.return_embedded,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_match_library() {
        let config = AnalysisConfig::default();
        assert_eq!(config.deconvolution_params(), DeconvolutionParams::default());
        assert_eq!(config.mass_match(), MassMatch::Exact);
        assert!(config.filter_type().is_none());
    }

    #[test]
    fn test_filter_names_round_trip() {
        let name = ArgFilter::SavitzkyGolay.to_string();
        assert_eq!(name, "savitzky-golay");
        assert_eq!(ArgFilter::from_str(&name, false), Ok(ArgFilter::SavitzkyGolay));
    }

    #[test]
    fn test_layering() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                decimals = 1
                prominence = 0.2
                filter = "savitzky-golay"

                [savitzky_golay]
                frame_length = 7
                polynomial_order = 2
                "#,
            )?;
            jail.create_file("override.toml", "prominence = 0.3\ntolerance = 0.05")?;
            jail.set_env("MSANALYZER_DECIMALS", "2");
            jail.set_env("MSANALYZER_SAVITZKY_GOLAY__POLYNOMIAL_ORDER", "3");

            let config = AnalysisConfig::load(None)?;
            assert_eq!(config.decimals, 2);
            assert_eq!(config.prominence, 0.2);
            assert_eq!(config.filter, Some(ArgFilter::SavitzkyGolay));
            assert_eq!(
                config.savitzky_golay,
                SavitzkyGolayParams {
                    frame_length: 7,
                    polynomial_order: 3
                }
            );

            let config = AnalysisConfig::load(Some(Path::new("override.toml")))?;
            assert_eq!(config.prominence, 0.3);
            assert_eq!(config.mass_match(), MassMatch::Tolerance(0.05));
            assert_eq!(config.bin_width, DEFAULT_BIN_WIDTH);
            Ok(())
        });
    }
}
