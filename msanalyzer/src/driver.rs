use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use nalgebra::DMatrix;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use msanalysis::{
    abundance::{relative_abundance, ScanSeries, ScanSeriesError},
    contour::contour_grid,
    peak_picking::find_peaks,
    smoothing::{filter_spectrum, moving_average, SmoothingError},
    DeconvolutionEngine, DeconvolutionError, DeconvolutionResult, FormulaIsotopicModel,
    IsotopicModelError, IsotopicPatternProvider, Spectrum, SpectrumError,
};

use crate::args::{AnalysisConfig, ArgFilter};
use crate::input::{read_spectra, read_spectrum, ScanRecord};

#[derive(Debug, Error)]
pub enum MSAnalyzerError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Input file {0} does not exist")]
    InputNotFound(String),
    #[error("No spectrum was found at index {0}")]
    SpectrumNotFound(usize),
    #[error("Failed to decode the arrays of spectrum {0}: {1}")]
    ArrayDecoding(String, String),
    #[error("Failed to parse line {line} of {path}: {reason}")]
    TextParse {
        path: String,
        line: u64,
        reason: String,
    },
    #[error("Failed to read delimited text: {0}")]
    CSVError(#[from] csv::Error),
    #[error(transparent)]
    SpectrumError(#[from] SpectrumError),
    #[error(transparent)]
    IsotopicModelError(#[from] IsotopicModelError),
    #[error(transparent)]
    DeconvolutionError(#[from] DeconvolutionError),
    #[error(transparent)]
    SmoothingError(#[from] SmoothingError),
    #[error(transparent)]
    ScanSeriesError(#[from] ScanSeriesError),
    #[error("Failed to load the configuration: {0}")]
    ConfigurationError(#[from] figment::Error),
    #[error("Failed to encode the output: {0}")]
    JSONError(#[from] serde_json::Error),
    #[error("Failed to encode the configuration: {0}")]
    TOMLError(#[from] toml::ser::Error),
}

/// Isotopic pattern generation, peak picking and species deconvolution of mass spectra.
///
/// Read an mzML, MGF or two-column text file, run one analysis, and write the result
/// as JSON.
#[derive(Parser, Debug)]
#[command(author, version)]
pub struct MSAnalyzer {
    /// A TOML configuration file to read additional parameters from.
    ///
    /// Configurations are also read from `msanalyzer.toml` in the working directory.
    /// Environment variables prefixed with `MSANALYZER_` will be read too.
    #[arg(long = "config-file", global = true)]
    pub config_file: Option<PathBuf>,

    /// The path to write a log file to, in addition to STDERR
    #[arg(short = 'l', long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    /// The path to write the output file to, or if '-' is passed, write to STDOUT
    #[arg(short = 'o', long = "output-file", default_value = "-", global = true)]
    pub output_file: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute the theoretical isotopic pattern of one or more chemical formulae
    Isotopes(IsotopesArgs),
    /// Pick peaks from a profile spectrum
    Peaks(PeaksArgs),
    /// Decompose a profile spectrum into the contributions of candidate species
    Deconvolute(DeconvoluteArgs),
    /// Sum the intensity around target m/z values in every scan
    Abundance(AbundanceArgs),
    /// Prepare an m/z window of a scan series for contour plotting
    Contour(ContourArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug)]
pub struct IsotopesArgs {
    /// The chemical formulae to compute patterns for, e.g. AlCl3
    #[arg(required = true)]
    pub formulas: Vec<String>,

    /// The minimum relative intensity an isotopic peak must exceed to be reported
    #[arg(long = "ignore-below")]
    pub ignore_below: Option<f64>,

    /// The number of isotopic peaks to request
    #[arg(long = "max-isotopes")]
    pub max_isotopes: Option<u32>,

    /// The charge state to report m/z for, 0 for neutral masses
    #[arg(short = 'z', long = "charge", allow_negative_numbers = true)]
    pub charge: Option<i32>,
}

/// Options controlling how a profile spectrum is read and peak picked
#[derive(Args, Debug)]
pub struct SignalArgs {
    /// The index of the spectrum to read
    #[arg(short = 'i', long = "index", default_value_t = 0)]
    pub index: usize,

    /// The minimum prominence of a peak
    #[arg(short = 'p', long = "prominence")]
    pub prominence: Option<f64>,

    /// The minimum height of a peak
    #[arg(long = "height")]
    pub height: Option<f64>,

    /// The minimum separation between peaks, in samples
    #[arg(long = "distance")]
    pub distance: Option<usize>,

    /// Smooth the spectrum before peak picking
    #[arg(short = 'f', long = "filter")]
    pub filter: Option<ArgFilter>,
}

#[derive(Args, Debug)]
pub struct PeaksArgs {
    /// The path to read the input spectrum from
    #[arg()]
    pub input_file: PathBuf,

    #[command(flatten)]
    pub signal: SignalArgs,
}

#[derive(Args, Debug)]
pub struct DeconvoluteArgs {
    /// The path to read the input spectrum from
    #[arg()]
    pub input_file: PathBuf,

    /// The chemical formula of a species present in the mass window, may be repeated
    #[arg(short = 's', long = "species", required = true)]
    pub species: Vec<String>,

    #[command(flatten)]
    pub signal: SignalArgs,

    /// The number of decimal places masses are rounded to before matching
    #[arg(short = 'd', long = "decimals", allow_negative_numbers = true)]
    pub decimals: Option<i32>,

    /// Match rounded masses within this many m/z units instead of exactly
    #[arg(short = 't', long = "tolerance")]
    pub tolerance: Option<f64>,

    /// Report each species' spectrum on the observed peaks rather than its full pattern
    #[arg(short = 'e', long = "embedded")]
    pub embedded: bool,
}

#[derive(Args, Debug)]
pub struct AbundanceArgs {
    /// The path to read the input spectra from
    #[arg()]
    pub input_file: PathBuf,

    /// A target m/z to sum the intensity around, may be repeated
    #[arg(short = 't', long = "target", required = true)]
    pub targets: Vec<f64>,

    /// The half-width of the window summed around each target
    #[arg(short = 'b', long = "bin-width")]
    pub bin_width: Option<f64>,

    /// Average the traces over this many consecutive scans
    #[arg(short = 'm', long = "moving-average")]
    pub moving_average: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ContourArgs {
    /// The path to read the input spectra from. Every scan must share one m/z axis.
    #[arg()]
    pub input_file: PathBuf,

    /// The exclusive lower bound of the m/z window
    #[arg(long = "mz-lower")]
    pub mz_lower: f64,

    /// The exclusive upper bound of the m/z window
    #[arg(long = "mz-upper")]
    pub mz_upper: f64,

    /// Keep every n-th scan
    #[arg(short = 'k', long = "keep-ith-scan", default_value_t = 1)]
    pub keep_ith_scan: usize,

    /// Average the scans over this many consecutive scans before down-sampling
    #[arg(short = 'm', long = "moving-average")]
    pub moving_average: Option<usize>,
}

impl SignalArgs {
    fn apply(&self, config: &mut AnalysisConfig) {
        if let Some(prominence) = self.prominence {
            config.prominence = prominence;
        }
        if self.height.is_some() {
            config.min_height = self.height;
        }
        if let Some(distance) = self.distance {
            config.distance = distance;
        }
        if self.filter.is_some() {
            config.filter = self.filter;
        }
    }
}

impl Command {
    /// Overlay the flags passed on the command line on top of `config`
    pub fn apply(&self, config: &mut AnalysisConfig) {
        match self {
            Command::Isotopes(args) => {
                if let Some(ignore_below) = args.ignore_below {
                    config.ignore_below = ignore_below;
                }
                if let Some(max_isotopes) = args.max_isotopes {
                    config.max_isotopes = max_isotopes;
                }
                if let Some(charge) = args.charge {
                    config.charge = charge;
                }
            }
            Command::Peaks(args) => args.signal.apply(config),
            Command::Deconvolute(args) => {
                args.signal.apply(config);
                if let Some(decimals) = args.decimals {
                    config.decimals = decimals;
                }
                if args.tolerance.is_some() {
                    config.tolerance = args.tolerance;
                }
                if args.embedded {
                    config.return_embedded = true;
                }
            }
            Command::Abundance(args) => {
                if let Some(bin_width) = args.bin_width {
                    config.bin_width = bin_width;
                }
                if args.moving_average.is_some() {
                    config.moving_average = args.moving_average;
                }
            }
            Command::Contour(args) => {
                if args.moving_average.is_some() {
                    config.moving_average = args.moving_average;
                }
            }
            Command::Config => {}
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IsotopePatternRecord {
    pub formula: String,
    pub pattern: Spectrum,
}

#[derive(Debug, Serialize)]
pub struct PickedPeak {
    pub index: usize,
    pub mz: f64,
    pub intensity: f64,
    pub prominence: f64,
}

#[derive(Debug, Serialize)]
pub struct PeakListRecord {
    pub index: usize,
    pub time: f64,
    pub peaks: Vec<PickedPeak>,
}

#[derive(Debug, Serialize)]
pub struct DeconvolutionRecord {
    pub index: usize,
    pub time: f64,
    #[serde(flatten)]
    pub result: DeconvolutionResult,
}

#[derive(Debug, Serialize)]
pub struct AbundanceRecord {
    pub targets: Vec<f64>,
    pub times: Vec<f64>,
    /// One row per scan, one column per target
    pub abundances: Vec<Vec<f64>>,
}

#[derive(Debug, Serialize)]
pub struct ContourRecord {
    pub scan_axis: Vec<usize>,
    pub mz_axis: Vec<f64>,
    /// One row per m/z value, one column per kept scan
    pub intensities: Vec<Vec<f64>>,
}

fn matrix_rows(matrix: &DMatrix<f64>) -> Vec<Vec<f64>> {
    matrix
        .row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}

/// The time at the center of each averaging window
fn window_times(times: &[f64], window: usize) -> Vec<f64> {
    let offset = window.saturating_sub(1) / 2;
    times
        .iter()
        .copied()
        .skip(offset)
        .take(times.len() + 1 - window.min(times.len()))
        .collect()
}

fn prepare_profile(spectrum: Spectrum, config: &AnalysisConfig) -> Result<Spectrum, MSAnalyzerError> {
    match config.filter_type() {
        Some(filter) => {
            debug!("Smoothing spectrum with {filter:?}");
            Ok(filter_spectrum(&spectrum, filter)?)
        }
        None => Ok(spectrum),
    }
}

impl MSAnalyzer {
    /// Load the layered configuration and overlay this invocation's flags
    pub fn configuration(&self) -> Result<AnalysisConfig, MSAnalyzerError> {
        let mut config = AnalysisConfig::load(self.config_file.as_deref())?;
        self.command.apply(&mut config);
        debug!("Configuration: {config:?}");
        Ok(config)
    }

    pub fn main(&self) -> Result<(), MSAnalyzerError> {
        info!(
            "msanalyzer v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
        );
        let config = self.configuration()?;
        match &self.command {
            Command::Isotopes(args) => self.isotopes(args, &config),
            Command::Peaks(args) => self.peaks(args, &config),
            Command::Deconvolute(args) => self.deconvolute(args, &config),
            Command::Abundance(args) => self.abundance(args, &config),
            Command::Contour(args) => self.contour(args, &config),
            Command::Config => {
                let text = toml::to_string_pretty(&config)?;
                self.write_text(&text)
            }
        }
    }

    fn isotopes(&self, args: &IsotopesArgs, config: &AnalysisConfig) -> Result<(), MSAnalyzerError> {
        let mut model = FormulaIsotopicModel::new(config.isotopic_params());
        let records = args
            .formulas
            .iter()
            .map(|formula| {
                let pattern = model.isotopic_pattern(formula)?;
                info!("{formula}: {} isotopic peaks", pattern.len());
                Ok(IsotopePatternRecord {
                    formula: formula.clone(),
                    pattern,
                })
            })
            .collect::<Result<Vec<_>, MSAnalyzerError>>()?;
        self.write_output(&records)
    }

    fn peaks(&self, args: &PeaksArgs, config: &AnalysisConfig) -> Result<(), MSAnalyzerError> {
        let ScanRecord {
            index,
            time,
            spectrum,
        } = read_spectrum(&args.input_file, args.signal.index)?;
        let spectrum = prepare_profile(spectrum, config)?;
        let peaks: Vec<PickedPeak> = find_peaks(spectrum.intensity(), &config.peak_params())
            .into_iter()
            .map(|p| PickedPeak {
                index: p.index,
                mz: spectrum.mz()[p.index],
                intensity: p.height,
                prominence: p.prominence,
            })
            .collect();
        info!("Picked {} peaks from {} points", peaks.len(), spectrum.len());
        self.write_output(&PeakListRecord { index, time, peaks })
    }

    fn deconvolute(&self, args: &DeconvoluteArgs, config: &AnalysisConfig) -> Result<(), MSAnalyzerError> {
        let ScanRecord {
            index,
            time,
            spectrum,
        } = read_spectrum(&args.input_file, args.signal.index)?;
        let spectrum = prepare_profile(spectrum, config)?;

        let mut engine = DeconvolutionEngine::new(config.deconvolution_params());
        let result = engine.deconvolute_spectrum(&spectrum, args.species.as_slice())?;
        for (species, ratio) in result.iter_ratios() {
            info!("Species: {species:18}  Relative ratio: {ratio:.3}");
        }
        info!("Error residual from fitting {:.4}", result.residual);
        self.write_output(&DeconvolutionRecord {
            index,
            time,
            result,
        })
    }

    fn abundance(&self, args: &AbundanceArgs, config: &AnalysisConfig) -> Result<(), MSAnalyzerError> {
        let scans = read_spectra(&args.input_file)?;
        let spectra: Vec<Spectrum> = scans.iter().map(|s| s.spectrum.clone()).collect();
        let mut times: Vec<f64> = scans.iter().map(|s| s.time).collect();
        let mut abundances = relative_abundance(&spectra, &args.targets, config.bin_width);

        if let Some(window) = config.moving_average {
            let table = DMatrix::from_fn(abundances.len(), args.targets.len(), |i, j| {
                abundances[i][j]
            });
            abundances = matrix_rows(&moving_average(&table, window)?);
            times = window_times(&times, window);
        }
        self.write_output(&AbundanceRecord {
            targets: args.targets.clone(),
            times,
            abundances,
        })
    }

    fn contour(&self, args: &ContourArgs, config: &AnalysisConfig) -> Result<(), MSAnalyzerError> {
        let scans = read_spectra(&args.input_file)?;
        let spectra: Vec<Spectrum> = scans.iter().map(|s| s.spectrum.clone()).collect();
        let times: Vec<f64> = scans.iter().map(|s| s.time).collect();
        let mut series = ScanSeries::from_spectra(&spectra, &times)?;

        if let Some(window) = config.moving_average {
            let smoothed = moving_average(series.intensities(), window)?;
            let times = window_times(series.times(), window);
            series = ScanSeries::new(series.mz().to_vec(), smoothed, times)?;
        }
        let grid = contour_grid(&series, args.mz_lower, args.mz_upper, args.keep_ith_scan);
        info!(
            "Contour grid of {} m/z values by {} scans",
            grid.mz_axis.len(),
            grid.scan_axis.len()
        );
        self.write_output(&ContourRecord {
            intensities: matrix_rows(&grid.intensities),
            scan_axis: grid.scan_axis,
            mz_axis: grid.mz_axis,
        })
    }

    fn to_stdout(&self) -> bool {
        self.output_file == Path::new("-")
    }

    fn write_output<T: Serialize>(&self, value: &T) -> Result<(), MSAnalyzerError> {
        if self.to_stdout() {
            let mut handle = io::stdout().lock();
            serde_json::to_writer_pretty(&mut handle, value)?;
            writeln!(handle)?;
        } else {
            let mut handle = io::BufWriter::new(fs::File::create(&self.output_file)?);
            serde_json::to_writer_pretty(&mut handle, value)?;
            writeln!(handle)?;
            handle.flush()?;
            info!("Wrote {}", self.output_file.display());
        }
        Ok(())
    }

    fn write_text(&self, text: &str) -> Result<(), MSAnalyzerError> {
        if self.to_stdout() {
            io::stdout().lock().write_all(text.as_bytes())?;
        } else {
            fs::write(&self.output_file, text)?;
        }
        Ok(())
    }
}
