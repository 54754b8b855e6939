mod args;
mod driver;
mod input;

pub use crate::args::{AnalysisConfig, ArgFilter, DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use crate::driver::{
    AbundanceRecord, Command, ContourRecord, DeconvolutionRecord, IsotopePatternRecord,
    MSAnalyzer, MSAnalyzerError, PeakListRecord, PickedPeak,
};
pub use crate::input::{read_spectra, read_spectrum, read_text_spectrum, ScanRecord};
