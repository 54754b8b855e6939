use std::fs;
use std::path::Path;

use mzdata::io::MZReader;
use mzdata::prelude::*;
use mzdata::spectrum::MultiLayerSpectrum;
use tracing::{debug, info};

use msanalysis::Spectrum;

use crate::driver::MSAnalyzerError;

/// Extensions read as two-column delimited text rather than through `mzdata`
const TEXT_EXTENSIONS: &[&str] = &["txt", "csv", "tsv", "xy", "dat"];

/// One scan read from an input file
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub index: usize,
    pub time: f64,
    pub spectrum: Spectrum,
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn check_exists(path: &Path) -> Result<(), MSAnalyzerError> {
    if path.exists() {
        Ok(())
    } else {
        Err(MSAnalyzerError::InputNotFound(path.display().to_string()))
    }
}

/// Read every scan in `path`
pub fn read_spectra(path: &Path) -> Result<Vec<ScanRecord>, MSAnalyzerError> {
    check_exists(path)?;
    if is_text_file(path) {
        let spectrum = read_text_spectrum(path)?;
        return Ok(vec![ScanRecord {
            index: 0,
            time: 0.0,
            spectrum,
        }]);
    }
    let reader = MZReader::open_path(path)?;
    let scans = reader
        .map(|spec| scan_record(&spec))
        .collect::<Result<Vec<_>, _>>()?;
    info!("Read {} spectra from {}", scans.len(), path.display());
    Ok(scans)
}

/// Read the scan at `index` in `path`
pub fn read_spectrum(path: &Path, index: usize) -> Result<ScanRecord, MSAnalyzerError> {
    check_exists(path)?;
    if is_text_file(path) {
        if index != 0 {
            return Err(MSAnalyzerError::SpectrumNotFound(index));
        }
        let spectrum = read_text_spectrum(path)?;
        return Ok(ScanRecord {
            index,
            time: 0.0,
            spectrum,
        });
    }
    let mut reader = MZReader::open_path(path)?;
    let spec = reader
        .get_spectrum_by_index(index)
        .ok_or(MSAnalyzerError::SpectrumNotFound(index))?;
    scan_record(&spec)
}

fn scan_record(spec: &MultiLayerSpectrum) -> Result<ScanRecord, MSAnalyzerError> {
    let spectrum = if let Some(arrays) = spec.arrays.as_ref() {
        let mzs = arrays
            .mzs()
            .map_err(|e| MSAnalyzerError::ArrayDecoding(spec.id().to_string(), e.to_string()))?;
        let intensities = arrays
            .intensities()
            .map_err(|e| MSAnalyzerError::ArrayDecoding(spec.id().to_string(), e.to_string()))?;
        Spectrum::new(
            mzs.to_vec(),
            intensities.iter().map(|i| *i as f64).collect(),
        )?
    } else if let Some(peaks) = spec.peaks.as_ref() {
        Spectrum::from(peaks)
    } else {
        Spectrum::empty()
    };
    debug!("{} has {} points", spec.id(), spectrum.len());
    Ok(ScanRecord {
        index: spec.index(),
        time: spec.start_time(),
        spectrum,
    })
}

fn sniff_delimiter(content: &str) -> u8 {
    let first = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .unwrap_or_default();
    if first.contains(',') {
        b','
    } else if first.contains('\t') {
        b'\t'
    } else if first.contains(';') {
        b';'
    } else {
        b' '
    }
}

/// Read a two-column m/z, intensity text export. Comment lines starting with `#` and
/// non-numeric lines before the first data row are skipped.
pub fn read_text_spectrum(path: &Path) -> Result<Spectrum, MSAnalyzerError> {
    let content = fs::read_to_string(path)?;
    let delimiter = sniff_delimiter(&content);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut points = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
        let parsed = match fields.as_slice() {
            [mz, intensity, ..] => match (mz.parse::<f64>(), intensity.parse::<f64>()) {
                (Ok(mz), Ok(intensity)) => Ok((mz, intensity)),
                (Err(e), _) | (_, Err(e)) => Err(e),
            },
            [] => continue,
            [_] => {
                if points.is_empty() {
                    continue;
                }
                return Err(MSAnalyzerError::TextParse {
                    path: path.display().to_string(),
                    line,
                    reason: "expected two columns".to_string(),
                });
            }
        };
        match parsed {
            Ok(point) => points.push(point),
            Err(_) if points.is_empty() => debug!("Skipping header line {line}"),
            Err(e) => {
                return Err(MSAnalyzerError::TextParse {
                    path: path.display().to_string(),
                    line,
                    reason: e.to_string(),
                })
            }
        }
    }
    debug!("Read {} points from {}", points.len(), path.display());
    Ok(points.into_iter().collect())
}

#[cfg(test)]
mod test {
    use super::*;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("msanalyzer-input-tests");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("# comment\n1.0,2.0\n"), b',');
        assert_eq!(sniff_delimiter("mz\tintensity\n1.0\t2.0\n"), b'\t');
        assert_eq!(sniff_delimiter("1.0   2.0\n"), b' ');
    }

    #[test]
    fn test_read_text_spectrum() {
        let path = write_temp(
            "spectrum.csv",
            "# exported scan\nmz,intensity\n26.0,40.5\n27.0, 0.6\n\n28.0,16.8\n",
        );
        let spectrum = read_text_spectrum(&path).unwrap();
        assert_eq!(spectrum.mz(), &[26.0, 27.0, 28.0]);
        assert_eq!(spectrum.intensity(), &[40.5, 0.6, 16.8]);

        let path = write_temp("spectrum.xy", "100.0    1.0\n101.0 \t  2.0\n");
        let spectrum = read_text_spectrum(&path).unwrap();
        assert_eq!(spectrum.mz(), &[100.0, 101.0]);
    }

    #[test]
    fn test_malformed_text() {
        let path = write_temp("broken.txt", "1.0 2.0\n3.0 abc\n");
        assert!(matches!(
            read_text_spectrum(&path),
            Err(MSAnalyzerError::TextParse { line: 2, .. })
        ));
        assert!(matches!(
            read_spectra(Path::new("not_real.mzML")),
            Err(MSAnalyzerError::InputNotFound(_))
        ));
        assert!(matches!(
            read_spectrum(&write_temp("single.txt", "1.0 2.0\n"), 3),
            Err(MSAnalyzerError::SpectrumNotFound(3))
        ));
    }
}
