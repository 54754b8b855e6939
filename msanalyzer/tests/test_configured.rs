use std::{error::Error, fs, path::PathBuf, process::Command};

use assert_cmd::prelude::*;
use figment::{
    providers::{Format, Toml},
    Figment,
};
use predicates::prelude::*;

use msanalyzer::AnalysisConfig;

fn write_config(name: &str, content: &str) -> Result<PathBuf, Box<dyn Error>> {
    let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("msanalyzer");
    fs::create_dir_all(&dir)?;
    let path = dir.join(name);
    fs::write(&path, content)?;
    Ok(path)
}

#[test_log::test]
#[test_log(default_log_filter = "debug")]
fn test_config_file() -> Result<(), Box<dyn Error>> {
    let path = write_config("tolerance.toml", "decimals = 2\ntolerance = 0.02\n")?;
    let mut config = Figment::new();
    config = config.merge(Toml::file_exact(&path));
    let config: AnalysisConfig = config.extract()?;
    assert_eq!(config.decimals, 2);
    assert_eq!(config.tolerance, Some(0.02));
    assert_eq!(config.prominence, AnalysisConfig::default().prominence);
    Ok(())
}

#[test]
fn test_effective_config() -> Result<(), Box<dyn Error>> {
    let path = write_config("prominence.toml", "prominence = 0.25\nbin_width = 0.3\n")?;

    let mut cmd = Command::cargo_bin("msanalyzer")?;
    cmd.env("MSANALYZER_BIN_WIDTH", "0.2")
        .arg("config")
        .arg("--config-file")
        .arg(&path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("prominence = 0.25"))
        .stdout(predicate::str::contains("bin_width = 0.2"));

    let mut cmd = Command::cargo_bin("msanalyzer")?;
    cmd.arg("config")
        .arg("--config-file")
        .arg("not_a_real_config.toml");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load the configuration"));
    Ok(())
}
