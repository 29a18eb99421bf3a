//! `--config` file: per-workflow settings plus the plot style.
//!
//! Every field has a default, so an empty file (or no file) reproduces the standard
//! workflows. YAML is the default format; `.json` files are read with `serde_json`.

use anyhow::{Context, Result};
use mf_viz_render::config::VizConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub output: OutputSettings,
    pub example1: Example1Settings,
    pub higgs_model: HiggsModelSettings,
    pub hypothesis_test: HypothesisTestSettings,
    pub higgs_hist_model: HiggsHistModelSettings,
    /// Plot style, merged over the selected theme (see `mf_viz_render::config`).
    pub plot: serde_yaml_ng::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    /// Directory for plots and workspace files.
    pub dir: PathBuf,
    /// Plot format: `png` or `svg`.
    pub format: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self { dir: PathBuf::from("."), format: "png".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Example1Settings {
    pub seed: u64,
    pub n_background: usize,
    pub n_signal: usize,
    pub n_data: usize,
    pub bins: usize,
    /// POI value tested by the profile likelihood calculator.
    pub null_mu: f64,
}

impl Default for Example1Settings {
    fn default() -> Self {
        Self {
            seed: 0,
            n_background: 10_000,
            n_signal: 300,
            n_data: 5_000,
            bins: 50,
            null_mu: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HiggsModelSettings {
    pub seed: u64,
    pub nsig: f64,
    pub nbkg: f64,
    pub bins: usize,
    /// Workspace file written at the end, relative to the output directory.
    pub file: PathBuf,
}

impl Default for HiggsModelSettings {
    fn default() -> Self {
        Self {
            seed: 111,
            nsig: 100.0,
            nbkg: 1000.0,
            bins: 50,
            file: PathBuf::from("HiggsModel.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HypothesisTestSettings {
    /// POI value of the signal-plus-background snapshot.
    pub sb_poi: f64,
    /// POI value of the background-only snapshot.
    pub b_poi: f64,
    pub cl: f64,
    pub scan_points: usize,
    pub scan_min: f64,
    pub scan_max: f64,
    pub toys_null: usize,
    pub toys_alt: usize,
    pub seed: u64,
    /// Histogram bins of the test-statistic plot.
    pub test_stat_bins: usize,
    /// Profile likelihood plot range and resolution.
    pub profile_min: f64,
    pub profile_max: f64,
    pub profile_points: usize,
    /// Skip the toy-based calculator (discovery test, plot and inverter).
    pub skip_frequentist: bool,
}

impl Default for HypothesisTestSettings {
    fn default() -> Self {
        Self {
            sb_poi: 50.0,
            b_poi: 0.0,
            cl: 0.683,
            scan_points: 50,
            scan_min: 0.0,
            scan_max: 50.0,
            toys_null: 500,
            toys_alt: 500,
            seed: 0,
            test_stat_bins: 50,
            profile_min: 0.0,
            profile_max: 100.0,
            profile_points: 101,
            skip_frequentist: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HiggsHistModelSettings {
    pub seed: u64,
    pub n_signal: f64,
    pub n_background: f64,
    /// Signal strength of the mock data.
    pub mu_true: f64,
    pub file: PathBuf,
}

impl Default for HiggsHistModelSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            n_signal: 200.0,
            n_background: 10_000.0,
            mu_true: 1.5,
            file: PathBuf::from("HiggsHistModel.json"),
        }
    }
}

impl CliConfig {
    /// Plot style resolved against its theme.
    pub fn viz(&self) -> Result<VizConfig> {
        mf_viz_render::config::resolve_value(self.plot.clone()).context("invalid `plot` section")
    }
}

pub fn read_config(path: Option<&Path>) -> Result<CliConfig> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let bytes =
        std::fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let cfg = if ext == "json" {
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing JSON config {}", path.display()))?
    } else {
        serde_yaml_ng::from_slice(&bytes)
            .with_context(|| format!("parsing YAML config {}", path.display()))?
    };
    Ok(cfg)
}
