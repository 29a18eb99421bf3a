//! Test-statistic sampling distributions (null vs alternate toys).

use mf_core::{Error, Result};
use mf_inference::HypoTestResult;
use serde::{Deserialize, Serialize};

/// Histogram of one sampling distribution, normalized to unit area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStatHistogram {
    pub label: String,
    /// Probability density per bin (`count / (n · width)`).
    pub density: Vec<f64>,
    pub n_toys: usize,
    pub n_failed: usize,
}

/// Null and alternate test-statistic distributions with the observed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStatArtifact {
    pub title: String,
    pub x_label: String,
    pub bin_edges: Vec<f64>,
    pub null: TestStatHistogram,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<TestStatHistogram>,
    pub observed: f64,
    pub null_p_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_p_value: Option<f64>,
    pub log_y: bool,
}

impl TestStatArtifact {
    /// Histogram the toy distributions of a frequentist result into `n_bins` bins over
    /// `[0, max(observed, toys)]`.
    pub fn from_result(result: &HypoTestResult, n_bins: usize) -> Result<Self> {
        let null = result.null_distribution.as_ref().ok_or_else(|| {
            Error::Validation(format!(
                "{} result carries no null sampling distribution",
                result.name
            ))
        })?;
        if null.is_empty() {
            return Err(Error::Validation("null sampling distribution is empty".to_string()));
        }
        if n_bins == 0 {
            return Err(Error::Validation("n_bins must be > 0".to_string()));
        }

        let upper = null
            .values
            .iter()
            .chain(result.alt_distribution.iter().flat_map(|d| d.values.iter()))
            .copied()
            .filter(|v| v.is_finite())
            .fold(result.test_statistic.max(0.0), f64::max);
        let hi = if upper > 0.0 { upper * 1.05 } else { 1.0 };
        let width = hi / n_bins as f64;
        let bin_edges: Vec<f64> = (0..=n_bins).map(|i| width * i as f64).collect();

        let (null_label, alt_label) = if result.background_is_alt {
            (format!("S+B ({} = {})", result.poi_name, result.null_value), "B only".to_string())
        } else {
            let alt = result.alt_value.map(|v| format!("{} = {v}", result.poi_name));
            (
                format!("null ({} = {})", result.poi_name, result.null_value),
                format!("alt ({})", alt.unwrap_or_default()),
            )
        };

        let hist = |label: String, values: &[f64], n_failed: usize| TestStatHistogram {
            label,
            density: density(values, n_bins, width),
            n_toys: values.len(),
            n_failed,
        };

        Ok(Self {
            title: format!("{} test statistic distributions", result.name),
            x_label: "test statistic".to_string(),
            null: hist(null_label, &null.values, null.n_failed),
            alt: result
                .alt_distribution
                .as_ref()
                .filter(|d| !d.is_empty())
                .map(|d| hist(alt_label, &d.values, d.n_failed)),
            bin_edges,
            observed: result.test_statistic,
            null_p_value: result.null_p_value,
            alt_p_value: result.alt_p_value,
            log_y: true,
        })
    }

    pub fn with_log_y(mut self, log_y: bool) -> Self {
        self.log_y = log_y;
        self
    }
}

fn density(values: &[f64], n_bins: usize, width: f64) -> Vec<f64> {
    let mut counts = vec![0.0; n_bins];
    for &v in values {
        if !v.is_finite() || v < 0.0 {
            continue;
        }
        let i = ((v / width) as usize).min(n_bins - 1);
        counts[i] += 1.0;
    }
    let norm = values.len() as f64 * width;
    if norm > 0.0 {
        for c in &mut counts {
            *c /= norm;
        }
    }
    counts
}
