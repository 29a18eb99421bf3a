//! Common data types for massfit

use serde::{Deserialize, Serialize};

/// Fit result containing parameter estimates and uncertainties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Parameter names in model order
    #[serde(default)]
    pub parameter_names: Vec<String>,

    /// Best-fit parameter values
    pub parameters: Vec<f64>,

    /// Parameter uncertainties (sqrt of covariance diagonal)
    pub uncertainties: Vec<f64>,

    /// Covariance matrix (row-major, N×N). `None` if inversion failed or the
    /// resulting covariance has non-positive variances.
    pub covariance: Option<Vec<f64>>,

    /// Negative log-likelihood at minimum
    pub nll: f64,

    /// Negative log-likelihood at the starting point. `NAN` if unavailable.
    #[serde(default = "default_nan")]
    pub initial_nll: f64,

    /// Convergence status
    pub converged: bool,

    /// Number of optimizer iterations.
    pub n_iter: usize,

    /// Number of objective evaluations (including line search).
    #[serde(default)]
    pub n_fev: usize,

    /// Number of gradient evaluations.
    #[serde(default)]
    pub n_gev: usize,

    /// Why the optimizer stopped.
    #[serde(default)]
    pub termination_reason: String,

    /// Diagnostics collected while estimating the covariance.
    #[serde(default)]
    pub warnings: Vec<String>,
}

fn default_nan() -> f64 {
    f64::NAN
}

impl FitResult {
    /// Create a new fit result without covariance
    pub fn new(
        parameters: Vec<f64>,
        uncertainties: Vec<f64>,
        nll: f64,
        converged: bool,
        n_iter: usize,
        n_fev: usize,
        n_gev: usize,
    ) -> Self {
        Self {
            parameter_names: Vec::new(),
            parameters,
            uncertainties,
            covariance: None,
            nll,
            initial_nll: f64::NAN,
            converged,
            n_iter,
            n_fev,
            n_gev,
            termination_reason: String::new(),
            warnings: Vec::new(),
        }
    }

    /// Attach a covariance matrix (builder-style).
    pub fn with_covariance(mut self, covariance: Vec<f64>) -> Self {
        self.covariance = Some(covariance);
        self
    }

    /// Attach parameter names (builder-style).
    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.parameter_names = names;
        self
    }

    /// Attach optimizer diagnostics (builder-style).
    pub fn with_diagnostics(mut self, termination_reason: String, initial_nll: f64) -> Self {
        self.termination_reason = termination_reason;
        self.initial_nll = initial_nll;
        self
    }

    /// Index of a parameter by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.parameter_names.iter().position(|n| n == name)
    }

    /// Best-fit value of a named parameter.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|i| self.parameters[i])
    }

    /// Uncertainty of a named parameter.
    pub fn error(&self, name: &str) -> Option<f64> {
        self.index_of(name).and_then(|i| self.uncertainties.get(i).copied())
    }

    /// Get correlation matrix element (i, j). Returns `None` if covariance is unavailable.
    pub fn correlation(&self, i: usize, j: usize) -> Option<f64> {
        let cov = self.covariance.as_ref()?;
        let n = self.parameters.len();
        if i >= n || j >= n {
            return None;
        }
        let sigma_i = self.uncertainties[i];
        let sigma_j = self.uncertainties[j];
        if sigma_i <= 0.0 || sigma_j <= 0.0 {
            return None;
        }
        Some(cov[i * n + j] / (sigma_i * sigma_j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_result() {
        let result = FitResult::new(vec![1.0, 2.0], vec![0.1, 0.2], 123.45, true, 100, 0, 0);
        assert_eq!(result.parameters.len(), 2);
        assert_eq!(result.uncertainties.len(), 2);
        assert!(result.converged);
        assert_eq!(result.n_iter, 100);
        assert!(result.correlation(0, 1).is_none());
    }

    #[test]
    fn test_named_lookup_and_correlation() {
        let result = FitResult::new(vec![1.0, 2.0], vec![0.5, 2.0], 0.0, true, 1, 1, 1)
            .with_names(vec!["mu".into(), "alpha".into()])
            .with_covariance(vec![0.25, 0.5, 0.5, 4.0]);
        assert_eq!(result.value("alpha"), Some(2.0));
        assert_eq!(result.error("mu"), Some(0.5));
        assert!(result.value("nope").is_none());
        let rho = result.correlation(0, 1).unwrap();
        assert!((rho - 0.5).abs() < 1e-12);
        assert!((result.correlation(1, 1).unwrap() - 1.0).abs() < 1e-12);
    }
}
