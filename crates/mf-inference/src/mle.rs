//! Maximum Likelihood Estimation

use crate::optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
use mf_core::traits::{LogDensityModel, PreparedNll};
use mf_core::{Error, FitResult, Result};
use nalgebra::DMatrix;

/// Adapter exposing a model's NLL to the optimizer.
struct ModelObjective<'a, M: LogDensityModel + ?Sized> {
    model: &'a M,
    prepared: M::Prepared<'a>,
}

impl<M: LogDensityModel + ?Sized> ObjectiveFunction for ModelObjective<'_, M> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        self.prepared.nll(params)
    }

    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        Ok(self.model.nll_grad_prepared(&self.prepared, params)?.1)
    }
}

/// Finite-difference step for parameter `j`, pointing into the allowed range.
fn inward_step(x: f64, (lo, hi): (f64, f64)) -> f64 {
    let eps = 1e-4 * x.abs().max(1.0);
    if x + eps > hi && x - eps >= lo { -eps } else { eps }
}

fn is_fixed((lo, hi): (f64, f64)) -> bool {
    hi <= lo
}

/// Check for identifiability issues based on the Hessian and uncertainties.
///
/// Returns human-readable warnings (empty if the model is well identified).
pub fn identifiability_warnings(
    hessian: &DMatrix<f64>,
    param_names: &[String],
    uncertainties: &[f64],
) -> Vec<String> {
    let mut warnings = Vec::new();
    let n = hessian.nrows();

    if n > 0 {
        let svd = hessian.clone().svd(false, false);
        let svals = &svd.singular_values;
        let s_max = svals.iter().fold(0.0_f64, |a, &b| a.max(b));
        let s_min = svals.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        if s_min > 0.0 {
            let cond = s_max / s_min;
            if cond > 1e12 {
                warnings.push(format!(
                    "Hessian condition number = {cond:.1e}: model may be poorly identified"
                ));
            }
        } else {
            warnings.push("Hessian is singular: model is not identifiable".into());
        }
    }

    for (name, u) in param_names.iter().zip(uncertainties) {
        if !u.is_finite() {
            warnings.push(format!("Parameter '{name}': uncertainty is {u}"));
        }
    }

    warnings
}

/// Maximum Likelihood Estimator
///
/// Fits models by minimizing the negative log-likelihood.
#[derive(Debug, Clone)]
pub struct MaximumLikelihoodEstimator {
    config: OptimizerConfig,
    scale_parameters: bool,
}

impl MaximumLikelihoodEstimator {
    /// Create an estimator with the default optimizer configuration
    pub fn new() -> Self {
        Self { config: OptimizerConfig::default(), scale_parameters: true }
    }

    /// Create an estimator with a custom optimizer configuration
    pub fn with_config(config: OptimizerConfig) -> Self {
        Self { config, scale_parameters: true }
    }

    /// Enable or disable curvature-based parameter scaling (enabled by default).
    pub fn with_scaling(mut self, enabled: bool) -> Self {
        self.scale_parameters = enabled;
        self
    }

    /// Optimizer configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Fit `model` from its suggested starting point.
    ///
    /// Returns best-fit values, Hesse uncertainties, the covariance matrix (when the
    /// Hessian is positive definite) and optimizer diagnostics.
    pub fn fit<M: LogDensityModel>(&self, model: &M) -> Result<FitResult> {
        self.fit_from(model, &model.parameter_init())
    }

    /// Like [`fit`](Self::fit), but starting from `initial_params`.
    pub fn fit_from<M: LogDensityModel>(
        &self,
        model: &M,
        initial_params: &[f64],
    ) -> Result<FitResult> {
        let result = self.fit_minimum_from(model, initial_params)?;
        if !result.converged {
            log::warn!("fit did not converge: {} (nll={})", result.message, result.fval);
        }

        let bounds = model.parameter_bounds();
        let n = result.parameters.len();
        let free: Vec<usize> = (0..n).filter(|&i| !is_fixed(bounds[i])).collect();

        let hessian = self.compute_hessian(model, &result.parameters, &bounds, &free)?;
        let m = free.len();
        let diag_unc = diagonal_uncertainties(&hessian);

        let mut uncertainties = vec![0.0; n];
        let mut covariance = None;
        match invert_hessian(&hessian) {
            Some(cov) => {
                let mut full = vec![0.0; n * n];
                for (a, &i) in free.iter().enumerate() {
                    for (b, &j) in free.iter().enumerate() {
                        full[i * n + j] = cov[(a, b)];
                    }
                    uncertainties[i] = cov[(a, a)].sqrt();
                }
                covariance = Some(full);
            }
            None => {
                log::warn!("Hessian inversion failed, using diagonal approximation");
                for (a, &i) in free.iter().enumerate() {
                    uncertainties[i] = diag_unc[a];
                }
            }
        }
        log::debug!("fit: {result}, {m} free parameters");

        let names = model.parameter_names();
        let free_names: Vec<String> = free.iter().map(|&i| names[i].clone()).collect();
        let free_unc: Vec<f64> = free.iter().map(|&i| uncertainties[i]).collect();
        let warnings = identifiability_warnings(&hessian, &free_names, &free_unc);
        for w in &warnings {
            log::warn!("{w}");
        }

        let mut fr = FitResult::new(
            result.parameters,
            uncertainties,
            result.fval,
            result.converged,
            result.n_iter as usize,
            result.n_fev,
            result.n_gev,
        )
        .with_names(names)
        .with_diagnostics(result.message, result.initial_cost);
        if let Some(cov) = covariance {
            fr = fr.with_covariance(cov);
        }
        fr.warnings = warnings;
        Ok(fr)
    }

    /// Minimize the NLL without computing uncertainties.
    ///
    /// Fast path for repeated minimizations (profile scans, test statistics, toys).
    pub fn fit_minimum(&self, model: &impl LogDensityModel) -> Result<OptimizationResult> {
        self.fit_minimum_from(model, &model.parameter_init())
    }

    /// Minimize the NLL from an explicit starting point (warm start).
    pub fn fit_minimum_from(
        &self,
        model: &impl LogDensityModel,
        initial_params: &[f64],
    ) -> Result<OptimizationResult> {
        if initial_params.len() != model.dim() {
            return Err(Error::Validation(format!(
                "fit_minimum_from: initial_params length {} != model.dim() {}",
                initial_params.len(),
                model.dim()
            )));
        }
        let bounds = model.parameter_bounds();
        let start: Vec<f64> = initial_params
            .iter()
            .zip(&bounds)
            .map(|(&x, &(lo, hi))| x.clamp(lo, hi))
            .collect();

        let objective = ModelObjective { model, prepared: model.prepared() };
        let optimizer = LbfgsbOptimizer::new(self.config.clone());
        if !self.scale_parameters {
            return check_progress(optimizer.minimize(&objective, &start, &bounds)?);
        }
        let scales = parameter_scales(model, &start, &bounds)?;
        let result = optimizer.minimize_scaled(&objective, &start, &bounds, &scales)?;
        if !stalled(&result) {
            return Ok(result);
        }
        log::warn!(
            "fit stopped after {} iteration(s) without converging ({}); retrying unscaled",
            result.n_iter,
            result.message
        );
        check_progress(optimizer.minimize(&objective, &start, &bounds)?)
    }

    /// Hessian of the NLL over the `free` parameters by forward differences of the
    /// analytic gradient, symmetrised.
    fn compute_hessian(
        &self,
        model: &impl LogDensityModel,
        best: &[f64],
        bounds: &[(f64, f64)],
        free: &[usize],
    ) -> Result<DMatrix<f64>> {
        let m = free.len();
        let grad_center = model.grad_nll(best)?;
        let mut hessian = DMatrix::zeros(m, m);
        let mut shifted = best.to_vec();

        for (b, &j) in free.iter().enumerate() {
            let eps = inward_step(best[j], bounds[j]);
            shifted[j] = best[j] + eps;
            let grad_plus = model.grad_nll(&shifted)?;
            shifted[j] = best[j];

            for (a, &i) in free.iter().enumerate() {
                hessian[(a, b)] = (grad_plus[i] - grad_center[i]) / eps;
            }
        }

        let ht = hessian.transpose();
        Ok((&hessian + &ht) * 0.5)
    }
}

impl Default for MaximumLikelihoodEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// True when the optimizer gave up at the starting point.
fn stalled(result: &OptimizationResult) -> bool {
    !result.converged && result.n_iter <= 1
}

fn check_progress(result: OptimizationResult) -> Result<OptimizationResult> {
    if stalled(&result) {
        return Err(Error::Computation(format!(
            "fit stalled at the starting point after {} iteration(s): {}",
            result.n_iter, result.message
        )));
    }
    Ok(result)
}

/// Per-parameter scales `1/sqrt(H_ii)` from the curvature at `x`.
///
/// Fixed parameters and parameters whose curvature is not positive keep scale 1.
fn parameter_scales(
    model: &impl LogDensityModel,
    x: &[f64],
    bounds: &[(f64, f64)],
) -> Result<Vec<f64>> {
    let g0 = model.grad_nll(x)?;
    let mut scales = vec![1.0; x.len()];
    let mut shifted = x.to_vec();
    for j in 0..x.len() {
        if is_fixed(bounds[j]) {
            continue;
        }
        let eps = inward_step(x[j], bounds[j]);
        shifted[j] = x[j] + eps;
        let g = model.grad_nll(&shifted);
        shifted[j] = x[j];
        let Ok(g) = g else { continue };
        let h = (g[j] - g0[j]) / eps;
        if h.is_finite() && h > 0.0 {
            scales[j] = (1.0 / h.sqrt()).clamp(1e-10, 1e10);
        }
    }
    Ok(scales)
}

/// Invert the Hessian by a damped Cholesky solve.
///
/// Returns `None` if no positive-definite regularisation was found.
fn invert_hessian(hessian: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let n = hessian.nrows();
    let identity = DMatrix::identity(n, n);
    let diag_scale = (0..n).map(|i| hessian[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);

    let mut h_damped = hessian.clone();
    let mut damping = 0.0_f64;
    for _ in 0..10 {
        if let Some(chol) = nalgebra::linalg::Cholesky::new(h_damped.clone()) {
            let cov = chol.solve(&identity);
            if (0..n).all(|i| cov[(i, i)].is_finite() && cov[(i, i)] > 0.0) {
                return Some(cov);
            }
            return None;
        }
        let next = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
        for i in 0..n {
            h_damped[(i, i)] += next - damping;
        }
        damping = next;
    }
    None
}

/// Uncertainties from the Hessian diagonal (fallback).
fn diagonal_uncertainties(hessian: &DMatrix<f64>) -> Vec<f64> {
    (0..hessian.nrows()).map(|i| 1.0 / hessian[(i, i)].abs().max(1e-12).sqrt()).collect()
}
