//! Bounded quasi-Newton minimization.
//!
//! Thin wrapper around argmin's L-BFGS with a More-Thuente line search. Box
//! constraints are enforced by clamping every trial point and projecting the gradient
//! at active bounds. An optional per-parameter scale turns the problem into
//! `min f(s ⊙ y)` so that parameters with very different curvature (a slope of order
//! 0.01 next to a yield of order 1000) converge in comparable numbers of steps.
//!
//! Objectives may return `+∞` outside their domain. The line search sees a finite
//! penalty above the starting cost there instead, so it shrinks the step rather than
//! interpolating with infinities.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use mf_core::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Configuration for the L-BFGS optimizer
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance for the (scaled) gradient norm
    pub tol: f64,
    /// Number of corrections kept for the inverse-Hessian approximation
    pub m: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-6, m: 10 }
    }
}

/// Result of a minimization
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best-fit parameters (original, unscaled space)
    pub parameters: Vec<f64>,
    /// Function value at the minimum
    pub fval: f64,
    /// Function value at the (clamped) starting point
    pub initial_cost: f64,
    /// Number of iterations
    pub n_iter: u64,
    /// Number of objective evaluations
    pub n_fev: usize,
    /// Number of gradient evaluations
    pub n_gev: usize,
    /// Convergence status
    pub converged: bool,
    /// Termination message
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, n_gev={}, converged={})",
            self.fval, self.n_iter, self.n_fev, self.n_gev, self.converged
        )
    }
}

/// Objective function for minimization
pub trait ObjectiveFunction: Send + Sync {
    /// Evaluate the function at `params`
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Gradient at `params` (central differences unless overridden)
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let n = params.len();
        let mut grad = vec![0.0; n];
        let mut work = params.to_vec();

        for i in 0..n {
            let eps = 1e-8 * params[i].abs().max(1.0);

            work[i] = params[i] + eps;
            let f_plus = self.eval(&work)?;
            work[i] = params[i] - eps;
            let f_minus = self.eval(&work)?;
            work[i] = params[i];

            grad[i] = (f_plus - f_minus) / (2.0 * eps);
        }

        Ok(grad)
    }
}

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds.iter()).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

#[derive(Default)]
struct FuncCounts {
    cost: AtomicUsize,
    grad: AtomicUsize,
}

/// argmin adapter working in scaled coordinates `y = x / s`.
struct ArgminProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    bounds: &'a [(f64, f64)],
    scales: &'a [f64],
    /// Cost reported where the objective is not finite.
    penalty: f64,
    counts: Arc<FuncCounts>,
}

impl ArgminProblem<'_> {
    fn to_params(&self, y: &[f64]) -> Vec<f64> {
        y.iter()
            .zip(self.scales)
            .zip(self.bounds)
            .map(|((&yi, &s), &(lo, hi))| (yi * s).clamp(lo, hi))
            .collect()
    }
}

impl CostFunction for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, y: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.counts.cost.fetch_add(1, Ordering::Relaxed);
        let x = self.to_params(y);
        let f = self.objective.eval(&x).map_err(|e| argmin::core::Error::msg(e.to_string()))?;
        Ok(if f.is_finite() { f } else { self.penalty })
    }
}

impl Gradient for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        y: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        self.counts.grad.fetch_add(1, Ordering::Relaxed);
        let x = self.to_params(y);
        let mut g =
            self.objective.gradient(&x).map_err(|e| argmin::core::Error::msg(e.to_string()))?;

        // Projected gradient: drop components that push further out of an active bound.
        const EPS: f64 = 1e-12;
        for (i, (&xi, &(lo, hi))) in x.iter().zip(self.bounds.iter()).enumerate() {
            if !g[i].is_finite() {
                g[i] = 0.0;
            }
            if xi <= lo + EPS && g[i] > 0.0 {
                g[i] = 0.0;
            }
            if xi >= hi - EPS && g[i] < 0.0 {
                g[i] = 0.0;
            }
            g[i] *= self.scales[i];
        }

        Ok(g)
    }
}

/// L-BFGS optimizer with box constraints
pub struct LbfgsbOptimizer {
    config: OptimizerConfig,
}

impl LbfgsbOptimizer {
    /// Create an optimizer with the given configuration
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Minimize `objective` inside `bounds`, starting from `init_params`.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        let scales = vec![1.0; init_params.len()];
        self.minimize_scaled(objective, init_params, bounds, &scales)
    }

    /// Minimize with per-parameter scales: the solver steps in `y = x / scale`.
    ///
    /// Scales must be finite and positive; a good choice is `1 / sqrt(H_ii)`.
    pub fn minimize_scaled(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
        bounds: &[(f64, f64)],
        scales: &[f64],
    ) -> Result<OptimizationResult> {
        if init_params.len() != bounds.len() || scales.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "parameter/bounds/scales length mismatch: {} / {} / {}",
                init_params.len(),
                bounds.len(),
                scales.len()
            )));
        }
        if let Some(s) = scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(Error::Validation(format!("parameter scale must be > 0, got {s}")));
        }

        let init_clamped = clamp_params(init_params, bounds);
        let initial_cost = objective.eval(&init_clamped)?;
        if !initial_cost.is_finite() {
            return Err(Error::Computation(format!(
                "objective is {initial_cost} at the starting point {init_clamped:?}"
            )));
        }
        let penalty = initial_cost + 1e3 * initial_cost.abs().max(1.0);
        let init_scaled: Vec<f64> = init_clamped.iter().zip(scales).map(|(x, s)| x / s).collect();

        let counts = Arc::new(FuncCounts::default());
        let problem =
            ArgminProblem { objective, bounds, scales, penalty, counts: counts.clone() };

        let linesearch = MoreThuenteLineSearch::new();
        // argmin's default cost tolerance (~machine epsilon) is too strict for NLL scales.
        let tol_cost =
            if self.config.tol == 0.0 { 0.0 } else { (0.1 * self.config.tol).max(1e-12) };
        let solver = LBFGS::new(linesearch, self.config.m)
            .with_tolerance_grad(self.config.tol)
            .map_err(|e| Error::Validation(format!("invalid optimizer tolerance: {e}")))?
            .with_tolerance_cost(tol_cost)
            .map_err(|e| Error::Validation(format!("invalid optimizer cost tolerance: {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(init_scaled).max_iters(self.config.max_iter))
            .run()
            .map_err(|e| Error::Computation(format!("optimization failed: {e}")))?;

        let state = res.state();
        let best_scaled = state
            .get_best_param()
            .ok_or_else(|| Error::Computation("optimizer returned no parameters".to_string()))?;
        let best: Vec<f64> = best_scaled.iter().zip(scales).map(|(y, s)| y * s).collect();
        let parameters = clamp_params(&best, bounds);
        let fval = state.get_best_cost();

        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );

        Ok(OptimizationResult {
            parameters,
            fval,
            initial_cost,
            n_iter: state.get_iter(),
            n_fev: counts.cost.load(Ordering::Relaxed),
            n_gev: counts.grad.load(Ordering::Relaxed),
            converged,
            message: termination.to_string(),
        })
    }
}

impl Default for LbfgsbOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // f(x, y) = (x - 2)^2 + (y - 3)^2, minimum at (2, 3)
    struct QuadraticFunction;

    impl ObjectiveFunction for QuadraticFunction {
        fn eval(&self, params: &[f64]) -> Result<f64> {
            Ok((params[0] - 2.0).powi(2) + (params[1] - 3.0).powi(2))
        }

        fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![2.0 * (params[0] - 2.0), 2.0 * (params[1] - 3.0)])
        }
    }

    #[test]
    fn test_optimizer_quadratic() {
        let optimizer = LbfgsbOptimizer::new(OptimizerConfig { max_iter: 100, tol: 1e-6, m: 10 });
        let bounds = vec![(-10.0, 10.0), (-10.0, 10.0)];

        let result = optimizer.minimize(&QuadraticFunction, &[0.0, 0.0], &bounds).unwrap();

        assert!(result.converged, "status: {}", result.message);
        assert_relative_eq!(result.parameters[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(result.parameters[1], 3.0, epsilon = 1e-4);
        assert_relative_eq!(result.fval, 0.0, epsilon = 1e-6);
        assert_relative_eq!(result.initial_cost, 13.0, epsilon = 1e-12);
    }

    #[test]
    fn test_optimizer_with_bounds() {
        let optimizer = LbfgsbOptimizer::default();
        let bounds = vec![(3.0, 5.0), (1.0, 2.0)];

        let result = optimizer.minimize(&QuadraticFunction, &[4.0, 1.5], &bounds).unwrap();

        assert_relative_eq!(result.parameters[0], 3.0, epsilon = 1e-4);
        assert_relative_eq!(result.parameters[1], 2.0, epsilon = 1e-4);
        assert!(result.converged, "status: {}", result.message);
    }

    #[test]
    fn test_optimizer_numeric_gradient_negative_minimum() {
        struct Offset;

        impl ObjectiveFunction for Offset {
            fn eval(&self, params: &[f64]) -> Result<f64> {
                Ok((params[0] - 2.0).powi(2) - 5.0)
            }
        }

        let optimizer = LbfgsbOptimizer::default();
        let result = optimizer.minimize(&Offset, &[0.0], &[(-10.0, 10.0)]).unwrap();

        assert_relative_eq!(result.parameters[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(result.fval, -5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_optimizer_pinned_at_lower_bound() {
        struct Shifted;

        impl ObjectiveFunction for Shifted {
            fn eval(&self, params: &[f64]) -> Result<f64> {
                Ok((params[0] + 1.0).powi(2))
            }

            fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
                Ok(vec![2.0 * (params[0] + 1.0)])
            }
        }

        let optimizer = LbfgsbOptimizer::new(OptimizerConfig { max_iter: 100, tol: 1e-8, m: 10 });
        let result = optimizer.minimize(&Shifted, &[5.0], &[(0.0, 10.0)]).unwrap();

        assert_relative_eq!(result.parameters[0], 0.0, epsilon = 1e-10);
        assert_relative_eq!(result.fval, 1.0, epsilon = 1e-10);
        assert!(result.converged, "status: {}", result.message);
    }

    #[test]
    fn test_optimizer_fixed_parameter_stays_put() {
        let optimizer = LbfgsbOptimizer::default();
        let bounds = vec![(-10.0, 10.0), (0.5, 0.5)];

        let result = optimizer.minimize(&QuadraticFunction, &[0.0, 0.5], &bounds).unwrap();

        assert_relative_eq!(result.parameters[0], 2.0, epsilon = 1e-4);
        assert_eq!(result.parameters[1], 0.5);
    }

    #[test]
    fn test_optimizer_scaled_ill_conditioned() {
        // Curvatures 2e6 and 2e-3: a slope next to a large yield.
        struct IllScaled;

        impl ObjectiveFunction for IllScaled {
            fn eval(&self, p: &[f64]) -> Result<f64> {
                Ok(1e6 * (p[0] + 0.02).powi(2) + 1e-3 * (p[1] - 950.0).powi(2))
            }

            fn gradient(&self, p: &[f64]) -> Result<Vec<f64>> {
                Ok(vec![2e6 * (p[0] + 0.02), 2e-3 * (p[1] - 950.0)])
            }
        }

        let optimizer = LbfgsbOptimizer::default();
        let bounds = vec![(-1.0, 0.0), (0.0, 5000.0)];
        let scales = vec![1.0 / 2e6_f64.sqrt(), 1.0 / 2e-3_f64.sqrt()];

        let result =
            optimizer.minimize_scaled(&IllScaled, &[-0.01, 1000.0], &bounds, &scales).unwrap();

        assert!(result.converged, "status: {}", result.message);
        assert_relative_eq!(result.parameters[0], -0.02, epsilon = 1e-6);
        assert_relative_eq!(result.parameters[1], 950.0, epsilon = 1e-2);
    }

    #[test]
    fn test_optimizer_backs_off_from_infinite_region() {
        // Minimum at x = 0.5; the objective is +inf for x + y < 0.2, which the first
        // unit step from (2, 2) along the steepest descent would cross.
        struct Walled;

        impl ObjectiveFunction for Walled {
            fn eval(&self, p: &[f64]) -> Result<f64> {
                if p[0] + p[1] < 0.2 {
                    return Ok(f64::INFINITY);
                }
                Ok(4.0 * (p[0] - 0.5).powi(2) + 4.0 * (p[1] - 0.5).powi(2))
            }

            fn gradient(&self, p: &[f64]) -> Result<Vec<f64>> {
                if p[0] + p[1] < 0.2 {
                    return Ok(vec![0.0, 0.0]);
                }
                Ok(vec![8.0 * (p[0] - 0.5), 8.0 * (p[1] - 0.5)])
            }
        }

        let optimizer = LbfgsbOptimizer::default();
        let result = optimizer.minimize(&Walled, &[2.0, 2.0], &[(-5.0, 5.0); 2]).unwrap();

        assert!(result.converged, "status: {}", result.message);
        assert!(result.n_iter > 1);
        assert_relative_eq!(result.parameters[0], 0.5, epsilon = 1e-4);
        assert_relative_eq!(result.parameters[1], 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_optimizer_rejects_infinite_start() {
        struct Wall;

        impl ObjectiveFunction for Wall {
            fn eval(&self, _p: &[f64]) -> Result<f64> {
                Ok(f64::INFINITY)
            }
        }

        let optimizer = LbfgsbOptimizer::default();
        assert!(optimizer.minimize(&Wall, &[0.0], &[(-1.0, 1.0)]).is_err());
    }

    #[test]
    fn test_optimizer_rejects_bad_scales() {
        let optimizer = LbfgsbOptimizer::default();
        let bounds = [(-1.0, 1.0); 2];
        let err = optimizer.minimize_scaled(&QuadraticFunction, &[0.0, 0.0], &bounds, &[1.0, 0.0]);
        assert!(err.is_err());
    }
}
