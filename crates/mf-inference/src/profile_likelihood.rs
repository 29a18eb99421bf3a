//! Profile likelihood utilities.
//!
//! Test statistics built from the profile likelihood ratio
//! `λ(μ) = L(μ, θ̂̂) / L(μ̂, θ̂)` (Cowan et al., arXiv:1007.1727):
//!
//! - `q_μ = 2ΔNLL` for upper limits (zero when `μ̂ > μ`),
//! - `q_0` for discovery (zero when `μ̂ < μ_0`),
//! - the two-sided `ΔNLL = -log λ(μ)` curve used for intervals and plots.

use crate::hypotest::HypoTestResult;
use crate::mle::MaximumLikelihoodEstimator;
use crate::optimizer::OptimizationResult;
use mf_core::traits::{FixedParamModel, LogDensityModel, PoiModel};
use mf_core::{Error, Result};
use mf_model::math::standard_normal_sf;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Single point in a profile likelihood scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilePoint {
    /// Tested POI value.
    pub mu: f64,
    /// One-sided upper-limit statistic `q_μ`.
    pub q_mu: f64,
    /// Two-sided `-log λ(μ)`.
    pub delta_nll: f64,
    /// Conditional NLL at `mu`.
    pub nll_mu: f64,
    /// Conditional fit convergence.
    pub converged: bool,
    /// Conditional fit iterations.
    pub n_iter: u64,
}

/// Profile likelihood scan result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileLikelihoodScan {
    /// POI index in model parameter order.
    pub poi_index: usize,
    /// Unconditional best-fit POI value.
    pub mu_hat: f64,
    /// Unconditional NLL at the global minimum.
    pub nll_hat: f64,
    /// Per-point results.
    pub points: Vec<ProfilePoint>,
}

impl ProfileLikelihoodScan {
    /// `(μ, ΔNLL)` pairs, e.g. for plotting.
    pub fn curve(&self) -> Vec<(f64, f64)> {
        self.points.iter().map(|p| (p.mu, p.delta_nll)).collect()
    }
}

pub(crate) fn poi_index(model: &(impl PoiModel + ?Sized)) -> Result<usize> {
    model.poi_index().ok_or_else(|| Error::Validation("No POI defined".to_string()))
}

/// Conditional minimum with the POI fixed at `mu`, warm-started from `start`.
pub(crate) fn conditional_fit<M: LogDensityModel + FixedParamModel>(
    mle: &MaximumLikelihoodEstimator,
    model: &M,
    poi: usize,
    mu: f64,
    start: &[f64],
) -> Result<OptimizationResult> {
    let fixed_model = model.with_fixed_param(poi, mu);
    let mut init = start.to_vec();
    init[poi] = mu;
    let fixed = mle.fit_minimum_from(&fixed_model, &init)?;
    if !fixed.converged {
        log::warn!(
            "conditional fit did not converge for mu={mu}: {} (continuing with best-found)",
            fixed.message
        );
    }
    Ok(fixed)
}

/// One-sided discovery statistic `q_0` against `null_value`.
///
/// Returns `(q0, free fit, conditional fit)`.
pub fn discovery_q0<M: LogDensityModel + PoiModel + FixedParamModel>(
    mle: &MaximumLikelihoodEstimator,
    model: &M,
    null_value: f64,
) -> Result<(f64, OptimizationResult, OptimizationResult)> {
    let poi = poi_index(model)?;
    let free = mle.fit_minimum(model)?;
    let fixed = conditional_fit(mle, model, poi, null_value, &free.parameters)?;
    let mu_hat = free.parameters[poi];
    let q0 = if mu_hat < null_value { 0.0 } else { (2.0 * (fixed.fval - free.fval)).max(0.0) };
    Ok((q0, free, fixed))
}

/// Profile likelihood scan over `mu_values`.
///
/// Consecutive conditional fits warm-start from the previous converged point.
pub fn scan<M: LogDensityModel + PoiModel + FixedParamModel>(
    mle: &MaximumLikelihoodEstimator,
    model: &M,
    mu_values: &[f64],
) -> Result<ProfileLikelihoodScan> {
    let poi = poi_index(model)?;

    let free = mle.fit_minimum(model)?;
    let mu_hat = free.parameters[poi];
    let nll_hat = free.fval;

    let mut warm = free.parameters.clone();
    let mut points = Vec::with_capacity(mu_values.len());
    for &mu in mu_values {
        let fixed = conditional_fit(mle, model, poi, mu, &warm)?;
        if fixed.converged {
            warm.clone_from(&fixed.parameters);
        }

        let delta_nll = (fixed.fval - nll_hat).max(0.0);
        let q_mu = if mu_hat > mu { 0.0 } else { 2.0 * delta_nll };

        points.push(ProfilePoint {
            mu,
            q_mu,
            delta_nll,
            nll_mu: fixed.fval,
            converged: fixed.converged,
            n_iter: fixed.n_iter,
        });
    }

    Ok(ProfileLikelihoodScan { poi_index: poi, mu_hat, nll_hat, points })
}

/// `n_points` equally spaced `(μ, ΔNLL)` pairs over `[lo, hi]`.
pub fn profile_curve<M: LogDensityModel + PoiModel + FixedParamModel>(
    mle: &MaximumLikelihoodEstimator,
    model: &M,
    lo: f64,
    hi: f64,
    n_points: usize,
) -> Result<Vec<(f64, f64)>> {
    if n_points < 2 || !(hi > lo) {
        return Err(Error::Validation(format!(
            "profile curve needs n_points >= 2 and hi > lo, got {n_points} on [{lo}, {hi}]"
        )));
    }
    let step = (hi - lo) / (n_points - 1) as f64;
    let mus: Vec<f64> = (0..n_points).map(|i| lo + step * i as f64).collect();
    Ok(scan(mle, model, &mus)?.curve())
}

/// Two-sided likelihood interval on the POI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikelihoodInterval {
    /// POI name.
    pub poi_name: String,
    /// Confidence level.
    pub cl: f64,
    /// Best-fit POI value.
    pub mu_hat: f64,
    /// Global minimum NLL.
    pub nll_hat: f64,
    /// `ΔNLL` threshold defining the interval, `½·χ²₁⁻¹(cl)`.
    pub threshold: f64,
    /// Lower limit (the POI lower bound if no crossing exists).
    pub lower: f64,
    /// Upper limit (the POI upper bound if no crossing exists).
    pub upper: f64,
}

impl LikelihoodInterval {
    /// True if `mu` lies inside the interval.
    pub fn contains(&self, mu: f64) -> bool {
        self.lower <= mu && mu <= self.upper
    }
}

/// Profile likelihood calculator for a single POI.
#[derive(Debug, Clone)]
pub struct ProfileLikelihoodCalculator<M> {
    model: M,
    mle: MaximumLikelihoodEstimator,
}

impl<M: LogDensityModel + PoiModel + FixedParamModel> ProfileLikelihoodCalculator<M> {
    /// Calculator for `model`, which must have a POI and data bound.
    pub fn new(model: M) -> Self {
        Self { model, mle: MaximumLikelihoodEstimator::new() }
    }

    /// Replace the estimator.
    pub fn with_estimator(mut self, mle: MaximumLikelihoodEstimator) -> Self {
        self.mle = mle;
        self
    }

    /// Test `POI = null_value` with `q = 2ΔNLL`.
    ///
    /// One-sided: `p = ½·P(χ²₁ > q)` if `μ̂ ≥ null_value`, else `p = 1`.
    pub fn hypotest(&self, null_value: f64) -> Result<HypoTestResult> {
        let (q, free, _fixed) = discovery_q0(&self.mle, &self.model, null_value)?;
        let poi = poi_index(&self.model)?;
        let mu_hat = free.parameters[poi];
        let p = if mu_hat >= null_value { standard_normal_sf(q.sqrt()) } else { 1.0 };
        log::debug!("profile likelihood test: mu_hat={mu_hat}, q={q}, p={p}");

        Ok(HypoTestResult {
            name: "ProfileLikelihoodCalculator".to_string(),
            poi_name: self.model.parameter_names()[poi].clone(),
            null_value,
            alt_value: None,
            test_statistic: q,
            null_p_value: p,
            alt_p_value: None,
            background_is_alt: false,
            mu_hat,
            null_distribution: None,
            alt_distribution: None,
        })
    }

    /// Two-sided interval at confidence level `cl` from `ΔNLL = ½·χ²₁⁻¹(cl)`.
    pub fn likelihood_interval(&self, cl: f64) -> Result<LikelihoodInterval> {
        if !(cl > 0.0 && cl < 1.0) {
            return Err(Error::Validation(format!("confidence level must be in (0,1), got {cl}")));
        }
        let chi2 = ChiSquared::new(1.0)
            .map_err(|e| Error::Computation(format!("chi-squared distribution: {e}")))?;
        let threshold = 0.5 * chi2.inverse_cdf(cl);

        let poi = poi_index(&self.model)?;
        let (lo_bound, hi_bound) = self.model.parameter_bounds()[poi];
        let free = self.mle.fit_minimum(&self.model)?;
        let mu_hat = free.parameters[poi];
        let nll_hat = free.fval;

        let delta = |mu: f64| -> Result<f64> {
            let fixed = conditional_fit(&self.mle, &self.model, poi, mu, &free.parameters)?;
            Ok((fixed.fval - nll_hat).max(0.0) - threshold)
        };

        let lower = find_crossing(&delta, mu_hat, lo_bound)?;
        let upper = find_crossing(&delta, mu_hat, hi_bound)?;

        Ok(LikelihoodInterval {
            poi_name: self.model.parameter_names()[poi].clone(),
            cl,
            mu_hat,
            nll_hat,
            threshold,
            lower,
            upper,
        })
    }

    /// The underlying model.
    pub fn model(&self) -> &M {
        &self.model
    }
}

/// Bisection for `f = 0` between `inside` (where `f < 0`) and `bound`.
///
/// Returns `bound` when `f(bound) <= 0`, i.e. the interval reaches the parameter limit.
fn find_crossing(f: &impl Fn(f64) -> Result<f64>, inside: f64, bound: f64) -> Result<f64> {
    if inside == bound || f(bound)? <= 0.0 {
        return Ok(bound);
    }
    let (mut a, mut b) = (inside, bound);
    let tol = 1e-6 * inside.abs().max(bound.abs()).max(1.0);
    for _ in 0..100 {
        let mid = 0.5 * (a + b);
        if f(mid)? > 0.0 {
            b = mid;
        } else {
            a = mid;
        }
        if (b - a).abs() < tol {
            break;
        }
    }
    Ok(0.5 * (a + b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::OptimizerConfig;
    use approx::assert_relative_eq;
    use mf_core::traits::PreparedModelRef;

    /// Quadratic NLL `(μ - m)² / (2σ²)` in one POI plus an unrelated nuisance.
    #[derive(Clone)]
    struct Parabola {
        m: f64,
        sigma: f64,
        bounds: Vec<(f64, f64)>,
    }

    impl Parabola {
        fn new(m: f64, sigma: f64) -> Self {
            Self { m, sigma, bounds: vec![(0.0, 100.0), (-5.0, 5.0)] }
        }
    }

    impl LogDensityModel for Parabola {
        type Prepared<'a>
            = PreparedModelRef<'a, Self>
        where
            Self: 'a;

        fn dim(&self) -> usize {
            2
        }

        fn parameter_names(&self) -> Vec<String> {
            vec!["mu".into(), "theta".into()]
        }

        fn parameter_bounds(&self) -> Vec<(f64, f64)> {
            self.bounds.clone()
        }

        fn parameter_init(&self) -> Vec<f64> {
            vec![1.0, 1.0]
        }

        fn nll(&self, p: &[f64]) -> Result<f64> {
            Ok(0.5 * ((p[0] - self.m) / self.sigma).powi(2) + 0.5 * p[1] * p[1])
        }

        fn grad_nll(&self, p: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![(p[0] - self.m) / (self.sigma * self.sigma), p[1]])
        }

        fn prepared(&self) -> Self::Prepared<'_> {
            PreparedModelRef::new(self)
        }
    }

    impl PoiModel for Parabola {
        fn poi_index(&self) -> Option<usize> {
            Some(0)
        }
    }

    impl FixedParamModel for Parabola {
        fn with_fixed_param(&self, idx: usize, value: f64) -> Self {
            let mut out = self.clone();
            out.bounds[idx] = (value, value);
            out
        }
    }

    #[test]
    fn test_scan_is_parabola() {
        let model = Parabola::new(10.0, 2.0);
        let mle = MaximumLikelihoodEstimator::new();
        let s = scan(&mle, &model, &[6.0, 10.0, 14.0]).unwrap();

        assert_relative_eq!(s.mu_hat, 10.0, epsilon = 1e-4);
        assert_relative_eq!(s.points[0].delta_nll, 2.0, epsilon = 1e-4);
        assert_relative_eq!(s.points[2].delta_nll, 2.0, epsilon = 1e-4);
        // One-sided: no upper-limit evidence below mu_hat.
        assert_eq!(s.points[0].q_mu, 0.0);
        assert_relative_eq!(s.points[2].q_mu, 4.0, epsilon = 1e-3);
    }

    #[test]
    fn test_hypotest_gaussian_significance() {
        // mu_hat = 3 sigma away from 0.
        let model = Parabola::new(6.0, 2.0);
        let plc = ProfileLikelihoodCalculator::new(model);
        let r = plc.hypotest(0.0).unwrap();

        assert_relative_eq!(r.test_statistic, 9.0, epsilon = 1e-3);
        assert_relative_eq!(r.significance(), 3.0, epsilon = 1e-3);
    }

    #[test]
    fn test_hypotest_deficit_has_unit_p_value() {
        let model = Parabola::new(2.0, 1.0);
        let plc = ProfileLikelihoodCalculator::new(model);
        let r = plc.hypotest(5.0).unwrap();
        assert_eq!(r.null_p_value, 1.0);
        assert_eq!(r.significance(), 0.0);
    }

    #[test]
    fn test_interval_68() {
        let model = Parabola::new(20.0, 3.0);
        let plc = ProfileLikelihoodCalculator::new(model);
        let iv = plc.likelihood_interval(0.6827).unwrap();

        assert_relative_eq!(iv.threshold, 0.5, epsilon = 1e-3);
        assert_relative_eq!(iv.lower, 17.0, epsilon = 1e-2);
        assert_relative_eq!(iv.upper, 23.0, epsilon = 1e-2);
        assert!(iv.contains(20.0));
    }

    #[test]
    fn test_interval_with_custom_estimator() {
        let config = OptimizerConfig { tol: 1e-9, ..OptimizerConfig::default() };
        let mle = MaximumLikelihoodEstimator::with_config(config).with_scaling(false);
        let plc = ProfileLikelihoodCalculator::new(Parabola::new(20.0, 3.0)).with_estimator(mle);
        let iv = plc.likelihood_interval(0.9545).unwrap();

        assert_relative_eq!(iv.threshold, 2.0, epsilon = 1e-3);
        assert_relative_eq!(iv.lower, 14.0, epsilon = 1e-2);
        assert_relative_eq!(iv.upper, 26.0, epsilon = 1e-2);
    }

    #[test]
    fn test_interval_clipped_at_bound() {
        let model = Parabola::new(1.0, 3.0);
        let plc = ProfileLikelihoodCalculator::new(model);
        let iv = plc.likelihood_interval(0.6827).unwrap();
        assert_eq!(iv.lower, 0.0);
        assert_relative_eq!(iv.upper, 4.0, epsilon = 1e-2);
    }

    #[test]
    fn test_profile_curve_validates_range() {
        let model = Parabola::new(1.0, 1.0);
        let mle = MaximumLikelihoodEstimator::new();
        assert!(profile_curve(&mle, &model, 1.0, 0.0, 10).is_err());
        let c = profile_curve(&mle, &model, 0.0, 2.0, 5).unwrap();
        assert_eq!(c.len(), 5);
        assert_relative_eq!(c[2].0, 1.0, epsilon = 1e-12);
    }
}
