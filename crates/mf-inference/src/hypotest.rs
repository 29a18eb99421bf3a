//! Hypothesis test results and asymptotic calculators.
//!
//! Discovery tests use the one-sided `q_0` statistic; limits use `qtilde_μ` with a
//! background-only Asimov dataset, following the asymptotic formulae of Cowan et al.
//! (arXiv:1007.1727). All p-values are right-tail probabilities of the test statistic
//! under the respective hypothesis.

use crate::mle::MaximumLikelihoodEstimator;
use crate::profile_likelihood::{conditional_fit, discovery_q0, poi_index};
use crate::toys::asimov_dataset;
use mf_core::traits::LogDensityModel;
use mf_core::{Error, Result};
use mf_model::CompiledModel;
use mf_model::math::{standard_normal_cdf, standard_normal_quantile, standard_normal_sf};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical expected-set ordering in `-muhat/sigma` space: `n_sigma = [2, 1, 0, -1, -2]`.
///
/// Index 0 therefore holds the lowest expected CLs (the `-2σ` limit).
pub const NSIGMA_ORDER: [f64; 5] = [2.0, 1.0, 0.0, -1.0, -2.0];

const CLB_MIN: f64 = 1e-300;

/// `CLs = CLs+b / CLb`, robust against underflow of `CLb`.
#[inline]
pub(crate) fn safe_cls(clsb: f64, clb: f64) -> f64 {
    if !(clsb.is_finite() && clb.is_finite()) {
        return 0.0;
    }
    if clb <= CLB_MIN {
        return if clsb <= CLB_MIN { 0.0 } else { 1.0 };
    }
    (clsb / clb).clamp(0.0, 1.0)
}

/// Significance `Z = Φ⁻¹(1 - p)`, clipped at zero for `p >= 0.5`.
pub fn p_value_to_significance(p: f64) -> f64 {
    if !(p < 0.5) {
        return 0.0;
    }
    // Φ⁻¹(1 - p) = -Φ⁻¹(p), accurate for tiny p.
    -standard_normal_quantile(p)
}

/// Expected CLs band for a given Asimov `sqrt(q_mu,A)`, ordered as [`NSIGMA_ORDER`].
pub fn expected_cls_band_from_sqrtq_a(sqrtq_a: f64) -> [f64; 5] {
    let mut out = [0.0; 5];
    for (i, t) in NSIGMA_ORDER.into_iter().enumerate() {
        let clsb = standard_normal_cdf(-(t + sqrtq_a));
        let clb = standard_normal_cdf(-t);
        out[i] = safe_cls(clsb, clb);
    }
    out
}

/// Test-statistic values sampled from toys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingDistribution {
    /// Label, e.g. `"null"` or `"alt"`.
    pub name: String,
    /// Finite test-statistic values, sorted ascending.
    pub values: Vec<f64>,
    /// Toys whose fit failed or produced a non-finite statistic.
    pub n_failed: usize,
}

impl SamplingDistribution {
    /// Build from raw values (non-finite values are counted as failures).
    pub fn new(name: impl Into<String>, raw: Vec<f64>, n_failed: usize) -> Self {
        let n_raw = raw.len();
        let mut values: Vec<f64> = raw.into_iter().filter(|v| v.is_finite()).collect();
        let n_failed = n_failed + (n_raw - values.len());
        values.sort_by(f64::total_cmp);
        Self { name: name.into(), values, n_failed }
    }

    /// Number of valid toys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no toy produced a valid value.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `P(t >= threshold)` with add-one smoothing, `(n_ge + 1) / (n + 1)`.
    pub fn right_tail(&self, threshold: f64) -> f64 {
        let n = self.values.len();
        if n == 0 {
            return 0.0;
        }
        let idx = self.values.partition_point(|v| *v < threshold);
        ((n - idx) as f64 + 1.0) / (n as f64 + 1.0)
    }

    /// Linearly interpolated quantile.
    pub fn quantile(&self, p: f64) -> f64 {
        quantile_sorted(&self.values, p)
    }
}

pub(crate) fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if p <= 0.0 {
        return sorted[0];
    }
    if p >= 1.0 {
        return sorted[n - 1];
    }
    let idx = p * ((n - 1) as f64);
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    let w = idx - lo as f64;
    sorted[lo] + w * (sorted[hi] - sorted[lo])
}

/// Result of a single hypothesis test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypoTestResult {
    /// Calculator that produced the result.
    pub name: String,
    /// POI name.
    pub poi_name: String,
    /// POI value of the null hypothesis.
    pub null_value: f64,
    /// POI value of the alternate hypothesis, if any.
    pub alt_value: Option<f64>,
    /// Observed test statistic.
    pub test_statistic: f64,
    /// Right-tail p-value under the null.
    pub null_p_value: f64,
    /// Right-tail p-value under the alternate, if computed.
    pub alt_p_value: Option<f64>,
    /// True when the alternate is the background-only hypothesis (limit setting).
    pub background_is_alt: bool,
    /// Unconditional best-fit POI on the observed data.
    pub mu_hat: f64,
    /// Test statistic under the null (toys only).
    pub null_distribution: Option<SamplingDistribution>,
    /// Test statistic under the alternate (toys only).
    pub alt_distribution: Option<SamplingDistribution>,
}

impl HypoTestResult {
    /// Significance of the null p-value.
    pub fn significance(&self) -> f64 {
        p_value_to_significance(self.null_p_value)
    }

    /// `CLb`: the p-value of whichever hypothesis is background-only (the null for
    /// discovery, the alternate for limits).
    pub fn cl_b(&self) -> f64 {
        if self.background_is_alt {
            self.alt_p_value.unwrap_or(f64::NAN)
        } else {
            self.null_p_value
        }
    }

    /// `CLs+b`: the signal-plus-background p-value.
    pub fn cl_sb(&self) -> f64 {
        if self.background_is_alt {
            self.null_p_value
        } else {
            self.alt_p_value.unwrap_or(f64::NAN)
        }
    }

    /// `CLs = CLs+b / CLb`.
    pub fn cl_s(&self) -> f64 {
        safe_cls(self.cl_sb(), self.cl_b())
    }
}

impl fmt::Display for HypoTestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Results {}:", self.name)?;
        writeln!(f, " - Null p-value = {:.6e}", self.null_p_value)?;
        writeln!(f, " - Significance = {:.6}", self.significance())?;
        if self.alt_p_value.is_some() {
            writeln!(f, " - CL_b: {:.6e}", self.cl_b())?;
            writeln!(f, " - CL_s+b: {:.6e}", self.cl_sb())?;
            writeln!(f, " - CL_s: {:.6e}", self.cl_s())?;
        }
        writeln!(f, " - Test statistic = {:.6}", self.test_statistic)?;
        write!(f, " - Best fit {} = {:.6}", self.poi_name, self.mu_hat)?;
        for d in [&self.null_distribution, &self.alt_distribution].into_iter().flatten() {
            write!(f, "\n - {} toys: {} valid, {} failed", d.name, d.len(), d.n_failed)?;
        }
        Ok(())
    }
}

/// CLs evaluation at one tested POI value, with the expected band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClsPoint {
    /// Tested POI value.
    pub mu: f64,
    /// Observed CLs.
    pub cls: f64,
    /// Observed CLs+b.
    pub clsb: f64,
    /// Observed CLb.
    pub clb: f64,
    /// Observed `qtilde_μ`.
    pub q_mu: f64,
    /// Expected CLs ordered as [`NSIGMA_ORDER`].
    pub expected: [f64; 5],
}

fn require_data(model: &CompiledModel) -> Result<()> {
    if model.data().is_none() {
        return Err(Error::Validation(format!(
            "model '{}' has no dataset bound",
            model.pdf_name()
        )));
    }
    Ok(())
}

/// Asymptotic calculator for a model bound to observed data.
#[derive(Debug, Clone)]
pub struct AsymptoticCalculator {
    model: CompiledModel,
    mle: MaximumLikelihoodEstimator,
}

impl AsymptoticCalculator {
    /// Calculator for `model`, which must have a POI and a dataset.
    pub fn new(model: CompiledModel) -> Result<Self> {
        poi_index(&model)?;
        require_data(&model)?;
        Ok(Self { model, mle: MaximumLikelihoodEstimator::new() })
    }

    /// Replace the estimator.
    pub fn with_estimator(mut self, mle: MaximumLikelihoodEstimator) -> Self {
        self.mle = mle;
        self
    }

    /// The model under test.
    pub fn model(&self) -> &CompiledModel {
        &self.model
    }

    /// One-sided discovery test of `POI = null_value` against `POI = alt_value`.
    ///
    /// `p_null = Φc(√q0)`; the alternate p-value uses `q0_A` from an Asimov dataset
    /// generated at `alt_value` with nuisances from the conditional fit to the data:
    /// `p_alt = Φc(√q0 - √q0_A)`.
    pub fn discovery(&self, null_value: f64, alt_value: f64) -> Result<HypoTestResult> {
        let poi = poi_index(&self.model)?;
        let (q0, free, _) = discovery_q0(&self.mle, &self.model, null_value)?;
        let mu_hat = free.parameters[poi];

        let alt_fit = conditional_fit(&self.mle, &self.model, poi, alt_value, &free.parameters)?;
        let asimov = asimov_dataset(&self.model, &alt_fit.parameters)?;
        let asimov_model = self.model.with_data(asimov)?.with_init(&alt_fit.parameters)?;
        let (q0_a, _, _) = discovery_q0(&self.mle, &asimov_model, null_value)?;

        let sqrt_q0 = q0.sqrt();
        let sqrt_q0_a = q0_a.sqrt();
        log::debug!("asymptotic discovery: q0={q0}, q0_A={q0_a}, mu_hat={mu_hat}");

        Ok(HypoTestResult {
            name: "AsymptoticCalculator".to_string(),
            poi_name: self.model.parameter_names()[poi].clone(),
            null_value,
            alt_value: Some(alt_value),
            test_statistic: q0,
            null_p_value: standard_normal_sf(sqrt_q0),
            alt_p_value: Some(standard_normal_sf(sqrt_q0 - sqrt_q0_a)),
            background_is_alt: false,
            mu_hat,
            null_distribution: None,
            alt_distribution: None,
        })
    }

    /// Context for repeated `qtilde` CLs evaluations with the background at `background_value`.
    pub fn cls_context(&self, background_value: f64) -> Result<AsymptoticCLsContext> {
        AsymptoticCLsContext::new(&self.mle, &self.model, background_value)
    }
}

/// Cached free fits and background-only Asimov model for asymptotic CLs.
#[derive(Debug, Clone)]
pub struct AsymptoticCLsContext {
    poi: usize,
    mle: MaximumLikelihoodEstimator,
    data_model: CompiledModel,
    asimov_model: CompiledModel,
    free_data_nll: f64,
    free_data_params: Vec<f64>,
    free_asimov_nll: f64,
    free_asimov_params: Vec<f64>,
}

impl AsymptoticCLsContext {
    /// Fit the data freely, build the Asimov dataset at `POI = background_value` with
    /// nuisances from the conditional fit, and fit that freely too.
    pub fn new(
        mle: &MaximumLikelihoodEstimator,
        model: &CompiledModel,
        background_value: f64,
    ) -> Result<Self> {
        let poi = poi_index(model)?;
        require_data(model)?;

        let free_data = mle.fit_minimum(model)?;
        if !free_data.converged {
            log::warn!("free fit on observed data did not converge: {}", free_data.message);
        }
        let fixed_b = conditional_fit(mle, model, poi, background_value, &free_data.parameters)?;

        let asimov = asimov_dataset(model, &fixed_b.parameters)?;
        let asimov_model = model.with_data(asimov)?.with_init(&fixed_b.parameters)?;
        let free_asimov = mle.fit_minimum(&asimov_model)?;
        if !free_asimov.converged {
            log::warn!("free fit on Asimov data did not converge: {}", free_asimov.message);
        }

        Ok(Self {
            poi,
            mle: mle.clone(),
            data_model: model.clone(),
            asimov_model,
            free_data_nll: free_data.fval,
            free_data_params: free_data.parameters,
            free_asimov_nll: free_asimov.fval,
            free_asimov_params: free_asimov.parameters,
        })
    }

    /// Best-fit POI on the observed data.
    pub fn mu_hat(&self) -> f64 {
        self.free_data_params[self.poi]
    }

    fn qtilde(&self, model: &CompiledModel, free_nll: f64, free: &[f64], mu: f64) -> Result<f64> {
        if free[self.poi] > mu {
            return Ok(0.0);
        }
        let fixed = conditional_fit(&self.mle, model, self.poi, mu, free)?;
        Ok((2.0 * (fixed.fval - free_nll)).max(0.0))
    }

    /// Observed and expected CLs at `mu` with the `qtilde` statistic.
    pub fn hypotest_qtilde(&self, mu: f64) -> Result<ClsPoint> {
        let q_mu = self.qtilde(&self.data_model, self.free_data_nll, &self.free_data_params, mu)?;
        let q_mu_a =
            self.qtilde(&self.asimov_model, self.free_asimov_nll, &self.free_asimov_params, mu)?;

        let sqrtq = q_mu.sqrt();
        let sqrtq_a = q_mu_a.sqrt();
        let teststat = if sqrtq <= sqrtq_a {
            sqrtq - sqrtq_a
        } else {
            (q_mu - q_mu_a) / (2.0 * sqrtq_a.max(1e-16))
        };

        let clsb = standard_normal_cdf(-(teststat + sqrtq_a));
        let clb = standard_normal_cdf(-teststat);
        Ok(ClsPoint {
            mu,
            cls: safe_cls(clsb, clb),
            clsb,
            clb,
            q_mu,
            expected: expected_cls_band_from_sqrtq_a(sqrtq_a),
        })
    }

    /// Observed CLs result at `mu` in [`HypoTestResult`] form (null = S+B at `mu`).
    pub fn hypotest(&self, mu: f64) -> Result<HypoTestResult> {
        let p = self.hypotest_qtilde(mu)?;
        Ok(HypoTestResult {
            name: "AsymptoticCalculator".to_string(),
            poi_name: self.data_model.parameter_names()[self.poi].clone(),
            null_value: mu,
            alt_value: None,
            test_statistic: p.q_mu,
            null_p_value: p.clsb,
            alt_p_value: Some(p.clb),
            background_is_alt: true,
            mu_hat: self.mu_hat(),
            null_distribution: None,
            alt_distribution: None,
        })
    }
}
