//! Toy-based frequentist hypothesis tests.
//!
//! Toys are generated from the model at parameter points obtained by conditional fits
//! to the observed data (nuisances profiled at the tested POI value). Randomness is
//! deterministic via per-toy seeding (`seed + toy_idx`), independent of threading; the
//! alternate ensemble is offset by `1e9` so the two ensembles never share seeds.

use crate::hypotest::{
    ClsPoint, HypoTestResult, NSIGMA_ORDER, SamplingDistribution, quantile_sorted, safe_cls,
};
use crate::inverter::InverterBackend;
use crate::mle::MaximumLikelihoodEstimator;
use crate::profile_likelihood::{conditional_fit, discovery_q0, poi_index};
use crate::toys::toy_dataset;
use mf_core::traits::LogDensityModel;
use mf_core::{Error, Result};
use mf_model::CompiledModel;
use mf_model::math::standard_normal_cdf;
use rayon::prelude::*;

const ALT_SEED_OFFSET: u64 = 1_000_000_000;

/// Frequentist calculator sampling the test statistic with toys.
#[derive(Debug, Clone)]
pub struct FrequentistCalculator {
    model: CompiledModel,
    mle: MaximumLikelihoodEstimator,
    n_toys_null: usize,
    n_toys_alt: usize,
    seed: u64,
    background_value: f64,
}

impl FrequentistCalculator {
    /// Calculator for `model`, which must have a POI and a dataset.
    ///
    /// Defaults: 1000 null toys, 1000 alternate toys, seed 0, background at `POI = 0`.
    pub fn new(model: CompiledModel) -> Result<Self> {
        poi_index(&model)?;
        if model.data().is_none() {
            return Err(Error::Validation(format!(
                "model '{}' has no dataset bound",
                model.pdf_name()
            )));
        }
        Ok(Self {
            model,
            mle: MaximumLikelihoodEstimator::new(),
            n_toys_null: 1000,
            n_toys_alt: 1000,
            seed: 0,
            background_value: 0.0,
        })
    }

    /// Number of toys for the null and alternate hypotheses.
    pub fn with_toys(mut self, n_toys_null: usize, n_toys_alt: usize) -> Self {
        self.n_toys_null = n_toys_null;
        self.n_toys_alt = n_toys_alt;
        self
    }

    /// Base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// POI value of the background-only hypothesis used for CLs.
    pub fn with_background_value(mut self, value: f64) -> Self {
        self.background_value = value;
        self
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

    fn check_toys(&self) -> Result<()> {
        if self.n_toys_null == 0 || self.n_toys_alt == 0 {
            return Err(Error::Validation(format!(
                "number of toys must be > 0, got null={} alt={}",
                self.n_toys_null, self.n_toys_alt
            )));
        }
        Ok(())
    }

    /// Sample `statistic` over `n_toys` toys generated at `gen_params`.
    fn ensemble<F>(
        &self,
        name: &str,
        gen_params: &[f64],
        n_toys: usize,
        seed: u64,
        statistic: F,
    ) -> Result<SamplingDistribution>
    where
        F: Fn(&CompiledModel) -> Result<f64> + Sync,
    {
        let results: Vec<Result<f64>> = (0..n_toys)
            .into_par_iter()
            .with_min_len(16)
            .map(|toy_idx| {
                let toy = toy_dataset(&self.model, gen_params, seed.wrapping_add(toy_idx as u64))?;
                let toy_model = self.model.with_data(toy)?.with_init(gen_params)?;
                statistic(&toy_model)
            })
            .collect();

        let mut values = Vec::with_capacity(n_toys);
        let mut n_failed = 0usize;
        for r in results {
            match r {
                Ok(q) => values.push(q),
                Err(e) => {
                    log::debug!("{name} toy failed: {e}");
                    n_failed += 1;
                }
            }
        }
        let dist = SamplingDistribution::new(name, values, n_failed);
        if dist.is_empty() {
            return Err(Error::Computation(format!("all {n_toys} {name} toys failed")));
        }
        if dist.n_failed > 0 {
            log::warn!("{} of {n_toys} {name} toys failed", dist.n_failed);
        }
        Ok(dist)
    }

    /// One-sided discovery test of `POI = null_value` against `POI = alt_value`.
    ///
    /// The null ensemble is generated at the conditional fit for `null_value`, the
    /// alternate one at the conditional fit for `alt_value`; both are evaluated with
    /// the discovery statistic `q_0`.
    pub fn discovery(&self, null_value: f64, alt_value: f64) -> Result<HypoTestResult> {
        self.check_toys()?;
        let poi = poi_index(&self.model)?;
        let (q_obs, free, fixed_null) = discovery_q0(&self.mle, &self.model, null_value)?;
        let alt_fit = conditional_fit(&self.mle, &self.model, poi, alt_value, &free.parameters)?;

        let statistic = |m: &CompiledModel| Ok(discovery_q0(&self.mle, m, null_value)?.0);
        let null_dist =
            self.ensemble("null", &fixed_null.parameters, self.n_toys_null, self.seed, statistic)?;
        let alt_dist = self.ensemble(
            "alt",
            &alt_fit.parameters,
            self.n_toys_alt,
            self.seed.wrapping_add(ALT_SEED_OFFSET),
            statistic,
        )?;

        Ok(HypoTestResult {
            name: "FrequentistCalculator".to_string(),
            poi_name: self.model.parameter_names()[poi].clone(),
            null_value,
            alt_value: Some(alt_value),
            test_statistic: q_obs,
            null_p_value: null_dist.right_tail(q_obs),
            alt_p_value: Some(alt_dist.right_tail(q_obs)),
            background_is_alt: false,
            mu_hat: free.parameters[poi],
            null_distribution: Some(null_dist),
            alt_distribution: Some(alt_dist),
        })
    }

    /// `qtilde_μ` on the model's data, warm-started from its init values.
    fn qtilde(&self, model: &CompiledModel, poi: usize, mu: f64) -> Result<f64> {
        let free = self.mle.fit_minimum(model)?;
        if free.parameters[poi] > mu {
            return Ok(0.0);
        }
        let fixed = conditional_fit(&self.mle, model, poi, mu, &free.parameters)?;
        Ok((2.0 * (fixed.fval - free.fval)).max(0.0))
    }

    fn cls_impl(&self, mu: f64) -> Result<(ClsPoint, HypoTestResult)> {
        self.check_toys()?;
        let poi = poi_index(&self.model)?;

        let free = self.mle.fit_minimum(&self.model)?;
        let fixed_mu = conditional_fit(&self.mle, &self.model, poi, mu, &free.parameters)?;
        let fixed_b =
            conditional_fit(&self.mle, &self.model, poi, self.background_value, &free.parameters)?;
        let mu_hat = free.parameters[poi];
        let q_obs = if mu_hat > mu { 0.0 } else { (2.0 * (fixed_mu.fval - free.fval)).max(0.0) };

        let statistic = |m: &CompiledModel| self.qtilde(m, poi, mu);
        let sb = self.ensemble(
            "s+b",
            &fixed_mu.parameters,
            self.n_toys_null,
            self.seed.wrapping_add(ALT_SEED_OFFSET),
            statistic,
        )?;
        let b = self.ensemble("b", &fixed_b.parameters, self.n_toys_alt, self.seed, statistic)?;

        let clsb = sb.right_tail(q_obs);
        let clb = b.right_tail(q_obs);

        // Expected band: CLs of each background-only toy, at the band quantiles.
        let mut cls_vals: Vec<f64> =
            b.values.iter().map(|&q| safe_cls(sb.right_tail(q), b.right_tail(q))).collect();
        cls_vals.sort_by(f64::total_cmp);
        let mut expected = [0.0; 5];
        for (i, t) in NSIGMA_ORDER.into_iter().enumerate() {
            expected[i] = quantile_sorted(&cls_vals, standard_normal_cdf(-t));
        }

        let point = ClsPoint { mu, cls: safe_cls(clsb, clb), clsb, clb, q_mu: q_obs, expected };
        let result = HypoTestResult {
            name: "FrequentistCalculator".to_string(),
            poi_name: self.model.parameter_names()[poi].clone(),
            null_value: mu,
            alt_value: Some(self.background_value),
            test_statistic: q_obs,
            null_p_value: clsb,
            alt_p_value: Some(clb),
            background_is_alt: true,
            mu_hat,
            null_distribution: Some(sb),
            alt_distribution: Some(b),
        };
        Ok((point, result))
    }

    /// Observed and expected CLs at `mu` with the `qtilde` statistic.
    pub fn cls_qtilde(&self, mu: f64) -> Result<ClsPoint> {
        Ok(self.cls_impl(mu)?.0)
    }

    /// CLs test at `mu` as a [`HypoTestResult`] including both sampling distributions.
    pub fn hypotest_qtilde(&self, mu: f64) -> Result<HypoTestResult> {
        Ok(self.cls_impl(mu)?.1)
    }
}

impl InverterBackend for FrequentistCalculator {
    fn name(&self) -> &str {
        "FrequentistCalculator"
    }

    fn evaluate(&self, mu: f64) -> Result<ClsPoint> {
        self.cls_qtilde(mu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_models::counting_model;
    use approx::assert_relative_eq;

    #[test]
    fn test_discovery_toys_with_clear_excess() {
        let model = counting_model(&[10.0, 40.0, 10.0, 10.0]);
        let calc = FrequentistCalculator::new(model).unwrap().with_toys(50, 50).with_seed(3);
        let r = calc.discovery(0.0, 40.0).unwrap();

        let null = r.null_distribution.as_ref().unwrap();
        let alt = r.alt_distribution.as_ref().unwrap();
        assert_eq!(null.len() + null.n_failed, 50);
        assert_eq!(alt.len() + alt.n_failed, 50);
        // No background toy reaches the observed excess: p = 1 / (n + 1).
        assert!(r.null_p_value <= 2.0 / 51.0, "{r}");
        let p_alt = r.alt_p_value.unwrap();
        assert!(p_alt > 0.0 && p_alt <= 1.0);
        assert!(null.values.iter().all(|&q| q >= 0.0));
    }

    #[test]
    fn test_discovery_toys_with_unscaled_estimator() {
        let model = counting_model(&[10.0, 40.0, 10.0, 10.0]);
        let scaled = FrequentistCalculator::new(model.clone()).unwrap().with_toys(20, 20);
        let unscaled = FrequentistCalculator::new(model)
            .unwrap()
            .with_toys(20, 20)
            .with_estimator(MaximumLikelihoodEstimator::new().with_scaling(false));
        let a = scaled.discovery(0.0, 40.0).unwrap();
        let b = unscaled.discovery(0.0, 40.0).unwrap();

        assert_relative_eq!(b.test_statistic, a.test_statistic, max_relative = 1e-3);
        assert_relative_eq!(b.mu_hat, a.mu_hat, epsilon = 1e-2);
        assert!(b.null_p_value <= 2.0 / 21.0, "{b}");
    }

    #[test]
    fn test_discovery_toys_reproducible() {
        let model = counting_model(&[12.0, 18.0, 10.0, 9.0]);
        let calc = FrequentistCalculator::new(model).unwrap().with_toys(20, 20).with_seed(11);
        let a = calc.discovery(0.0, 20.0).unwrap();
        let b = calc.discovery(0.0, 20.0).unwrap();
        assert_eq!(a.null_distribution.unwrap().values, b.null_distribution.unwrap().values);
        assert_eq!(a.alt_p_value, b.alt_p_value);
    }

    #[test]
    fn test_cls_excludes_large_signal() {
        let model = counting_model(&[10.0, 11.0, 9.0, 10.0]);
        let calc = FrequentistCalculator::new(model).unwrap().with_toys(50, 50).with_seed(5);
        let p = calc.cls_qtilde(60.0).unwrap();
        assert!(p.cls < 0.1, "{p:?}");
        for w in p.expected.windows(2) {
            assert!(w[0] <= w[1], "{:?}", p.expected);
        }
    }

    #[test]
    fn test_zero_toys_rejected() {
        let model = counting_model(&[10.0, 10.0]);
        let calc = FrequentistCalculator::new(model).unwrap().with_toys(0, 10);
        assert!(calc.discovery(0.0, 5.0).is_err());
    }
}
