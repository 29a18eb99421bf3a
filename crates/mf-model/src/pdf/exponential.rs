use crate::math::log_diff_exp;
use crate::pdf::{ShapePdf, check_bounds, check_edges, check_lengths};
use mf_core::{Error, Result};
use rand::{Rng, RngCore};

/// Exponential-family PDF `p(x) ∝ exp(c x)` normalized on the observable bounds.
///
/// `c` may take any real value; a falling background has `c < 0`.
/// Parameters: `[c]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialPdf;

impl ExponentialPdf {
    /// Create a new exponential shape.
    pub fn new() -> Self {
        Self
    }

    fn param(params: &[f64]) -> Result<f64> {
        if params.len() != 1 {
            return Err(Error::Validation(format!(
                "ExponentialPdf expects 1 param (c), got {}",
                params.len()
            )));
        }
        let c = params[0];
        if !c.is_finite() {
            return Err(Error::Validation(format!(
                "ExponentialPdf parameter must be finite, got c={c}"
            )));
        }
        Ok(c)
    }
}

/// Return `(logZ, E[x])` for `p(x) ∝ exp(λ x)` on `[a, b]`, `a < b`.
fn logz_and_ex(lambda: f64, a: f64, b: f64) -> (f64, f64) {
    debug_assert!(a < b);

    // Small-λ limit: uniform on [a,b].
    if lambda.abs() < 1e-12 {
        return ((b - a).ln(), 0.5 * (a + b));
    }

    let t_a = lambda * a;
    let t_b = lambda * b;
    let (hi_t, lo_t) = if t_b >= t_a { (t_b, t_a) } else { (t_a, t_b) };
    if hi_t == lo_t {
        return ((b - a).ln(), 0.5 * (a + b));
    }
    let log_z = log_diff_exp(hi_t, lo_t) - lambda.abs().ln();

    // E[x] = d/dλ logZ = (x_hi - x_lo r)/(1 - r) - 1/λ with r = exp(lo - hi).
    let (x_hi, x_lo, r) =
        if t_b >= t_a { (b, a, (t_a - t_b).exp()) } else { (a, b, (t_b - t_a).exp()) };
    let denom = 1.0 - r;
    if denom <= 0.0 {
        return ((b - a).ln(), 0.5 * (a + b));
    }
    (log_z, (x_hi - x_lo * r) / denom - 1.0 / lambda)
}

impl ShapePdf for ExponentialPdf {
    fn kind(&self) -> &'static str {
        "Exponential"
    }

    fn n_params(&self) -> usize {
        1
    }

    fn log_prob_grad_batch(
        &self,
        xs: &[f64],
        bounds: (f64, f64),
        params: &[f64],
        out_logp: &mut [f64],
        mut out_grad: Option<&mut [f64]>,
    ) -> Result<()> {
        let c = Self::param(params)?;
        check_bounds("ExponentialPdf", bounds)?;
        check_lengths("ExponentialPdf", xs.len(), 1, out_logp, out_grad.as_deref())?;

        let (log_z, ex) = logz_and_ex(c, bounds.0, bounds.1);
        for (i, &x) in xs.iter().enumerate() {
            out_logp[i] = c * x - log_z;
            if let Some(g) = out_grad.as_deref_mut() {
                g[i] = x - ex;
            }
        }
        Ok(())
    }

    fn bin_log_prob_grad(
        &self,
        edges: &[f64],
        bounds: (f64, f64),
        params: &[f64],
        out_logp: &mut [f64],
        mut out_grad: Option<&mut [f64]>,
    ) -> Result<()> {
        let c = Self::param(params)?;
        check_bounds("ExponentialPdf", bounds)?;
        let n_bins = check_edges("ExponentialPdf", edges)?;
        check_lengths("ExponentialPdf", n_bins, 1, out_logp, out_grad.as_deref())?;

        let (log_z, ex) = logz_and_ex(c, bounds.0, bounds.1);
        for i in 0..n_bins {
            let lo = edges[i].max(bounds.0);
            let hi = edges[i + 1].min(bounds.1);
            let (lp, d) = if lo < hi {
                let (log_zb, ex_b) = logz_and_ex(c, lo, hi);
                (log_zb - log_z, ex_b - ex)
            } else {
                (f64::NEG_INFINITY, 0.0)
            };
            out_logp[i] = lp;
            if let Some(g) = out_grad.as_deref_mut() {
                g[i] = d;
            }
        }
        Ok(())
    }

    fn sample(&self, bounds: (f64, f64), params: &[f64], rng: &mut dyn RngCore) -> Result<f64> {
        let c = Self::param(params)?;
        check_bounds("ExponentialPdf", bounds)?;
        let (a, b) = bounds;
        let len = b - a;
        let u: f64 = rng.random();
        let x = if (c * len).abs() < 1e-12 {
            a + u * len
        } else if c < 0.0 {
            a + (u * (c * len).exp_m1()).ln_1p() / c
        } else {
            // Sample the distance from the upper edge, which falls off with rate c.
            b + (u * (-c * len).exp_m1()).ln_1p() / c
        };
        Ok(x.clamp(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_density_normalized() {
        let pdf = ExponentialPdf::new();
        let n = 10_000;
        let xs: Vec<f64> = (0..n).map(|i| 80.0 + 120.0 * (i as f64 + 0.5) / n as f64).collect();
        let mut lp = vec![0.0; n];
        pdf.log_prob_batch(&xs, (80.0, 200.0), &[-0.01], &mut lp).unwrap();
        let integral: f64 = lp.iter().map(|l| l.exp() * 120.0 / n as f64).sum();
        assert_relative_eq!(integral, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_uniform_limit() {
        let pdf = ExponentialPdf::new();
        let mut lp = [0.0; 2];
        pdf.log_prob_batch(&[1.0, 3.0], (0.0, 4.0), &[0.0], &mut lp).unwrap();
        assert_relative_eq!(lp[0], -(4.0f64.ln()), epsilon = 1e-12);
        assert_relative_eq!(lp[1], lp[0], epsilon = 1e-12);
    }

    #[test]
    fn test_bin_grad_matches_finite_difference() {
        let pdf = ExponentialPdf::new();
        let edges = [40.0, 100.0, 250.0, 400.0];
        let mut lp = [0.0; 3];
        let mut g = [0.0; 3];
        pdf.bin_log_prob_grad(&edges, (40.0, 400.0), &[-0.02], &mut lp, Some(&mut g)).unwrap();
        let total: f64 = lp.iter().map(|l| l.exp()).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);

        let eps = 1e-7;
        let mut up = [0.0; 3];
        let mut dn = [0.0; 3];
        pdf.bin_log_prob_grad(&edges, (40.0, 400.0), &[-0.02 + eps], &mut up, None).unwrap();
        pdf.bin_log_prob_grad(&edges, (40.0, 400.0), &[-0.02 - eps], &mut dn, None).unwrap();
        for i in 0..3 {
            assert_relative_eq!(g[i], (up[i] - dn[i]) / (2.0 * eps), epsilon = 1e-4);
        }
    }

    #[test]
    fn test_sample_mean_matches_expectation() {
        let pdf = ExponentialPdf::new();
        let mut rng = StdRng::seed_from_u64(3);
        for &c in &[-0.01, 0.02] {
            let n = 20_000;
            let mut sum = 0.0;
            for _ in 0..n {
                let x = pdf.sample((80.0, 200.0), &[c], &mut rng).unwrap();
                assert!((80.0..=200.0).contains(&x));
                sum += x;
            }
            let (_, ex) = logz_and_ex(c, 80.0, 200.0);
            assert_relative_eq!(sum / n as f64, ex, epsilon = 1.0);
        }
    }
}
