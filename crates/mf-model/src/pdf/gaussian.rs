use crate::math::{
    standard_normal_cdf, standard_normal_interval, standard_normal_logpdf, standard_normal_pdf,
    standard_normal_quantile, standard_normal_sf,
};
use crate::pdf::{ShapePdf, check_bounds, check_edges, check_lengths};
use mf_core::{Error, Result};
use rand::{Rng, RngCore};

/// Truncated Gaussian PDF `N(μ, σ)` normalized on the observable bounds.
///
/// Parameters: `[mean, sigma]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianPdf;

impl GaussianPdf {
    /// Create a new Gaussian shape.
    pub fn new() -> Self {
        Self
    }

    fn params(params: &[f64]) -> Result<(f64, f64)> {
        if params.len() != 2 {
            return Err(Error::Validation(format!(
                "GaussianPdf expects 2 params (mean, sigma), got {}",
                params.len()
            )));
        }
        let (mu, sigma) = (params[0], params[1]);
        if !mu.is_finite() || !sigma.is_finite() || sigma <= 0.0 {
            return Err(Error::Validation(format!(
                "GaussianPdf parameters must be finite with sigma > 0, got mean={mu}, sigma={sigma}"
            )));
        }
        Ok((mu, sigma))
    }
}

/// `(Z, d log Z / dμ, d log Z / dσ)` for the truncation interval `[a, b]`.
fn normalization(mu: f64, sigma: f64, a: f64, b: f64) -> (f64, f64, f64) {
    let inv_sigma = 1.0 / sigma;
    let z_a = (a - mu) * inv_sigma;
    let z_b = (b - mu) * inv_sigma;
    let mut z = standard_normal_interval(z_a, z_b);
    if !z.is_finite() || z <= 0.0 {
        // Extreme truncation: keep the cost finite.
        z = f64::MIN_POSITIVE;
    }
    let phi_a = standard_normal_pdf(z_a);
    let phi_b = standard_normal_pdf(z_b);
    let dmu = (phi_a - phi_b) * inv_sigma / z;
    let dsigma = (z_a * phi_a - z_b * phi_b) * inv_sigma / z;
    (z, dmu, dsigma)
}

impl ShapePdf for GaussianPdf {
    fn kind(&self) -> &'static str {
        "Gaussian"
    }

    fn n_params(&self) -> usize {
        2
    }

    fn log_prob_grad_batch(
        &self,
        xs: &[f64],
        bounds: (f64, f64),
        params: &[f64],
        out_logp: &mut [f64],
        mut out_grad: Option<&mut [f64]>,
    ) -> Result<()> {
        let (mu, sigma) = Self::params(params)?;
        check_bounds("GaussianPdf", bounds)?;
        check_lengths("GaussianPdf", xs.len(), 2, out_logp, out_grad.as_deref())?;

        let (z, dlogz_dmu, dlogz_dsigma) = normalization(mu, sigma, bounds.0, bounds.1);
        let log_norm = sigma.ln() + z.ln();
        let inv_sigma = 1.0 / sigma;

        for (i, &x) in xs.iter().enumerate() {
            let z_x = (x - mu) * inv_sigma;
            out_logp[i] = standard_normal_logpdf(z_x) - log_norm;
            if let Some(g) = out_grad.as_deref_mut() {
                g[2 * i] = z_x * inv_sigma - dlogz_dmu;
                g[2 * i + 1] = (z_x * z_x - 1.0) * inv_sigma - dlogz_dsigma;
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
        let (mu, sigma) = Self::params(params)?;
        check_bounds("GaussianPdf", bounds)?;
        let n_bins = check_edges("GaussianPdf", edges)?;
        check_lengths("GaussianPdf", n_bins, 2, out_logp, out_grad.as_deref())?;

        let (z, dlogz_dmu, dlogz_dsigma) = normalization(mu, sigma, bounds.0, bounds.1);
        let log_z = z.ln();
        let inv_sigma = 1.0 / sigma;

        for i in 0..n_bins {
            let lo = edges[i].max(bounds.0);
            let hi = edges[i + 1].min(bounds.1);
            let z1 = (lo - mu) * inv_sigma;
            let z2 = (hi - mu) * inv_sigma;
            let mass = standard_normal_interval(z1, z2);
            let (lp, dmu, dsigma) = if mass > 0.0 {
                let phi1 = standard_normal_pdf(z1);
                let phi2 = standard_normal_pdf(z2);
                (
                    mass.ln() - log_z,
                    (phi1 - phi2) * inv_sigma / mass - dlogz_dmu,
                    (z1 * phi1 - z2 * phi2) * inv_sigma / mass - dlogz_dsigma,
                )
            } else {
                (f64::NEG_INFINITY, 0.0, 0.0)
            };
            out_logp[i] = lp;
            if let Some(g) = out_grad.as_deref_mut() {
                g[2 * i] = dmu;
                g[2 * i + 1] = dsigma;
            }
        }
        Ok(())
    }

    fn sample(&self, bounds: (f64, f64), params: &[f64], rng: &mut dyn RngCore) -> Result<f64> {
        let (mu, sigma) = Self::params(params)?;
        check_bounds("GaussianPdf", bounds)?;
        let (a, b) = bounds;
        let z_a = (a - mu) / sigma;
        let z_b = (b - mu) / sigma;
        let u: f64 = rng.random();
        // Invert on the side of the mode that keeps the tail probabilities precise.
        let z = if z_a > 0.0 {
            let (qa, qb) = (standard_normal_sf(z_a), standard_normal_sf(z_b));
            -standard_normal_quantile(qb + u * (qa - qb))
        } else {
            let (pa, pb) = (standard_normal_cdf(z_a), standard_normal_cdf(z_b));
            standard_normal_quantile(pa + u * (pb - pa))
        };
        let x = mu + sigma * z;
        Ok(if x.is_finite() { x.clamp(a, b) } else { 0.5 * (a + b) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_untruncated_matches_normal_density() {
        let pdf = GaussianPdf::new();
        let mut out = [0.0];
        pdf.log_prob_batch(&[1.0], (-50.0, 50.0), &[0.0, 1.0], &mut out).unwrap();
        assert_relative_eq!(out[0], standard_normal_logpdf(1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_bin_masses_sum_to_one() {
        let pdf = GaussianPdf::new();
        let edges: Vec<f64> = (0..=50).map(|i| 80.0 + 2.4 * i as f64).collect();
        let mut lp = vec![0.0; 50];
        pdf.bin_log_prob_grad(&edges, (80.0, 200.0), &[125.0, 10.0], &mut lp, None).unwrap();
        let total: f64 = lp.iter().map(|l| l.exp()).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bin_grad_matches_finite_difference() {
        let pdf = GaussianPdf::new();
        let edges = [0.0, 2.0, 5.0, 6.0, 10.0];
        let params = [4.0, 1.7];
        let mut lp = [0.0; 4];
        let mut g = [0.0; 8];
        pdf.bin_log_prob_grad(&edges, (0.0, 10.0), &params, &mut lp, Some(&mut g)).unwrap();
        let eps = 1e-6;
        for j in 0..2 {
            let mut p_hi = params;
            let mut p_lo = params;
            p_hi[j] += eps;
            p_lo[j] -= eps;
            let mut up = [0.0; 4];
            let mut dn = [0.0; 4];
            pdf.bin_log_prob_grad(&edges, (0.0, 10.0), &p_hi, &mut up, None).unwrap();
            pdf.bin_log_prob_grad(&edges, (0.0, 10.0), &p_lo, &mut dn, None).unwrap();
            for i in 0..4 {
                assert_relative_eq!(g[2 * i + j], (up[i] - dn[i]) / (2.0 * eps), epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_samples_respect_truncation() {
        let pdf = GaussianPdf::new();
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let mut sum = 0.0;
        for _ in 0..n {
            let x = pdf.sample((80.0, 200.0), &[125.0, 10.0], &mut rng).unwrap();
            assert!((80.0..=200.0).contains(&x));
            sum += x;
        }
        assert_relative_eq!(sum / n as f64, 125.0, epsilon = 0.3);

        // Far upper tail.
        let x = pdf.sample((10.0, 11.0), &[0.0, 1.0], &mut rng).unwrap();
        assert!((10.0..=11.0).contains(&x));
    }

    #[test]
    fn test_invalid_sigma() {
        let pdf = GaussianPdf::new();
        let mut out = [0.0];
        assert!(pdf.log_prob_batch(&[1.0], (0.0, 2.0), &[1.0, 0.0], &mut out).is_err());
    }
}
