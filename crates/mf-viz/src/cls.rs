use mf_core::{Error, Result};
use mf_inference::HypoTestInverterResult;
use serde::{Deserialize, Serialize};

/// Expected-set ordering in `-muhat/sigma` space, `[2, 1, 0, -1, -2]`.
pub type NsSigmaOrder = [i32; 5];

const NSIGMA_ORDER: NsSigmaOrder = [2, 1, 0, -1, -2];

/// Plot-friendly artifact for a CLs scan: observed CLs, CLs+b and CLb, and the
/// expected (Brazil) band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClsCurveArtifact {
    /// Name of the calculator behind the scan.
    pub calculator: String,
    /// POI label for the x axis.
    pub poi_label: String,
    /// Confidence level of the inversion.
    pub cl: f64,
    /// Target level `1 - cl`.
    pub alpha: f64,
    /// Whether the limit inverts CLs (true) or CLs+b.
    pub use_cls: bool,
    /// Canonical ordering of `cls_exp`.
    pub nsigma_order: NsSigmaOrder,
    /// Scan x-values.
    pub mu_values: Vec<f64>,
    /// Observed CLs aligned with `mu_values`.
    pub cls_obs: Vec<f64>,
    /// Observed CLs+b aligned with `mu_values`.
    pub clsb_obs: Vec<f64>,
    /// Observed CLb aligned with `mu_values`.
    pub clb_obs: Vec<f64>,
    /// `cls_exp[i][j]` is the expected CLs for `nsigma_order[i]` at `mu_values[j]`.
    pub cls_exp: [Vec<f64>; 5],
    /// Observed upper limit.
    pub obs_limit: f64,
    /// Expected upper limits ordered as `nsigma_order`.
    pub exp_limits: [f64; 5],
}

impl ClsCurveArtifact {
    /// Build from an inverter result; limits are interpolated from the scan.
    pub fn from_result(
        result: &HypoTestInverterResult,
        poi_label: impl Into<String>,
    ) -> Result<Self> {
        if result.points.len() < 2 {
            return Err(Error::Validation("CLs curve needs at least 2 scan points".to_string()));
        }
        let n = result.points.len();
        let mut cls_exp: [Vec<f64>; 5] = std::array::from_fn(|_| Vec::with_capacity(n));
        for p in &result.points {
            for (i, v) in p.expected.iter().enumerate() {
                cls_exp[i].push(*v);
            }
        }

        let mut exp_limits = [0.0; 5];
        for (i, &t) in NSIGMA_ORDER.iter().enumerate() {
            // Band entry `t` in -muhat/sigma space is the `-t` sigma expected limit.
            exp_limits[i] = result.expected_upper_limit(-t)?;
        }

        Ok(Self {
            calculator: result.calculator.clone(),
            poi_label: poi_label.into(),
            cl: result.cl,
            alpha: 1.0 - result.cl,
            use_cls: result.use_cls,
            nsigma_order: NSIGMA_ORDER,
            mu_values: result.mu_values(),
            cls_obs: result.points.iter().map(|p| p.cls).collect(),
            clsb_obs: result.points.iter().map(|p| p.clsb).collect(),
            clb_obs: result.points.iter().map(|p| p.clb).collect(),
            cls_exp,
            obs_limit: result.upper_limit()?,
            exp_limits,
        })
    }

    /// Median expected limit.
    pub fn median_limit(&self) -> f64 {
        self.exp_limits[2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_inference::ClsPoint;
    use mf_inference::hypotest::expected_cls_band_from_sqrtq_a;

    fn result() -> HypoTestInverterResult {
        let points = (0..=10)
            .map(|i| {
                let mu = i as f64;
                let sqrtq = mu / 3.0;
                let band = expected_cls_band_from_sqrtq_a(sqrtq);
                ClsPoint {
                    mu,
                    cls: band[2],
                    clsb: band[2] * 0.5,
                    clb: 0.5,
                    q_mu: sqrtq * sqrtq,
                    expected: band,
                }
            })
            .collect();
        HypoTestInverterResult { calculator: "test".into(), cl: 0.95, use_cls: true, points }
    }

    #[test]
    fn test_artifact_aligned_arrays_and_limits() {
        let art = ClsCurveArtifact::from_result(&result(), "nsig").unwrap();
        assert_eq!(art.mu_values.len(), 11);
        for v in &art.cls_exp {
            assert_eq!(v.len(), 11);
        }
        assert!((art.alpha - 0.05).abs() < 1e-12);
        // Observed equals the median here.
        assert!((art.obs_limit - art.median_limit()).abs() < 1e-9);
        for w in art.exp_limits.windows(2) {
            assert!(w[0] <= w[1], "{:?}", art.exp_limits);
        }
    }

    #[test]
    fn test_too_few_points_rejected() {
        let mut r = result();
        r.points.truncate(1);
        assert!(ClsCurveArtifact::from_result(&r, "mu").is_err());
    }
}
