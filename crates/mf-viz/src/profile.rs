use mf_core::{Error, Result};
use mf_inference::{LikelihoodInterval, ProfileLikelihoodScan};
use serde::{Deserialize, Serialize};

/// Plot-friendly artifact for a profile likelihood curve `-log λ(μ)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileCurveArtifact {
    /// POI name for the x-axis label.
    pub poi_name: String,
    /// Unconditional best-fit POI value.
    pub mu_hat: f64,
    /// Scan x-values.
    pub mu_values: Vec<f64>,
    /// `nll(μ) - nll(μ̂)` aligned with `mu_values`.
    pub delta_nll: Vec<f64>,
    /// Interval confidence level, when an interval is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cl: Option<f64>,
    /// `ΔNLL` level defining the interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// Interval end points.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<(f64, f64)>,
}

impl ProfileCurveArtifact {
    /// Curve from `(μ, ΔNLL)` pairs, e.g. `profile_likelihood::profile_curve`.
    pub fn new(poi_name: impl Into<String>, mu_hat: f64, curve: &[(f64, f64)]) -> Result<Self> {
        if curve.len() < 2 {
            return Err(Error::Validation("profile curve needs at least 2 points".to_string()));
        }
        Ok(Self {
            poi_name: poi_name.into(),
            mu_hat,
            mu_values: curve.iter().map(|p| p.0).collect(),
            delta_nll: curve.iter().map(|p| p.1).collect(),
            cl: None,
            threshold: None,
            interval: None,
        })
    }

    /// Attach an interval and its threshold.
    pub fn with_interval(mut self, interval: &LikelihoodInterval) -> Self {
        self.cl = Some(interval.cl);
        self.threshold = Some(interval.threshold);
        self.interval = Some((interval.lower, interval.upper));
        self
    }

    /// Largest `ΔNLL` in the curve.
    pub fn max_delta_nll(&self) -> f64 {
        self.delta_nll.iter().copied().filter(|v| v.is_finite()).fold(0.0, f64::max)
    }
}

impl From<ProfileLikelihoodScan> for ProfileCurveArtifact {
    fn from(scan: ProfileLikelihoodScan) -> Self {
        let ProfileLikelihoodScan { mu_hat, nll_hat, points, .. } = scan;
        Self {
            poi_name: "\u{03BC}".to_string(),
            mu_hat,
            mu_values: points.iter().map(|p| p.mu).collect(),
            delta_nll: points.iter().map(|p| p.nll_mu - nll_hat).collect(),
            cl: None,
            threshold: None,
            interval: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_inference::ProfilePoint;

    #[test]
    fn test_interval_attached() {
        let curve: Vec<(f64, f64)> =
            (0..=20).map(|i| (i as f64, 0.5 * ((i as f64 - 10.0) / 3.0).powi(2))).collect();
        let interval = LikelihoodInterval {
            poi_name: "mu".into(),
            cl: 0.683,
            mu_hat: 10.0,
            nll_hat: 0.0,
            threshold: 0.5,
            lower: 7.0,
            upper: 13.0,
        };
        let art = ProfileCurveArtifact::new("mu", 10.0, &curve).unwrap().with_interval(&interval);
        assert_eq!(art.interval, Some((7.0, 13.0)));
        assert_eq!(art.threshold, Some(0.5));
        assert!((art.max_delta_nll() - 50.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_scan_uses_delta_nll() {
        let scan = ProfileLikelihoodScan {
            poi_index: 0,
            mu_hat: 1.0,
            nll_hat: 10.0,
            points: vec![
                ProfilePoint {
                    mu: 0.0,
                    q_mu: 2.0,
                    delta_nll: 1.0,
                    nll_mu: 11.0,
                    converged: true,
                    n_iter: 3,
                },
                ProfilePoint {
                    mu: 2.0,
                    q_mu: 0.0,
                    delta_nll: 1.0,
                    nll_mu: 11.0,
                    converged: true,
                    n_iter: 4,
                },
            ],
        };
        let art = ProfileCurveArtifact::from(scan);
        assert_eq!(art.mu_values, vec![0.0, 2.0]);
        assert_eq!(art.delta_nll, vec![1.0, 1.0]);
        assert!(art.interval.is_none());
    }
}
