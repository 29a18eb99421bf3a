//! Hypothesis-test inversion: CLs scans over the POI and upper limits.

use crate::hypotest::{AsymptoticCLsContext, ClsPoint, NSIGMA_ORDER};
use mf_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// A CLs evaluator the inverter can scan.
pub trait InverterBackend {
    /// Calculator name, used in results and plot titles.
    fn name(&self) -> &str;

    /// Observed and expected CLs at the tested POI value.
    fn evaluate(&self, mu: f64) -> Result<ClsPoint>;
}

impl InverterBackend for AsymptoticCLsContext {
    fn name(&self) -> &str {
        "AsymptoticCalculator"
    }

    fn evaluate(&self, mu: f64) -> Result<ClsPoint> {
        self.hypotest_qtilde(mu)
    }
}

/// Linear interpolation of the first crossing of `alpha` in a scan.
///
/// `xs` ascending. Outside the scanned range the nearest end point is returned. When noise
/// makes `ys` non-monotone, the first crossing in the scan direction wins.
pub fn interp_limit(alpha: f64, xs: &[f64], ys: &[f64]) -> Result<f64> {
    if xs.len() != ys.len() {
        return Err(Error::Validation(format!(
            "interpolation length mismatch: {} x vs {} y",
            xs.len(),
            ys.len()
        )));
    }
    let n = xs.len();
    if n < 2 {
        return Err(Error::Validation("interpolation requires >= 2 scan points".to_string()));
    }

    let decreasing = ys[0] >= ys[n - 1];
    let (first, last) = (ys[0], ys[n - 1]);
    if decreasing {
        if alpha >= first {
            return Ok(xs[0]);
        }
        if alpha <= last {
            return Ok(xs[n - 1]);
        }
    } else {
        if alpha <= first {
            return Ok(xs[0]);
        }
        if alpha >= last {
            return Ok(xs[n - 1]);
        }
    }

    for i in 0..n - 1 {
        let (y0, y1) = (ys[i], ys[i + 1]);
        if y0 == alpha {
            return Ok(xs[i]);
        }
        let crosses = if decreasing {
            y0 >= alpha && y1 <= alpha
        } else {
            y0 <= alpha && y1 >= alpha
        };
        if crosses && y1 != y0 {
            let t = (alpha - y0) / (y1 - y0);
            return Ok(xs[i] + t * (xs[i + 1] - xs[i]));
        }
    }

    // Unreachable for finite input; fall back to the scan end.
    Ok(xs[n - 1])
}

/// Evenly spaced POI values `[min, max]` (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedScan {
    /// Number of points.
    pub n_points: usize,
    /// First value.
    pub min: f64,
    /// Last value.
    pub max: f64,
}

impl FixedScan {
    /// Validated scan of at least two points with `max > min`.
    pub fn new(n_points: usize, min: f64, max: f64) -> Result<Self> {
        if n_points < 2 {
            return Err(Error::Validation(format!(
                "scan needs at least two points, got {n_points}"
            )));
        }
        if !(min.is_finite() && max.is_finite()) || max <= min {
            return Err(Error::Validation(format!("invalid scan range [{min}, {max}]")));
        }
        Ok(Self { n_points, min, max })
    }

    /// The scanned values.
    pub fn values(&self) -> Vec<f64> {
        let step = (self.max - self.min) / (self.n_points - 1) as f64;
        (0..self.n_points).map(|i| self.min + step * i as f64).collect()
    }
}

/// Scans a backend over a fixed grid and reports the CLs (or CLs+b) limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypoTestInverter {
    /// Confidence level; the limit is where the scanned quantity drops to `1 - cl`.
    pub cl: f64,
    /// Invert `CLs` rather than `CLs+b`.
    pub use_cls: bool,
    /// POI grid.
    pub scan: FixedScan,
}

impl HypoTestInverter {
    /// Inverter at confidence level `cl` with CLs and the given scan.
    pub fn new(cl: f64, scan: FixedScan) -> Result<Self> {
        if !(cl > 0.0 && cl < 1.0) {
            return Err(Error::Validation(format!("confidence level must be in (0,1), got {cl}")));
        }
        Ok(Self { cl, use_cls: true, scan })
    }

    /// Use `CLs` (true) or plain `CLs+b` (false).
    pub fn with_cls(mut self, use_cls: bool) -> Self {
        self.use_cls = use_cls;
        self
    }

    /// Evaluate every scan point.
    pub fn get_interval(&self, backend: &dyn InverterBackend) -> Result<HypoTestInverterResult> {
        let mut points = Vec::with_capacity(self.scan.n_points);
        for mu in self.scan.values() {
            let p = backend.evaluate(mu)?;
            log::debug!(
                "{}: mu={mu:.4} CLs={:.5} CLs+b={:.5} CLb={:.5}",
                backend.name(),
                p.cls,
                p.clsb,
                p.clb
            );
            points.push(p);
        }
        Ok(HypoTestInverterResult {
            calculator: backend.name().to_string(),
            cl: self.cl,
            use_cls: self.use_cls,
            points,
        })
    }
}

/// Result of a CLs scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypoTestInverterResult {
    /// Name of the backend that produced the points.
    pub calculator: String,
    /// Confidence level.
    pub cl: f64,
    /// Whether limits use `CLs`.
    pub use_cls: bool,
    /// One entry per scan point, in scan order.
    pub points: Vec<ClsPoint>,
}

impl HypoTestInverterResult {
    fn alpha(&self) -> f64 {
        1.0 - self.cl
    }

    /// Scanned POI values.
    pub fn mu_values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.mu).collect()
    }

    /// Observed CLs (or CLs+b) per scan point.
    pub fn observed(&self) -> Vec<f64> {
        self.points.iter().map(|p| if self.use_cls { p.cls } else { p.clsb }).collect()
    }

    /// Expected CLs curve for `n_sigma` in `-2..=2`.
    pub fn expected(&self, n_sigma: i32) -> Result<Vec<f64>> {
        let idx = band_index(n_sigma)?;
        Ok(self.points.iter().map(|p| p.expected[idx]).collect())
    }

    /// Observed upper limit.
    pub fn upper_limit(&self) -> Result<f64> {
        interp_limit(self.alpha(), &self.mu_values(), &self.observed())
    }

    /// Expected upper limit at `n_sigma` (`-2..=2`, 0 is the median).
    pub fn expected_upper_limit(&self, n_sigma: i32) -> Result<f64> {
        interp_limit(self.alpha(), &self.mu_values(), &self.expected(n_sigma)?)
    }
}

/// Index into the expected band for `n_sigma`; negative `n_sigma` is the lower limit.
fn band_index(n_sigma: i32) -> Result<usize> {
    if !(-2..=2).contains(&n_sigma) {
        return Err(Error::Validation(format!("n_sigma must be in -2..=2, got {n_sigma}")));
    }
    let t = -(n_sigma as f64);
    NSIGMA_ORDER
        .iter()
        .position(|&v| v == t)
        .ok_or_else(|| Error::Computation(format!("no band entry for n_sigma={n_sigma}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypotest::{AsymptoticCalculator, expected_cls_band_from_sqrtq_a};
    use crate::test_models::counting_model;
    use approx::assert_relative_eq;

    #[test]
    fn test_interp_limit_linear() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 0.6, 0.2, 0.1];
        assert_relative_eq!(interp_limit(0.4, &xs, &ys).unwrap(), 1.5, epsilon = 1e-12);
        assert_eq!(interp_limit(0.05, &xs, &ys).unwrap(), 3.0);
        assert_eq!(interp_limit(1.5, &xs, &ys).unwrap(), 0.0);
    }

    #[test]
    fn test_interp_limit_nonmonotonic_first_crossing() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = [1.0, 0.2, 0.4, 0.1, 0.05];
        assert_relative_eq!(interp_limit(0.3, &xs, &ys).unwrap(), 0.875, epsilon = 1e-12);
    }

    #[test]
    fn test_interp_limit_rejects_short_input() {
        assert!(interp_limit(0.05, &[1.0], &[0.5]).is_err());
        assert!(interp_limit(0.05, &[1.0, 2.0], &[0.5]).is_err());
    }

    #[test]
    fn test_fixed_scan_values() {
        let s = FixedScan::new(51, 0.0, 50.0).unwrap();
        let v = s.values();
        assert_eq!(v.len(), 51);
        assert_relative_eq!(v[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(v[50], 50.0, epsilon = 1e-12);
        assert_eq!(FixedScan::new(2, 3.0, 5.0).unwrap().values(), vec![3.0, 5.0]);
        assert!(FixedScan::new(0, 0.0, 1.0).is_err());
        assert!(FixedScan::new(1, 3.0, 5.0).is_err());
        assert!(FixedScan::new(5, 2.0, 1.0).is_err());
        assert!(FixedScan::new(5, 2.0, 2.0).is_err());
    }

    #[test]
    fn test_band_index_mapping() {
        assert_eq!(band_index(-2).unwrap(), 0);
        assert_eq!(band_index(0).unwrap(), 2);
        assert_eq!(band_index(2).unwrap(), 4);
        assert!(band_index(3).is_err());
    }

    struct Linear;

    impl InverterBackend for Linear {
        fn name(&self) -> &str {
            "linear"
        }

        // Expected band from a linear sqrt(q_A) = mu / 5.
        fn evaluate(&self, mu: f64) -> Result<ClsPoint> {
            let cls = (1.0 - mu / 10.0).max(0.0);
            Ok(ClsPoint {
                mu,
                cls,
                clsb: cls * 0.5,
                clb: 0.5,
                q_mu: 0.0,
                expected: expected_cls_band_from_sqrtq_a(mu / 5.0),
            })
        }
    }

    #[test]
    fn test_inverter_with_synthetic_backend() {
        let inv = HypoTestInverter::new(0.95, FixedScan::new(11, 0.0, 10.0).unwrap()).unwrap();
        let r = inv.get_interval(&Linear).unwrap();
        assert_eq!(r.points.len(), 11);
        assert_eq!(r.calculator, "linear");
        assert_relative_eq!(r.upper_limit().unwrap(), 9.5, epsilon = 1e-9);

        let lims: Vec<f64> = (-2..=2).map(|n| r.expected_upper_limit(n).unwrap()).collect();
        for w in lims.windows(2) {
            assert!(w[0] <= w[1], "{lims:?}");
        }

        let plain = inv.clone().with_cls(false).get_interval(&Linear).unwrap();
        assert!(plain.upper_limit().unwrap() < r.upper_limit().unwrap());
    }

    #[test]
    fn test_asymptotic_inverter_limit_inside_scan() {
        let model = counting_model(&[10.0, 11.0, 9.0, 10.0]);
        let calc = AsymptoticCalculator::new(model).unwrap();
        let ctx = calc.cls_context(0.0).unwrap();
        let inv = HypoTestInverter::new(0.95, FixedScan::new(21, 0.0, 60.0).unwrap()).unwrap();
        let r = inv.get_interval(&ctx).unwrap();
        let ul = r.upper_limit().unwrap();
        assert!(ul > 0.0 && ul < 60.0, "ul={ul}");
        let med = r.expected_upper_limit(0).unwrap();
        let lo = r.expected_upper_limit(-1).unwrap();
        let hi = r.expected_upper_limit(1).unwrap();
        assert!(lo <= med && med <= hi, "{lo} {med} {hi}");
    }

    #[test]
    fn test_inverter_rejects_bad_cl() {
        assert!(HypoTestInverter::new(1.0, FixedScan::new(2, 0.0, 1.0).unwrap()).is_err());
    }
}
