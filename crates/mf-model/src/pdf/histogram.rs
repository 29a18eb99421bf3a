use crate::data::BinnedData;
use crate::pdf::{ShapePdf, check_edges, check_lengths};
use mf_core::{Error, Result};
use rand::{Rng, RngCore};

/// Piecewise-constant histogram PDF normalized on its bin edges.
///
/// `p(x) = m_i / (x_{i+1} - x_i)` for `x ∈ [x_i, x_{i+1})`, where `m_i` is the
/// probability mass of bin `i`. Empty bins have zero density.
#[derive(Debug, Clone)]
pub struct HistogramPdf {
    bin_edges: Vec<f64>,
    log_density: Vec<f64>,
    /// Cumulative mass at each edge (`cdf[0] = 0`, `cdf[n] = 1`).
    cdf: Vec<f64>,
}

impl HistogramPdf {
    /// Construct a histogram PDF from edges and non-negative bin contents.
    ///
    /// `pseudo_count` is added to every bin before normalization.
    pub fn from_edges_and_contents(
        bin_edges: Vec<f64>,
        bin_content: Vec<f64>,
        pseudo_count: f64,
    ) -> Result<Self> {
        let n_bins = check_edges("HistogramPdf", &bin_edges)?;
        if bin_content.len() != n_bins {
            return Err(Error::Validation(format!(
                "HistogramPdf bin_content length mismatch: expected {n_bins}, got {}",
                bin_content.len()
            )));
        }
        if !pseudo_count.is_finite() || pseudo_count < 0.0 {
            return Err(Error::Validation(format!(
                "HistogramPdf pseudo_count must be finite and >=0, got {pseudo_count}"
            )));
        }
        for (i, w) in bin_content.iter().enumerate() {
            if !w.is_finite() || *w < 0.0 {
                return Err(Error::Validation(format!(
                    "HistogramPdf bin_content[{i}] must be finite and >=0, got {w}"
                )));
            }
        }

        let total: f64 = bin_content.iter().map(|w| w + pseudo_count).sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(Error::Validation(format!(
                "HistogramPdf total content must be finite and >0, got {total}"
            )));
        }

        let mut log_density = Vec::with_capacity(n_bins);
        let mut cdf = Vec::with_capacity(n_bins + 1);
        cdf.push(0.0);
        let mut acc = 0.0;
        for (i, &w) in bin_content.iter().enumerate() {
            let mass = (w + pseudo_count) / total;
            let width = bin_edges[i + 1] - bin_edges[i];
            log_density.push(if mass > 0.0 { (mass / width).ln() } else { f64::NEG_INFINITY });
            acc += mass;
            cdf.push(acc);
        }
        if let Some(last) = cdf.last_mut() {
            *last = 1.0;
        }

        Ok(Self { bin_edges, log_density, cdf })
    }

    /// Template PDF from a histogram dataset.
    pub fn from_binned(data: &BinnedData) -> Result<Self> {
        Self::from_edges_and_contents(data.binning().edges(), data.counts().to_vec(), 0.0)
    }

    /// Bin edges.
    pub fn edges(&self) -> &[f64] {
        &self.bin_edges
    }

    fn bin_index(&self, x: f64) -> Option<usize> {
        let n_bins = self.log_density.len();
        let (lo, hi) = (self.bin_edges[0], self.bin_edges[n_bins]);
        if !x.is_finite() || x < lo || x > hi {
            return None;
        }
        if x >= hi {
            return Some(n_bins - 1);
        }
        // Number of edges <= x, minus one.
        Some(self.bin_edges.partition_point(|e| *e <= x).saturating_sub(1).min(n_bins - 1))
    }

    /// Cumulative distribution function.
    pub fn cdf(&self, x: f64) -> f64 {
        let n_bins = self.log_density.len();
        if x <= self.bin_edges[0] {
            return 0.0;
        }
        if x >= self.bin_edges[n_bins] {
            return 1.0;
        }
        match self.bin_index(x) {
            Some(i) => {
                let frac = (x - self.bin_edges[i]) / (self.bin_edges[i + 1] - self.bin_edges[i]);
                self.cdf[i] + frac * (self.cdf[i + 1] - self.cdf[i])
            }
            None => 0.0,
        }
    }
}

impl ShapePdf for HistogramPdf {
    fn kind(&self) -> &'static str {
        "Histogram"
    }

    fn n_params(&self) -> usize {
        0
    }

    fn log_prob_grad_batch(
        &self,
        xs: &[f64],
        _bounds: (f64, f64),
        params: &[f64],
        out_logp: &mut [f64],
        out_grad: Option<&mut [f64]>,
    ) -> Result<()> {
        if !params.is_empty() {
            return Err(Error::Validation(format!(
                "HistogramPdf expects 0 params, got {}",
                params.len()
            )));
        }
        check_lengths("HistogramPdf", xs.len(), 0, out_logp, out_grad.as_deref())?;
        for (i, &x) in xs.iter().enumerate() {
            let idx = self.bin_index(x).ok_or_else(|| {
                Error::Validation(format!(
                    "HistogramPdf x out of range: x={x} not in [{}, {}]",
                    self.bin_edges[0],
                    self.bin_edges[self.bin_edges.len() - 1]
                ))
            })?;
            out_logp[i] = self.log_density[idx];
        }
        Ok(())
    }

    fn bin_log_prob_grad(
        &self,
        edges: &[f64],
        _bounds: (f64, f64),
        params: &[f64],
        out_logp: &mut [f64],
        out_grad: Option<&mut [f64]>,
    ) -> Result<()> {
        if !params.is_empty() {
            return Err(Error::Validation(format!(
                "HistogramPdf expects 0 params, got {}",
                params.len()
            )));
        }
        let n_bins = check_edges("HistogramPdf", edges)?;
        check_lengths("HistogramPdf", n_bins, 0, out_logp, out_grad.as_deref())?;
        for i in 0..n_bins {
            let mass = self.cdf(edges[i + 1]) - self.cdf(edges[i]);
            out_logp[i] = if mass > 0.0 { mass.ln() } else { f64::NEG_INFINITY };
        }
        Ok(())
    }

    fn sample(&self, _bounds: (f64, f64), params: &[f64], rng: &mut dyn RngCore) -> Result<f64> {
        if !params.is_empty() {
            return Err(Error::Validation("HistogramPdf expects 0 params".into()));
        }
        let u: f64 = rng.random();
        let n_bins = self.log_density.len();
        // First bin whose upper cumulative mass exceeds u.
        let k = self.cdf[1..].partition_point(|c| *c <= u).min(n_bins - 1);
        let (lo, hi) = (self.bin_edges[k], self.bin_edges[k + 1]);
        let v: f64 = rng.random();
        Ok(lo + v * (hi - lo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn pdf() -> HistogramPdf {
        HistogramPdf::from_edges_and_contents(vec![0.0, 1.0, 3.0, 4.0], vec![2.0, 0.0, 6.0], 0.0)
            .unwrap()
    }

    #[test]
    fn test_density_and_cdf() {
        let h = pdf();
        let mut lp = [0.0; 3];
        h.log_prob_batch(&[0.5, 2.0, 4.0], (0.0, 4.0), &[], &mut lp).unwrap();
        assert_relative_eq!(lp[0].exp(), 0.25, epsilon = 1e-12);
        assert_eq!(lp[1], f64::NEG_INFINITY);
        assert_relative_eq!(lp[2].exp(), 0.75, epsilon = 1e-12);
        assert_relative_eq!(h.cdf(0.5), 0.125, epsilon = 1e-12);
        assert_relative_eq!(h.cdf(3.5), 0.625, epsilon = 1e-12);
        assert_eq!(h.cdf(10.0), 1.0);
    }

    #[test]
    fn test_rebinned_masses() {
        let h = pdf();
        let mut lp = [0.0; 2];
        h.bin_log_prob_grad(&[0.0, 2.0, 4.0], (0.0, 4.0), &[], &mut lp, None).unwrap();
        assert_relative_eq!(lp[0].exp(), 0.25, epsilon = 1e-12);
        assert_relative_eq!(lp[1].exp(), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_sampling_skips_empty_bins() {
        let h = pdf();
        let mut rng = StdRng::seed_from_u64(11);
        let mut in_first = 0;
        for _ in 0..4000 {
            let x = h.sample((0.0, 4.0), &[], &mut rng).unwrap();
            assert!(!(1.0..3.0).contains(&x));
            if x < 1.0 {
                in_first += 1;
            }
        }
        assert!((800..1200).contains(&in_first));
    }

    #[test]
    fn test_out_of_range_is_error() {
        let h = pdf();
        let mut lp = [0.0];
        assert!(h.log_prob_batch(&[5.0], (0.0, 4.0), &[], &mut lp).is_err());
    }
}
