//! Normalized one-dimensional shape PDFs.
//!
//! Every shape is a proper density on the observable support `[a, b]`. Shapes expose
//! per-event log-densities (unbinned fits), per-bin log-probabilities (binned fits) and
//! inverse-CDF sampling (toy generation), all with gradients w.r.t. their shape
//! parameters.

use mf_core::{Error, Result};
use rand::RngCore;

mod exponential;
mod gaussian;
mod histogram;

pub use exponential::ExponentialPdf;
pub use gaussian::GaussianPdf;
pub use histogram::HistogramPdf;

/// Trait for normalized PDFs used by compiled likelihoods.
pub trait ShapePdf: Send + Sync + std::fmt::Debug {
    /// Short type name used in diagnostics.
    fn kind(&self) -> &'static str;

    /// Number of shape parameters.
    fn n_params(&self) -> usize;

    /// Evaluate `log p(x | params)` for every `x` and, optionally, its gradient w.r.t.
    /// the shape parameters.
    ///
    /// `out_grad` is row-major `[x0_p0, x0_p1, ..., x1_p0, ...]` with length
    /// `xs.len() * self.n_params()`.
    fn log_prob_grad_batch(
        &self,
        xs: &[f64],
        bounds: (f64, f64),
        params: &[f64],
        out_logp: &mut [f64],
        out_grad: Option<&mut [f64]>,
    ) -> Result<()>;

    /// Evaluate `log p(x | params)` only.
    fn log_prob_batch(
        &self,
        xs: &[f64],
        bounds: (f64, f64),
        params: &[f64],
        out: &mut [f64],
    ) -> Result<()> {
        self.log_prob_grad_batch(xs, bounds, params, out, None)
    }

    /// Log of the probability mass in each bin `[edges[i], edges[i+1]]`, with the same
    /// gradient layout as [`ShapePdf::log_prob_grad_batch`] (one row per bin).
    fn bin_log_prob_grad(
        &self,
        edges: &[f64],
        bounds: (f64, f64),
        params: &[f64],
        out_logp: &mut [f64],
        out_grad: Option<&mut [f64]>,
    ) -> Result<()>;

    /// Draw one value from the density.
    fn sample(&self, bounds: (f64, f64), params: &[f64], rng: &mut dyn RngCore) -> Result<f64>;
}

pub(crate) fn check_bounds(kind: &str, bounds: (f64, f64)) -> Result<()> {
    let (a, b) = bounds;
    if a.partial_cmp(&b) != Some(core::cmp::Ordering::Less) || !a.is_finite() || !b.is_finite() {
        return Err(Error::Validation(format!(
            "invalid bounds for {kind}: expected finite low < high, got ({a}, {b})"
        )));
    }
    Ok(())
}

pub(crate) fn check_lengths(
    kind: &str,
    n: usize,
    n_params: usize,
    out_logp: &[f64],
    out_grad: Option<&[f64]>,
) -> Result<()> {
    if out_logp.len() != n {
        return Err(Error::Validation(format!(
            "{kind} out_logp length mismatch: expected {n}, got {}",
            out_logp.len()
        )));
    }
    if let Some(g) = out_grad {
        if g.len() != n * n_params {
            return Err(Error::Validation(format!(
                "{kind} out_grad length mismatch: expected {}, got {}",
                n * n_params,
                g.len()
            )));
        }
    }
    Ok(())
}

pub(crate) fn check_edges(kind: &str, edges: &[f64]) -> Result<usize> {
    if edges.len() < 2 {
        return Err(Error::Validation(format!("{kind} requires at least 2 bin edges")));
    }
    if edges.windows(2).any(|w| !(w[0] < w[1])) {
        return Err(Error::Validation(format!("{kind} bin edges must be strictly increasing")));
    }
    Ok(edges.len() - 1)
}
