//! Uniform binning of an observable range.

use mf_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Uniform binning `[lo, hi]` with `n_bins` equal-width bins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    /// Lower edge.
    pub lo: f64,
    /// Upper edge.
    pub hi: f64,
    /// Number of bins.
    pub n_bins: usize,
}

impl Binning {
    /// Create a binning; requires `lo < hi` and at least one bin.
    pub fn new(lo: f64, hi: f64, n_bins: usize) -> Result<Self> {
        if !(lo.is_finite() && hi.is_finite()) || lo >= hi {
            return Err(Error::Validation(format!(
                "binning requires finite lo < hi, got ({lo}, {hi})"
            )));
        }
        if n_bins == 0 {
            return Err(Error::Validation("binning requires at least one bin".into()));
        }
        Ok(Self { lo, hi, n_bins })
    }

    /// Bin width.
    pub fn width(&self) -> f64 {
        (self.hi - self.lo) / self.n_bins as f64
    }

    /// `n_bins + 1` edges.
    pub fn edges(&self) -> Vec<f64> {
        let w = self.width();
        (0..=self.n_bins)
            .map(|i| if i == self.n_bins { self.hi } else { self.lo + w * i as f64 })
            .collect()
    }

    /// Bin centers.
    pub fn centers(&self) -> Vec<f64> {
        let w = self.width();
        (0..self.n_bins).map(|i| self.lo + w * (i as f64 + 0.5)).collect()
    }

    /// Index of the bin containing `x`. The upper edge belongs to the last bin.
    pub fn bin_index(&self, x: f64) -> Option<usize> {
        if !x.is_finite() || x < self.lo || x > self.hi {
            return None;
        }
        if x >= self.hi {
            return Some(self.n_bins - 1);
        }
        let idx = ((x - self.lo) / self.width()) as usize;
        Some(idx.min(self.n_bins - 1))
    }
}
