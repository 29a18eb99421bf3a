//! Datasets: unbinned event lists and binned histograms.

use crate::binning::Binning;
use mf_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Unbinned dataset over a single observable, with optional per-event weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventStore {
    observable: String,
    bounds: (f64, f64),
    values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    weights: Option<Vec<f64>>,
}

impl EventStore {
    /// Create an event store. Values must be finite and inside `bounds`; weights, when
    /// present, must be finite, non-negative and one per event.
    pub fn new(
        observable: impl Into<String>,
        bounds: (f64, f64),
        values: Vec<f64>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self> {
        let observable = observable.into();
        let (lo, hi) = bounds;
        if lo.is_nan() || hi.is_nan() || lo >= hi {
            return Err(Error::Validation(format!(
                "invalid bounds for observable '{observable}': expected low < high, got ({lo}, {hi})"
            )));
        }
        if values.iter().any(|x| !x.is_finite()) {
            return Err(Error::Validation(format!(
                "observable '{observable}' contains non-finite values"
            )));
        }
        if values.iter().any(|&x| x < lo || x > hi) {
            return Err(Error::Validation(format!(
                "observable '{observable}' contains values outside bounds ({lo}, {hi})"
            )));
        }
        if let Some(w) = &weights {
            if w.len() != values.len() {
                return Err(Error::Validation(format!(
                    "weights length mismatch: expected {}, got {}",
                    values.len(),
                    w.len()
                )));
            }
            if w.iter().any(|x| !x.is_finite() || *x < 0.0) {
                return Err(Error::Validation("weights must be finite and >= 0".into()));
            }
        }
        Ok(Self { observable, bounds, values, weights })
    }

    /// Observable name.
    pub fn observable(&self) -> &str {
        &self.observable
    }

    /// Observable support.
    pub fn bounds(&self) -> (f64, f64) {
        self.bounds
    }

    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.values.len()
    }

    /// Observable values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Optional per-event weights.
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Sum of weights (event count if unweighted).
    pub fn sum_weights(&self) -> f64 {
        match &self.weights {
            Some(w) => w.iter().sum(),
            None => self.values.len() as f64,
        }
    }

    /// Fill a histogram with the given binning (a "binned clone").
    pub fn binned_clone(&self, binning: &Binning) -> Result<BinnedData> {
        let mut counts = vec![0.0; binning.n_bins];
        let mut sum_w2 = vec![0.0; binning.n_bins];
        for (i, &x) in self.values.iter().enumerate() {
            let Some(bin) = binning.bin_index(x) else {
                continue;
            };
            let w = self.weights.as_ref().map_or(1.0, |w| w[i]);
            counts[bin] += w;
            sum_w2[bin] += w * w;
        }
        BinnedData::with_sum_w2(self.observable.clone(), *binning, counts, sum_w2)
    }
}

/// Binned dataset (histogram) over a single observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedData {
    observable: String,
    binning: Binning,
    counts: Vec<f64>,
    sum_w2: Vec<f64>,
}

impl BinnedData {
    /// Histogram from per-bin counts; the sum of squared weights equals the counts.
    pub fn from_counts(
        observable: impl Into<String>,
        binning: Binning,
        counts: Vec<f64>,
    ) -> Result<Self> {
        let sum_w2 = counts.clone();
        Self::with_sum_w2(observable, binning, counts, sum_w2)
    }

    /// Histogram with explicit sum of squared weights per bin.
    pub fn with_sum_w2(
        observable: impl Into<String>,
        binning: Binning,
        counts: Vec<f64>,
        sum_w2: Vec<f64>,
    ) -> Result<Self> {
        let observable = observable.into();
        if counts.len() != binning.n_bins || sum_w2.len() != binning.n_bins {
            return Err(Error::Validation(format!(
                "histogram '{observable}' expects {} bins, got counts={} sum_w2={}",
                binning.n_bins,
                counts.len(),
                sum_w2.len()
            )));
        }
        if counts.iter().chain(sum_w2.iter()).any(|c| !c.is_finite() || *c < 0.0) {
            return Err(Error::Validation(format!(
                "histogram '{observable}' contents must be finite and >= 0"
            )));
        }
        Ok(Self { observable, binning, counts, sum_w2 })
    }

    /// Observable name.
    pub fn observable(&self) -> &str {
        &self.observable
    }

    /// Binning.
    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    /// Bin contents.
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Per-bin sum of squared weights.
    pub fn sum_w2(&self) -> &[f64] {
        &self.sum_w2
    }

    /// Total content.
    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Integral of the histogram as a function (content × bin width summed).
    pub fn integral(&self) -> f64 {
        self.total() * self.binning.width()
    }
}

/// Any dataset held in a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dataset {
    /// Event list.
    Unbinned(EventStore),
    /// Histogram.
    Binned(BinnedData),
}

impl Dataset {
    /// Observable name.
    pub fn observable(&self) -> &str {
        match self {
            Self::Unbinned(d) => d.observable(),
            Self::Binned(d) => d.observable(),
        }
    }

    /// Number of stored entries (events or bins).
    pub fn n_entries(&self) -> usize {
        match self {
            Self::Unbinned(d) => d.n_events(),
            Self::Binned(d) => d.binning().n_bins,
        }
    }

    /// Sum of weights.
    pub fn sum_weights(&self) -> f64 {
        match self {
            Self::Unbinned(d) => d.sum_weights(),
            Self::Binned(d) => d.total(),
        }
    }

    /// True for histograms.
    pub fn is_binned(&self) -> bool {
        matches!(self, Self::Binned(_))
    }

    /// One-line summary, e.g. `data[x] = 1100 entries`.
    pub fn describe(&self, name: &str) -> String {
        match self {
            Self::Unbinned(d) => {
                format!("{name}[{}] = {} entries", d.observable(), d.n_events())
            }
            Self::Binned(d) => format!(
                "{name}[{}] = {} bins ({:.1} weights)",
                d.observable(),
                d.binning().n_bins,
                d.total()
            ),
        }
    }
}

impl From<EventStore> for Dataset {
    fn from(d: EventStore) -> Self {
        Self::Unbinned(d)
    }
}

impl From<BinnedData> for Dataset {
    fn from(d: BinnedData) -> Self {
        Self::Binned(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_store_validation() {
        assert!(EventStore::new("x", (0.0, 1.0), vec![0.5, 2.0], None).is_err());
        assert!(EventStore::new("x", (0.0, 1.0), vec![f64::NAN], None).is_err());
        assert!(EventStore::new("x", (1.0, 0.0), vec![], None).is_err());
        assert!(EventStore::new("x", (0.0, 1.0), vec![0.5], Some(vec![-1.0])).is_err());
        assert!(EventStore::new("x", (0.0, 1.0), vec![0.5], Some(vec![1.0, 2.0])).is_err());
    }

    #[test]
    fn test_binned_clone_preserves_weights() {
        let d = EventStore::new(
            "x",
            (0.0, 4.0),
            vec![0.5, 1.5, 1.7, 4.0],
            Some(vec![1.0, 2.0, 3.0, 0.5]),
        )
        .unwrap();
        let h = d.binned_clone(&Binning::new(0.0, 4.0, 4).unwrap()).unwrap();
        assert_eq!(h.counts(), &[1.0, 5.0, 0.0, 0.5]);
        assert_eq!(h.sum_w2(), &[1.0, 13.0, 0.0, 0.25]);
        assert_eq!(h.total(), d.sum_weights());
    }

    #[test]
    fn test_describe() {
        let d: Dataset = EventStore::new("x", (0.0, 1.0), vec![0.1; 7], None).unwrap().into();
        assert_eq!(d.describe("data"), "data[x] = 7 entries");
        assert!(!d.is_binned());
    }
}
