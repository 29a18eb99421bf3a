//! Pseudo-data generation from compiled models.

use crate::binning::Binning;
use crate::compiled::CompiledModel;
use crate::data::{BinnedData, Dataset, EventStore};
use mf_core::{Error, Result};
use rand::RngCore;
use rand_distr::{Distribution, Poisson};

/// Poisson draw that tolerates a zero mean.
pub fn poisson_count(mean: f64, rng: &mut dyn RngCore) -> Result<f64> {
    if !mean.is_finite() || mean < 0.0 {
        return Err(Error::Validation(format!("Poisson mean must be finite and >= 0, got {mean}")));
    }
    if mean == 0.0 {
        return Ok(0.0);
    }
    let dist = Poisson::new(mean)
        .map_err(|e| Error::Computation(format!("Poisson({mean}) construction failed: {e}")))?;
    Ok(dist.sample(rng))
}

impl CompiledModel {
    /// Generate exactly `n_events` unbinned events at `params`.
    pub fn generate(
        &self,
        params: &[f64],
        n_events: usize,
        rng: &mut dyn RngCore,
    ) -> Result<EventStore> {
        let bounds = self.observable().bounds();
        let mut values = Vec::with_capacity(n_events);
        for _ in 0..n_events {
            values.push(self.root().sample(bounds, params, rng)?);
        }
        EventStore::new(self.observable().name.clone(), bounds, values, None)
    }

    /// Expected number of events for generation: the model yield when extended,
    /// otherwise the bound dataset's sum of weights.
    pub fn default_event_count(&self, params: &[f64]) -> Result<f64> {
        if let Some(nu) = self.expected_events(params)? {
            return Ok(nu);
        }
        self.data().map(|d| d.sum_weights()).ok_or_else(|| {
            Error::Validation(format!(
                "model '{}' is not extended and has no dataset to take the event count from",
                self.pdf_name()
            ))
        })
    }

    /// Generate the expected number of events (rounded), without fluctuation.
    pub fn generate_expected(&self, params: &[f64], rng: &mut dyn RngCore) -> Result<EventStore> {
        let n = self.default_event_count(params)?.round().max(0.0) as usize;
        self.generate(params, n, rng)
    }

    /// Generate a Poisson-fluctuated number of events around the expected count.
    pub fn generate_extended(&self, params: &[f64], rng: &mut dyn RngCore) -> Result<EventStore> {
        let nu = self.default_event_count(params)?;
        let n = poisson_count(nu, rng)? as usize;
        self.generate(params, n, rng)
    }

    /// Generate a histogram with Poisson-fluctuated bins around `n_expected · P_i`
    /// (`n_expected` defaults to [`CompiledModel::default_event_count`]).
    pub fn generate_binned(
        &self,
        params: &[f64],
        n_expected: Option<f64>,
        binning: &Binning,
        rng: &mut dyn RngCore,
    ) -> Result<BinnedData> {
        let n = match n_expected {
            Some(n) => n,
            None => self.default_event_count(params)?,
        };
        let probs = self.bin_probabilities(&binning.edges(), params)?;
        let counts = probs
            .iter()
            .map(|p| poisson_count(n * p, rng))
            .collect::<Result<Vec<_>>>()?;
        BinnedData::from_counts(self.observable().name.clone(), *binning, counts)
    }

    /// Asimov dataset: expected (non-integer) bin contents.
    pub fn asimov(&self, params: &[f64], binning: &Binning) -> Result<BinnedData> {
        let n = self.default_event_count(params)?;
        let probs = self.bin_probabilities(&binning.edges(), params)?;
        BinnedData::from_counts(
            self.observable().name.clone(),
            *binning,
            probs.into_iter().map(|p| n * p).collect(),
        )
    }

    /// Toy dataset of the same kind as the bound data: Poisson-fluctuated bins for
    /// histograms, a Poisson-fluctuated number of events otherwise.
    pub fn generate_toy(&self, params: &[f64], rng: &mut dyn RngCore) -> Result<Dataset> {
        match self.data() {
            Some(Dataset::Binned(h)) => {
                let binning = *h.binning();
                Ok(self.generate_binned(params, None, &binning, rng)?.into())
            }
            _ => Ok(self.generate_extended(params, rng)?.into()),
        }
    }
}
