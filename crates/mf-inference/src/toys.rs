//! Toy data generation utilities (Asimov + Poisson).
//!
//! Toys follow the kind of the data bound to the model: binned data gives
//! Poisson-fluctuated histograms, unbinned data gives Poisson-fluctuated event counts.
//! Sampling is deterministic: toy `i` uses seed `seed + i`, independent of threading.

use mf_core::{Error, Result};
use mf_model::{Binning, CompiledModel, Dataset};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Binning used for Asimov datasets: the data binning if binned, else the observable's.
pub fn asimov_binning(model: &CompiledModel) -> Result<Binning> {
    match model.data() {
        Some(Dataset::Binned(h)) => Ok(*h.binning()),
        _ => model.observable().binning(),
    }
}

/// Asimov dataset (expected bin contents) at `params`.
pub fn asimov_dataset(model: &CompiledModel, params: &[f64]) -> Result<Dataset> {
    let binning = asimov_binning(model)?;
    Ok(model.asimov(params, &binning)?.into())
}

/// One toy dataset generated at `params` with a fixed seed.
pub fn toy_dataset(model: &CompiledModel, params: &[f64], seed: u64) -> Result<Dataset> {
    let mut rng = StdRng::seed_from_u64(seed);
    model.generate_toy(params, &mut rng)
}

/// `n_toys` datasets generated at `params`; toy `i` uses seed `seed + i`.
pub fn toy_datasets(
    model: &CompiledModel,
    params: &[f64],
    n_toys: usize,
    seed: u64,
) -> Result<Vec<Dataset>> {
    if params.len() != model.parameters().len() {
        return Err(Error::Validation(format!(
            "toy generation expects {} parameters, got {}",
            model.parameters().len(),
            params.len()
        )));
    }
    (0..n_toys).map(|i| toy_dataset(model, params, seed.wrapping_add(i as u64))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mf_core::LogDensityModel;
    use mf_model::{EventStore, Workspace};

    fn model() -> CompiledModel {
        let mut ws = Workspace::new("w");
        ws.factory("x[0,10]").unwrap();
        ws.factory("Exponential::bkg(x, c[-0.3,-1,0])").unwrap();
        ws.factory("SUM::model(n[50,0,500]*bkg)").unwrap();
        ws.var_mut("x").unwrap().set_bins(10).unwrap();
        let data = EventStore::new("x", (0.0, 10.0), vec![1.0, 2.0, 3.0], None).unwrap();
        CompiledModel::from_workspace(&ws, "model").unwrap().with_data(data.into()).unwrap()
    }

    #[test]
    fn test_asimov_sums_to_expected_yield() {
        let m = model();
        let p = m.parameter_init();
        let Dataset::Binned(h) = asimov_dataset(&m, &p).unwrap() else {
            panic!("asimov data must be binned");
        };
        assert_eq!(h.counts().len(), 10);
        assert_relative_eq!(h.total(), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_toys_reproducible_and_distinct() {
        let m = model();
        let p = m.parameter_init();
        let a = toy_datasets(&m, &p, 3, 7).unwrap();
        let b = toy_datasets(&m, &p, 3, 7).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.n_entries(), y.n_entries());
            assert_eq!(x.sum_weights(), y.sum_weights());
        }
        assert!(!a[0].is_binned());
        let Dataset::Unbinned(t0) = &a[0] else { unreachable!() };
        let Dataset::Unbinned(t1) = &a[1] else { unreachable!() };
        assert_ne!(t0.values(), t1.values());
    }

    #[test]
    fn test_toy_parameter_length_checked() {
        let m = model();
        assert!(toy_datasets(&m, &[1.0], 2, 0).is_err());
    }
}
