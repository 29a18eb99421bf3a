//! End-to-end inference on the Gaussian-on-exponential Higgs-like model.
//!
//! Generates one seeded dataset and runs every calculator on it, checking the results
//! are mutually consistent rather than pinning exact numbers.

use mf_core::LogDensityModel;
use mf_inference::{
    AsymptoticCalculator, FixedScan, FrequentistCalculator, HypoTestInverter,
    MaximumLikelihoodEstimator, ProfileLikelihoodCalculator,
};
use mf_model::{CompiledModel, Workspace};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn higgs_model() -> CompiledModel {
    let mut ws = Workspace::new("w");
    ws.factory("x[80,200]").unwrap();
    ws.factory("Exponential:bkg_pdf(x, a[-0.01,-0.2,0.01])").unwrap();
    ws.factory("Gaussian:sig_pdf(x, mass[125], sigma[10])").unwrap();
    ws.factory("SUM:model(nsig[0,10000]*sig_pdf, nbkg[0,10000]*bkg_pdf)").unwrap();
    ws.set_value("nsig", 100.0).unwrap();
    ws.set_value("nbkg", 1000.0).unwrap();

    let model = CompiledModel::from_workspace(&ws, "model").unwrap();
    let mut rng = StdRng::seed_from_u64(111);
    let data = model.generate_expected(&model.parameter_init(), &mut rng).unwrap();
    assert_eq!(data.values().len(), 1100);
    model.with_data(data.into()).unwrap().with_poi("nsig").unwrap()
}

fn index(model: &CompiledModel, name: &str) -> usize {
    model.parameter_names().iter().position(|n| n == name).unwrap()
}

#[test]
fn test_fit_recovers_generated_yields() {
    let model = higgs_model();
    let fit = MaximumLikelihoodEstimator::new().fit(&model).unwrap();
    let (i_s, i_b) = (index(&model, "nsig"), index(&model, "nbkg"));

    assert!(fit.converged, "{}", fit.termination_reason);
    // Yields sum to the observed count at the extended-likelihood minimum.
    let total = fit.parameters[i_s] + fit.parameters[i_b];
    assert!((total - 1100.0).abs() < 1.0, "total={total}");
    assert!(fit.uncertainties[i_s] > 10.0 && fit.uncertainties[i_s] < 60.0);
    assert!((fit.parameters[i_s] - 100.0).abs() < 5.0 * fit.uncertainties[i_s]);
    assert!(fit.covariance.is_some());
}

#[test]
fn test_profile_interval_brackets_best_fit() {
    let model = higgs_model();
    let plc = ProfileLikelihoodCalculator::new(model);
    let interval = plc.likelihood_interval(0.683).unwrap();
    assert!(interval.lower <= interval.mu_hat && interval.mu_hat < interval.upper);
    assert!(interval.contains(interval.mu_hat));

    let r = plc.hypotest(0.0).unwrap();
    assert!(r.test_statistic >= 0.0);
    assert!(r.null_p_value > 0.0 && r.null_p_value <= 0.5);
}

#[test]
fn test_asymptotic_discovery_agrees_with_profile_likelihood() {
    let model = higgs_model();
    let asym = AsymptoticCalculator::new(model.clone()).unwrap().discovery(0.0, 50.0).unwrap();
    let plc = ProfileLikelihoodCalculator::new(model).hypotest(0.0).unwrap();

    // Same q0, same Φc(√q0).
    assert!((asym.test_statistic - plc.test_statistic).abs() < 1e-3 * plc.test_statistic.max(1.0));
    assert!((asym.significance() - plc.significance()).abs() < 1e-2);
    let p_alt = asym.alt_p_value.unwrap();
    assert!(p_alt > 0.0 && p_alt < 1.0);
}

#[test]
fn test_asymptotic_upper_limit_above_best_fit() {
    let model = higgs_model();
    let calc = AsymptoticCalculator::new(model).unwrap();
    let ctx = calc.cls_context(0.0).unwrap();
    let inv = HypoTestInverter::new(0.95, FixedScan::new(21, 0.0, 400.0).unwrap()).unwrap();
    let r = inv.get_interval(&ctx).unwrap();

    let ul = r.upper_limit().unwrap();
    assert!(ul > ctx.mu_hat(), "ul={ul} mu_hat={}", ctx.mu_hat());
    assert!(ul < 400.0);
    assert_eq!(r.points.len(), 21);
}

#[test]
fn test_frequentist_discovery_small_ensemble() {
    let model = higgs_model();
    let calc = FrequentistCalculator::new(model).unwrap().with_toys(20, 20).with_seed(1);
    let r = calc.discovery(0.0, 50.0).unwrap();
    let null = r.null_distribution.as_ref().unwrap();
    assert_eq!(null.len() + null.n_failed, 20);
    assert!(r.null_p_value >= 1.0 / 21.0 && r.null_p_value <= 1.0);
}
