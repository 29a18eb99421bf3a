//! # mf-inference
//!
//! Statistical inference for massfit.
//!
//! This crate provides:
//! - Maximum likelihood estimation with Hessian-based uncertainties
//! - Profile likelihood scans, hypothesis tests and intervals
//! - Asymptotic and toy-based (frequentist) calculators
//! - CLs hypothesis-test inversion for upper limits
//!
//! Everything is written against the model traits in `mf-core`; the calculators that
//! need to rebind data or build Asimov datasets work on `mf_model::CompiledModel`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Hypothesis test results and asymptotic calculators.
pub mod hypotest;
/// CLs scans and upper limits.
pub mod inverter;
/// Maximum-likelihood estimation via L-BFGS.
pub mod mle;
/// Bounded numerical optimizer (argmin L-BFGS backend).
pub mod optimizer;
/// Profile likelihood scans, calculator and intervals.
pub mod profile_likelihood;
/// Toy-based frequentist calculator.
pub mod toybased;
/// Asimov and Poisson toy datasets.
pub mod toys;

#[cfg(test)]
mod test_models;

pub use hypotest::{
    AsymptoticCLsContext, AsymptoticCalculator, ClsPoint, HypoTestResult, SamplingDistribution,
    p_value_to_significance,
};
pub use inverter::{FixedScan, HypoTestInverter, HypoTestInverterResult, InverterBackend};
pub use mle::MaximumLikelihoodEstimator;
pub use optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
pub use profile_likelihood::{
    LikelihoodInterval, ProfileLikelihoodCalculator, ProfileLikelihoodScan, ProfilePoint,
};
pub use toybased::FrequentistCalculator;
