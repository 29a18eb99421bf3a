//! Model traits consumed by the inference layer.
//!
//! Fitting, profiling and hypothesis testing depend on these interfaces rather than
//! on the concrete compiled model, so calculators can be tested against small
//! analytic models.

use crate::Result;

/// Prepared negative log-likelihood evaluator.
///
/// Models can precompute constants (observed counts, normalization tables) once and
/// reuse them across repeated NLL evaluations during a fit.
pub trait PreparedNll: Send + Sync {
    /// Compute negative log-likelihood at `params`.
    fn nll(&self, params: &[f64]) -> Result<f64>;
}

/// Default prepared wrapper that forwards to the model's `nll`.
#[derive(Debug, Clone, Copy)]
pub struct PreparedModelRef<'a, M: LogDensityModel + ?Sized> {
    model: &'a M,
}

impl<'a, M: LogDensityModel + ?Sized> PreparedModelRef<'a, M> {
    /// Create a new prepared wrapper that forwards `nll` to the model.
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }
}

impl<M: LogDensityModel + ?Sized> PreparedNll for PreparedModelRef<'_, M> {
    fn nll(&self, params: &[f64]) -> Result<f64> {
        self.model.nll(params)
    }
}

/// Likelihood interface: parameter metadata plus NLL and gradient evaluation.
pub trait LogDensityModel: Send + Sync {
    /// Prepared evaluator type.
    ///
    /// If a model has nothing to cache, use:
    /// `type Prepared<'a> = PreparedModelRef<'a, Self> where Self: 'a;`
    type Prepared<'a>: PreparedNll + 'a
    where
        Self: 'a;

    /// Number of parameters.
    fn dim(&self) -> usize;

    /// Parameter names (stable order).
    fn parameter_names(&self) -> Vec<String>;

    /// Parameter bounds (min, max) (stable order).
    fn parameter_bounds(&self) -> Vec<(f64, f64)>;

    /// Suggested initial values (stable order).
    fn parameter_init(&self) -> Vec<f64>;

    /// Negative log-likelihood.
    fn nll(&self, params: &[f64]) -> Result<f64>;

    /// Gradient of NLL.
    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>>;

    /// Create a prepared evaluator.
    fn prepared(&self) -> Self::Prepared<'_>;

    /// Compute NLL and gradient together.
    fn nll_grad_prepared(
        &self,
        prepared: &Self::Prepared<'_>,
        params: &[f64],
    ) -> Result<(f64, Vec<f64>)> {
        Ok((prepared.nll(params)?, self.grad_nll(params)?))
    }
}

/// Optional extension: parameter-of-interest (POI) index.
pub trait PoiModel: Send + Sync {
    /// Index of the POI in the model's parameter order.
    fn poi_index(&self) -> Option<usize>;
}

/// Optional extension: create a copy of the model with one parameter fixed.
pub trait FixedParamModel: Sized + Send + Sync {
    /// Return a copy with parameter `param_idx` fixed at `value` (bounds clamped).
    fn with_fixed_param(&self, param_idx: usize, value: f64) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyModel;

    impl LogDensityModel for DummyModel {
        type Prepared<'a>
            = PreparedModelRef<'a, Self>
        where
            Self: 'a;

        fn dim(&self) -> usize {
            2
        }

        fn parameter_names(&self) -> Vec<String> {
            vec!["a".to_string(), "b".to_string()]
        }

        fn parameter_bounds(&self) -> Vec<(f64, f64)> {
            vec![(0.0, 1.0), (-1.0, 1.0)]
        }

        fn parameter_init(&self) -> Vec<f64> {
            vec![0.5, 0.0]
        }

        fn nll(&self, params: &[f64]) -> Result<f64> {
            Ok(params.iter().map(|&x| x * x).sum())
        }

        fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
            Ok(params.iter().map(|&x| 2.0 * x).collect())
        }

        fn prepared(&self) -> Self::Prepared<'_> {
            PreparedModelRef::new(self)
        }
    }

    #[test]
    fn test_prepared_forwards_to_model() {
        let m = DummyModel;
        let p = m.prepared();
        assert!((p.nll(&[2.0, 3.0]).unwrap() - 13.0).abs() < 1e-12);
    }

    #[test]
    fn test_fused_default_matches_separate_calls() {
        let m = DummyModel;
        let p = m.prepared();
        let (f, g) = m.nll_grad_prepared(&p, &[1.0, -2.0]).unwrap();
        assert!((f - 5.0).abs() < 1e-12);
        assert_eq!(g, vec![2.0, -4.0]);
    }
}
