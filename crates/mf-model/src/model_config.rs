//! Model configuration: which PDF, which parameters are of interest, which are nuisances.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Binds a PDF in a workspace to its roles for statistical tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Config name (e.g. `ModelConfig`).
    pub name: String,
    /// PDF name in the workspace.
    pub pdf: String,
    /// Observables.
    #[serde(default)]
    pub observables: Vec<String>,
    /// Parameters of interest.
    #[serde(default)]
    pub pois: Vec<String>,
    /// Nuisance parameters.
    #[serde(default)]
    pub nuisance: Vec<String>,
    /// Snapshot of parameter values attached to this config (usually the POI).
    #[serde(default)]
    pub snapshot: BTreeMap<String, f64>,
}

impl ModelConfig {
    /// New config for `pdf`.
    pub fn new(name: impl Into<String>, pdf: impl Into<String>) -> Self {
        Self { name: name.into(), pdf: pdf.into(), ..Self::default() }
    }

    /// Builder: observables.
    pub fn with_observables<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.observables = names.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: parameters of interest.
    pub fn with_pois<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.pois = names.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: nuisance parameters.
    pub fn with_nuisance<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.nuisance = names.into_iter().map(Into::into).collect();
        self
    }

    /// Record a snapshot value.
    pub fn set_snapshot(&mut self, name: impl Into<String>, value: f64) {
        self.snapshot.insert(name.into(), value);
    }

    /// First parameter of interest.
    pub fn poi(&self) -> Option<&str> {
        self.pois.first().map(String::as_str)
    }

    /// Copy of this config under another name with a single-valued POI snapshot.
    pub fn clone_with_snapshot(&self, name: impl Into<String>, poi_value: f64) -> Self {
        let mut out = self.clone();
        out.name = name.into();
        out.snapshot.clear();
        if let Some(poi) = self.poi() {
            out.snapshot.insert(poi.to_string(), poi_value);
        }
        out
    }

    /// Snapshot value of the POI, if recorded.
    pub fn poi_snapshot(&self) -> Option<f64> {
        self.poi().and_then(|p| self.snapshot.get(p).copied())
    }
}

impl fmt::Display for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Using the following for {} ===", self.name)?;
        writeln!(f, "Observables:             ({})", self.observables.join(","))?;
        writeln!(f, "Parameters of Interest:  ({})", self.pois.join(","))?;
        writeln!(f, "Nuisance Parameters:     ({})", self.nuisance.join(","))?;
        writeln!(f, "PDF:                     {}", self.pdf)?;
        if !self.snapshot.is_empty() {
            let snap: Vec<String> =
                self.snapshot.iter().map(|(k, v)| format!("{k}={v}")).collect();
            writeln!(f, "Snapshot:                ({})", snap.join(","))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_clone() {
        let mc = ModelConfig::new("ModelConfig", "model")
            .with_observables(["x"])
            .with_pois(["nsig"])
            .with_nuisance(["a", "nbkg"]);
        let sb = mc.clone_with_snapshot("S+B_model", 50.0);
        assert_eq!(sb.poi_snapshot(), Some(50.0));
        assert_eq!(sb.name, "S+B_model");
        assert!(mc.poi_snapshot().is_none());
        let text = sb.to_string();
        assert!(text.contains("Parameters of Interest:  (nsig)"));
        assert!(text.contains("nsig=50"));
    }
}
