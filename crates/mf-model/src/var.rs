//! Real-valued variables: observables, floating parameters and constants.

use crate::binning::Binning;
use mf_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default number of bins for a freshly declared variable.
pub const DEFAULT_BINS: usize = 100;

fn default_bins() -> usize {
    DEFAULT_BINS
}

/// A named real variable with a range.
///
/// The same type describes the observable (`x[80,200]`), floating parameters
/// (`a[-0.01,-0.2,0.01]`) and constants (`mass[125]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealVar {
    /// Unique name inside a workspace.
    pub name: String,
    /// Display title (axis labels); empty means "use the name".
    #[serde(default)]
    pub title: String,
    /// Unit used in axis labels.
    #[serde(default)]
    pub unit: String,
    /// Current value.
    pub value: f64,
    /// Lower range limit.
    pub min: f64,
    /// Upper range limit.
    pub max: f64,
    /// Constant variables never float in fits.
    #[serde(default)]
    pub constant: bool,
    /// Number of bins used when binning this variable.
    #[serde(default = "default_bins")]
    pub bins: usize,
    /// Last fitted uncertainty, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<f64>,
}

impl RealVar {
    /// Floating variable with a value and a range.
    pub fn new(name: impl Into<String>, value: f64, min: f64, max: f64) -> Result<Self> {
        let name = name.into();
        if !(min.is_finite() && max.is_finite() && value.is_finite()) {
            return Err(Error::Validation(format!(
                "variable '{name}' requires finite value and range, got {value} in [{min}, {max}]"
            )));
        }
        if min > max {
            return Err(Error::Validation(format!(
                "variable '{name}' has inverted range [{min}, {max}]"
            )));
        }
        if value < min || value > max {
            return Err(Error::Validation(format!(
                "variable '{name}' value {value} outside range [{min}, {max}]"
            )));
        }
        Ok(Self {
            name,
            title: String::new(),
            unit: String::new(),
            value,
            min,
            max,
            constant: false,
            bins: DEFAULT_BINS,
            error: None,
        })
    }

    /// Floating variable whose value starts at the middle of its range.
    pub fn ranged(name: impl Into<String>, min: f64, max: f64) -> Result<Self> {
        Self::new(name, 0.5 * (min + max), min, max)
    }

    /// Constant with a single value.
    pub fn constant(name: impl Into<String>, value: f64) -> Result<Self> {
        let mut v = Self::new(name, value, value, value)?;
        v.constant = true;
        Ok(v)
    }

    /// Builder: set title and unit.
    pub fn with_title(mut self, title: impl Into<String>, unit: impl Into<String>) -> Self {
        self.title = title.into();
        self.unit = unit.into();
        self
    }

    /// Set the value, clamped into the range.
    pub fn set_value(&mut self, value: f64) {
        self.value = value.clamp(self.min, self.max);
    }

    /// Mark the variable constant or floating.
    pub fn set_constant(&mut self, constant: bool) {
        self.constant = constant;
    }

    /// Set the number of bins used by [`RealVar::binning`].
    pub fn set_bins(&mut self, bins: usize) -> Result<()> {
        if bins == 0 {
            let msg = format!("variable '{}' needs at least one bin", self.name);
            return Err(Error::Validation(msg));
        }
        self.bins = bins;
        Ok(())
    }

    /// Range as a tuple.
    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Uniform binning over the range.
    pub fn binning(&self) -> Result<Binning> {
        Binning::new(self.min, self.max, self.bins)
    }

    /// Axis label: `title [unit]`.
    pub fn label(&self) -> String {
        let title = if self.title.is_empty() { self.name.as_str() } else { self.title.as_str() };
        if self.unit.is_empty() { title.to_string() } else { format!("{title} [{}]", self.unit) }
    }
}
