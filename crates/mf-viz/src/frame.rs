//! Observable frames: binned data points with model curves overlaid.
//!
//! A frame owns one observable axis. Data series are histogrammed with the frame binning
//! (unbinned data) or taken bin by bin (binned data); model curves are sampled densities
//! scaled to events per bin, so both share the `Events / (bin width)` y axis.

use mf_core::{Error, FitResult, Result};
use mf_model::{Binning, CompiledModel, Dataset, RealVar};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// How data error bars are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataErrors {
    /// Central 68% Poisson (Garwood) interval on integer counts.
    Poisson,
    /// `sqrt(Σ w²)` per bin.
    SumW2,
    /// No error bars.
    None,
}

/// Curve line pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

/// How a legend entry is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegendMark {
    Marker,
    Line,
    Fill,
}

/// Histogrammed data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSeries {
    pub name: String,
    pub x: Vec<f64>,
    pub x_half_width: f64,
    pub y: Vec<f64>,
    pub yerr_lo: Vec<f64>,
    pub yerr_hi: Vec<f64>,
    pub errors: DataErrors,
}

/// A sampled model curve in events per bin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveSeries {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Named color (`"blue"`, `"violet"`, ...) or `#rrggbb`.
    pub color: String,
    pub line: LineKind,
    /// Fill the area under the curve.
    pub filled: bool,
}

/// Options for [`FrameArtifact::plot_model`].
#[derive(Debug, Clone)]
pub struct CurveOptions {
    pub name: String,
    pub component: Option<String>,
    pub color: String,
    pub line: LineKind,
    pub filled: bool,
    pub n_points: usize,
}

impl CurveOptions {
    /// Solid blue curve of the full model named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component: None,
            color: "blue".to_string(),
            line: LineKind::Solid,
            filled: false,
            n_points: 400,
        }
    }

    /// Plot only component `name` of the mixture.
    pub fn component(mut self, name: impl Into<String>) -> Self {
        self.component = Some(name.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn line(mut self, line: LineKind) -> Self {
        self.line = line;
        self
    }

    pub fn filled(mut self) -> Self {
        self.filled = true;
        self
    }
}

/// One line of the parameter box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamEntry {
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<f64>,
}

/// One legend line, referring to a data or curve series by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegendItem {
    pub series: String,
    pub label: String,
    pub mark: LegendMark,
}

/// Plot-friendly frame over one observable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameArtifact {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x_min: f64,
    pub x_max: f64,
    pub bin_width: f64,
    pub data: Vec<DataSeries>,
    pub curves: Vec<CurveSeries>,
    #[serde(default)]
    pub param_box: Vec<ParamEntry>,
    #[serde(default)]
    pub legend: Vec<LegendItem>,
    /// Event count of the most recently plotted data, used to normalize curves of
    /// non-extended models.
    #[serde(skip)]
    last_data_events: Option<f64>,
    #[serde(skip)]
    binning: Option<Binning>,
}

impl FrameArtifact {
    /// Empty frame over the range and binning of `observable`.
    pub fn new(observable: &RealVar) -> Result<Self> {
        let binning = observable.binning()?;
        let label = observable.label();
        Ok(Self {
            title: format!("A plot of \"{label}\""),
            x_label: label,
            y_label: events_label(binning.width()),
            x_min: binning.lo,
            x_max: binning.hi,
            bin_width: binning.width(),
            data: Vec::new(),
            curves: Vec::new(),
            param_box: Vec::new(),
            legend: Vec::new(),
            last_data_events: None,
            binning: Some(binning),
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    fn frame_binning(&self) -> Result<Binning> {
        match self.binning {
            Some(b) => Ok(b),
            None => Binning::new(
                self.x_min,
                self.x_max,
                ((self.x_max - self.x_min) / self.bin_width).round().max(1.0) as usize,
            ),
        }
    }

    /// Add a data series. Unbinned data is histogrammed with the frame binning; binned
    /// data keeps its own bins.
    pub fn plot_data(
        &mut self,
        name: impl Into<String>,
        data: &Dataset,
        errors: DataErrors,
    ) -> Result<()> {
        let hist = match data {
            Dataset::Unbinned(ev) => ev.binned_clone(&self.frame_binning()?)?,
            Dataset::Binned(h) => h.clone(),
        };
        let binning = *hist.binning();
        let counts = hist.counts();
        let (yerr_lo, yerr_hi) = match errors {
            DataErrors::Poisson => poisson_errors(counts)?,
            DataErrors::SumW2 => {
                let e: Vec<f64> = hist.sum_w2().iter().map(|w2| w2.max(0.0).sqrt()).collect();
                (e.clone(), e)
            }
            DataErrors::None => (vec![0.0; counts.len()], vec![0.0; counts.len()]),
        };

        if (binning.width() - self.bin_width).abs() > 1e-12 * self.bin_width {
            log::debug!(
                "data bin width {} differs from frame bin width {}; y label follows the data",
                binning.width(),
                self.bin_width
            );
            self.bin_width = binning.width();
            self.y_label = events_label(self.bin_width);
            self.binning = Some(binning);
        }

        self.data.push(DataSeries {
            name: name.into(),
            x: binning.centers(),
            x_half_width: 0.5 * binning.width(),
            y: counts.to_vec(),
            yerr_lo,
            yerr_hi,
            errors,
        });
        self.last_data_events = Some(hist.total());
        Ok(())
    }

    /// Add a model curve at `params`.
    ///
    /// Extended models are normalized to their expected event count; otherwise the
    /// curve is scaled to the most recently plotted data.
    pub fn plot_model(
        &mut self,
        model: &CompiledModel,
        params: &[f64],
        opts: CurveOptions,
    ) -> Result<()> {
        let n_events = match model.expected_events(params)? {
            Some(nu) => nu,
            None => self.last_data_events.ok_or_else(|| {
                Error::Validation(format!(
                    "cannot normalize non-extended pdf '{}' without plotted data",
                    model.pdf_name()
                ))
            })?,
        };
        let n = opts.n_points.max(2);
        let step = (self.x_max - self.x_min) / (n - 1) as f64;
        let xs: Vec<f64> = (0..n).map(|i| self.x_min + step * i as f64).collect();
        let dens = match &opts.component {
            Some(c) => model.component_density(c, &xs, params)?,
            None => model.density(&xs, params)?,
        };
        let scale = n_events * self.bin_width;
        self.curves.push(CurveSeries {
            name: opts.name,
            component: opts.component,
            y: dens.into_iter().map(|d| d * scale).collect(),
            x: xs,
            color: opts.color,
            line: opts.line,
            filled: opts.filled,
        });
        Ok(())
    }

    /// Fill the parameter box from a fit result (all parameters, in fit order).
    pub fn param_box_from_fit(&mut self, fit: &FitResult) {
        self.param_box = fit
            .parameter_names
            .iter()
            .zip(fit.parameters.iter().zip(&fit.uncertainties))
            .map(|(name, (&value, &err))| ParamEntry {
                name: name.clone(),
                value,
                error: (err > 0.0).then_some(err),
            })
            .collect();
    }

    /// Append one parameter box line.
    pub fn add_param(&mut self, name: impl Into<String>, value: f64, error: Option<f64>) {
        self.param_box.push(ParamEntry { name: name.into(), value, error });
    }

    /// Add a legend entry for the series called `series`.
    pub fn add_legend(
        &mut self,
        series: &str,
        label: impl Into<String>,
        mark: LegendMark,
    ) -> Result<()> {
        let known =
            self.data.iter().any(|d| d.name == series)
                || self.curves.iter().any(|c| c.name == series);
        if !known {
            return Err(Error::NotFound(format!("series '{series}' in frame")));
        }
        self.legend.push(LegendItem { series: series.to_string(), label: label.into(), mark });
        Ok(())
    }

    /// Largest y value among data (including upper errors) and curves.
    pub fn y_max(&self) -> f64 {
        let d = self
            .data
            .iter()
            .flat_map(|s| s.y.iter().zip(&s.yerr_hi).map(|(y, e)| y + e))
            .fold(0.0_f64, f64::max);
        let c = self.curves.iter().flat_map(|s| s.y.iter().copied()).fold(0.0_f64, f64::max);
        d.max(c)
    }
}

fn events_label(bin_width: f64) -> String {
    format!("Events / ( {} )", format_width(bin_width))
}

fn format_width(w: f64) -> String {
    let s = format!("{w:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

fn near_integer(x: f64) -> Option<u64> {
    if !(x.is_finite() && x >= 0.0) {
        return None;
    }
    let r = x.round();
    ((x - r).abs() <= 1e-9).then_some(r as u64)
}

/// Garwood interval half-widths `(n - lo, hi - n)` at 68.27% CL.
pub fn garwood_errors(n: u64) -> Result<(f64, f64)> {
    let alpha = 1.0 - 0.682_689_492_137_085_9;
    let nf = n as f64;
    let lo = if n == 0 {
        0.0
    } else {
        let chi2 = ChiSquared::new(2.0 * nf)
            .map_err(|e| Error::Computation(format!("chi2 lower: {e}")))?;
        nf - 0.5 * chi2.inverse_cdf(alpha / 2.0)
    };
    let chi2 = ChiSquared::new(2.0 * (nf + 1.0))
        .map_err(|e| Error::Computation(format!("chi2 upper: {e}")))?;
    let hi = 0.5 * chi2.inverse_cdf(1.0 - alpha / 2.0) - nf;
    Ok((lo, hi))
}

// Non-integer contents (weighted or Asimov data) fall back to sqrt(y).
fn poisson_errors(counts: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut lo = Vec::with_capacity(counts.len());
    let mut hi = Vec::with_capacity(counts.len());
    for &c in counts {
        match near_integer(c) {
            Some(n) => {
                let (l, h) = garwood_errors(n)?;
                lo.push(l);
                hi.push(h);
            }
            None => {
                let e = c.max(0.0).sqrt();
                lo.push(e);
                hi.push(e);
            }
        }
    }
    Ok((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mf_core::LogDensityModel;
    use mf_model::{EventStore, Workspace};

    fn model_and_data() -> (CompiledModel, Dataset) {
        let mut ws = Workspace::new("w");
        ws.factory("x[0,10]").unwrap();
        ws.factory("Exponential::bkg(x, c[-0.2,-1,0])").unwrap();
        ws.factory("Gaussian::sig(x, m[5], s[0.5])").unwrap();
        ws.factory("SUM::model(ns[20,0,100]*sig, nb[80,0,500]*bkg)").unwrap();
        ws.var_mut("x").unwrap().set_bins(10).unwrap();
        let vals: Vec<f64> = (0..100).map(|i| 0.05 + 0.1 * i as f64).collect();
        let data = EventStore::new("x", (0.0, 10.0), vals, None).unwrap();
        let m = CompiledModel::from_workspace(&ws, "model").unwrap();
        (m, data.into())
    }

    #[test]
    fn test_garwood_known_values() {
        let (lo, hi) = garwood_errors(0).unwrap();
        assert_eq!(lo, 0.0);
        assert_relative_eq!(hi, 1.8410, epsilon = 1e-3);
        let (lo, hi) = garwood_errors(10).unwrap();
        assert_relative_eq!(lo, 3.1086, epsilon = 5e-3);
        assert_relative_eq!(hi, 4.2657, epsilon = 5e-3);
    }

    #[test]
    fn test_frame_histograms_unbinned_data() {
        let (m, data) = model_and_data();
        let mut frame = FrameArtifact::new(m.observable()).unwrap().with_title("t");
        frame.plot_data("data", &data, DataErrors::Poisson).unwrap();
        let d = &frame.data[0];
        assert_eq!(d.x.len(), 10);
        assert!(d.y.iter().all(|&y| y == 10.0));
        assert_relative_eq!(d.x_half_width, 0.5, epsilon = 1e-12);
        assert_eq!(frame.y_label, "Events / ( 1 )");
    }

    #[test]
    fn test_extended_curve_integrates_to_yield() {
        let (m, data) = model_and_data();
        let mut frame = FrameArtifact::new(m.observable()).unwrap();
        frame.plot_data("data", &data, DataErrors::SumW2).unwrap();
        let p = m.parameter_init();
        frame.plot_model(&m, &p, CurveOptions::new("model").color("violet")).unwrap();
        frame
            .plot_model(&m, &p, CurveOptions::new("sig").component("sig").line(LineKind::Dashed))
            .unwrap();

        // Trapezoid integral of events-per-bin / bin width = expected events.
        let integral = |c: &CurveSeries| {
            let area: f64 = c
                .x
                .windows(2)
                .zip(c.y.windows(2))
                .map(|(x, y)| 0.5 * (y[0] + y[1]) * (x[1] - x[0]))
                .sum();
            area / frame.bin_width
        };
        assert_relative_eq!(integral(&frame.curves[0]), 100.0, max_relative = 1e-3);
        assert_relative_eq!(integral(&frame.curves[1]), 20.0, max_relative = 1e-3);
        assert!(frame.y_max() > 0.0);
    }

    #[test]
    fn test_legend_requires_known_series() {
        let (m, data) = model_and_data();
        let mut frame = FrameArtifact::new(m.observable()).unwrap();
        frame.plot_data("data", &data, DataErrors::None).unwrap();
        frame.add_legend("data", "Data", LegendMark::Marker).unwrap();
        assert!(frame.add_legend("model", "Model", LegendMark::Line).is_err());
    }

    #[test]
    fn test_serializes_without_private_fields() {
        let (m, data) = model_and_data();
        let mut frame = FrameArtifact::new(m.observable()).unwrap();
        frame.plot_data("data", &data, DataErrors::Poisson).unwrap();
        frame.add_param("ns", 20.0, Some(4.0));
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"param_box\""));
        assert!(!json.contains("last_data_events"));
        let back: FrameArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data[0].y.len(), 10);
    }
}
