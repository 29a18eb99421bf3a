//! # mf-viz
//!
//! Visualization data artifacts for massfit.
//!
//! Artifacts are plain serde structures (arrays rather than nested objects) computed from
//! models and inference results; drawing them is left to `mf-viz-render`.

#![warn(clippy::all)]

/// CLs scan curves with expected bands.
pub mod cls;
/// Observable frames: data histograms and model curves.
pub mod frame;
/// Profile likelihood curves and intervals.
pub mod profile;
/// Test-statistic sampling distributions.
pub mod test_stat;

pub use cls::{ClsCurveArtifact, NsSigmaOrder};
pub use frame::{
    CurveOptions, CurveSeries, DataErrors, DataSeries, FrameArtifact, LegendItem, LegendMark,
    LineKind, ParamEntry,
};
pub use profile::ProfileCurveArtifact;
pub use test_stat::{TestStatArtifact, TestStatHistogram};
