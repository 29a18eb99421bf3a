//! # mf-model
//!
//! Probability models for invariant-mass fits.
//!
//! - [`RealVar`]: observables, floating parameters and constants
//! - [`EventStore`] / [`BinnedData`]: unbinned and binned datasets
//! - [`pdf`]: truncated Gaussian, bounded exponential and histogram shapes
//! - [`Workspace`]: a named, persistable collection built with [`Workspace::factory`]
//! - [`CompiledModel`]: a workspace PDF as a likelihood (implements
//!   [`mf_core::LogDensityModel`]) with toy generation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binning;
pub mod compiled;
pub mod data;
mod factory;
pub mod generate;
pub mod math;
pub mod model_config;
pub mod pdf;
pub mod var;
pub mod workspace;


pub use binning::Binning;
pub use compiled::{CompiledModel, Parameter};
pub use data::{BinnedData, Dataset, EventStore};
pub use generate::poisson_count;
pub use model_config::ModelConfig;
pub use var::RealVar;
pub use workspace::{FuncNode, PdfNode, Workspace};
