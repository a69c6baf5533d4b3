//! Data-driven minimum-expression threshold for single-cell quality control.
//!
//! Given per-cell values of some expression statistic (typically log
//! counts), the pipeline estimates a density, smooths it, finds the
//! high-expression peak and the trough to its left, fits a parabola across
//! that span and returns its lower root as the cutoff below which cells are
//! treated as low quality.
//!
//! ## Quickstart
//!
//! ```no_run
//! use expr_threshold::{compute_threshold, ThresholdParams};
//!
//! let values: Vec<f64> = vec![/* per-cell log expression */];
//! let cutoff = compute_threshold(&values, &ThresholdParams::default());
//! let keep: Vec<bool> = values.iter().map(|&v| v >= cutoff).collect();
//! # let _ = keep;
//! ```
//!
//! [`compute_threshold`] never fails: on any pipeline error it logs a warning
//! and returns [`ThresholdParams::fallback_threshold`]. Use
//! [`try_compute_threshold`] or [`ThresholdEstimator::estimate`] to see the
//! error and the intermediate decisions instead.
//!
//! ## API map
//! - `expr_threshold::core`: the numerical stages (KDE, spline, extrema,
//!   peak selection, quadratic fit).
//! - [`ThresholdParams`] / [`ThresholdProfile`]: configuration.
//! - [`ThresholdSink`] / [`ThresholdReport`]: intermediate artifacts for
//!   plotting.
//! - [`ThresholdConfig`]: JSON config with profile and overrides.

pub use expr_threshold_core as core;

mod error;
mod io;
mod params;
mod pipeline;
mod report;
mod sink;

pub use error::{FitError, ThresholdError, ThresholdErrorKind};
pub use io::{compute_threshold_with_config, ThresholdConfig, ThresholdIoError};
pub use params::{ThresholdParams, ThresholdProfile};
pub use pipeline::{
    compute_threshold, compute_threshold_with_sink, try_compute_threshold, ThresholdEstimate,
    ThresholdEstimator,
};
pub use report::ThresholdReport;
pub use sink::{NoopSink, ThresholdSink};

pub use expr_threshold_core::{
    init_with_level, DensityCurve, DensityRange, Extrema, Extremum, FitWindow, PeakSelection,
    QuadraticModel, ThresholdRoot,
};

#[cfg(feature = "tracing")]
pub use expr_threshold_core::init_tracing;
