//! Numerical building blocks for expression thresholding.
//!
//! Each stage is a free function over plain data and returns its own error
//! type:
//! 1. [`estimate_density`]: Gaussian KDE on an [`EvaluationGrid`],
//! 2. [`fit_smoothing_spline`]: penalized cubic spline with a slope,
//! 3. [`locate_extrema`]: slope sign changes plus fallbacks,
//! 4. [`select_peak`]: densest maximum above a cutoff and its left trough,
//! 5. [`fit_quadratic_window`]: least-squares parabola around the peak,
//! 6. [`QuadraticModel::threshold_root`]: guarded closed-form root.
//!
//! The crate does no I/O and keeps no state between calls.

mod density;
mod extrema;
mod logger;
mod peak;
mod quadratic;
mod spline;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use density::{
    estimate_density, DensityCurve, DensityError, DensityRange, EvaluationGrid, DEFAULT_GRID_SIZE,
};
pub use extrema::{locate_extrema, scan_extrema, Extrema, Extremum, ExtremumKind};
pub use peak::{select_peak, PeakError, PeakSelection};
pub use quadratic::{
    fit_quadratic, fit_quadratic_window, FitWindow, QuadraticError, QuadraticModel, ThresholdRoot,
};
pub use spline::{fit_smoothing_spline, FittedCurve, SmoothingSpline, SplineError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
