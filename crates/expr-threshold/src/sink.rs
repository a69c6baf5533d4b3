//! Write-only observer for intermediate pipeline artifacts.
//!
//! A sink never influences the returned threshold. Every method has a no-op
//! default, so implementors pick the artifacts they care about.

use crate::ThresholdError;
use expr_threshold_core::{DensityCurve, Extrema, FitWindow, PeakSelection, QuadraticModel};

pub trait ThresholdSink {
    /// Whether the pipeline should build the sampled curves passed to
    /// [`ThresholdSink::fitted`] and [`ThresholdSink::quadratic`].
    fn enabled(&self) -> bool {
        true
    }

    fn density(&mut self, _curve: &DensityCurve) {}

    /// Smoothing spline evaluated on the density grid, as `[x, f(x)]`.
    fn fitted(&mut self, _samples: &[[f64; 2]]) {}

    /// Extrema after fallbacks were applied.
    fn extrema(&mut self, _extrema: &Extrema) {}

    fn selection(&mut self, _selection: &PeakSelection) {}

    /// Window and the density points that fell inside it.
    fn fit_window(&mut self, _window: &FitWindow, _points: &[[f64; 2]]) {}

    /// Quadratic model and its values over the window abscissae.
    fn quadratic(&mut self, _model: &QuadraticModel, _curve: &[[f64; 2]]) {}

    /// Final threshold. The lenient entry points report the fallback value
    /// here when the pipeline failed.
    fn threshold(&mut self, _value: f64) {}

    /// Failure swallowed by a lenient entry point.
    fn error(&mut self, _err: &ThresholdError) {}
}

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl ThresholdSink for NoopSink {
    fn enabled(&self) -> bool {
        false
    }
}
