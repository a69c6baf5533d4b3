use crate::{NoopSink, ThresholdError, ThresholdParams, ThresholdSink};
use expr_threshold_core::{
    estimate_density, fit_quadratic_window, fit_smoothing_spline, locate_extrema, select_peak,
    Extrema, FitWindow, PeakSelection, QuadraticModel, ThresholdRoot,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Successful pipeline outcome with the intermediate decisions that led to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEstimate {
    pub threshold: f64,
    pub selection: PeakSelection,
    pub window: FitWindow,
    pub quadratic: QuadraticModel,
    pub root: ThresholdRoot,
    pub extrema: Extrema,
}

impl ThresholdEstimate {
    /// Whether the raw root was replaced by the `abs_min` floor.
    pub fn clamped(&self) -> bool {
        self.root.clamped
    }
}

/// Minimum-expression threshold estimator.
#[derive(Clone, Debug)]
pub struct ThresholdEstimator {
    params: ThresholdParams,
}

impl ThresholdEstimator {
    /// Create an estimator after validating `params`.
    pub fn new(params: ThresholdParams) -> Result<Self, ThresholdError> {
        params.validate()?;
        Ok(Self { params })
    }

    #[inline]
    pub fn params(&self) -> &ThresholdParams {
        &self.params
    }

    /// Run the full pipeline and fail on any stage error.
    pub fn estimate(&self, sample: &[f64]) -> Result<ThresholdEstimate, ThresholdError> {
        self.estimate_with_sink(sample, &mut NoopSink)
    }

    /// Same as [`ThresholdEstimator::estimate`], reporting intermediates to `sink`.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, sample, sink), fields(n = sample.len()))
    )]
    pub fn estimate_with_sink(
        &self,
        sample: &[f64],
        sink: &mut dyn ThresholdSink,
    ) -> Result<ThresholdEstimate, ThresholdError> {
        let p = &self.params;

        let density = estimate_density(sample, p.bandwidth, p.range, p.grid_size)?;
        sink.density(&density);

        let spline = fit_smoothing_spline(density.xs(), density.ys(), p.smoothing)?;
        if sink.enabled() {
            sink.fitted(&spline.sample_at_knots());
        }

        let extrema = locate_extrema(&spline, &density, p.rough_max, p.abs_min);
        sink.extrema(&extrema);

        let selection = select_peak(&extrema, p.chosen_min, p.abs_min)?;
        sink.selection(&selection);

        let window = FitWindow::around(&selection);
        let (quadratic, points) = fit_quadratic_window(&density, &window)?;
        sink.fit_window(&window, &points);
        if sink.enabled() {
            let curve: Vec<[f64; 2]> = points
                .iter()
                .map(|&[x, _]| [x, quadratic.eval(x)])
                .collect();
            sink.quadratic(&quadratic, &curve);
        }

        let root = quadratic.threshold_root(p.abs_min)?;
        debug!(
            "threshold={:.4} window=[{:.4}, {:.4}]{}",
            root.value,
            window.lo(),
            window.hi(),
            if root.clamped { " (clamped)" } else { "" }
        );
        sink.threshold(root.value);

        Ok(ThresholdEstimate {
            threshold: root.value,
            selection,
            window,
            quadratic,
            root,
            extrema,
        })
    }

    /// Lenient entry point: any failure yields `fallback_threshold`.
    pub fn threshold(&self, sample: &[f64]) -> f64 {
        self.threshold_with_sink(sample, &mut NoopSink)
    }

    /// Lenient entry point that records the failure, if any, in `sink`.
    pub fn threshold_with_sink(&self, sample: &[f64], sink: &mut dyn ThresholdSink) -> f64 {
        match self.estimate_with_sink(sample, sink) {
            Ok(estimate) => estimate.threshold,
            Err(err) => {
                warn!(
                    "threshold estimation failed ({err}); the sample likely has no clear \
                     high-expression population, using fallback {}",
                    self.params.fallback_threshold
                );
                sink.error(&err);
                sink.threshold(self.params.fallback_threshold);
                self.params.fallback_threshold
            }
        }
    }
}

/// Strict one-shot threshold. Use [`ThresholdEstimator::estimate`] to also get
/// the selected peak and fit.
pub fn try_compute_threshold(sample: &[f64], params: &ThresholdParams) -> Result<f64, ThresholdError> {
    Ok(ThresholdEstimator::new(params.clone())?
        .estimate(sample)?
        .threshold)
}

/// Lenient one-shot threshold. Returns `params.fallback_threshold` on any
/// failure, including invalid parameters.
pub fn compute_threshold(sample: &[f64], params: &ThresholdParams) -> f64 {
    compute_threshold_with_sink(sample, params, &mut NoopSink)
}

/// Lenient one-shot threshold that reports intermediates to `sink`.
pub fn compute_threshold_with_sink(
    sample: &[f64],
    params: &ThresholdParams,
    sink: &mut dyn ThresholdSink,
) -> f64 {
    match ThresholdEstimator::new(params.clone()) {
        Ok(estimator) => estimator.threshold_with_sink(sample, sink),
        Err(err) => {
            warn!(
                "rejected threshold parameters ({err}), using fallback {}",
                params.fallback_threshold
            );
            sink.error(&err);
            sink.threshold(params.fallback_threshold);
            params.fallback_threshold
        }
    }
}
