use crate::ThresholdError;
use expr_threshold_core::{DensityRange, DEFAULT_GRID_SIZE};
use serde::{Deserialize, Serialize};

/// Named parameter sets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdProfile {
    /// Peak cutoff at 1.0 and a grid spanning exactly the sample.
    #[default]
    Robust,
    /// Peak cutoff at 2.0 and a grid widened by `3 * bandwidth` on each side.
    Legacy,
}

impl ThresholdProfile {
    pub fn params(self) -> ThresholdParams {
        match self {
            ThresholdProfile::Robust => ThresholdParams::robust_defaults(),
            ThresholdProfile::Legacy => ThresholdParams::legacy_defaults(),
        }
    }
}

/// Configuration for the threshold pipeline.
///
/// Missing fields deserialize from [`ThresholdParams::robust_defaults`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdParams {
    /// Gaussian kernel standard deviation for the density estimate.
    pub bandwidth: f64,
    /// Smoothing-spline stiffness (`spar`), roughly 0 to 1.5.
    pub smoothing: f64,
    /// A maximum must lie strictly above this x to count as the
    /// high-expression peak.
    pub chosen_min: f64,
    /// Floor for the threshold and fallback trough location.
    pub abs_min: f64,
    /// Peak location substituted when the density has no maximum.
    pub rough_max: f64,
    /// Number of evaluation grid points.
    pub grid_size: usize,
    /// Span of the evaluation grid.
    pub range: DensityRange,
    /// Value returned by the lenient entry points when the pipeline fails.
    pub fallback_threshold: f64,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self::robust_defaults()
    }
}

impl ThresholdParams {
    pub fn robust_defaults() -> Self {
        Self {
            bandwidth: 0.1,
            smoothing: 1.0,
            chosen_min: 1.0,
            abs_min: 0.3,
            rough_max: 2.0,
            grid_size: DEFAULT_GRID_SIZE,
            range: DensityRange::SampleRange,
            fallback_threshold: 2.0,
        }
    }

    pub fn legacy_defaults() -> Self {
        Self {
            chosen_min: 2.0,
            range: DensityRange::Widened { cut: 3.0 },
            ..Self::robust_defaults()
        }
    }

    /// Reject parameter sets the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        let invalid = |field: &'static str, reason: &'static str| {
            Err(ThresholdError::InvalidParams { field, reason })
        };

        if !self.bandwidth.is_finite() || self.bandwidth <= 0.0 {
            return invalid("bandwidth", "must be positive and finite");
        }
        if !self.smoothing.is_finite() || self.smoothing < 0.0 {
            return invalid("smoothing", "must be finite and non-negative");
        }
        if !self.chosen_min.is_finite() {
            return invalid("chosen_min", "must be finite");
        }
        if !self.abs_min.is_finite() || self.abs_min < 0.0 {
            return invalid("abs_min", "must be finite and non-negative");
        }
        if !self.rough_max.is_finite() {
            return invalid("rough_max", "must be finite");
        }
        if self.grid_size < 4 {
            return invalid("grid_size", "must be at least 4");
        }
        if !self.fallback_threshold.is_finite() {
            return invalid("fallback_threshold", "must be finite");
        }
        match self.range {
            DensityRange::SampleRange => {}
            DensityRange::Widened { cut } => {
                if !cut.is_finite() || cut < 0.0 {
                    return invalid("range", "widening cut must be finite and non-negative");
                }
            }
            DensityRange::Explicit { from, to } => {
                if !from.is_finite() || !to.is_finite() || from >= to {
                    return invalid("range", "explicit range must satisfy from < to");
                }
            }
        }
        Ok(())
    }
}
