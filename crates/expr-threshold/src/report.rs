use crate::{ThresholdError, ThresholdErrorKind, ThresholdParams, ThresholdSink};
use expr_threshold_core::{DensityCurve, Extrema, FitWindow, PeakSelection, QuadraticModel};
use serde::{Deserialize, Serialize};

/// Serializable record of one pipeline run, for external plotting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdReport {
    #[serde(default)]
    pub params: Option<ThresholdParams>,
    #[serde(default)]
    pub density: Vec<[f64; 2]>,
    #[serde(default)]
    pub fitted: Vec<[f64; 2]>,
    #[serde(default)]
    pub extrema: Option<Extrema>,
    #[serde(default)]
    pub selection: Option<PeakSelection>,
    #[serde(default)]
    pub fit_window: Option<FitWindow>,
    #[serde(default)]
    pub fit_points: Vec<[f64; 2]>,
    #[serde(default)]
    pub quadratic: Option<QuadraticModel>,
    #[serde(default)]
    pub quadratic_curve: Vec<[f64; 2]>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_kind: Option<ThresholdErrorKind>,
}

impl ThresholdReport {
    /// Empty report tagged with the parameters of the run.
    pub fn new(params: &ThresholdParams) -> Self {
        Self {
            params: Some(params.clone()),
            ..Self::default()
        }
    }

    /// Whether the run reached a threshold without error.
    pub fn succeeded(&self) -> bool {
        self.threshold.is_some() && self.error.is_none()
    }
}

impl ThresholdSink for ThresholdReport {
    fn density(&mut self, curve: &DensityCurve) {
        self.density = curve.points().collect();
    }

    fn fitted(&mut self, samples: &[[f64; 2]]) {
        self.fitted = samples.to_vec();
    }

    fn extrema(&mut self, extrema: &Extrema) {
        self.extrema = Some(extrema.clone());
    }

    fn selection(&mut self, selection: &PeakSelection) {
        self.selection = Some(*selection);
    }

    fn fit_window(&mut self, window: &FitWindow, points: &[[f64; 2]]) {
        self.fit_window = Some(*window);
        self.fit_points = points.to_vec();
    }

    fn quadratic(&mut self, model: &QuadraticModel, curve: &[[f64; 2]]) {
        self.quadratic = Some(*model);
        self.quadratic_curve = curve.to_vec();
    }

    fn threshold(&mut self, value: f64) {
        self.threshold = Some(value);
    }

    fn error(&mut self, err: &ThresholdError) {
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind());
    }
}
