use expr_threshold_core::{DensityError, PeakError, QuadraticError, SplineError};
use serde::{Deserialize, Serialize};

/// Numerically underdetermined fit in one of the pipeline stages.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("smoothing spline: {0}")]
    Spline(#[from] SplineError),
    #[error("local quadratic: {0}")]
    Quadratic(QuadraticError),
}

/// Errors returned by the strict threshold entry points.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] DensityError),
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParams {
        field: &'static str,
        reason: &'static str,
    },
    #[error("fit failed: {0}")]
    Fit(#[from] FitError),
    #[error(transparent)]
    NoPeakFound(#[from] PeakError),
    #[error("fitted quadratic has no real root (discriminant {discriminant:.6e})")]
    NoRealRoot { discriminant: f64 },
}

/// Coarse classification of a [`ThresholdError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdErrorKind {
    InvalidInput,
    Fit,
    NoPeakFound,
    NoRealRoot,
}

impl ThresholdError {
    pub fn kind(&self) -> ThresholdErrorKind {
        match self {
            ThresholdError::InvalidInput(_) | ThresholdError::InvalidParams { .. } => {
                ThresholdErrorKind::InvalidInput
            }
            ThresholdError::Fit(_) => ThresholdErrorKind::Fit,
            ThresholdError::NoPeakFound(_) => ThresholdErrorKind::NoPeakFound,
            ThresholdError::NoRealRoot { .. } => ThresholdErrorKind::NoRealRoot,
        }
    }
}

impl From<SplineError> for ThresholdError {
    fn from(err: SplineError) -> Self {
        ThresholdError::Fit(FitError::Spline(err))
    }
}

impl From<QuadraticError> for ThresholdError {
    fn from(err: QuadraticError) -> Self {
        match err {
            QuadraticError::NoRealRoot { discriminant } => {
                ThresholdError::NoRealRoot { discriminant }
            }
            other => ThresholdError::Fit(FitError::Quadratic(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_map_to_kinds() {
        let e: ThresholdError = DensityError::TooFewDistinctValues { distinct: 1 }.into();
        assert_eq!(e.kind(), ThresholdErrorKind::InvalidInput);

        let e: ThresholdError = SplineError::TooFewPoints { points: 3 }.into();
        assert_eq!(e.kind(), ThresholdErrorKind::Fit);

        let e: ThresholdError = QuadraticError::TooFewWindowPoints { points: 2 }.into();
        assert_eq!(e.kind(), ThresholdErrorKind::Fit);

        let e: ThresholdError = QuadraticError::NoRealRoot { discriminant: -1.0 }.into();
        assert_eq!(e, ThresholdError::NoRealRoot { discriminant: -1.0 });

        let e: ThresholdError = PeakError::NoPeakFound {
            chosen_min: 1.0,
            maxima: 2,
        }
        .into();
        assert_eq!(e.kind(), ThresholdErrorKind::NoPeakFound);
        assert!(e.to_string().contains("chosen_min=1"));
    }
}
