//! Local quadratic least squares and closed-form root extraction.

use crate::density::DensityCurve;
use crate::peak::PeakSelection;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum QuadraticError {
    #[error("quadratic fit needs at least 3 points in the window (got {points})")]
    TooFewWindowPoints { points: usize },
    #[error("quadratic design matrix is rank deficient (rank {rank})")]
    RankDeficient { rank: usize },
    #[error("quadratic has no real root (discriminant {discriminant:.6e})")]
    NoRealRoot { discriminant: f64 },
}

/// `y = a * x^2 + b * x + c`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuadraticModel {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

/// Root picked from a [`QuadraticModel`], after the non-negativity guard.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRoot {
    /// Final value, never negative.
    pub value: f64,
    /// `(-b + sqrt(D)) / (2a)` before the guard; may be negative or NaN.
    pub raw: f64,
    /// `value` was replaced by the floor.
    pub clamped: bool,
}

impl QuadraticModel {
    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        (self.a * x + self.b) * x + self.c
    }

    #[inline]
    pub fn discriminant(&self) -> f64 {
        self.b * self.b - 4.0 * self.a * self.c
    }

    /// `(-b + sqrt(D)) / (2a)`, the smaller root when `a < 0`.
    ///
    /// Fails when `D < 0`. A negative or non-finite root (e.g. `a == 0`) is
    /// replaced by `floor`.
    pub fn threshold_root(&self, floor: f64) -> Result<ThresholdRoot, QuadraticError> {
        let discriminant = self.discriminant();
        if discriminant < 0.0 {
            return Err(QuadraticError::NoRealRoot { discriminant });
        }
        let raw = (-self.b + discriminant.sqrt()) / (2.0 * self.a);
        if raw.is_finite() && raw >= 0.0 {
            return Ok(ThresholdRoot {
                value: raw,
                raw,
                clamped: false,
            });
        }
        warn!("quadratic root {raw} is negative or not finite, using floor {floor}");
        Ok(ThresholdRoot {
            value: floor,
            raw,
            clamped: true,
        })
    }
}

/// `[center - half_width, center + half_width]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitWindow {
    pub center: f64,
    pub half_width: f64,
}

impl FitWindow {
    /// Window centred on the peak with half-width equal to the peak-to-trough
    /// distance.
    pub fn around(selection: &PeakSelection) -> Self {
        Self {
            center: selection.peak.x,
            half_width: selection.delta(),
        }
    }

    #[inline]
    pub fn lo(&self) -> f64 {
        self.center - self.half_width
    }

    #[inline]
    pub fn hi(&self) -> f64 {
        self.center + self.half_width
    }

    #[inline]
    pub fn contains(&self, x: f64) -> bool {
        x >= self.lo() && x <= self.hi()
    }

    /// Curve points falling inside the window.
    pub fn select(&self, curve: &DensityCurve) -> Vec<[f64; 2]> {
        curve.points().filter(|p| self.contains(p[0])).collect()
    }
}

/// Ordinary least squares on the raw basis `[1, x, x^2]`.
pub fn fit_quadratic(points: &[[f64; 2]]) -> Result<QuadraticModel, QuadraticError> {
    let n = points.len();
    if n < 3 {
        return Err(QuadraticError::TooFewWindowPoints { points: n });
    }

    let design = DMatrix::<f64>::from_fn(n, 3, |i, j| points[i][0].powi(j as i32));
    let y = DVector::<f64>::from_iterator(n, points.iter().map(|p| p[1]));

    let svd = design.svd(true, true);
    let eps = svd.singular_values.max() * n as f64 * f64::EPSILON;
    let rank = svd.rank(eps);
    if rank < 3 {
        return Err(QuadraticError::RankDeficient { rank });
    }
    let coef = svd
        .solve(&y, eps)
        .map_err(|_| QuadraticError::RankDeficient { rank })?;

    Ok(QuadraticModel {
        a: coef[2],
        b: coef[1],
        c: coef[0],
    })
}

/// Fit a quadratic to the density points inside `window`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(curve), fields(lo = window.lo(), hi = window.hi()))
)]
pub fn fit_quadratic_window(
    curve: &DensityCurve,
    window: &FitWindow,
) -> Result<(QuadraticModel, Vec<[f64; 2]>), QuadraticError> {
    let points = window.select(curve);
    let model = fit_quadratic(&points)?;
    debug!(
        "quadratic: window=[{:.4}, {:.4}] points={} a={:.4e} b={:.4e} c={:.4e}",
        window.lo(),
        window.hi(),
        points.len(),
        model.a,
        model.b,
        model.c
    );
    Ok((model, points))
}
