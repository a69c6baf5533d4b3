//! Local extrema from sign changes of a fitted curve's slope.

use crate::density::DensityCurve;
use crate::spline::FittedCurve;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtremumKind {
    Maximum,
    Minimum,
}

/// One located extremum.
///
/// `density` is read from the density curve at the moment the extremum is
/// identified, so later stages never look it up again by x.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extremum {
    pub kind: ExtremumKind,
    pub x: f64,
    pub density: f64,
    /// Grid index the extremum was read from; `None` for substituted values
    /// that do not sit on the grid.
    pub grid_index: Option<usize>,
}

impl Extremum {
    fn on_grid(kind: ExtremumKind, density: &DensityCurve, index: usize) -> Self {
        Self {
            kind,
            x: density.xs()[index],
            density: density.ys()[index],
            grid_index: Some(index),
        }
    }
}

/// Ascending maxima and minima.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Extrema {
    pub maxima: Vec<Extremum>,
    pub minima: Vec<Extremum>,
    /// Maxima were empty and replaced by the grid point nearest `rough_max`.
    pub maxima_substituted: bool,
    /// Minima were empty and replaced by `abs_min`.
    pub minima_substituted: bool,
}

impl Extrema {
    /// Guarantee both sequences are non-empty.
    ///
    /// - no maxima: the grid point closest to `rough_max`,
    /// - no minima: `abs_min` itself, as an x-value.
    pub fn apply_fallbacks(&mut self, density: &DensityCurve, rough_max: f64, abs_min: f64) {
        if self.maxima.is_empty() {
            if let Some(index) = density.grid().nearest_index(rough_max) {
                warn!(
                    "no density maximum found, substituting grid x={:.4} near rough_max={rough_max}",
                    density.xs()[index]
                );
                self.maxima
                    .push(Extremum::on_grid(ExtremumKind::Maximum, density, index));
                self.maxima_substituted = true;
            }
        }
        if self.minima.is_empty() {
            warn!("no density minimum found, substituting abs_min={abs_min}");
            self.minima.push(Extremum {
                kind: ExtremumKind::Minimum,
                x: abs_min,
                density: density.value_at(abs_min),
                grid_index: None,
            });
            self.minima_substituted = true;
        }
    }
}

/// Scan the slope sign on every grid point of `density`.
///
/// A maximum is reported where the sign goes from `+` to `-` between grid
/// points `i` and `i + 1`, a minimum where it goes from `-` to `+`. Both are
/// reported at index `i`. A zero slope has sign `0`, so a flat step through
/// zero never registers.
pub fn scan_extrema<C: FittedCurve + ?Sized>(curve: &C, density: &DensityCurve) -> Extrema {
    let signs: Vec<i8> = density
        .xs()
        .iter()
        .map(|&x| slope_sign(curve.derivative(x)))
        .collect();

    let mut extrema = Extrema::default();
    for (i, w) in signs.windows(2).enumerate() {
        match w[1] - w[0] {
            -2 => extrema
                .maxima
                .push(Extremum::on_grid(ExtremumKind::Maximum, density, i)),
            2 => extrema
                .minima
                .push(Extremum::on_grid(ExtremumKind::Minimum, density, i)),
            _ => {}
        }
    }
    extrema
}

/// [`scan_extrema`] followed by [`Extrema::apply_fallbacks`].
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(curve, density), fields(n = density.len()))
)]
pub fn locate_extrema<C: FittedCurve + ?Sized>(
    curve: &C,
    density: &DensityCurve,
    rough_max: f64,
    abs_min: f64,
) -> Extrema {
    let mut extrema = scan_extrema(curve, density);
    debug!(
        "extrema: {} maxima, {} minima",
        extrema.maxima.len(),
        extrema.minima.len()
    );
    extrema.apply_fallbacks(density, rough_max, abs_min);
    extrema
}

fn slope_sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}
