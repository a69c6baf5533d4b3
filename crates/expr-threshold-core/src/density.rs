//! Gaussian kernel density estimation on a fixed evaluation grid.
//!
//! The estimator follows the classic binned scheme: the sample is linearly
//! binned onto a fine grid that extends `4 * bw` past the requested range,
//! convolved with the Gaussian kernel, and linearly interpolated onto the
//! output grid. Cost is one pass over the sample plus `O(grid_size^2)`.

use log::debug;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Conventional evaluation grid resolution.
pub const DEFAULT_GRID_SIZE: usize = 512;

/// How far (in bandwidths) the binning grid extends past the evaluation range.
const BINNING_CUT: f64 = 4.0;

/// Errors returned by [`estimate_density`] and the grid constructors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DensityError {
    #[error("sample has {distinct} distinct values, need at least 2")]
    TooFewDistinctValues { distinct: usize },
    #[error("sample value at index {index} is not finite")]
    NonFiniteValue { index: usize },
    #[error("bandwidth must be positive and finite (got {bandwidth})")]
    InvalidBandwidth { bandwidth: f64 },
    #[error("evaluation grid needs at least 2 points (got {size})")]
    GridTooSmall { size: usize },
    #[error("invalid evaluation range [{from}, {to}]")]
    InvalidRange { from: f64, to: f64 },
}

/// Span of the evaluation grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityRange {
    /// `[min(sample), max(sample)]`.
    ///
    /// Kernel mass beyond the extremes is not on the grid, so the integral
    /// falls below 1. With many tied values at an extreme (e.g. exact zeros)
    /// close to half of their mass is cut off.
    #[default]
    SampleRange,
    /// `[min - cut * bw, max + cut * bw]`.
    Widened { cut: f64 },
    /// Caller-provided `[from, to]`.
    Explicit { from: f64, to: f64 },
}

impl DensityRange {
    /// Resolve the range against the sample extent and bandwidth.
    pub fn resolve(&self, min: f64, max: f64, bandwidth: f64) -> Result<(f64, f64), DensityError> {
        let (from, to) = match *self {
            DensityRange::SampleRange => (min, max),
            DensityRange::Widened { cut } => (min - cut * bandwidth, max + cut * bandwidth),
            DensityRange::Explicit { from, to } => (from, to),
        };
        if !from.is_finite() || !to.is_finite() || from >= to {
            return Err(DensityError::InvalidRange { from, to });
        }
        Ok((from, to))
    }
}

/// Strictly increasing evaluation abscissae shared by every pipeline stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationGrid {
    xs: Vec<f64>,
}

impl EvaluationGrid {
    /// `size` equally spaced points from `from` to `to` inclusive.
    pub fn linspace(from: f64, to: f64, size: usize) -> Result<Self, DensityError> {
        if size < 2 {
            return Err(DensityError::GridTooSmall { size });
        }
        if !from.is_finite() || !to.is_finite() || from >= to {
            return Err(DensityError::InvalidRange { from, to });
        }
        let step = (to - from) / (size - 1) as f64;
        let mut xs: Vec<f64> = (0..size).map(|i| from + step * i as f64).collect();
        // pin the last point so the span is exact
        xs[size - 1] = to;
        Ok(Self { xs })
    }

    /// Wrap arbitrary abscissae. Returns `None` unless they are finite and
    /// strictly increasing.
    pub fn from_points(xs: Vec<f64>) -> Option<Self> {
        if xs.iter().any(|x| !x.is_finite()) || xs.windows(2).any(|w| w[0] >= w[1]) {
            return None;
        }
        Some(Self { xs })
    }

    #[inline]
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// First and last abscissa.
    pub fn span(&self) -> Option<(f64, f64)> {
        Some((*self.xs.first()?, *self.xs.last()?))
    }

    /// Index of the grid point closest to `x`. Ties go to the lower index.
    pub fn nearest_index(&self, x: f64) -> Option<usize> {
        if self.xs.is_empty() {
            return None;
        }
        let upper = self.xs.partition_point(|&g| g < x);
        if upper == 0 {
            return Some(0);
        }
        if upper == self.xs.len() {
            return Some(self.xs.len() - 1);
        }
        let lower = upper - 1;
        if x - self.xs[lower] <= self.xs[upper] - x {
            Some(lower)
        } else {
            Some(upper)
        }
    }
}

/// Density values aligned to an [`EvaluationGrid`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DensityCurve {
    grid: EvaluationGrid,
    ys: Vec<f64>,
}

impl DensityCurve {
    /// Pair a grid with its values. Returns `None` on a length mismatch.
    pub fn new(grid: EvaluationGrid, ys: Vec<f64>) -> Option<Self> {
        (grid.len() == ys.len()).then_some(Self { grid, ys })
    }

    /// Build a curve from raw `(x, y)` points with strictly increasing x.
    pub fn from_points(points: &[[f64; 2]]) -> Option<Self> {
        let grid = EvaluationGrid::from_points(points.iter().map(|p| p[0]).collect())?;
        Self::new(grid, points.iter().map(|p| p[1]).collect())
    }

    #[inline]
    pub fn grid(&self) -> &EvaluationGrid {
        &self.grid
    }

    #[inline]
    pub fn xs(&self) -> &[f64] {
        self.grid.xs()
    }

    #[inline]
    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ys.is_empty()
    }

    /// Iterate over `[x, y]` pairs.
    pub fn points(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        self.grid.xs().iter().zip(&self.ys).map(|(&x, &y)| [x, y])
    }

    /// Linear interpolation of the curve at `x`; zero outside the grid span.
    pub fn value_at(&self, x: f64) -> f64 {
        let xs = self.grid.xs();
        let n = xs.len();
        if n == 0 || !x.is_finite() || x < xs[0] || x > xs[n - 1] {
            return 0.0;
        }
        let upper = xs.partition_point(|&g| g < x);
        if upper == 0 {
            return self.ys[0];
        }
        let lower = upper - 1;
        let t = (x - xs[lower]) / (xs[upper] - xs[lower]);
        self.ys[lower] + t * (self.ys[upper] - self.ys[lower])
    }

    /// Trapezoidal integral over the grid span.
    pub fn integral(&self) -> f64 {
        self.grid
            .xs()
            .windows(2)
            .zip(self.ys.windows(2))
            .map(|(x, y)| 0.5 * (x[1] - x[0]) * (y[0] + y[1]))
            .sum()
    }
}

/// Gaussian kernel density estimate of `sample` on `grid_size` points.
///
/// `bandwidth` is the kernel standard deviation.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(sample), fields(n = sample.len()))
)]
pub fn estimate_density(
    sample: &[f64],
    bandwidth: f64,
    range: DensityRange,
    grid_size: usize,
) -> Result<DensityCurve, DensityError> {
    if !bandwidth.is_finite() || bandwidth <= 0.0 {
        return Err(DensityError::InvalidBandwidth { bandwidth });
    }
    if grid_size < 2 {
        return Err(DensityError::GridTooSmall { size: grid_size });
    }

    let (min, max) = sample_extent(sample)?;
    let (from, to) = range.resolve(min, max, bandwidth)?;
    let grid = EvaluationGrid::linspace(from, to, grid_size)?;

    let lo = from - BINNING_CUT * bandwidth;
    let hi = to + BINNING_CUT * bandwidth;
    let bins = 2 * grid_size;
    let step = (hi - lo) / (bins - 1) as f64;

    let weights = linear_binning(sample, lo, step, bins);
    let fine = convolve_gaussian(&weights, step, bandwidth);

    let ys = grid
        .xs()
        .iter()
        .map(|&x| {
            let pos = (x - lo) / step;
            let i = (pos.floor() as usize).min(bins - 2);
            let t = pos - i as f64;
            ((1.0 - t) * fine[i] + t * fine[i + 1]).max(0.0)
        })
        .collect();

    debug!(
        "density: n={} bw={bandwidth} range=[{from:.4}, {to:.4}] grid={grid_size}",
        sample.len()
    );

    Ok(DensityCurve { grid, ys })
}

fn sample_extent(sample: &[f64]) -> Result<(f64, f64), DensityError> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for (index, &v) in sample.iter().enumerate() {
        if !v.is_finite() {
            return Err(DensityError::NonFiniteValue { index });
        }
        min = min.min(v);
        max = max.max(v);
    }
    if sample.is_empty() {
        return Err(DensityError::TooFewDistinctValues { distinct: 0 });
    }
    if min == max {
        return Err(DensityError::TooFewDistinctValues { distinct: 1 });
    }
    Ok((min, max))
}

/// Spread unit mass `1 / n` per observation onto the two neighbouring bins.
/// Observations outside the binning grid are dropped but still count in `n`.
fn linear_binning(sample: &[f64], lo: f64, step: f64, bins: usize) -> Vec<f64> {
    let mass = 1.0 / sample.len() as f64;
    let mut weights = vec![0.0f64; bins];
    let last = (bins - 1) as f64;
    for &v in sample {
        let pos = (v - lo) / step;
        if !(0.0..=last).contains(&pos) {
            continue;
        }
        let i = pos.floor() as usize;
        if i >= bins - 1 {
            weights[bins - 1] += mass;
            continue;
        }
        let t = pos - i as f64;
        weights[i] += (1.0 - t) * mass;
        weights[i + 1] += t * mass;
    }
    weights
}

fn convolve_gaussian(weights: &[f64], step: f64, bandwidth: f64) -> Vec<f64> {
    let n = weights.len();
    let norm = 1.0 / (bandwidth * (2.0 * PI).sqrt());
    let kernel: Vec<f64> = (0..n)
        .map(|lag| {
            let u = lag as f64 * step / bandwidth;
            norm * (-0.5 * u * u).exp()
        })
        .collect();

    let mut out = vec![0.0f64; n];
    for (i, &w) in weights.iter().enumerate() {
        if w == 0.0 {
            continue;
        }
        for (j, slot) in out.iter_mut().enumerate() {
            *slot += w * kernel[i.abs_diff(j)];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::normal_sample;
    use approx::assert_abs_diff_eq;

    #[test]
    fn widened_density_integrates_to_one() {
        let sample = normal_sample(1.0, 0.4, 2000);
        let curve = estimate_density(&sample, 0.1, DensityRange::Widened { cut: 3.0 }, 512)
            .expect("density");
        assert_eq!(curve.len(), 512);
        assert!(curve.ys().iter().all(|&y| y >= 0.0));
        assert_abs_diff_eq!(curve.integral(), 1.0, epsilon = 1e-2);
    }

    #[test]
    fn sample_range_cuts_mass_at_a_tied_extreme() {
        let mut sample = vec![0.0; 1000];
        sample.extend(normal_sample(2.0, 0.3, 1000));

        let cut = estimate_density(&sample, 0.1, DensityRange::SampleRange, 512).unwrap();
        // half the kernel mass of the zeros, which carry half the sample
        assert_abs_diff_eq!(cut.integral(), 0.75, epsilon = 0.03);

        let widened =
            estimate_density(&sample, 0.1, DensityRange::Widened { cut: 3.0 }, 512).unwrap();
        assert_abs_diff_eq!(widened.integral(), 1.0, epsilon = 1e-2);
    }

    #[test]
    fn sample_range_grid_spans_the_sample() {
        let sample = [0.5, 1.0, 1.5, 2.0, 4.0];
        let curve = estimate_density(&sample, 0.2, DensityRange::SampleRange, 64).unwrap();
        let (from, to) = curve.grid().span().unwrap();
        assert_eq!(from, 0.5);
        assert_eq!(to, 4.0);
        assert!(curve.xs().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn peak_sits_at_the_sample_mean() {
        let sample = normal_sample(2.0, 0.3, 4000);
        let curve = estimate_density(&sample, 0.1, DensityRange::Widened { cut: 3.0 }, 512)
            .unwrap();
        let (imax, _) = curve
            .ys()
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, &y)| if y > best.1 { (i, y) } else { best });
        assert_abs_diff_eq!(curve.xs()[imax], 2.0, epsilon = 0.03);
        // N(2, sqrt(0.3^2 + 0.1^2)) peak height
        let sd = (0.09f64 + 0.01).sqrt();
        assert_abs_diff_eq!(curve.ys()[imax], 1.0 / (sd * (2.0 * PI).sqrt()), epsilon = 0.03);
    }

    #[test]
    fn larger_bandwidth_flattens_the_peak() {
        let sample = normal_sample(2.0, 0.2, 1000);
        let range = DensityRange::Widened { cut: 3.0 };
        let narrow = estimate_density(&sample, 0.05, range, 256).unwrap();
        let wide = estimate_density(&sample, 0.5, range, 256).unwrap();
        let peak = |c: &DensityCurve| c.ys().iter().cloned().fold(f64::MIN, f64::max);
        assert!(peak(&narrow) > peak(&wide));
    }

    #[test]
    fn rejects_degenerate_samples() {
        assert_eq!(
            estimate_density(&[], 0.1, DensityRange::SampleRange, 512),
            Err(DensityError::TooFewDistinctValues { distinct: 0 })
        );
        assert_eq!(
            estimate_density(&[1.0; 10], 0.1, DensityRange::SampleRange, 512),
            Err(DensityError::TooFewDistinctValues { distinct: 1 })
        );
        assert_eq!(
            estimate_density(&[1.0, f64::NAN], 0.1, DensityRange::SampleRange, 512),
            Err(DensityError::NonFiniteValue { index: 1 })
        );
        assert!(matches!(
            estimate_density(&[1.0, 2.0], 0.0, DensityRange::SampleRange, 512),
            Err(DensityError::InvalidBandwidth { .. })
        ));
        assert_eq!(
            estimate_density(&[1.0, 2.0], 0.1, DensityRange::SampleRange, 1),
            Err(DensityError::GridTooSmall { size: 1 })
        );
        assert!(matches!(
            estimate_density(
                &[1.0, 2.0],
                0.1,
                DensityRange::Explicit { from: 3.0, to: 3.0 },
                16
            ),
            Err(DensityError::InvalidRange { .. })
        ));
    }

    #[test]
    fn nearest_index_prefers_lower_on_ties() {
        let grid = EvaluationGrid::linspace(0.0, 4.0, 5).unwrap();
        assert_eq!(grid.nearest_index(1.5), Some(1));
        assert_eq!(grid.nearest_index(1.6), Some(2));
        assert_eq!(grid.nearest_index(-3.0), Some(0));
        assert_eq!(grid.nearest_index(9.0), Some(4));
    }

    #[test]
    fn value_at_interpolates_and_vanishes_outside() {
        let curve = DensityCurve::from_points(&[[0.0, 0.0], [1.0, 2.0], [2.0, 0.0]]).unwrap();
        assert_abs_diff_eq!(curve.value_at(0.25), 0.5);
        assert_abs_diff_eq!(curve.value_at(1.5), 1.0);
        assert_eq!(curve.value_at(-0.1), 0.0);
        assert_eq!(curve.value_at(2.1), 0.0);
        assert!(DensityCurve::from_points(&[[1.0, 0.0], [1.0, 1.0]]).is_none());
    }
}
