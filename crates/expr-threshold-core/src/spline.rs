//! Penalized cubic smoothing spline (Reinsch form).
//!
//! Minimizes `sum (y_i - f(x_i))^2 + lambda * int f''(t)^2 dt` over natural
//! cubic splines with a knot at every abscissa. Abscissae are rescaled to
//! `[0, 1]` before fitting and `spar` maps to the penalty weight as
//! `lambda = r * 256^(3 * spar - 1)`, with `r = tr(I) / tr(K)` and `K` the
//! roughness matrix, so `spar` does not depend on the units or spacing of x.

use log::debug;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// A curve that can be queried for its value and slope.
pub trait FittedCurve {
    fn value(&self, x: f64) -> f64;
    fn derivative(&self, x: f64) -> f64;
}

/// Errors returned by [`fit_smoothing_spline`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SplineError {
    #[error("smoothing spline needs at least 4 points (got {points})")]
    TooFewPoints { points: usize },
    #[error("abscissae must be finite and strictly increasing (index {index})")]
    NotIncreasing { index: usize },
    #[error("ordinate at index {index} is not finite")]
    NonFiniteValue { index: usize },
    #[error("smoothing parameter must be finite (got {spar})")]
    InvalidSpar { spar: f64 },
    #[error("penalized spline system is not positive definite")]
    NotPositiveDefinite,
}

/// Fitted natural cubic smoothing spline.
///
/// Queries outside the knot span extrapolate the boundary cubic piece;
/// callers should stay inside the fitted range.
#[derive(Clone, Debug)]
pub struct SmoothingSpline {
    knots: Vec<f64>,
    origin: f64,
    scale: f64,
    /// Fitted values at the knots.
    values: Vec<f64>,
    /// Second derivatives at the knots in rescaled units; zero at both ends.
    second: Vec<f64>,
    lambda: f64,
}

impl SmoothingSpline {
    #[inline]
    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    /// Fitted values at the knots.
    #[inline]
    pub fn fitted_values(&self) -> &[f64] {
        &self.values
    }

    /// Penalty weight used for the fit (rescaled abscissae).
    #[inline]
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Evaluate the curve at every knot as `[x, f(x)]`.
    pub fn sample_at_knots(&self) -> Vec<[f64; 2]> {
        self.knots
            .iter()
            .zip(&self.values)
            .map(|(&x, &y)| [x, y])
            .collect()
    }

    /// Locate the cubic piece holding rescaled `t`.
    fn segment(&self, t: f64) -> (usize, f64, f64) {
        let n = self.knots.len();
        let tk = |i: usize| (self.knots[i] - self.origin) / self.scale;
        let upper = self
            .knots
            .partition_point(|&k| (k - self.origin) / self.scale <= t);
        let i = upper.saturating_sub(1).min(n - 2);
        let h = tk(i + 1) - tk(i);
        let a = (tk(i + 1) - t) / h;
        (i, a, h)
    }
}

impl FittedCurve for SmoothingSpline {
    fn value(&self, x: f64) -> f64 {
        let t = (x - self.origin) / self.scale;
        let (i, a, h) = self.segment(t);
        let b = 1.0 - a;
        a * self.values[i]
            + b * self.values[i + 1]
            + ((a * a * a - a) * self.second[i] + (b * b * b - b) * self.second[i + 1]) * h * h
                / 6.0
    }

    fn derivative(&self, x: f64) -> f64 {
        let t = (x - self.origin) / self.scale;
        let (i, a, h) = self.segment(t);
        let b = 1.0 - a;
        let dt = (self.values[i + 1] - self.values[i]) / h
            - (3.0 * a * a - 1.0) / 6.0 * h * self.second[i]
            + (3.0 * b * b - 1.0) / 6.0 * h * self.second[i + 1];
        dt / self.scale
    }
}

/// Fit a smoothing spline through `(xs, ys)` with smoothness `spar`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(xs, ys), fields(n = xs.len()))
)]
pub fn fit_smoothing_spline(
    xs: &[f64],
    ys: &[f64],
    spar: f64,
) -> Result<SmoothingSpline, SplineError> {
    let n = xs.len().min(ys.len());
    if n < 4 {
        return Err(SplineError::TooFewPoints { points: n });
    }
    if !spar.is_finite() {
        return Err(SplineError::InvalidSpar { spar });
    }
    if let Some(index) = xs[..n].iter().position(|x| !x.is_finite()) {
        return Err(SplineError::NotIncreasing { index });
    }
    if let Some(index) = xs[..n].windows(2).position(|w| w[0] >= w[1]) {
        return Err(SplineError::NotIncreasing { index: index + 1 });
    }
    if let Some(index) = ys[..n].iter().position(|y| !y.is_finite()) {
        return Err(SplineError::NonFiniteValue { index });
    }

    let origin = xs[0];
    let scale = xs[n - 1] - xs[0];
    let t: Vec<f64> = xs[..n].iter().map(|&x| (x - origin) / scale).collect();
    let h: Vec<f64> = t.windows(2).map(|w| w[1] - w[0]).collect();
    let m = n - 2;

    // Row j of Q^T covers knots j, j + 1, j + 2.
    let qt_rows: Vec<[f64; 3]> = (0..m)
        .map(|j| {
            [
                1.0 / h[j],
                -1.0 / h[j] - 1.0 / h[j + 1],
                1.0 / h[j + 1],
            ]
        })
        .collect();

    // R is tridiagonal, Q^T Q pentadiagonal; both stored by diagonals.
    let r = SymmetricBands {
        diag: (0..m).map(|j| (h[j] + h[j + 1]) / 3.0).collect(),
        off1: (0..m.saturating_sub(1)).map(|j| h[j + 1] / 6.0).collect(),
        off2: vec![0.0; m.saturating_sub(2)],
    };
    let qtq = SymmetricBands {
        diag: (0..m).map(|j| band_dot(&qt_rows, j, 0)).collect(),
        off1: (0..m.saturating_sub(1)).map(|j| band_dot(&qt_rows, j, 1)).collect(),
        off2: (0..m.saturating_sub(2)).map(|j| band_dot(&qt_rows, j, 2)).collect(),
    };

    // tr(K) = tr(Q R^-1 Q^T) = tr(R^-1 Q^T Q)
    let trace_k = BandLdl::factor(&r)
        .ok_or(SplineError::NotPositiveDefinite)?
        .inverse_bands()
        .trace_product(&qtq);
    let ratio = if trace_k > 0.0 { n as f64 / trace_k } else { 0.0 };
    let lambda = ratio * 256f64.powf(3.0 * spar - 1.0);

    let qty: Vec<f64> = qt_rows
        .iter()
        .enumerate()
        .map(|(j, row)| row[0] * ys[j] + row[1] * ys[j + 1] + row[2] * ys[j + 2])
        .collect();

    let gamma = BandLdl::factor(&r.add_scaled(&qtq, lambda))
        .ok_or(SplineError::NotPositiveDefinite)?
        .solve(&qty);

    // f = y - lambda * Q * gamma
    let mut values = ys[..n].to_vec();
    for (j, row) in qt_rows.iter().enumerate() {
        for (o, &q) in row.iter().enumerate() {
            values[j + o] -= lambda * q * gamma[j];
        }
    }

    let mut second = vec![0.0f64; n];
    second[1..n - 1].copy_from_slice(&gamma);

    debug!("spline: n={n} spar={spar} lambda={lambda:.3e}");

    Ok(SmoothingSpline {
        knots: xs[..n].to_vec(),
        origin,
        scale,
        values,
        second,
        lambda,
    })
}

/// `(Q^T Q)[j][j + d]` from the three non-zero entries of each `Q^T` row.
fn band_dot(qt_rows: &[[f64; 3]], j: usize, d: usize) -> f64 {
    (d..3).map(|o| qt_rows[j][o] * qt_rows[j + d][o - d]).sum()
}

/// Symmetric matrix with bandwidth 2, stored by diagonals.
#[derive(Clone, Debug, PartialEq)]
struct SymmetricBands {
    diag: Vec<f64>,
    /// `A[i][i + 1]`
    off1: Vec<f64>,
    /// `A[i][i + 2]`
    off2: Vec<f64>,
}

impl SymmetricBands {
    fn len(&self) -> usize {
        self.diag.len()
    }

    fn off1(&self, i: usize) -> f64 {
        self.off1.get(i).copied().unwrap_or(0.0)
    }

    fn off2(&self, i: usize) -> f64 {
        self.off2.get(i).copied().unwrap_or(0.0)
    }

    /// `self + k * other`.
    fn add_scaled(&self, other: &SymmetricBands, k: f64) -> SymmetricBands {
        let axpy = |a: &[f64], b: &[f64]| a.iter().zip(b).map(|(x, y)| x + k * y).collect();
        SymmetricBands {
            diag: axpy(&self.diag, &other.diag),
            off1: axpy(&self.off1, &other.off1),
            off2: axpy(&self.off2, &other.off2),
        }
    }

    /// `tr(self * other)` for two symmetric band matrices of the same size.
    fn trace_product(&self, other: &SymmetricBands) -> f64 {
        let dot = |a: &[f64], b: &[f64]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>();
        dot(&self.diag, &other.diag)
            + 2.0 * dot(&self.off1, &other.off1)
            + 2.0 * dot(&self.off2, &other.off2)
    }
}

/// `A = L D L^T` of a positive definite [`SymmetricBands`], with `L` unit
/// lower triangular of bandwidth 2.
#[derive(Clone, Debug)]
struct BandLdl {
    d: Vec<f64>,
    /// `L[i + 1][i]`
    l1: Vec<f64>,
    /// `L[i + 2][i]`
    l2: Vec<f64>,
}

impl BandLdl {
    /// Returns `None` when a pivot is not positive.
    fn factor(a: &SymmetricBands) -> Option<Self> {
        let m = a.len();
        let mut d = vec![0.0f64; m];
        let mut l1 = vec![0.0f64; m];
        let mut l2 = vec![0.0f64; m];
        for i in 0..m {
            let mut di = a.diag[i];
            if i >= 1 {
                di -= l1[i - 1] * l1[i - 1] * d[i - 1];
            }
            if i >= 2 {
                di -= l2[i - 2] * l2[i - 2] * d[i - 2];
            }
            if !di.is_finite() || di <= 0.0 {
                return None;
            }
            d[i] = di;

            let mut a1 = a.off1(i);
            if i >= 1 {
                a1 -= l2[i - 1] * l1[i - 1] * d[i - 1];
            }
            l1[i] = a1 / di;
            l2[i] = a.off2(i) / di;
        }
        Some(Self { d, l1, l2 })
    }

    fn solve(&self, b: &[f64]) -> Vec<f64> {
        let m = self.d.len();
        let mut x = b.to_vec();
        for i in 0..m {
            if i >= 1 {
                x[i] -= self.l1[i - 1] * x[i - 1];
            }
            if i >= 2 {
                x[i] -= self.l2[i - 2] * x[i - 2];
            }
        }
        for i in 0..m {
            x[i] /= self.d[i];
        }
        for i in (0..m).rev() {
            if i + 1 < m {
                x[i] -= self.l1[i] * x[i + 1];
            }
            if i + 2 < m {
                x[i] -= self.l2[i] * x[i + 2];
            }
        }
        x
    }

    /// Entries of `A^-1` within two of the diagonal.
    ///
    /// Backward recurrence `S[i][j] = [i == j] / d[i] - l1[i] * S[i + 1][j]
    /// - l2[i] * S[i + 2][j]` for `j >= i`, using symmetry for `S[i + 2][i + 1]`.
    fn inverse_bands(&self) -> SymmetricBands {
        let m = self.d.len();
        let mut s0 = vec![0.0f64; m];
        let mut s1 = vec![0.0f64; m.saturating_sub(1)];
        let mut s2 = vec![0.0f64; m.saturating_sub(2)];
        for i in (0..m).rev() {
            if i + 2 < m {
                s2[i] = -self.l1[i] * s1[i + 1] - self.l2[i] * s0[i + 2];
            }
            if i + 1 < m {
                let s_i2_i1 = if i + 2 < m { s1[i + 1] } else { 0.0 };
                s1[i] = -self.l1[i] * s0[i + 1] - self.l2[i] * s_i2_i1;
            }
            let s_i1_i = s1.get(i).copied().unwrap_or(0.0);
            let s_i2_i = s2.get(i).copied().unwrap_or(0.0);
            s0[i] = 1.0 / self.d[i] - self.l1[i] * s_i1_i - self.l2[i] * s_i2_i;
        }
        SymmetricBands {
            diag: s0,
            off1: s1,
            off2: s2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{DMatrix, DVector};

    fn grid(from: f64, to: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| from + (to - from) * i as f64 / (n - 1) as f64)
            .collect()
    }

    #[test]
    fn straight_lines_are_reproduced() {
        let xs = grid(-1.0, 3.0, 40);
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x - 0.5).collect();
        let spline = fit_smoothing_spline(&xs, &ys, 1.2).unwrap();
        for &x in &[-0.8, 0.0, 1.37, 2.9] {
            assert_abs_diff_eq!(spline.value(x), 2.0 * x - 0.5, epsilon = 1e-8);
            assert_abs_diff_eq!(spline.derivative(x), 2.0, epsilon = 1e-7);
        }
    }

    #[test]
    fn light_smoothing_follows_the_data() {
        let xs = grid(0.0, 6.0, 200);
        let ys: Vec<f64> = xs.iter().map(|x| x.sin()).collect();
        let spline = fit_smoothing_spline(&xs, &ys, 0.2).unwrap();
        for &x in &[0.5, 1.5, 3.0, 4.7] {
            assert_abs_diff_eq!(spline.value(x), x.sin(), epsilon = 1e-3);
            assert_abs_diff_eq!(spline.derivative(x), x.cos(), epsilon = 1e-2);
        }
    }

    #[test]
    fn stiffer_spar_shrinks_curvature() {
        let xs = grid(0.0, 1.0, 100);
        let ys: Vec<f64> = xs
            .iter()
            .map(|&x| (-((x - 0.5) * (x - 0.5)) / 0.005).exp())
            .collect();
        let soft = fit_smoothing_spline(&xs, &ys, 0.5).unwrap();
        let stiff = fit_smoothing_spline(&xs, &ys, 1.4).unwrap();
        assert!(stiff.lambda() > soft.lambda());
        assert!(stiff.value(0.5) < soft.value(0.5));
    }

    #[test]
    fn fitted_values_match_pointwise_evaluation() {
        let xs = grid(2.0, 5.0, 30);
        let ys: Vec<f64> = xs.iter().map(|x| (x * 1.7).cos() + 0.1 * x).collect();
        let spline = fit_smoothing_spline(&xs, &ys, 0.8).unwrap();
        for [x, f] in spline.sample_at_knots() {
            assert_abs_diff_eq!(spline.value(x), f, epsilon = 1e-12);
        }
    }

    fn dense(a: &SymmetricBands) -> DMatrix<f64> {
        DMatrix::<f64>::from_fn(a.len(), a.len(), |i, j| match i.abs_diff(j) {
            0 => a.diag[i],
            1 => a.off1[i.min(j)],
            2 => a.off2[i.min(j)],
            _ => 0.0,
        })
    }

    fn pentadiagonal(m: usize) -> SymmetricBands {
        SymmetricBands {
            diag: (0..m).map(|i| 4.0 + 0.3 * (i % 3) as f64).collect(),
            off1: (0..m - 1).map(|i| -1.0 + 0.05 * i as f64).collect(),
            off2: (0..m - 2).map(|i| 0.4 - 0.02 * i as f64).collect(),
        }
    }

    #[test]
    fn band_solver_matches_dense_cholesky() {
        let a = pentadiagonal(9);
        let b: Vec<f64> = (0..9).map(|i| (i as f64 * 0.7).sin()).collect();
        let banded = BandLdl::factor(&a).unwrap().solve(&b);
        let expected = dense(&a)
            .cholesky()
            .unwrap()
            .solve(&DVector::from_column_slice(&b));
        for i in 0..9 {
            assert_abs_diff_eq!(banded[i], expected[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn inverse_bands_match_dense_inverse() {
        let a = pentadiagonal(7);
        let other = SymmetricBands {
            diag: (0..7).map(|i| 6.0 - i as f64).collect(),
            off1: (0..6).map(|i| -2.0 + 0.1 * i as f64).collect(),
            off2: vec![0.5; 5],
        };
        let inv = dense(&a).try_inverse().unwrap();
        let bands = BandLdl::factor(&a).unwrap().inverse_bands();
        for i in 0..7 {
            assert_abs_diff_eq!(bands.diag[i], inv[(i, i)], epsilon = 1e-12);
        }
        for i in 0..6 {
            assert_abs_diff_eq!(bands.off1[i], inv[(i, i + 1)], epsilon = 1e-12);
        }
        for i in 0..5 {
            assert_abs_diff_eq!(bands.off2[i], inv[(i, i + 2)], epsilon = 1e-12);
        }
        let trace = inv.component_mul(&dense(&other)).sum();
        assert_abs_diff_eq!(bands.trace_product(&other), trace, epsilon = 1e-10);
    }

    #[test]
    fn indefinite_band_matrix_is_rejected() {
        let mut a = pentadiagonal(5);
        a.diag[2] = -1.0;
        assert!(BandLdl::factor(&a).is_none());
    }

    #[test]
    fn fine_grids_fit_in_linear_time() {
        let xs = grid(0.0, 10.0, 8192);
        let ys: Vec<f64> = xs.iter().map(|x| (0.5 * x).sin() + 0.1 * x).collect();
        let spline = fit_smoothing_spline(&xs, &ys, 1.0).unwrap();
        assert_eq!(spline.knots().len(), 8192);
        for &x in &[1.0, 3.3, 5.0, 8.7] {
            assert_abs_diff_eq!(spline.value(x), (0.5 * x).sin() + 0.1 * x, epsilon = 1e-3);
            assert_abs_diff_eq!(spline.derivative(x), 0.5 * (0.5 * x).cos() + 0.1, epsilon = 1e-2);
        }
    }

    #[test]
    fn rejects_bad_designs() {
        assert_eq!(
            fit_smoothing_spline(&[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0], 1.0).unwrap_err(),
            SplineError::TooFewPoints { points: 3 }
        );
        assert_eq!(
            fit_smoothing_spline(&[0.0, 1.0, 1.0, 2.0], &[0.0; 4], 1.0).unwrap_err(),
            SplineError::NotIncreasing { index: 2 }
        );
        assert_eq!(
            fit_smoothing_spline(&[0.0, 1.0, 2.0, 3.0], &[0.0, f64::NAN, 0.0, 0.0], 1.0)
                .unwrap_err(),
            SplineError::NonFiniteValue { index: 1 }
        );
    }
}
