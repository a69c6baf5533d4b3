//! Selection of the high-population peak and its lower trough.

use crate::extrema::{Extrema, Extremum};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PeakError {
    #[error("no density maximum above chosen_min={chosen_min} ({maxima} maxima located)")]
    NoPeakFound { chosen_min: f64, maxima: usize },
}

/// Chosen peak and the boundary to its left.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakSelection {
    pub peak: Extremum,
    pub trough_x: f64,
    /// No minimum lay below the peak and `abs_min` was used instead.
    pub trough_substituted: bool,
}

impl PeakSelection {
    /// Peak-to-trough distance.
    #[inline]
    pub fn delta(&self) -> f64 {
        (self.peak.x - self.trough_x).abs()
    }
}

/// Pick the densest maximum strictly above `chosen_min` and the nearest
/// minimum strictly below it.
///
/// On exactly equal densities the lowest-x maximum wins. When no minimum lies
/// below the peak, `abs_min` is used as the trough.
pub fn select_peak(
    extrema: &Extrema,
    chosen_min: f64,
    abs_min: f64,
) -> Result<PeakSelection, PeakError> {
    let peak = extrema
        .maxima
        .iter()
        .filter(|m| m.x > chosen_min)
        .fold(None::<&Extremum>, |best, m| match best {
            Some(b) if b.density >= m.density => Some(b),
            _ => Some(m),
        })
        .copied()
        .ok_or(PeakError::NoPeakFound {
            chosen_min,
            maxima: extrema.maxima.len(),
        })?;

    let nearest = extrema
        .minima
        .iter()
        .map(|m| m.x)
        .filter(|&x| x < peak.x)
        .fold(None::<f64>, |best, x| Some(best.map_or(x, |b| b.max(x))));

    let (trough_x, trough_substituted) = match nearest {
        Some(x) => (x, false),
        None => (abs_min, true),
    };

    debug!(
        "peak: x={:.4} density={:.4} trough={trough_x:.4}{}",
        peak.x,
        peak.density,
        if trough_substituted { " (abs_min)" } else { "" }
    );

    Ok(PeakSelection {
        peak,
        trough_x,
        trough_substituted,
    })
}
