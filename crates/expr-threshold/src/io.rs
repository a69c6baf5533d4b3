//! JSON configuration and report helpers.

use crate::{compute_threshold_with_sink, ThresholdParams, ThresholdProfile, ThresholdReport};
use expr_threshold_core::DensityRange;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum ThresholdIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T, ThresholdIoError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_pretty<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), ThresholdIoError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Profile plus optional per-field overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default)]
    pub profile: ThresholdProfile,
    #[serde(default)]
    pub bandwidth: Option<f64>,
    #[serde(default)]
    pub smoothing: Option<f64>,
    #[serde(default)]
    pub chosen_min: Option<f64>,
    #[serde(default)]
    pub abs_min: Option<f64>,
    #[serde(default)]
    pub rough_max: Option<f64>,
    #[serde(default)]
    pub grid_size: Option<usize>,
    #[serde(default)]
    pub range: Option<DensityRange>,
    #[serde(default)]
    pub fallback_threshold: Option<f64>,
    #[serde(default)]
    pub report_path: Option<String>,
}

impl ThresholdConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ThresholdIoError> {
        read_json(path)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ThresholdIoError> {
        write_pretty(self, path)
    }

    /// Resolve the output report path used by [`compute_threshold_with_config`].
    pub fn report_path(&self) -> PathBuf {
        self.report_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("threshold_report.json"))
    }

    /// Profile defaults with the configured overrides applied.
    pub fn build_params(&self) -> ThresholdParams {
        let mut params = self.profile.params();
        if let Some(v) = self.bandwidth {
            params.bandwidth = v;
        }
        if let Some(v) = self.smoothing {
            params.smoothing = v;
        }
        if let Some(v) = self.chosen_min {
            params.chosen_min = v;
        }
        if let Some(v) = self.abs_min {
            params.abs_min = v;
        }
        if let Some(v) = self.rough_max {
            params.rough_max = v;
        }
        if let Some(v) = self.grid_size {
            params.grid_size = v;
        }
        if let Some(v) = self.range {
            params.range = v;
        }
        if let Some(v) = self.fallback_threshold {
            params.fallback_threshold = v;
        }
        params
    }
}

/// Lenient threshold for `sample` under `config`, with the run's
/// [`ThresholdReport`] written to [`ThresholdConfig::report_path`].
///
/// Only writing the report can fail; pipeline failures end up in the report
/// and the fallback threshold is returned.
pub fn compute_threshold_with_config(
    sample: &[f64],
    config: &ThresholdConfig,
) -> Result<(f64, ThresholdReport), ThresholdIoError> {
    let params = config.build_params();
    let mut report = ThresholdReport::new(&params);
    let threshold = compute_threshold_with_sink(sample, &params, &mut report);
    report.write_json(config.report_path())?;
    Ok((threshold, report))
}

impl ThresholdParams {
    /// Load parameters from JSON. Missing fields take robust defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ThresholdIoError> {
        read_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ThresholdIoError> {
        write_pretty(self, path)
    }
}

impl ThresholdReport {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ThresholdIoError> {
        read_json(path)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ThresholdIoError> {
        write_pretty(self, path)
    }
}
