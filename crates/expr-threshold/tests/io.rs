mod common;

use approx::assert_relative_eq;
use common::qc_bimodal;
use expr_threshold::{
    compute_threshold, compute_threshold_with_config, compute_threshold_with_sink, DensityRange,
    ThresholdConfig, ThresholdErrorKind, ThresholdIoError, ThresholdParams, ThresholdProfile,
    ThresholdReport,
};
use tempfile::tempdir;

#[test]
fn params_round_trip_through_json_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("params.json");

    let params = ThresholdParams {
        bandwidth: 0.2,
        range: DensityRange::Explicit { from: -1.0, to: 6.0 },
        ..ThresholdParams::legacy_defaults()
    };
    params.write_json(&path).expect("write params");
    let loaded = ThresholdParams::load_json(&path).expect("load params");
    assert_eq!(loaded, params);
}

#[test]
fn config_file_builds_params_from_profile() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{ "profile": "legacy", "abs_min": 0.5, "report_path": "out.json" }"#,
    )
    .expect("write config");

    let cfg = ThresholdConfig::load_json(&path).expect("load config");
    assert_eq!(cfg.profile, ThresholdProfile::Legacy);
    assert_eq!(cfg.report_path(), std::path::PathBuf::from("out.json"));
    let params = cfg.build_params();
    assert_eq!(params.abs_min, 0.5);
    assert_eq!(params.chosen_min, 2.0);
    assert!(params.validate().is_ok());
}

#[test]
fn report_survives_a_write_and_reload() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("report.json");

    let params = ThresholdParams::default();
    let mut report = ThresholdReport::new(&params);
    let t = compute_threshold_with_sink(&qc_bimodal(), &params, &mut report);
    report.write_json(&path).expect("write report");

    let loaded = ThresholdReport::load_json(&path).expect("load report");
    assert_relative_eq!(loaded.threshold.expect("threshold"), t, max_relative = 1e-12);
    assert_eq!(loaded.params, Some(params));
    assert_eq!(loaded.density.len(), report.density.len());
    let (before, after) = (
        report.selection.expect("selection"),
        loaded.selection.expect("selection"),
    );
    assert_relative_eq!(after.peak.x, before.peak.x, max_relative = 1e-12);
    assert_relative_eq!(after.trough_x, before.trough_x, max_relative = 1e-12);
    assert!(loaded.succeeded());
}

#[test]
fn failed_run_report_records_the_error_kind() {
    let params = ThresholdParams::default();
    let mut report = ThresholdReport::new(&params);
    compute_threshold_with_sink(&[1.0; 5], &params, &mut report);

    let json = serde_json::to_string(&report).expect("serialize");
    assert!(json.contains(r#""error_kind":"invalid_input""#));
    let back: ThresholdReport = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.error_kind, Some(ThresholdErrorKind::InvalidInput));
}

#[test]
fn missing_and_malformed_files_are_reported() {
    let dir = tempdir().expect("tempdir");
    let missing = ThresholdParams::load_json(dir.path().join("nope.json"));
    assert!(matches!(missing, Err(ThresholdIoError::Io(_))));

    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{ not json").expect("write");
    let bad = ThresholdParams::load_json(&path);
    assert!(matches!(bad, Err(ThresholdIoError::Json(_))));
}

#[test]
fn config_run_writes_its_report_to_the_configured_path() {
    let dir = tempdir().expect("tempdir");
    let report_path = dir.path().join("nested-report.json");
    let cfg = ThresholdConfig {
        profile: ThresholdProfile::Legacy,
        report_path: Some(report_path.to_string_lossy().into_owned()),
        ..ThresholdConfig::default()
    };

    let sample = qc_bimodal();
    let (t, report) = compute_threshold_with_config(&sample, &cfg).expect("config run");
    assert_eq!(t, compute_threshold(&sample, &cfg.build_params()));

    assert_eq!(report.threshold, Some(t));
    let written = ThresholdReport::load_json(&report_path).expect("report on disk");
    assert_relative_eq!(written.threshold.expect("threshold"), t, max_relative = 1e-12);
    assert_eq!(written.density.len(), report.density.len());
    assert_eq!(written.params, Some(ThresholdParams::legacy_defaults()));
}

#[test]
fn config_run_reports_io_failures() {
    let dir = tempdir().expect("tempdir");
    let cfg = ThresholdConfig {
        report_path: Some(
            dir.path()
                .join("missing-dir")
                .join("report.json")
                .to_string_lossy()
                .into_owned(),
        ),
        ..ThresholdConfig::default()
    };
    let result = compute_threshold_with_config(&qc_bimodal(), &cfg);
    assert!(matches!(result, Err(ThresholdIoError::Io(_))));
}
