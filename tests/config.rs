use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use facebox::config::AppConfig;
use facebox::{Error, InputCrop, SuppressionMode};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| vars.get(key).cloned()
}

fn temp_file(contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("facebox-config-{}.json", uuid::Uuid::new_v4()));
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn defaults_match_the_mobile_detector() {
    let config = AppConfig::from_sources(None, lookup(&[])).unwrap();
    let s = config.pipeline.suppression;
    assert_eq!(s.anchor_count, 896);
    assert_eq!(s.confidence_threshold, 0.75);
    assert_eq!(s.iou_threshold, 0.3);
    assert_eq!(s.mode, SuppressionMode::TopBox);
    assert_eq!(config.pipeline.input_crop, InputCrop::Full);
    assert!(config.pipeline.clip_to_display);
    assert_eq!(config.server.addr, "0.0.0.0:8080");
    assert_eq!(config.server.max_fps, 15);
}

#[test]
fn environment_overrides_defaults() {
    let env = lookup(&[
        ("FACEBOX_ADDR", "127.0.0.1:9000"),
        ("FACEBOX_MODELS_DIR", "/opt/models"),
        ("FACEBOX_MAX_FPS", "30"),
        ("FACEBOX_CONFIDENCE", "0.6"),
        ("FACEBOX_IOU", " 0.45 "),
        ("FACEBOX_MODE", "weighted-average"),
    ]);
    let config = AppConfig::from_sources(None, env).unwrap();
    assert_eq!(config.server.addr, "127.0.0.1:9000");
    assert_eq!(config.server.models_dir, PathBuf::from("/opt/models"));
    assert_eq!(config.server.max_fps, 30);
    assert_eq!(config.pipeline.suppression.confidence_threshold, 0.6);
    assert_eq!(config.pipeline.suppression.iou_threshold, 0.45);
    assert_eq!(config.pipeline.suppression.mode, SuppressionMode::WeightedAverage);
}

#[test]
fn file_values_apply_and_environment_wins() {
    let path = temp_file(
        r#"{
            "server": { "maxFps": 24 },
            "pipeline": {
                "suppression": { "iouThreshold": 0.5, "mode": "weighted-average" },
                "inputCrop": "center-square",
                "clipToDisplay": false
            }
        }"#,
    );
    let config = AppConfig::from_sources(Some(&path), lookup(&[("FACEBOX_IOU", "0.2")])).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(config.server.max_fps, 24);
    assert_eq!(config.server.addr, "0.0.0.0:8080");
    assert_eq!(config.pipeline.suppression.anchor_count, 896);
    assert_eq!(config.pipeline.suppression.iou_threshold, 0.2);
    assert_eq!(config.pipeline.suppression.mode, SuppressionMode::WeightedAverage);
    assert_eq!(config.pipeline.input_crop, InputCrop::CenterSquare);
    assert!(!config.pipeline.clip_to_display);
}

#[test]
fn out_of_range_thresholds_are_rejected() {
    for (key, value) in [
        ("FACEBOX_IOU", "0"),
        ("FACEBOX_IOU", "1.5"),
        ("FACEBOX_CONFIDENCE", "1.0"),
        ("FACEBOX_CONFIDENCE", "-0.1"),
        ("FACEBOX_MAX_FPS", "0"),
    ] {
        let err = AppConfig::from_sources(None, lookup(&[(key, value)])).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{key}={value} gave {err:?}");
    }
}

#[test]
fn unparsable_values_are_rejected() {
    for (key, value) in [("FACEBOX_IOU", "half"), ("FACEBOX_MAX_FPS", "-3"), ("FACEBOX_MODE", "soft")] {
        let err = AppConfig::from_sources(None, lookup(&[(key, value)])).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{key}={value} gave {err:?}");
    }
}

#[test]
fn zero_anchor_count_in_file_is_rejected() {
    let path = temp_file(r#"{ "pipeline": { "suppression": { "anchorCount": 0 } } }"#);
    let err = AppConfig::from_sources(Some(&path), lookup(&[])).unwrap_err();
    fs::remove_file(&path).unwrap();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn missing_and_malformed_files_report_their_path() {
    let missing = std::env::temp_dir().join("facebox-config-missing.json");
    let err = AppConfig::from_sources(Some(&missing), lookup(&[])).unwrap_err();
    assert!(matches!(err, Error::Io { ref path, .. } if *path == missing));

    let path = temp_file("{ not json");
    let err = AppConfig::from_sources(Some(&path), lookup(&[])).unwrap_err();
    fs::remove_file(&path).unwrap();
    assert!(matches!(err, Error::Parse { path: ref p, .. } if *p == path));
}
