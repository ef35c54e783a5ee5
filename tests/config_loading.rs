//! Configuration file loading

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use rootfs_quota::cli::{Config, CliErrorCode};
use rootfs_quota::engine::ReconnectPolicy;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("config.json");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_full_config_loads() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "state_file_path": "/var/lib/containerd-quota/state.json",
            "project_id_min": 1000,
            "project_id_max": 60000,
            "containerd_sock": "/run/containerd/containerd.sock",
            "namespace": "k8s.io",
            "default_quota_soft": "8g",
            "default_quota_hard": "10g",
            "metrics_port": ":9100",
            "reconnect_delay_secs": 2,
            "reconnect_max_delay_secs": 30,
            "orphan_sweep": true
        }"#,
    );

    let config = Config::load(&path).unwrap();

    assert_eq!(config.namespace, "k8s.io");
    let range = config.project_id_range().unwrap();
    assert!(range.contains(1000));
    assert!(range.contains(60000));
    assert!(!range.contains(60001));
    assert_eq!(
        config.metrics_addr().unwrap(),
        Some("0.0.0.0:9100".parse().unwrap())
    );
    assert_eq!(
        config.reconnect_policy(),
        ReconnectPolicy::exponential(Duration::from_secs(2), Duration::from_secs(30))
    );

    let engine = config.engine_config().unwrap();
    assert!(engine.orphan_sweep);
    assert_eq!(engine.limits.soft.as_str(), "8g");
    assert_eq!(engine.limits.hard.as_str(), "10g");

    let ctr = config.ctr_options();
    assert_eq!(ctr.address, "/run/containerd/containerd.sock");
    assert_eq!(ctr.namespace, "k8s.io");
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = Config::load(&dir.path().join("absent.json")).unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::ConfigError);
}

#[test]
fn test_malformed_json_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "{ not json");
    assert_eq!(
        Config::load(&path).unwrap_err().code(),
        &CliErrorCode::ConfigError
    );
}

#[test]
fn test_required_fields() {
    let dir = TempDir::new().unwrap();
    let full = serde_json::json!({
        "state_file_path": "/s.json",
        "project_id_min": 10,
        "project_id_max": 20,
        "containerd_sock": "/c.sock",
        "default_quota_soft": "1g",
        "default_quota_hard": "2g"
    });

    for field in [
        "state_file_path",
        "project_id_min",
        "project_id_max",
        "containerd_sock",
        "default_quota_soft",
        "default_quota_hard",
    ] {
        let mut doc = full.clone();
        doc.as_object_mut().unwrap().remove(field);
        let path = write_config(&dir, &doc.to_string());
        assert!(Config::load(&path).is_err(), "{} should be required", field);
    }

    let path = write_config(&dir, &full.to_string());
    assert!(Config::load(&path).is_ok());
}

#[test]
fn test_invalid_ranges_rejected() {
    let dir = TempDir::new().unwrap();
    for (min, max) in [(0, 10), (20, 10), (10, 10)] {
        let body = format!(
            r#"{{"state_file_path": "/s.json", "project_id_min": {}, "project_id_max": {},
                "containerd_sock": "/c.sock", "default_quota_soft": "1g",
                "default_quota_hard": "2g"}}"#,
            min, max
        );
        let path = write_config(&dir, &body);
        assert!(Config::load(&path).is_err(), "range {}..={} accepted", min, max);
    }
}

#[test]
fn test_invalid_sizes_rejected() {
    let dir = TempDir::new().unwrap();
    for (soft, hard) in [("lots", "2g"), ("1g", "2x"), ("", "2g"), ("3g", "2g")] {
        let body = format!(
            r#"{{"state_file_path": "/s.json", "project_id_min": 10, "project_id_max": 20,
                "containerd_sock": "/c.sock", "default_quota_soft": "{}",
                "default_quota_hard": "{}"}}"#,
            soft, hard
        );
        let path = write_config(&dir, &body);
        assert!(Config::load(&path).is_err(), "{} / {} accepted", soft, hard);
    }
}
