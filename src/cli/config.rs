//! Configuration file
//!
//! JSON document, validated before anything else starts:
//!
//! ```json
//! {
//!   "state_file_path": "/var/lib/containerd-quota/state.json",
//!   "project_id_min": 1000,
//!   "project_id_max": 60000,
//!   "containerd_sock": "/run/containerd/containerd.sock",
//!   "namespace": "k8s.io",
//!   "default_quota_soft": "8g",
//!   "default_quota_hard": "10g",
//!   "metrics_port": ":9100"
//! }
//! ```

use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};
use crate::engine::{EngineConfig, ReconnectPolicy};
use crate::enforcer::{QuotaLimits, QuotaSize, XfsToolPaths};
use crate::pool::ProjectIdRange;
use crate::runtime::CtrOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// State document location (required)
    pub state_file_path: PathBuf,

    /// Inclusive project ID range (required, `0 < min < max`)
    pub project_id_min: u32,
    pub project_id_max: u32,

    /// containerd socket address (required)
    pub containerd_sock: String,

    /// containerd namespace (default "default")
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Limits for every container, size with unit such as "10g" (required)
    pub default_quota_soft: String,
    pub default_quota_hard: String,

    /// Metrics endpoint: "9100", ":9100" or "host:port". Absent or empty
    /// disables it.
    #[serde(default)]
    pub metrics_port: Option<String>,

    #[serde(default = "default_ctr_path")]
    pub ctr_path: PathBuf,

    #[serde(default = "default_xfs_quota_path")]
    pub xfs_quota_path: PathBuf,

    #[serde(default = "default_xfs_io_path")]
    pub xfs_io_path: PathBuf,

    /// Filesystem argument passed to `xfs_quota`
    #[serde(default)]
    pub quota_mount_point: Option<PathBuf>,

    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Backoff cap; defaults to `reconnect_delay_secs` (fixed delay)
    #[serde(default)]
    pub reconnect_max_delay_secs: Option<u64>,

    /// Remove entries whose container is gone during reconciliation
    #[serde(default)]
    pub orphan_sweep: bool,
}

fn default_namespace() -> String {
    "default".to_string()
}
fn default_ctr_path() -> PathBuf {
    PathBuf::from("ctr")
}
fn default_xfs_quota_path() -> PathBuf {
    PathBuf::from("xfs_quota")
}
fn default_xfs_io_path() -> PathBuf {
    PathBuf::from("xfs_io")
}
fn default_reconnect_delay_secs() -> u64 {
    5
}

impl Config {
    /// Load and validate the configuration file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::config_error(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> CliResult<Self> {
        let mut config: Config = serde_json::from_str(content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        if config.namespace.trim().is_empty() {
            config.namespace = default_namespace();
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.state_file_path.as_os_str().is_empty() {
            return Err(CliError::config_error("state_file_path is required"));
        }
        self.project_id_range()?;
        if self.containerd_sock.trim().is_empty() {
            return Err(CliError::config_error("containerd_sock is required"));
        }
        self.quota_limits()?;
        self.metrics_addr()?;
        if self.reconnect_delay_secs == 0 {
            return Err(CliError::config_error("reconnect_delay_secs must be > 0"));
        }
        if let Some(max) = self.reconnect_max_delay_secs {
            if max < self.reconnect_delay_secs {
                return Err(CliError::config_error(format!(
                    "reconnect_max_delay_secs ({}) must be >= reconnect_delay_secs ({})",
                    max, self.reconnect_delay_secs
                )));
            }
        }
        Ok(())
    }

    pub fn project_id_range(&self) -> CliResult<ProjectIdRange> {
        ProjectIdRange::new(self.project_id_min, self.project_id_max)
            .map_err(|e| CliError::config_error(e.to_string()))
    }

    pub fn quota_limits(&self) -> CliResult<QuotaLimits> {
        let parse = |field: &str, value: &str| {
            QuotaSize::parse(value).map_err(|e| CliError::config_error(format!("{}: {}", field, e)))
        };
        let soft = parse("default_quota_soft", &self.default_quota_soft)?;
        let hard = parse("default_quota_hard", &self.default_quota_hard)?;
        QuotaLimits::new(soft, hard).map_err(|e| CliError::config_error(e.to_string()))
    }

    /// Listen address of the metrics endpoint, if enabled
    pub fn metrics_addr(&self) -> CliResult<Option<SocketAddr>> {
        let Some(raw) = self.metrics_port.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }

        let port_only = raw.strip_prefix(':').unwrap_or(raw);
        if let Ok(port) = port_only.parse::<u16>() {
            return Ok(Some(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))));
        }
        raw.parse::<SocketAddr>()
            .map(Some)
            .map_err(|_| CliError::config_error(format!("Invalid metrics_port: '{}'", raw)))
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let initial = Duration::from_secs(self.reconnect_delay_secs);
        let max = self
            .reconnect_max_delay_secs
            .map_or(initial, Duration::from_secs);
        ReconnectPolicy::exponential(initial, max)
    }

    pub fn engine_config(&self) -> CliResult<EngineConfig> {
        Ok(EngineConfig {
            limits: self.quota_limits()?,
            reconnect: self.reconnect_policy(),
            orphan_sweep: self.orphan_sweep,
        })
    }

    pub fn xfs_tools(&self) -> XfsToolPaths {
        XfsToolPaths {
            xfs_quota: self.xfs_quota_path.clone(),
            xfs_io: self.xfs_io_path.clone(),
            mount_point: self.quota_mount_point.clone(),
        }
    }

    pub fn ctr_options(&self) -> CtrOptions {
        CtrOptions {
            ctr_path: self.ctr_path.clone(),
            ..CtrOptions::new(self.containerd_sock.clone(), self.namespace.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "state_file_path": "/var/lib/containerd-quota/state.json",
        "project_id_min": 1000,
        "project_id_max": 2000,
        "containerd_sock": "/run/containerd/containerd.sock",
        "default_quota_soft": "8g",
        "default_quota_hard": "10g"
    }"#;

    fn with(field: &str, value: serde_json::Value) -> String {
        let mut doc: serde_json::Value = serde_json::from_str(MINIMAL).unwrap();
        doc[field] = value;
        doc.to_string()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_json(MINIMAL).unwrap();
        assert_eq!(config.namespace, "default");
        assert_eq!(config.metrics_addr().unwrap(), None);
        assert_eq!(config.ctr_path, PathBuf::from("ctr"));
        assert!(!config.orphan_sweep);
        assert_eq!(config.reconnect_policy(), ReconnectPolicy::default());
    }

    #[test]
    fn test_empty_namespace_defaults() {
        let config = Config::from_json(&with("namespace", "".into())).unwrap();
        assert_eq!(config.namespace, "default");
    }

    #[test]
    fn test_metrics_port_forms() {
        for (raw, expected) in [
            ("9100", "0.0.0.0:9100"),
            (":9100", "0.0.0.0:9100"),
            ("127.0.0.1:9200", "127.0.0.1:9200"),
        ] {
            let config = Config::from_json(&with("metrics_port", raw.into())).unwrap();
            assert_eq!(
                config.metrics_addr().unwrap(),
                Some(expected.parse().unwrap())
            );
        }
        assert!(Config::from_json(&with("metrics_port", "nope".into())).is_err());
    }

    #[test]
    fn test_soft_above_hard_rejected() {
        let err = Config::from_json(&with("default_quota_soft", "20g".into())).unwrap_err();
        assert_eq!(err.code_str(), "RFSQ_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_reconnect_cap_below_delay_rejected() {
        let doc = with("reconnect_max_delay_secs", 1.into());
        assert!(Config::from_json(&doc).is_err());
    }
}
