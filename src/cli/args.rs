//! CLI argument definitions using clap
//!
//! - rootfs-quota [--config <path>]

use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/containerd-quota/config.json";

/// Keeps per-container XFS project quotas in sync with containerd
#[derive(Parser, Debug)]
#[command(name = "rootfs-quota")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        let cli = Cli::try_parse_from(["rootfs-quota"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_config_flag() {
        let cli = Cli::try_parse_from(["rootfs-quota", "--config", "/tmp/q.json"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/tmp/q.json"));
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Cli::try_parse_from(["rootfs-quota", "--data-dir", "/x"]).is_err());
    }
}
