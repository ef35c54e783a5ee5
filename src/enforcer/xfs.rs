//! `xfs_quota` / `xfs_io` backed enforcer

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tokio::process::Command;

use super::errors::{EnforcerError, EnforcerResult};
use super::size::QuotaLimits;
use super::QuotaEnforcer;

/// Locations of the XFS tools and the filesystem they operate on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XfsToolPaths {
    pub xfs_quota: PathBuf,
    pub xfs_io: PathBuf,
    /// Appended as the filesystem argument to `xfs_quota` when set
    pub mount_point: Option<PathBuf>,
}

impl Default for XfsToolPaths {
    fn default() -> Self {
        Self {
            xfs_quota: PathBuf::from("xfs_quota"),
            xfs_io: PathBuf::from("xfs_io"),
            mount_point: None,
        }
    }
}

/// Enforcer that shells out to the XFS userspace tools.
#[derive(Debug, Clone, Default)]
pub struct XfsQuotaEnforcer {
    tools: XfsToolPaths,
}

impl XfsQuotaEnforcer {
    pub fn new(tools: XfsToolPaths) -> Self {
        Self { tools }
    }

    fn xfs_quota_args(&self, command: String) -> Vec<String> {
        let mut args = vec!["-x".to_string(), "-c".to_string(), command];
        if let Some(ref mount) = self.tools.mount_point {
            args.push(mount.display().to_string());
        }
        args
    }

    async fn run(&self, program: &Path, args: &[String]) -> EnforcerResult<String> {
        let command_line = format!("{} {}", program.display(), args.join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|source| EnforcerError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(EnforcerError::CommandFailed {
                command: command_line,
                status: output.status.to_string(),
                output: combined.trim().to_string(),
            });
        }
        Ok(combined)
    }
}

impl QuotaEnforcer for XfsQuotaEnforcer {
    async fn tag(&self, path: &Path, project_id: u32) -> EnforcerResult<()> {
        let args = self.xfs_quota_args(format!("project -s -p {} {}", path.display(), project_id));
        self.run(&self.tools.xfs_quota, &args).await.map(|_| ())
    }

    async fn set_limit(&self, project_id: u32, limits: &QuotaLimits) -> EnforcerResult<()> {
        let args = self.xfs_quota_args(format!(
            "limit -p bsoft={} bhard={} {}",
            limits.soft, limits.hard, project_id
        ));
        self.run(&self.tools.xfs_quota, &args).await.map(|_| ())
    }

    async fn read_tag(&self, path: &Path) -> EnforcerResult<u32> {
        let args = vec![
            "-r".to_string(),
            "-c".to_string(),
            "stat".to_string(),
            path.display().to_string(),
        ];
        let output = self.run(&self.tools.xfs_io, &args).await?;
        parse_projid(&output)?.ok_or_else(|| EnforcerError::ProjectIdNotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Extract `fsxattr.projid` from `xfs_io -c stat` output.
///
/// Returns `Ok(None)` when the output carries no projid line.
pub fn parse_projid(output: &str) -> EnforcerResult<Option<u32>> {
    static PROJID: OnceLock<Regex> = OnceLock::new();
    let re = PROJID.get_or_init(|| Regex::new(r"projid\s*=\s*(\S+)").expect("static pattern"));

    match re.captures(output) {
        Some(caps) => {
            let raw = &caps[1];
            raw.parse::<u32>()
                .map(Some)
                .map_err(|_| EnforcerError::ParseProjectId(raw.to_string()))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XFS_IO_STAT: &str = "fd.path = \"/var/lib/containerd/snapshots/42/fs\"
fd.flags = non-sync,non-direct,read-only
stat.ino = 134
stat.type = directory
stat.size = 6
stat.blocks = 0
fsxattr.xflags = 0x200 [--------P--------]
fsxattr.projid = 1007
fsxattr.extsize = 0
fsxattr.cowextsize = 0
fsxattr.nextents = 0
fsxattr.naextents = 0
dioattr.mem = 0x200
";

    #[test]
    fn test_parse_projid_from_stat_output() {
        assert_eq!(parse_projid(XFS_IO_STAT).unwrap(), Some(1007));
    }

    #[test]
    fn test_parse_projid_missing() {
        assert_eq!(parse_projid("stat.ino = 134\n").unwrap(), None);
    }

    #[test]
    fn test_parse_projid_out_of_range() {
        assert!(matches!(
            parse_projid("fsxattr.projid = 99999999999"),
            Err(EnforcerError::ParseProjectId(_))
        ));
    }

    #[test]
    fn test_xfs_quota_args_with_mount_point() {
        let enforcer = XfsQuotaEnforcer::new(XfsToolPaths {
            mount_point: Some(PathBuf::from("/var/lib/containerd")),
            ..Default::default()
        });
        let args = enforcer.xfs_quota_args("limit -p bsoft=0 bhard=0 7".to_string());
        assert_eq!(
            args,
            vec!["-x", "-c", "limit -p bsoft=0 bhard=0 7", "/var/lib/containerd"]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let enforcer = XfsQuotaEnforcer::new(XfsToolPaths {
            xfs_quota: PathBuf::from("/nonexistent/xfs_quota"),
            ..Default::default()
        });
        let err = enforcer
            .set_limit(7, &QuotaLimits::cleared())
            .await
            .unwrap_err();
        assert!(matches!(err, EnforcerError::Spawn { .. }));
    }
}
