//! containerd gateway backed by the `ctr` CLI
//!
//! - `ctr version` probes the daemon on connect
//! - `ctr events` is the subscription; one event per stdout line, formatted
//!   as `<timestamp> <namespace> <topic> <json>`
//! - `ctr containers info` + `ctr snapshots mounts` resolve the writable layer

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use super::errors::{GatewayError, GatewayResult};
use super::event::{extract_upperdir, Mount, RuntimeEvent};
use super::{EventStream, RuntimeGateway};
use crate::observability::{log_event_with_fields, Event};

/// How to reach containerd through `ctr`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtrOptions {
    pub ctr_path: PathBuf,
    /// containerd socket address
    pub address: String,
    pub namespace: String,
    /// Target printed by `ctr snapshots mounts`; nothing is mounted there
    pub mount_target: PathBuf,
}

impl CtrOptions {
    pub fn new(address: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            ctr_path: PathBuf::from("ctr"),
            address: address.into(),
            namespace: namespace.into(),
            mount_target: PathBuf::from("/rootfs-quota"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CtrGateway {
    options: CtrOptions,
}

impl CtrGateway {
    pub fn new(options: CtrOptions) -> Self {
        Self { options }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.options.ctr_path);
        cmd.arg("--address")
            .arg(&self.options.address)
            .arg("--namespace")
            .arg(&self.options.namespace);
        cmd
    }

    async fn run(&self, args: &[&str]) -> GatewayResult<String> {
        let command_line = format!("{} {}", self.options.ctr_path.display(), args.join(" "));
        let output = self
            .command()
            .args(args)
            .output()
            .await
            .map_err(|source| GatewayError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(GatewayError::CommandFailed {
                command: command_line,
                status: output.status.to_string(),
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Subset of `ctr containers info` output
#[derive(Debug, Deserialize)]
struct ContainerInfo {
    #[serde(rename = "Snapshotter", default)]
    snapshotter: String,
    #[serde(rename = "SnapshotKey", default)]
    snapshot_key: String,
}

impl RuntimeGateway for CtrGateway {
    type Events = CtrEventStream;

    async fn connect(&mut self) -> GatewayResult<CtrEventStream> {
        self.run(&["version"])
            .await
            .map_err(|e| GatewayError::Connect(e.to_string()))?;

        let mut child = self
            .command()
            .arg("events")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GatewayError::Spawn {
                command: format!("{} events", self.options.ctr_path.display()),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GatewayError::Connect("ctr events stdout not captured".to_string()))?;

        Ok(CtrEventStream {
            namespace: self.options.namespace.clone(),
            lines: BufReader::new(stdout).lines(),
            _child: child,
        })
    }

    async fn list_containers(&self) -> GatewayResult<Vec<String>> {
        let output = self.run(&["containers", "list", "--quiet"]).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn resolve_upperdir(&self, container_id: &str) -> GatewayResult<PathBuf> {
        let info = match self.run(&["containers", "info", container_id]).await {
            Ok(out) => out,
            Err(GatewayError::CommandFailed { output, .. }) if output.contains("not found") => {
                return Err(GatewayError::ContainerNotFound(container_id.to_string()))
            }
            Err(e) => return Err(e),
        };
        let info: ContainerInfo = serde_json::from_str(&info)
            .map_err(|e| GatewayError::Parse(format!("containers info {}: {}", container_id, e)))?;

        if info.snapshotter.is_empty() || info.snapshot_key.is_empty() {
            return Err(GatewayError::UpperdirNotFound(container_id.to_string()));
        }

        let target = self.options.mount_target.display().to_string();
        let mounts = self
            .run(&[
                "snapshots",
                "--snapshotter",
                &info.snapshotter,
                "mounts",
                &target,
                &info.snapshot_key,
            ])
            .await?;

        extract_upperdir(&parse_mounts_output(&mounts))
            .ok_or_else(|| GatewayError::UpperdirNotFound(container_id.to_string()))
    }
}

/// Live `ctr events` subscription. Dropping it kills the child process.
#[derive(Debug)]
pub struct CtrEventStream {
    namespace: String,
    lines: Lines<BufReader<ChildStdout>>,
    _child: Child,
}

impl EventStream for CtrEventStream {
    async fn next_event(&mut self) -> GatewayResult<Option<RuntimeEvent>> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(None),
                Err(e) => return Err(GatewayError::Stream(e.to_string())),
            };

            match parse_event_line(&line, &self.namespace) {
                Ok(Some(event)) => return Ok(Some(event)),
                Ok(None) => continue,
                Err(e) => {
                    log_event_with_fields(Event::EventUnparseable, &[("error", &e.to_string())]);
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaskCreatePayload {
    container_id: String,
    #[serde(default)]
    rootfs: Vec<Mount>,
}

#[derive(Debug, Deserialize)]
struct TaskDeletePayload {
    container_id: String,
    /// Exec ID; empty or equal to the container ID for the init process
    #[serde(default)]
    id: String,
}

/// Parse one line of `ctr events` output.
///
/// Returns `Ok(None)` for lines that are not events or belong to another
/// namespace. Exec-process deletions are reported as [`RuntimeEvent::Other`].
pub fn parse_event_line(line: &str, namespace: &str) -> GatewayResult<Option<RuntimeEvent>> {
    static EVENT_LINE: OnceLock<Regex> = OnceLock::new();
    let re = EVENT_LINE.get_or_init(|| {
        Regex::new(r"^(?P<ts>.+?)\s+(?P<ns>\S+)\s+(?P<topic>/\S+)\s*(?P<body>.*)$")
            .expect("static pattern")
    });

    let Some(caps) = re.captures(line.trim()) else {
        return Ok(None);
    };
    if &caps["ns"] != namespace {
        return Ok(None);
    }

    let topic = &caps["topic"];
    let body = &caps["body"];
    let event = match topic {
        "/tasks/create" => {
            let payload: TaskCreatePayload = serde_json::from_str(body)
                .map_err(|e| GatewayError::Parse(format!("{}: {}", topic, e)))?;
            RuntimeEvent::TaskCreate {
                container_id: payload.container_id,
                rootfs: payload.rootfs,
            }
        }
        "/tasks/delete" => {
            let payload: TaskDeletePayload = serde_json::from_str(body)
                .map_err(|e| GatewayError::Parse(format!("{}: {}", topic, e)))?;
            if !payload.id.is_empty() && payload.id != payload.container_id {
                RuntimeEvent::Other {
                    topic: topic.to_string(),
                }
            } else {
                RuntimeEvent::TaskDelete {
                    container_id: payload.container_id,
                }
            }
        }
        other => RuntimeEvent::Other {
            topic: other.to_string(),
        },
    };
    Ok(Some(event))
}

/// Parse `ctr snapshots mounts` output (`mount -t <type> <source> <target> -o <opts>`).
pub fn parse_mounts_output(output: &str) -> Vec<Mount> {
    output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            if tokens.next() != Some("mount") {
                return None;
            }
            let mut mount = Mount::default();
            let mut positional = Vec::new();
            while let Some(token) = tokens.next() {
                match token {
                    "-t" => mount.mount_type = tokens.next().unwrap_or_default().to_string(),
                    "-o" => {
                        mount.options = tokens
                            .next()
                            .unwrap_or_default()
                            .split(',')
                            .filter(|o| !o.is_empty())
                            .map(str::to_string)
                            .collect()
                    }
                    other => positional.push(other),
                }
            }
            mount.source = positional.first().copied().unwrap_or_default().to_string();
            Some(mount)
        })
        .collect()
}
