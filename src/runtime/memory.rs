//! Scripted in-memory gateway
//!
//! Each `connect` consumes the next scripted session. A session either
//! refuses the connection or yields a fixed list of events and then ends
//! (or stays open, pending forever).

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::errors::{GatewayError, GatewayResult};
use super::event::{Mount, RuntimeEvent};
use super::{EventStream, RuntimeGateway};

/// One step of a scripted event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedEvent {
    Event(RuntimeEvent),
    /// The stream fails with this message
    Error(String),
}

impl ScriptedEvent {
    /// TaskCreate whose rootfs is an overlay with `upperdir`
    pub fn create(container_id: &str, upperdir: impl AsRef<Path>) -> Self {
        ScriptedEvent::Event(RuntimeEvent::TaskCreate {
            container_id: container_id.to_string(),
            rootfs: vec![Mount {
                mount_type: "overlay".to_string(),
                source: "overlay".to_string(),
                options: vec![
                    "index=off".to_string(),
                    format!("upperdir={}", upperdir.as_ref().display()),
                ],
            }],
        })
    }

    /// TaskCreate with no rootfs mounts; the engine has to resolve the path
    pub fn create_without_rootfs(container_id: &str) -> Self {
        ScriptedEvent::Event(RuntimeEvent::TaskCreate {
            container_id: container_id.to_string(),
            rootfs: Vec::new(),
        })
    }

    pub fn delete(container_id: &str) -> Self {
        ScriptedEvent::Event(RuntimeEvent::TaskDelete {
            container_id: container_id.to_string(),
        })
    }
}

#[derive(Debug)]
enum Session {
    Refuse(String),
    Stream {
        events: Vec<ScriptedEvent>,
        hold_open: bool,
    },
}

#[derive(Debug, Default)]
struct Inner {
    live: BTreeMap<String, PathBuf>,
    /// Deleted containers whose path still resolves
    retained: BTreeMap<String, PathBuf>,
    unresolvable: BTreeSet<String>,
    list_failures: usize,
    sessions: VecDeque<Session>,
    connects: usize,
}

/// In-memory [`RuntimeGateway`]. Clones share state, so a test can keep a
/// handle while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a live container
    pub fn add_container(&self, container_id: &str, upperdir: impl Into<PathBuf>) {
        let mut inner = self.lock();
        inner.retained.remove(container_id);
        inner.live.insert(container_id.to_string(), upperdir.into());
    }

    /// Drop a container from the live list; its path keeps resolving
    pub fn remove_container(&self, container_id: &str) {
        let mut inner = self.lock();
        if let Some(path) = inner.live.remove(container_id) {
            inner.retained.insert(container_id.to_string(), path);
        }
    }

    /// Forget a container entirely
    pub fn forget(&self, container_id: &str) {
        let mut inner = self.lock();
        inner.live.remove(container_id);
        inner.retained.remove(container_id);
    }

    /// Make `resolve_upperdir` fail for this container
    pub fn fail_resolve(&self, container_id: &str) {
        self.lock().unresolvable.insert(container_id.to_string());
    }

    /// Make the next `list_containers` call fail
    pub fn fail_next_list(&self) {
        self.lock().list_failures += 1;
    }

    /// Next connect attempt is refused
    pub fn refuse_connect(&self, reason: &str) {
        self.lock()
            .sessions
            .push_back(Session::Refuse(reason.to_string()));
    }

    /// Next connect yields `events`, then the stream ends
    pub fn push_session(&self, events: Vec<ScriptedEvent>) {
        self.lock().sessions.push_back(Session::Stream {
            events,
            hold_open: false,
        });
    }

    /// Next connect yields `events`, then the stream stays open
    pub fn push_open_session(&self, events: Vec<ScriptedEvent>) {
        self.lock().sessions.push_back(Session::Stream {
            events,
            hold_open: true,
        });
    }

    /// Number of connect attempts so far
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn pending_sessions(&self) -> usize {
        self.lock().sessions.len()
    }
}

impl RuntimeGateway for MemoryGateway {
    type Events = MemoryEventStream;

    async fn connect(&mut self) -> GatewayResult<MemoryEventStream> {
        let mut inner = self.lock();
        inner.connects += 1;
        match inner.sessions.pop_front() {
            Some(Session::Refuse(reason)) => Err(GatewayError::Connect(reason)),
            Some(Session::Stream { events, hold_open }) => Ok(MemoryEventStream {
                events: events.into(),
                hold_open,
            }),
            None => Err(GatewayError::Connect("no session scripted".to_string())),
        }
    }

    async fn list_containers(&self) -> GatewayResult<Vec<String>> {
        let mut inner = self.lock();
        if inner.list_failures > 0 {
            inner.list_failures -= 1;
            return Err(GatewayError::CommandFailed {
                command: "list".to_string(),
                status: "exit status: 1".to_string(),
                output: "injected failure".to_string(),
            });
        }
        Ok(inner.live.keys().cloned().collect())
    }

    async fn resolve_upperdir(&self, container_id: &str) -> GatewayResult<PathBuf> {
        let inner = self.lock();
        if inner.unresolvable.contains(container_id) {
            return Err(GatewayError::UpperdirNotFound(container_id.to_string()));
        }
        inner
            .live
            .get(container_id)
            .or_else(|| inner.retained.get(container_id))
            .cloned()
            .ok_or_else(|| GatewayError::ContainerNotFound(container_id.to_string()))
    }
}

#[derive(Debug)]
pub struct MemoryEventStream {
    events: VecDeque<ScriptedEvent>,
    hold_open: bool,
}

impl EventStream for MemoryEventStream {
    async fn next_event(&mut self) -> GatewayResult<Option<RuntimeEvent>> {
        match self.events.pop_front() {
            Some(ScriptedEvent::Event(event)) => Ok(Some(event)),
            Some(ScriptedEvent::Error(message)) => Err(GatewayError::Stream(message)),
            None if self.hold_open => std::future::pending().await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_are_consumed_in_order() {
        let mut gateway = MemoryGateway::new();
        gateway.refuse_connect("daemon down");
        gateway.push_session(vec![ScriptedEvent::delete("c1")]);

        assert!(matches!(
            gateway.connect().await,
            Err(GatewayError::Connect(_))
        ));
        let mut stream = gateway.connect().await.unwrap();
        assert_eq!(
            stream.next_event().await.unwrap(),
            Some(RuntimeEvent::TaskDelete {
                container_id: "c1".to_string()
            })
        );
        assert_eq!(stream.next_event().await.unwrap(), None);
        assert!(gateway.connect().await.is_err());
        assert_eq!(gateway.connects(), 3);
    }

    #[tokio::test]
    async fn test_removed_container_still_resolves() {
        let gateway = MemoryGateway::new();
        gateway.add_container("c1", "/snap/1/fs");
        gateway.remove_container("c1");

        assert!(gateway.list_containers().await.unwrap().is_empty());
        assert_eq!(
            gateway.resolve_upperdir("c1").await.unwrap(),
            PathBuf::from("/snap/1/fs")
        );

        gateway.forget("c1");
        assert!(matches!(
            gateway.resolve_upperdir("c1").await,
            Err(GatewayError::ContainerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_failure_is_one_shot() {
        let gateway = MemoryGateway::new();
        gateway.add_container("c1", "/snap/1/fs");
        gateway.fail_next_list();
        assert!(gateway.list_containers().await.is_err());
        assert_eq!(gateway.list_containers().await.unwrap(), vec!["c1".to_string()]);
    }
}
