//! Container runtime collaborator
//!
//! The engine talks to the runtime through [`RuntimeGateway`]: enumerate
//! live containers, resolve a container's writable layer, and subscribe to
//! lifecycle events.
//!
//! - [`CtrGateway`] drives containerd through the `ctr` CLI.
//! - [`MemoryGateway`] replays scripted sessions for tests.

mod ctr;
mod errors;
mod event;
mod memory;

use std::path::PathBuf;

pub use ctr::{parse_event_line, parse_mounts_output, CtrEventStream, CtrGateway, CtrOptions};
pub use errors::{GatewayError, GatewayResult};
pub use event::{extract_upperdir, Mount, RuntimeEvent};
pub use memory::{MemoryEventStream, MemoryGateway, ScriptedEvent};

/// Ordered stream of lifecycle events from one connection.
#[allow(async_fn_in_trait)]
pub trait EventStream {
    /// Next event. `Ok(None)` means the stream ended and the connection is gone.
    ///
    /// Must be cancel-safe: dropping the future loses no event.
    async fn next_event(&mut self) -> GatewayResult<Option<RuntimeEvent>>;
}

/// Access to the container runtime.
#[allow(async_fn_in_trait)]
pub trait RuntimeGateway {
    type Events: EventStream;

    /// Establish a connection and subscribe to lifecycle events. Dropping
    /// the returned stream tears the connection down.
    async fn connect(&mut self) -> GatewayResult<Self::Events>;

    /// IDs of all containers currently known to the runtime.
    async fn list_containers(&self) -> GatewayResult<Vec<String>>;

    /// Writable layer path of `container_id`. Also answers for a container
    /// whose task was just deleted.
    async fn resolve_upperdir(&self, container_id: &str) -> GatewayResult<PathBuf>;
}
