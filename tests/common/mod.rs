//! Shared fixtures for engine tests
//!
//! Real filesystem under a TempDir, in-memory enforcer and gateway, manual
//! clock.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rootfs_quota::engine::{EngineConfig, ManualClock, ReconciliationEngine};
use rootfs_quota::enforcer::{MemoryEnforcer, QuotaLimits, QuotaSize};
use rootfs_quota::pool::{ProjectIdPool, ProjectIdRange};
use rootfs_quota::runtime::MemoryGateway;
use rootfs_quota::state::{Entry, StateDocument, StateStore};
use tempfile::TempDir;

pub type TestEngine = ReconciliationEngine<MemoryGateway, MemoryEnforcer, ManualClock>;

pub struct Fixture {
    pub dir: TempDir,
    pub gateway: MemoryGateway,
    pub clock: ManualClock,
    pub pool: Arc<ProjectIdPool>,
    pub store: Arc<StateStore>,
}

impl Fixture {
    pub fn new(min: u32, max: u32) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let state_path = dir.path().join("state").join("state.json");
        let store = StateStore::load(&state_path).expect("state loads");
        let range = ProjectIdRange::new(min, max).expect("valid range");

        Self {
            dir,
            gateway: MemoryGateway::new(),
            clock: ManualClock::new(),
            pool: Arc::new(ProjectIdPool::new(range)),
            store: Arc::new(store),
        }
    }

    /// Rewrite the state document to hold exactly `entries` and reload it,
    /// as a restarted process would find it. The pool starts empty.
    pub fn restart_with(&mut self, entries: &[Entry]) {
        let doc = StateDocument {
            entries: entries
                .iter()
                .map(|e| (e.container_id.clone(), e.clone()))
                .collect(),
        };
        let state_path = self.state_path();
        fs::write(&state_path, doc.to_json().unwrap()).unwrap();

        self.store = Arc::new(StateStore::load(&state_path).expect("state reloads"));
        self.pool = Arc::new(ProjectIdPool::new(self.pool.range()));
    }

    pub fn state_path(&self) -> PathBuf {
        self.store.path().to_path_buf()
    }

    /// An existing writable layer directory for `name`
    pub fn upperdir(&self, name: &str) -> PathBuf {
        let path = self.upperdir_path(name);
        fs::create_dir_all(&path).unwrap();
        path
    }

    /// Where the writable layer for `name` would be; not created
    pub fn upperdir_path(&self, name: &str) -> PathBuf {
        self.dir.path().join("snapshots").join(name).join("fs")
    }

    /// Register a live container with an existing writable layer
    pub fn live(&self, container_id: &str) -> PathBuf {
        let path = self.upperdir(container_id);
        self.gateway.add_container(container_id, &path);
        path
    }

    pub fn engine(&self) -> TestEngine {
        self.engine_with(EngineConfig::new(limits()))
    }

    pub fn engine_with(&self, config: EngineConfig) -> TestEngine {
        ReconciliationEngine::new(
            self.gateway.clone(),
            MemoryEnforcer::new(),
            Arc::clone(&self.pool),
            Arc::clone(&self.store),
            config,
        )
        .with_clock(self.clock.clone())
    }

    /// Make every further state write fail by replacing the state directory
    /// with a plain file
    pub fn break_state_dir(&self) {
        let parent = self.state_path().parent().unwrap().to_path_buf();
        fs::remove_dir_all(&parent).unwrap();
        fs::write(&parent, b"not a directory").unwrap();
    }
}

pub fn limits() -> QuotaLimits {
    QuotaLimits::new(
        QuotaSize::parse("8g").unwrap(),
        QuotaSize::parse("10g").unwrap(),
    )
    .unwrap()
}

pub fn entry(container_id: &str, project_id: u32, upperdir: &Path) -> Entry {
    Entry::new(container_id, project_id, upperdir)
}
