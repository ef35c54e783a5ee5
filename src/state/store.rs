//! Durable container → quota mapping
//!
//! Every mutation rewrites the whole document and fsyncs it before returning.
//! If the durable write fails the in-memory map is rolled back, so the
//! in-memory view never claims durability it does not have.
//!
//! Writes go through a temp file in the same directory followed by a rename,
//! so a crash mid-write leaves either the old or the new document, never a
//! truncated one.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tempfile::NamedTempFile;

use super::entry::{Entry, StateDocument};
use super::errors::{StateError, StateResult};
use crate::crash_point::{maybe_crash, points};

/// Concurrency-safe, file-backed store of quota entries.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl StateStore {
    /// Load the store from `path`.
    ///
    /// A missing file is created (with parent directories) holding an empty
    /// document. An empty file is treated as an empty document.
    ///
    /// # Errors
    ///
    /// - `RFSQ_STATE_CORRUPT` (fatal) if the file exists but cannot be parsed.
    ///   Persisted assignments are never silently discarded.
    /// - `RFSQ_STATE_IO_ERROR` if the file cannot be read or created.
    pub fn load(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match fs::read_to_string(&path) {
            Ok(content) => {
                StateDocument::from_json(&content)
                    .map_err(|reason| StateError::corrupt(&path, reason))?
                    .entries
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let empty = BTreeMap::new();
                write_document(&path, &empty).map_err(|e| {
                    StateError::io_error(
                        format!("Failed to create state file: {}", path.display()),
                        e,
                    )
                })?;
                empty
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(StateError::corrupt(&path, "state file is not valid UTF-8"));
            }
            Err(e) => {
                return Err(StateError::io_error(
                    format!("Failed to read state file: {}", path.display()),
                    e,
                ))
            }
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the entry for `entry.container_id` and persist.
    ///
    /// # Errors
    ///
    /// Returns `RFSQ_STATE_PERSIST_FAILED` if the durable write fails; the
    /// in-memory map is restored to its previous value.
    pub fn put(&self, entry: Entry) -> StateResult<()> {
        let mut entries = self.write();
        let container_id = entry.container_id.clone();
        let previous = entries.insert(container_id.clone(), entry);

        if let Err(e) = self.persist(&entries) {
            match previous {
                Some(prev) => entries.insert(container_id, prev),
                None => entries.remove(&container_id),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Remove the entry for `container_id` and persist.
    ///
    /// Removing an absent key is a no-op and does not touch the file.
    /// Returns the removed entry, if any.
    ///
    /// # Errors
    ///
    /// Returns `RFSQ_STATE_PERSIST_FAILED` if the durable write fails; the
    /// entry is put back.
    pub fn remove(&self, container_id: &str) -> StateResult<Option<Entry>> {
        let mut entries = self.write();
        let Some(removed) = entries.remove(container_id) else {
            return Ok(None);
        };

        if let Err(e) = self.persist(&entries) {
            entries.insert(container_id.to_string(), removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    pub fn get(&self, container_id: &str) -> Option<Entry> {
        self.read().get(container_id).cloned()
    }

    /// Point-in-time snapshot of all entries, ordered by container ID.
    pub fn all(&self) -> Vec<Entry> {
        self.read().values().cloned().collect()
    }

    /// Entry currently holding `project_id`, if any
    pub fn find_by_project_id(&self, project_id: u32) -> Option<Entry> {
        self.read()
            .values()
            .find(|e| e.project_id == project_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, entries: &BTreeMap<String, Entry>) -> StateResult<()> {
        write_document(&self.path, entries).map_err(|e| {
            StateError::persist_failed(
                format!("Failed to persist state file: {}", self.path.display()),
                e,
            )
        })
    }
}

/// Serialize `entries` and atomically replace the file at `path`.
fn write_document(path: &Path, entries: &BTreeMap<String, Entry>) -> io::Result<()> {
    let doc = StateDocument {
        entries: entries.clone(),
    };
    let json = doc
        .to_json()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(json.as_bytes())?;
    temp.as_file().sync_all()?;

    maybe_crash(points::STATE_BEFORE_RENAME);

    temp.persist(path).map_err(|e| e.error)?;
    fsync_dir(parent)
}

/// fsync a directory so the rename itself is durable.
fn fsync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_creates_file_and_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/state/state.json");

        let store = StateStore::load(&path).unwrap();

        assert!(store.is_empty());
        assert!(path.exists());
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(StateDocument::from_json(&content).unwrap(), StateDocument::default());
    }

    #[test]
    fn test_load_empty_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "").unwrap();

        let store = StateStore::load(&path).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_replaces_existing_entry() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).unwrap();

        store.put(Entry::new("c1", 5, "/a")).unwrap();
        store.put(Entry::new("c1", 6, "/b")).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("c1"), Some(Entry::new("c1", 6, "/b")));
    }

    #[test]
    fn test_find_by_project_id() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).unwrap();
        store.put(Entry::new("c1", 5, "/a")).unwrap();
        store.put(Entry::new("c2", 9, "/b")).unwrap();

        assert_eq!(store.find_by_project_id(9).map(|e| e.container_id), Some("c2".to_string()));
        assert!(store.find_by_project_id(1).is_none());
    }

    #[test]
    fn test_all_is_ordered_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).unwrap();
        store.put(Entry::new("b", 2, "/b")).unwrap();
        store.put(Entry::new("a", 1, "/a")).unwrap();

        let snapshot = store.all();
        store.remove("a").unwrap();

        let ids: Vec<_> = snapshot.iter().map(|e| e.container_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).unwrap();
        store.put(Entry::new("c1", 1, "/a")).unwrap();
        store.remove("c1").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["state.json".to_string()]);
    }
}
