//! Persisted quota assignments
//!
//! Document format (rewritten whole on every mutation):
//!
//! ```json
//! {
//!   "entries": {
//!     "<container id>": {
//!       "container_id": "<container id>",
//!       "project_id": 1001,
//!       "upperdir": "/var/lib/containerd/.../fs"
//!     }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One active quota assignment: container → (project ID, writable layer path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub container_id: String,
    pub project_id: u32,
    pub upperdir: PathBuf,
}

impl Entry {
    pub fn new(container_id: impl Into<String>, project_id: u32, upperdir: impl Into<PathBuf>) -> Self {
        Self {
            container_id: container_id.into(),
            project_id,
            upperdir: upperdir.into(),
        }
    }
}

/// On-disk shape of the state file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub entries: BTreeMap<String, Entry>,
}

impl StateDocument {
    /// Parse a document. Empty input is an empty document.
    pub fn from_json(input: &str) -> Result<Self, String> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        let doc: StateDocument = serde_json::from_str(input).map_err(|e| e.to_string())?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Keys must match their entry, and no project ID may appear twice.
    fn validate(&self) -> Result<(), String> {
        let mut owners: HashMap<u32, &str> = HashMap::new();
        for (key, entry) in &self.entries {
            if key != &entry.container_id {
                return Err(format!(
                    "entry key '{}' does not match container_id '{}'",
                    key, entry.container_id
                ));
            }
            if let Some(other) = owners.insert(entry.project_id, key) {
                return Err(format!(
                    "project ID {} assigned to both '{}' and '{}'",
                    entry.project_id, other, key
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_empty_document() {
        assert_eq!(StateDocument::from_json("").unwrap(), StateDocument::default());
        assert_eq!(StateDocument::from_json("  \n").unwrap(), StateDocument::default());
    }

    #[test]
    fn test_parses_field_names() {
        let doc = StateDocument::from_json(
            r#"{"entries":{"c1":{"container_id":"c1","project_id":7,"upperdir":"/var/lib/x/c1"}}}"#,
        )
        .unwrap();
        assert_eq!(doc.entries["c1"], Entry::new("c1", 7, "/var/lib/x/c1"));
    }

    #[test]
    fn test_rejects_mismatched_key() {
        let err = StateDocument::from_json(
            r#"{"entries":{"c1":{"container_id":"c2","project_id":7,"upperdir":"/a"}}}"#,
        )
        .unwrap_err();
        assert!(err.contains("does not match"));
    }

    #[test]
    fn test_rejects_duplicate_project_id() {
        let err = StateDocument::from_json(
            r#"{"entries":{
                "a":{"container_id":"a","project_id":7,"upperdir":"/a"},
                "b":{"container_id":"b","project_id":7,"upperdir":"/b"}}}"#,
        )
        .unwrap_err();
        assert!(err.contains("project ID 7"));
    }

    #[test]
    fn test_rejects_negative_project_id() {
        assert!(StateDocument::from_json(
            r#"{"entries":{"a":{"container_id":"a","project_id":-1,"upperdir":"/a"}}}"#
        )
        .is_err());
    }
}
