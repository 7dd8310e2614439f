//! Document stores behind the [`Persistence`] boundary.
//!
//! [`FileStore`] keeps one JSON document per key under a data directory;
//! [`MemoryStore`] keeps them in a map and is meant for tests and demos.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use parking_lot::Mutex;
use parley_core::{ChatError, ChatResult, Persistence};
use serde_json::Value;
use tracing::{debug, trace};

/// JSON documents under `<root>/<key>`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps `key` to a path below the root, rejecting keys that escape it.
    fn path_for(&self, key: &str) -> ChatResult<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(ChatError::persistence(format!("invalid key: {key}")));
        }
        Ok(self.root.join(relative))
    }
}

impl Persistence for FileStore {
    fn load(&self, key: &str) -> ChatResult<Option<Value>> {
        let path = self.path_for(key)?;
        if !path.is_file() {
            trace!(key = %key, "No document stored");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .map_err(|e| ChatError::persistence(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| ChatError::persistence(format!("{}: {e}", path.display())))
    }

    fn save(&self, key: &str, document: &Value) -> ChatResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ChatError::persistence(format!("{}: {e}", parent.display())))?;
        }
        let raw = serde_json::to_string_pretty(document)
            .map_err(|e| ChatError::persistence(e.to_string()))?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, raw)
            .and_then(|()| fs::rename(&tmp, &path))
            .map_err(|e| ChatError::persistence(format!("{}: {e}", path.display())))?;
        debug!(key = %key, path = %path.display(), "Document saved");
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.is_file()).unwrap_or(false)
    }
}

/// In-memory documents.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.documents.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Persistence for MemoryStore {
    fn load(&self, key: &str) -> ChatResult<Option<Value>> {
        Ok(self.documents.lock().get(key).cloned())
    }

    fn save(&self, key: &str, document: &Value) -> ChatResult<()> {
        self.documents
            .lock()
            .insert(key.to_string(), document.clone());
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.documents.lock().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        assert!(!store.exists("fleet/main/state"));
        assert_eq!(store.load("fleet/main/state").unwrap(), None);

        let doc = json!({"joined_channels": [{"name": "#parley"}]});
        store.save("fleet/main/state", &doc).unwrap();
        assert!(store.exists("fleet/main/state"));
        assert!(dir.path().join("fleet/main/state").is_file());
        assert!(!dir.path().join("fleet/main/state.tmp").exists());
        assert_eq!(store.load("fleet/main/state").unwrap(), Some(doc));

        store.save("fleet/main/state", &json!([])).unwrap();
        assert_eq!(store.load("fleet/main/state").unwrap(), Some(json!([])));
    }

    #[test]
    fn test_file_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.save("../outside", &json!(1)),
            Err(ChatError::Persistence(_))
        ));
        assert!(store.load("").is_err());
        assert!(!store.exists("a/../../b"));
    }

    #[test]
    fn test_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken"), "{not json").unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(store.load("broken"), Err(ChatError::Persistence(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.save("plugins/blacklist", &json!(["x"])).unwrap();
        assert!(store.exists("plugins/blacklist"));
        assert_eq!(store.keys(), vec!["plugins/blacklist"]);
        assert_eq!(store.load("missing").unwrap(), None);
    }
}
