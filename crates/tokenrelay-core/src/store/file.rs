//! JSON file backed store
//!
//! The whole store is one JSON object. Every `get` reads the file, every
//! `set` rewrites it atomically through a temp file.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::ConfigStore;

/// Persistent store in a JSON file
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at the default location (`<config_dir>/tokenrelay/store.json`)
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(Self::new(dir.join("tokenrelay").join("store.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store file: {:?}", self.path))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse store file: {:?}", self.path))
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create store directory: {:?}", parent))?;
            }
        }

        let json = serde_json::to_string_pretty(values).context("Failed to serialize store")?;
        let temp_path = self.path.with_extension("tmp");

        // Leftover from an interrupted write
        let _ = fs::remove_file(&temp_path);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp store file: {:?}", temp_path))?;

        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write temp store file: {:?}", temp_path))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync temp store file: {:?}", temp_path))?;

        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to rename store file: {:?}", self.path))?;

        Ok(())
    }
}

impl ConfigStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut values = self.load()?;
        values.insert(key.to_string(), value.to_string());
        self.save(&values)?;
        tracing::debug!(key, path = ?self.path, "store updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{resolve_room_id, ROOM_ID_KEY};

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store.json"));
        assert_eq!(store.get(ROOM_ID_KEY).unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_set_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        FileStore::new(&path).set(ROOM_ID_KEY, "abc123").unwrap();
        FileStore::new(&path).set("other", "x").unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get(ROOM_ID_KEY).unwrap().as_deref(), Some("abc123"));
        assert_eq!(reopened.get("other").unwrap().as_deref(), Some("x"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_reads_see_latest_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let reader = FileStore::new(&path);
        let writer = FileStore::new(&path);

        writer.set(ROOM_ID_KEY, "first").unwrap();
        assert_eq!(resolve_room_id(&reader).unwrap().as_deref(), Some("first"));
        writer.set(ROOM_ID_KEY, "").unwrap();
        assert_eq!(resolve_room_id(&reader).unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").unwrap();
        let err = FileStore::new(&path).get(ROOM_ID_KEY).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse store file"));
    }
}
