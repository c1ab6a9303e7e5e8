//! Operator configuration store.
//!
//! Holds the room id under [`ROOM_ID_KEY`]. The relay reads it on every
//! forward; nothing in this crate caches values read from a store.

mod file;

pub use file::FileStore;

use anyhow::Result;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Key of the room identifier
pub const ROOM_ID_KEY: &str = "room_id";

/// Key-value store for operator settings
pub trait ConfigStore: Send + Sync {
    /// Read a value; `None` when the key was never set
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value; returns once the write is visible to `get`
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Resolve the configured room id.
///
/// Missing, empty and whitespace-only values all mean "not configured".
pub fn resolve_room_id(store: &dyn ConfigStore) -> Result<Option<String>> {
    Ok(store
        .get(ROOM_ID_KEY)?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a room id
    pub fn with_room_id(room_id: &str) -> Self {
        let store = Self::new();
        store
            .values
            .write()
            .insert(ROOM_ID_KEY.to_string(), room_id.to_string());
        store
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
