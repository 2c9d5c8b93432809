// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Persisted key-value settings.
//!
//! The sound manager keeps two values across sessions: whether sound is
//! enabled and the master volume. The store itself is a generic namespaced
//! JSON key-value abstraction supplied by the embedding application; this
//! module provides a file-backed implementation and an in-memory one for
//! tests. Store operations are fallible but never fatal to playback.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

/// Key under which the sound-enabled flag is persisted.
pub const KEY_SOUND_ENABLED: &str = "sound.enabled";
/// Key under which the master volume is persisted.
pub const KEY_SOUND_VOLUME: &str = "sound.volume";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A namespaced key-value store with JSON-serialized values.
pub trait SettingsStore: Send + Sync {
    /// Reads a value; None when the key is absent.
    fn get(&self, key: &str) -> Result<Option<Value>, SettingsError>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError>;

    /// Removes a key. Removing an absent key is a no-op.
    fn remove(&self, key: &str) -> Result<(), SettingsError>;

    /// Removes every key in the namespace.
    fn clear(&self) -> Result<(), SettingsError>;
}

/// A store persisted as a single JSON object in a file. Writes go to a
/// temporary file first, then rename over the target.
pub struct JsonFileStore {
    path: PathBuf,
    values: RwLock<HashMap<String, Value>>,
}

impl JsonFileStore {
    /// Opens the store, loading existing values if the file is present.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<JsonFileStore, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(SettingsError::Io(e)),
        };
        Ok(JsonFileStore {
            path,
            values: RwLock::new(values),
        })
    }

    fn flush(&self, values: &HashMap<String, Value>) -> Result<(), SettingsError> {
        let serialized = serde_json::to_string_pretty(values)?;
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = fs::File::create(&tmp_path)?;
            tmp.write_all(serialized.as_bytes())?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), keys = values.len(), "Settings flushed");
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let mut values = self.values.write();
        values.insert(key.to_string(), value);
        self.flush(&values)
    }

    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        let mut values = self.values.write();
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), SettingsError> {
        let mut values = self.values.write();
        values.clear();
        self.flush(&values)
    }
}

/// An in-memory store for tests and for callers that do not want
/// persistence.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SettingsError> {
        self.values.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), SettingsError> {
        self.values.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_store_round_trip() -> Result<(), SettingsError> {
        let store = MemoryStore::new();
        assert!(store.get(KEY_SOUND_ENABLED)?.is_none());

        store.set(KEY_SOUND_ENABLED, json!(false))?;
        assert_eq!(store.get(KEY_SOUND_ENABLED)?, Some(json!(false)));

        store.remove(KEY_SOUND_ENABLED)?;
        assert!(store.get(KEY_SOUND_ENABLED)?.is_none());

        // Removing again is a no-op.
        store.remove(KEY_SOUND_ENABLED)?;
        Ok(())
    }

    #[test]
    fn test_file_store_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");

        {
            let store = JsonFileStore::open(&path)?;
            store.set(KEY_SOUND_ENABLED, json!(false))?;
            store.set(KEY_SOUND_VOLUME, json!(0.4))?;
        }

        let store = JsonFileStore::open(&path)?;
        assert_eq!(store.get(KEY_SOUND_ENABLED)?, Some(json!(false)));
        assert_eq!(store.get(KEY_SOUND_VOLUME)?, Some(json!(0.4)));

        store.clear()?;
        let store = JsonFileStore::open(&path)?;
        assert!(store.get(KEY_SOUND_ENABLED)?.is_none());
        Ok(())
    }

    #[test]
    fn test_file_store_missing_file_is_empty() -> Result<(), SettingsError> {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("absent.json"))?;
        assert!(store.get("anything")?.is_none());
        Ok(())
    }
}
