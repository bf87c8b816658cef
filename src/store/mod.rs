//! Local key-value storage for the credential and account profile.

use crate::util::write_atomic;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Bearer credential sent to the backend.
pub const AUTH_TOKEN_KEY: &str = "auth_token";
/// Account name selecting the account-scoped endpoints.
pub const USERNAME_KEY: &str = "username";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// JSON object on disk, loaded once and rewritten atomically on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store: {}", path.display()))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse store: {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries).context("Failed to serialize store")?;
        write_atomic(&self.path, &json)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}
