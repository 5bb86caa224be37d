//! Durable client-side key/value storage.
//!
//! The session client mirrors a logged-in flag and a user snapshot here for optimistic
//! first-paint decisions. Nothing stored here is ever trusted as proof of a session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use tracing::warn;

pub const LOGGED_IN_KEY: &str = "isLoggedIn";
pub const USER_KEY: &str = "user";

pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> { self.map.read().get(key).cloned() }
    fn set(&self, key: &str, value: &str) { self.map.write().insert(key.to_string(), value.to_string()); }
    fn remove(&self, key: &str) { self.map.write().remove(key); }
}

/// JSON-file store that survives process restarts, the way browser storage survives reloads.
pub struct FileStore {
    path: PathBuf,
    map: Mutex<HashMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let map = if path.exists() {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        } else {
            HashMap::new()
        };
        Ok(Self { path, map: Mutex::new(map) })
    }

    /// Temp file plus rename; an interrupted write leaves the previous contents.
    fn flush(&self, map: &HashMap<String, String>) {
        let tmp = self.path.with_extension("json.tmp");
        let res = serde_json::to_vec(map)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| std::fs::write(&tmp, bytes).map_err(anyhow::Error::from))
            .and_then(|_| std::fs::rename(&tmp, &self.path).map_err(anyhow::Error::from));
        if let Err(e) = res {
            warn!(target: "session", path = %self.path.display(), "durable store write failed: {e}");
        }
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Option<String> { self.map.lock().get(key).cloned() }

    fn set(&self, key: &str, value: &str) {
        let mut map = self.map.lock();
        map.insert(key.to_string(), value.to_string());
        self.flush(&map);
    }

    fn remove(&self, key: &str) {
        let mut map = self.map.lock();
        if map.remove(key).is_some() {
            self.flush(&map);
        }
    }
}
