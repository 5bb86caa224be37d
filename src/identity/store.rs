//! User document store.
//!
//! Identities are kept in a map keyed by phone number and, when opened on a directory,
//! written through to `users.json` after every mutation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use serde::Deserialize;

use super::principal::{Identity, Role};
use crate::error::{AppError, AppResult};

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Clone)]
pub struct UserStore {
    users: Arc<RwLock<BTreeMap<String, Identity>>>,
    path: Option<PathBuf>,
}

fn users_path(dir: &Path) -> PathBuf { dir.join("users.json") }

impl UserStore {
    pub fn in_memory() -> Self {
        Self { users: Arc::new(RwLock::new(BTreeMap::new())), path: None }
    }

    /// Open (or create) the store under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).with_context(|| format!("creating data dir {}", dir.display()))?;
        let path = users_path(dir);
        let users = if path.exists() {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            let list: Vec<Identity> = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
            list.into_iter().map(|u| (u.phone.clone(), u)).collect()
        } else {
            BTreeMap::new()
        };
        Ok(Self { users: Arc::new(RwLock::new(users)), path: Some(path) })
    }

    fn persist(&self, users: &BTreeMap<String, Identity>) -> AppResult<()> {
        let Some(path) = &self.path else { return Ok(()) };
        let list: Vec<&Identity> = users.values().collect();
        let json = serde_json::to_vec_pretty(&list).map_err(|e| AppError::internal("store_encode".to_string(), e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, path))
            .map_err(|e| AppError::internal("store_write".to_string(), e.to_string()))
    }

    pub fn get(&self, phone: &str) -> Option<Identity> {
        self.users.read().get(phone).cloned()
    }

    /// Return the identity for `phone`, creating it with `role` on first sight.
    /// The second value is true when the identity was just created.
    pub fn get_or_create(&self, phone: &str, role: Role) -> AppResult<(Identity, bool)> {
        let mut users = self.users.write();
        if let Some(existing) = users.get(phone) {
            return Ok((existing.clone(), false));
        }
        let identity = Identity::new(phone, role);
        users.insert(phone.to_string(), identity.clone());
        if let Err(e) = self.persist(&users) {
            users.remove(phone);
            return Err(e);
        }
        Ok((identity, true))
    }

    pub fn update_profile(&self, phone: &str, update: ProfileUpdate) -> AppResult<Identity> {
        let mut users = self.users.write();
        let previous = users
            .get(phone)
            .cloned()
            .ok_or_else(|| AppError::not_found("user_not_found".to_string(), format!("no user {phone}")))?;
        let mut next = previous.clone();
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            next.name = if name.is_empty() { None } else { Some(name) };
        }
        if let Some(address) = update.address {
            let address = address.trim().to_string();
            next.address = if address.is_empty() { None } else { Some(address) };
        }
        next.updated_at = Utc::now();
        users.insert(phone.to_string(), next.clone());
        if let Err(e) = self.persist(&users) {
            users.insert(phone.to_string(), previous);
            return Err(e);
        }
        Ok(next)
    }

    /// Hard delete. Returns whether a document was removed.
    pub fn delete(&self, phone: &str) -> AppResult<bool> {
        let mut users = self.users.write();
        let Some(removed) = users.remove(phone) else { return Ok(false) };
        if let Err(e) = self.persist(&users) {
            users.insert(phone.to_string(), removed);
            return Err(e);
        }
        Ok(true)
    }

    pub fn list(&self) -> Vec<Identity> {
        self.users.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_stable() {
        let store = UserStore::in_memory();
        let (a, created) = store.get_or_create("9876543210", Role::User).unwrap();
        assert!(created);
        let (b, created_again) = store.get_or_create("9876543210", Role::Admin).unwrap();
        assert!(!created_again);
        assert_eq!(a, b);
        assert_eq!(b.role, Role::User);
    }

    #[test]
    fn profile_update_trims_and_clears() {
        let store = UserStore::in_memory();
        store.get_or_create("9876543210", Role::User).unwrap();
        let u = store
            .update_profile("9876543210", ProfileUpdate { name: Some(" Asha ".into()), address: Some("Pune".into()) })
            .unwrap();
        assert_eq!(u.name.as_deref(), Some("Asha"));
        assert!(u.is_profile_complete());
        let u = store.update_profile("9876543210", ProfileUpdate { name: None, address: Some("  ".into()) }).unwrap();
        assert_eq!(u.name.as_deref(), Some("Asha"));
        assert!(!u.is_profile_complete());
        assert!(matches!(store.update_profile("0000000000", ProfileUpdate::default()), Err(AppError::NotFound { .. })));
    }

    #[test]
    fn file_store_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = UserStore::open(tmp.path()).unwrap();
            store.get_or_create("9876543210", Role::Admin).unwrap();
            store.get_or_create("9123456780", Role::User).unwrap();
            assert!(store.delete("9123456780").unwrap());
            assert!(!store.delete("9123456780").unwrap());
        }
        let reopened = UserStore::open(tmp.path()).unwrap();
        assert_eq!(reopened.list().len(), 1);
        assert_eq!(reopened.get("9876543210").map(|u| u.role), Some(Role::Admin));
    }
}
