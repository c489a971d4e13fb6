//! Credential store seam
//!
//! The host owns the storage medium. This crate only needs an async
//! string key/value interface; batch writes default to per-key calls and may
//! be overridden by stores that can commit several keys at once.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{BunqError, BunqResult};

/// Async key/value store for credential fields
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_item(&self, key: &str) -> BunqResult<Option<String>>;

    async fn set_item(&self, key: &str, value: &str) -> BunqResult<()>;

    async fn remove_item(&self, key: &str) -> BunqResult<()>;

    /// Write several fields as one logical update, in order
    async fn set_items(&self, items: &[(String, String)]) -> BunqResult<()> {
        for (key, value) in items {
            self.set_item(key, value).await?;
        }
        Ok(())
    }

    /// Remove several fields as one logical update
    async fn remove_items(&self, keys: &[String]) -> BunqResult<()> {
        for key in keys {
            self.remove_item(key).await?;
        }
        Ok(())
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store, mainly for tests and short-lived hosts
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored entry
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.items.read().await.clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_item(&self, key: &str) -> BunqResult<Option<String>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> BunqResult<()> {
        self.items.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> BunqResult<()> {
        self.items.write().await.remove(key);
        Ok(())
    }

    async fn set_items(&self, items: &[(String, String)]) -> BunqResult<()> {
        let mut map = self.items.write().await;
        for (key, value) in items {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn remove_items(&self, keys: &[String]) -> BunqResult<()> {
        let mut map = self.items.write().await;
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// Stores every field in one JSON object on disk
///
/// Each update rewrites a sibling temp file and renames it over the original,
/// so readers never observe a half-written record.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<config dir>/bunqlink/credentials.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|dir| dir.join("bunqlink").join("credentials.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> BunqResult<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                BunqError::Storage(format!("{} is not a credential file: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(storage_error(&self.path, e)),
        }
    }

    async fn save(&self, items: &BTreeMap<String, String>) -> BunqResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(parent, e))?;
        }

        let text = serde_json::to_string_pretty(items)
            .map_err(|e| BunqError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, text)
            .await
            .map_err(|e| storage_error(&tmp, e))?;
        restrict_permissions(&tmp).await?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| storage_error(&self.path, e))?;

        debug!(path = %self.path.display(), fields = items.len(), "Credential file written");
        Ok(())
    }

    async fn update<F>(&self, apply: F) -> BunqResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut items = self.load().await?;
        apply(&mut items);
        self.save(&items).await
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn get_item(&self, key: &str) -> BunqResult<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> BunqResult<()> {
        self.update(|items| {
            items.insert(key.to_string(), value.to_string());
        })
        .await
    }

    async fn remove_item(&self, key: &str) -> BunqResult<()> {
        self.update(|items| {
            items.remove(key);
        })
        .await
    }

    async fn set_items(&self, entries: &[(String, String)]) -> BunqResult<()> {
        self.update(|items| {
            for (key, value) in entries {
                items.insert(key.clone(), value.clone());
            }
        })
        .await
    }

    async fn remove_items(&self, keys: &[String]) -> BunqResult<()> {
        self.update(|items| {
            for key in keys {
                items.remove(key);
            }
        })
        .await
    }
}

fn storage_error(path: &Path, err: std::io::Error) -> BunqError {
    BunqError::Storage(format!("{}: {}", path.display(), err))
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> BunqResult<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| storage_error(path, e))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> BunqResult<()> {
    Ok(())
}
