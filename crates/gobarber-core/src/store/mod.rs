//! Persistent credential storage.
//!
//! This module provides the `CredentialStore` trait, a small async
//! key-value contract with batched variants, and three backends:
//! - `FileStore`: JSON map in the data directory
//! - `KeyringStore`: one OS keychain entry per key
//! - `MemoryStore`: process-local, for ephemeral sessions and tests
//!
//! The session is persisted under the three keys below.

pub mod file;
pub mod keyring;
pub mod memory;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::StorageBackend;

pub use self::file::FileStore;
pub use self::keyring::KeyringStore;
pub use self::memory::MemoryStore;

/// Token record: JSON `{token, creationDate}`
pub const TOKEN_KEY: &str = "@GoBarber:token";
/// User profile: JSON
pub const USER_KEY: &str = "@GoBarber:user";
/// Raw refresh token string
pub const REFRESH_TOKEN_KEY: &str = "@GoBarber:refreshToken";

/// Every key the session is persisted under, in hydration order
pub const SESSION_KEYS: [&str; 3] = [TOKEN_KEY, USER_KEY, REFRESH_TOKEN_KEY];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] ::keyring::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Async key-value storage that survives process restarts.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    async fn multi_get(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    async fn multi_set(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    async fn multi_remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// Open the store selected in the config
pub fn open_store(backend: StorageBackend, data_dir: &Path) -> Arc<dyn CredentialStore> {
    match backend {
        StorageBackend::File => Arc::new(FileStore::new(data_dir)),
        StorageBackend::Keyring => Arc::new(KeyringStore::new()),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    }
}
