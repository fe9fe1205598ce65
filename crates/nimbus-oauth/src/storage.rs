//! Secure storage capability for persisted tokens.
//!
//! Platforms provide keychain/keystore-backed implementations; the SDK only
//! requires opaque byte blobs keyed by string.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use nimbus_common::Result;

/// The capability to persist opaque secrets.
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Reads the blob stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes a blob under `key`, replacing any existing value.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Deletes the blob under `key`. Deleting a missing key is a no-op.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory storage for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemorySecureStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySecureStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStorage for MemorySecureStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
