//! Token set model and lifecycle management.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nimbus_common::{Error, Result};

use crate::storage::SecureStorage;

/// Tokens are refreshed this many seconds before their expiry.
pub const REFRESH_WINDOW_SECS: u64 = 60;

/// A set of OAuth tokens as the token endpoint returns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// The access token.
    pub access_token: String,
    /// The refresh token, when granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Token type (`DPoP` for this protocol).
    pub token_type: String,
    /// Lifetime in seconds, relative to issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Granted scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Subject (the user's DID).
    pub sub: String,
    /// Absolute expiry as a Unix timestamp, filled in at store time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

/// Returns the current Unix timestamp in seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Default)]
struct TokenState {
    tokens: Option<TokenSet>,
    loaded: bool,
}

/// Owns the current token set, optionally backed by secure storage.
pub struct TokenManager {
    storage: Option<Arc<dyn SecureStorage>>,
    storage_key: String,
    state: Mutex<TokenState>,
}

impl TokenManager {
    /// Creates a memory-only manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: None,
            storage_key: String::new(),
            state: Mutex::new(TokenState {
                tokens: None,
                loaded: true,
            }),
        }
    }

    /// Creates a manager backed by secure storage under the given key.
    #[must_use]
    pub fn with_storage(storage: Arc<dyn SecureStorage>, storage_key: impl Into<String>) -> Self {
        Self {
            storage: Some(storage),
            storage_key: storage_key.into(),
            state: Mutex::new(TokenState::default()),
        }
    }

    /// Stores a token set, normalizing `expires_at`.
    ///
    /// When `expires_at` is absent but `expires_in` is present,
    /// `expires_at` becomes `now + expires_in`; an existing `expires_at`
    /// is preserved.
    ///
    /// # Errors
    /// Returns an error if the storage backend fails.
    pub async fn store_tokens(&self, mut tokens: TokenSet) -> Result<()> {
        if tokens.expires_at.is_none() {
            if let Some(expires_in) = tokens.expires_in {
                tokens.expires_at = Some(unix_now() + expires_in);
            }
        }

        if let Some(storage) = &self.storage {
            let blob = serde_json::to_vec(&tokens).map_err(|e| Error::Encoding(e.to_string()))?;
            storage.set(&self.storage_key, blob).await?;
        }

        let mut state = self.state.lock();
        state.tokens = Some(tokens);
        state.loaded = true;
        debug!("stored token set");
        Ok(())
    }

    /// Returns the current token set, reading from storage on first use.
    ///
    /// # Errors
    /// Returns an error if the storage backend fails.
    pub async fn get_tokens(&self) -> Result<Option<TokenSet>> {
        {
            let state = self.state.lock();
            if state.loaded {
                return Ok(state.tokens.clone());
            }
        }

        // Cold manager: populate memory from storage once.
        let stored = match &self.storage {
            Some(storage) => storage.get(&self.storage_key).await?,
            None => None,
        };
        let tokens = match stored {
            Some(blob) => Some(
                serde_json::from_slice(&blob)
                    .map_err(|e| Error::Decoding(format!("persisted tokens: {e}")))?,
            ),
            None => None,
        };

        let mut state = self.state.lock();
        if !state.loaded {
            state.tokens = tokens;
            state.loaded = true;
        }
        Ok(state.tokens.clone())
    }

    /// Clears tokens from memory and storage. A no-op when already empty.
    ///
    /// # Errors
    /// Returns an error if the storage backend fails.
    pub async fn clear_tokens(&self) -> Result<()> {
        if let Some(storage) = &self.storage {
            storage.delete(&self.storage_key).await?;
        }
        let mut state = self.state.lock();
        state.tokens = None;
        state.loaded = true;
        Ok(())
    }

    /// True when tokens are missing, carry no expiry, or expire within
    /// [`REFRESH_WINDOW_SECS`]. The boundary instant counts as true.
    ///
    /// # Errors
    /// Returns an error if the storage backend fails.
    pub async fn needs_refresh(&self) -> Result<bool> {
        let Some(tokens) = self.get_tokens().await? else {
            return Ok(true);
        };
        let Some(expires_at) = tokens.expires_at else {
            return Ok(true);
        };
        Ok(unix_now() + REFRESH_WINDOW_SECS >= expires_at)
    }

    /// True when tokens are missing, carry no expiry, or are past expiry.
    ///
    /// # Errors
    /// Returns an error if the storage backend fails.
    pub async fn is_expired(&self) -> Result<bool> {
        let Some(tokens) = self.get_tokens().await? else {
            return Ok(true);
        };
        let Some(expires_at) = tokens.expires_at else {
            return Ok(true);
        };
        Ok(unix_now() >= expires_at)
    }
}

impl Default for TokenManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySecureStorage;

    fn tokens(expires_in: Option<u64>, expires_at: Option<u64>) -> TokenSet {
        TokenSet {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            token_type: "DPoP".to_string(),
            expires_in,
            scope: Some("atproto".to_string()),
            sub: "did:plc:abc".to_string(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_store_normalizes_expires_at() {
        let manager = TokenManager::new();
        let before = unix_now();
        manager.store_tokens(tokens(Some(3600), None)).await.unwrap();
        let after = unix_now();

        let stored = manager.get_tokens().await.unwrap().unwrap();
        let expires_at = stored.expires_at.unwrap();
        assert!(expires_at >= before + 3600);
        assert!(expires_at <= after + 3600);
    }

    #[tokio::test]
    async fn test_store_preserves_explicit_expires_at() {
        let manager = TokenManager::new();
        manager
            .store_tokens(tokens(Some(3600), Some(12345)))
            .await
            .unwrap();

        let stored = manager.get_tokens().await.unwrap().unwrap();
        assert_eq!(stored.expires_at, Some(12345));
    }

    #[tokio::test]
    async fn test_needs_refresh_empty_manager() {
        let manager = TokenManager::new();
        assert!(manager.needs_refresh().await.unwrap());
        assert!(manager.is_expired().await.unwrap());
    }

    #[tokio::test]
    async fn test_needs_refresh_without_expiry() {
        let manager = TokenManager::new();
        manager.store_tokens(tokens(None, None)).await.unwrap();
        assert!(manager.needs_refresh().await.unwrap());
    }

    #[tokio::test]
    async fn test_needs_refresh_boundary_is_true() {
        let manager = TokenManager::new();
        manager
            .store_tokens(tokens(None, Some(unix_now() + REFRESH_WINDOW_SECS)))
            .await
            .unwrap();
        assert!(manager.needs_refresh().await.unwrap());
    }

    #[tokio::test]
    async fn test_fresh_tokens_do_not_need_refresh() {
        let manager = TokenManager::new();
        manager.store_tokens(tokens(Some(3600), None)).await.unwrap();
        assert!(!manager.needs_refresh().await.unwrap());
        assert!(!manager.is_expired().await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_tokens() {
        let manager = TokenManager::new();
        manager
            .store_tokens(tokens(None, Some(unix_now().saturating_sub(10))))
            .await
            .unwrap();
        assert!(manager.is_expired().await.unwrap());
        assert!(manager.needs_refresh().await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_on_empty_manager_is_noop() {
        let manager = TokenManager::new();
        manager.clear_tokens().await.unwrap();
        assert_eq!(manager.get_tokens().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cold_manager_reads_storage() {
        let storage = Arc::new(MemorySecureStorage::new());

        let writer = TokenManager::with_storage(storage.clone(), "nimbus.tokens");
        writer.store_tokens(tokens(Some(3600), None)).await.unwrap();

        // A fresh manager over the same storage sees the persisted set.
        let reader = TokenManager::with_storage(storage, "nimbus.tokens");
        let loaded = reader.get_tokens().await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "access");
        assert_eq!(loaded.sub, "did:plc:abc");
    }

    #[tokio::test]
    async fn test_clear_removes_storage() {
        let storage = Arc::new(MemorySecureStorage::new());

        let manager = TokenManager::with_storage(storage.clone(), "nimbus.tokens");
        manager.store_tokens(tokens(Some(3600), None)).await.unwrap();
        manager.clear_tokens().await.unwrap();

        let reader = TokenManager::with_storage(storage, "nimbus.tokens");
        assert_eq!(reader.get_tokens().await.unwrap(), None);
    }
}
