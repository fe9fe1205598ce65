//! Authorization-server metadata discovery.
//!
//! RFC 8414: metadata lives at `<issuer>/.well-known/oauth-authorization-server`
//! and MUST advertise the requested issuer. Results are memoized per issuer.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nimbus_common::{Error, Result};
use nimbus_xrpc::executor::{HttpExecutor, HttpMethod, HttpRequest};

/// Authorization-server metadata fields the client consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthServerMetadata {
    /// The server's issuer identifier.
    pub issuer: String,
    /// Authorization endpoint URL.
    pub authorization_endpoint: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// PAR endpoint URL, when supported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_authorization_request_endpoint: Option<String>,
    /// Scopes the server advertises.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,
    /// DPoP signing algorithms the server accepts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dpop_signing_alg_values_supported: Vec<String>,
}

/// Fetches and memoizes authorization-server metadata.
pub struct AuthServerDiscovery {
    executor: Arc<dyn HttpExecutor>,
    cache: Mutex<HashMap<String, AuthServerMetadata>>,
}

impl AuthServerDiscovery {
    /// Creates a new discovery service.
    #[must_use]
    pub fn new(executor: Arc<dyn HttpExecutor>) -> Self {
        Self {
            executor,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetches metadata for an issuer, using the cache when warm.
    ///
    /// # Errors
    /// Returns an OAuth `invalid_issuer` error when the advertised issuer
    /// does not match the requested one, or other errors on fetch failure.
    pub async fn discover(&self, issuer: &str) -> Result<AuthServerMetadata> {
        if let Some(cached) = self.cache.lock().get(issuer) {
            return Ok(cached.clone());
        }

        let url = format!(
            "{}/.well-known/oauth-authorization-server",
            issuer.trim_end_matches('/')
        );
        debug!(issuer, %url, "discovering authorization server metadata");

        let mut request = HttpRequest::new(HttpMethod::Get, &url);
        request.set_header("accept", "application/json");

        let response = self.executor.execute(request).await?;
        if !response.is_success() {
            return Err(Error::OAuth {
                error: "server_error".to_string(),
                description: Some(format!("metadata fetch returned HTTP {}", response.status)),
                uri: None,
            });
        }

        let metadata: AuthServerMetadata = serde_json::from_slice(&response.body)
            .map_err(|e| Error::Decoding(format!("authorization server metadata: {e}")))?;

        if metadata.issuer != issuer {
            return Err(Error::OAuth {
                error: "invalid_issuer".to_string(),
                description: Some(format!(
                    "metadata advertises issuer '{}', expected '{issuer}'",
                    metadata.issuer
                )),
                uri: None,
            });
        }

        self.cache
            .lock()
            .insert(issuer.to_string(), metadata.clone());
        Ok(metadata)
    }
}
