//! Handle-to-DID resolution.
//!
//! Handles resolve over HTTPS via the `/.well-known/atproto-did` document.

use std::sync::Arc;

use tracing::debug;

use nimbus_common::atproto::{Did, Handle};
use nimbus_common::{Error, Result};
use nimbus_xrpc::executor::{HttpExecutor, HttpMethod, HttpRequest};

/// Resolves handles to DIDs over HTTPS.
pub struct HandleResolver {
    executor: Arc<dyn HttpExecutor>,
}

impl HandleResolver {
    /// Creates a new handle resolver.
    #[must_use]
    pub fn new(executor: Arc<dyn HttpExecutor>) -> Self {
        Self { executor }
    }

    /// Resolves a handle to the DID it declares.
    ///
    /// # Errors
    /// Returns [`Error::HandleResolution`] if the request fails or the
    /// response body is not a valid DID.
    pub async fn resolve(&self, handle: &Handle) -> Result<Did> {
        let url = format!("https://{handle}/.well-known/atproto-did");
        debug!(%handle, %url, "resolving handle");

        let mut request = HttpRequest::new(HttpMethod::Get, &url);
        request.set_header("accept", "text/plain");

        let response = self
            .executor
            .execute(request)
            .await
            .map_err(|e| Error::HandleResolution(e.to_string()))?;

        if !response.is_success() {
            return Err(Error::HandleResolution(format!(
                "HTTP {} from {url}",
                response.status
            )));
        }

        let body = String::from_utf8(response.body)
            .map_err(|_| Error::HandleResolution("response body is not UTF-8".to_string()))?;

        Did::new(body.trim())
            .map_err(|e| Error::HandleResolution(format!("invalid DID in response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_xrpc::testing::MockExecutor;

    #[tokio::test]
    async fn test_resolve_trims_whitespace() {
        let mock = Arc::new(MockExecutor::new());
        mock.enqueue_json(200, "  did:plc:abc123\n");

        let resolver = HandleResolver::new(mock.clone());
        let handle = Handle::new("alice.bsky.social").unwrap();
        let did = resolver.resolve(&handle).await.unwrap();

        assert_eq!(did.as_str(), "did:plc:abc123");
        let captured = mock.captured();
        assert_eq!(
            captured[0].url,
            "https://alice.bsky.social/.well-known/atproto-did"
        );
        assert_eq!(captured[0].header("accept"), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_resolve_rejects_invalid_did_body() {
        let mock = Arc::new(MockExecutor::new());
        mock.enqueue_json(200, "not a did");

        let resolver = HandleResolver::new(mock);
        let handle = Handle::new("alice.bsky.social").unwrap();

        assert!(matches!(
            resolver.resolve(&handle).await,
            Err(Error::HandleResolution(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_maps_http_errors() {
        let mock = Arc::new(MockExecutor::new());
        mock.enqueue_json(404, "");

        let resolver = HandleResolver::new(mock);
        let handle = Handle::new("alice.bsky.social").unwrap();

        match resolver.resolve(&handle).await {
            Err(Error::HandleResolution(reason)) => assert!(reason.contains("404")),
            other => panic!("expected handle resolution failure, got {other:?}"),
        }
    }
}
