//! PDS discovery.
//!
//! An identity's PDS is the service entry typed `AtprotoPersonalDataServer`
//! with id `#atproto_pds` in its DID document. From a PDS, the OAuth
//! authorization server is advertised by the protected-resource metadata.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use nimbus_common::atproto::{Did, Handle};
use nimbus_common::{Error, Result};
use nimbus_xrpc::executor::{HttpExecutor, HttpMethod, HttpRequest};

use crate::handle::HandleResolver;
use crate::resolver::DidResolver;

/// Service type identifying a PDS in a DID document.
pub const PDS_SERVICE_TYPE: &str = "AtprotoPersonalDataServer";

/// Service id identifying a PDS in a DID document.
pub const PDS_SERVICE_ID: &str = "#atproto_pds";

#[derive(Debug, Deserialize)]
struct ProtectedResourceMetadata {
    #[serde(default)]
    authorization_servers: Vec<String>,
}

/// Discovers PDS endpoints and their authorization servers.
pub struct PdsDiscovery {
    did_resolver: DidResolver,
    handle_resolver: HandleResolver,
    executor: Arc<dyn HttpExecutor>,
}

impl PdsDiscovery {
    /// Creates a discovery service with the default PLC directory.
    #[must_use]
    pub fn new(executor: Arc<dyn HttpExecutor>) -> Self {
        Self {
            did_resolver: DidResolver::new(executor.clone()),
            handle_resolver: HandleResolver::new(executor.clone()),
            executor,
        }
    }

    /// Creates a discovery service with a custom PLC directory URL.
    #[must_use]
    pub fn with_plc_directory(
        directory_url: impl Into<String>,
        executor: Arc<dyn HttpExecutor>,
    ) -> Self {
        Self {
            did_resolver: DidResolver::with_plc_directory(directory_url, executor.clone()),
            handle_resolver: HandleResolver::new(executor.clone()),
            executor,
        }
    }

    /// Finds the PDS endpoint URL for a DID.
    ///
    /// # Errors
    /// Returns [`Error::PdsNotFound`] when the document carries no matching
    /// service entry or its endpoint is not a valid URL.
    pub async fn pds_for_did(&self, did: &Did) -> Result<Url> {
        let doc = self.did_resolver.resolve(did).await?;

        let endpoint = doc
            .service
            .iter()
            .find(|s| s.service_type == PDS_SERVICE_TYPE && s.id == PDS_SERVICE_ID)
            .map(|s| s.service_endpoint.clone())
            .ok_or_else(|| {
                Error::PdsNotFound(format!("no PDS service entry in document for {did}"))
            })?;

        debug!(%did, %endpoint, "discovered PDS");
        Url::parse(&endpoint)
            .map_err(|e| Error::PdsNotFound(format!("invalid PDS endpoint '{endpoint}': {e}")))
    }

    /// Finds the PDS endpoint URL for a handle by resolving it first.
    ///
    /// # Errors
    /// Returns an error if handle resolution or PDS discovery fails.
    pub async fn pds_for_handle(&self, handle: &Handle) -> Result<Url> {
        let did = self.handle_resolver.resolve(handle).await?;
        self.pds_for_did(&did).await
    }

    /// Finds the authorization server a PDS delegates to.
    ///
    /// # Errors
    /// Returns [`Error::PdsNotFound`] when the metadata is unreachable or
    /// advertises no authorization servers.
    pub async fn auth_server_for_pds(&self, pds_url: &Url) -> Result<String> {
        let url = format!(
            "{}/.well-known/oauth-protected-resource",
            pds_url.as_str().trim_end_matches('/')
        );

        let mut request = HttpRequest::new(HttpMethod::Get, &url);
        request.set_header("accept", "application/json");

        let response = self
            .executor
            .execute(request)
            .await
            .map_err(|e| Error::PdsNotFound(format!("auth server discovery failed: {e}")))?;

        if !response.is_success() {
            return Err(Error::PdsNotFound(format!(
                "HTTP {} from {url}",
                response.status
            )));
        }

        let metadata: ProtectedResourceMetadata = serde_json::from_slice(&response.body)
            .map_err(|e| Error::PdsNotFound(format!("invalid protected resource metadata: {e}")))?;

        metadata
            .authorization_servers
            .into_iter()
            .next()
            .ok_or_else(|| Error::PdsNotFound("no authorization servers advertised".to_string()))
    }
}
