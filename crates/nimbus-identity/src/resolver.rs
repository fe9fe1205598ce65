//! DID resolution.
//!
//! `did:plc` resolves through a PLC directory; `did:web` resolves through
//! the domain's `did.json`. The composite [`DidResolver`] dispatches on the
//! DID method. Network failures surface as [`Error::DidResolution`], never
//! as raw transport errors.

use std::sync::Arc;

use tracing::debug;

use nimbus_common::atproto::{Did, DidMethod};
use nimbus_common::{Error, Result};
use nimbus_xrpc::executor::{HttpExecutor, HttpMethod, HttpRequest};

use crate::doc::DidDocument;

/// Default PLC directory URL.
pub const PLC_DIRECTORY_URL: &str = "https://plc.directory";

/// Resolves `did:plc` identifiers against a PLC directory.
pub struct PlcResolver {
    directory_url: String,
    executor: Arc<dyn HttpExecutor>,
}

impl PlcResolver {
    /// Creates a resolver against the default PLC directory.
    #[must_use]
    pub fn new(executor: Arc<dyn HttpExecutor>) -> Self {
        Self::with_directory(PLC_DIRECTORY_URL, executor)
    }

    /// Creates a resolver against a custom directory URL.
    #[must_use]
    pub fn with_directory(directory_url: impl Into<String>, executor: Arc<dyn HttpExecutor>) -> Self {
        Self {
            directory_url: directory_url.into(),
            executor,
        }
    }

    /// Resolves a `did:plc` DID to its document.
    ///
    /// # Errors
    /// Returns an error if the DID is not `did:plc` or resolution fails.
    pub async fn resolve(&self, did: &Did) -> Result<DidDocument> {
        if did.method() != DidMethod::Plc {
            return Err(Error::DidResolution(format!(
                "PLC resolver cannot handle method '{}'",
                did.method_str()
            )));
        }

        let url = format!("{}/{}", self.directory_url.trim_end_matches('/'), did);
        debug!(%did, %url, "resolving PLC DID");
        fetch_document(&self.executor, &url).await
    }
}

/// Resolves `did:web` identifiers via the domain's well-known document.
pub struct WebResolver {
    executor: Arc<dyn HttpExecutor>,
}

impl WebResolver {
    /// Creates a new web resolver.
    #[must_use]
    pub fn new(executor: Arc<dyn HttpExecutor>) -> Self {
        Self { executor }
    }

    /// Resolves a `did:web` DID to its document.
    ///
    /// A bare domain fetches `https://<domain>/.well-known/did.json`; an
    /// identifier with colon-separated path segments fetches
    /// `https://<domain>/<path>/did.json`.
    ///
    /// # Errors
    /// Returns an error if the DID is not `did:web` or resolution fails.
    pub async fn resolve(&self, did: &Did) -> Result<DidDocument> {
        if did.method() != DidMethod::Web {
            return Err(Error::DidResolution(format!(
                "web resolver cannot handle method '{}'",
                did.method_str()
            )));
        }

        let mut parts = did.identifier().split(':');
        let domain = parts.next().unwrap_or("");
        let path: Vec<&str> = parts.collect();

        let url = if path.is_empty() {
            format!("https://{domain}/.well-known/did.json")
        } else {
            format!("https://{domain}/{}/did.json", path.join("/"))
        };

        debug!(%did, %url, "resolving web DID");
        fetch_document(&self.executor, &url).await
    }
}

/// Composite resolver dispatching on DID method.
pub struct DidResolver {
    plc: PlcResolver,
    web: WebResolver,
}

impl DidResolver {
    /// Creates a composite resolver with the default PLC directory.
    #[must_use]
    pub fn new(executor: Arc<dyn HttpExecutor>) -> Self {
        Self {
            plc: PlcResolver::new(executor.clone()),
            web: WebResolver::new(executor),
        }
    }

    /// Creates a composite resolver with a custom PLC directory URL.
    #[must_use]
    pub fn with_plc_directory(
        directory_url: impl Into<String>,
        executor: Arc<dyn HttpExecutor>,
    ) -> Self {
        Self {
            plc: PlcResolver::with_directory(directory_url, executor.clone()),
            web: WebResolver::new(executor),
        }
    }

    /// Resolves a DID to its document.
    ///
    /// # Errors
    /// Returns an error for unsupported methods or failed resolution.
    pub async fn resolve(&self, did: &Did) -> Result<DidDocument> {
        match did.method() {
            DidMethod::Plc => self.plc.resolve(did).await,
            DidMethod::Web => self.web.resolve(did).await,
            DidMethod::Key | DidMethod::Other => Err(Error::DidResolution(format!(
                "unsupported method '{}'",
                did.method_str()
            ))),
        }
    }
}

async fn fetch_document(executor: &Arc<dyn HttpExecutor>, url: &str) -> Result<DidDocument> {
    let mut request = HttpRequest::new(HttpMethod::Get, url);
    request.set_header("accept", "application/json");

    let response = executor
        .execute(request)
        .await
        .map_err(|e| Error::DidResolution(e.to_string()))?;

    if !response.is_success() {
        return Err(Error::DidResolution(format!(
            "HTTP {} from {url}",
            response.status
        )));
    }

    serde_json::from_slice(&response.body)
        .map_err(|e| Error::DidResolution(format!("invalid DID document: {e}")))
}
