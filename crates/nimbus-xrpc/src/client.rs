//! XRPC client: typed queries, procedures, and blob uploads.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use nimbus_common::atproto::Nsid;
use nimbus_common::{BlobRef, Error, Result};

use crate::executor::{HttpExecutor, HttpRequest, HttpResponse};
use crate::rate_limit::RateLimit;
use crate::request::RequestBuilder;

/// Fixed endpoint for blob uploads.
pub const UPLOAD_BLOB_NSID: &str = "com.atproto.repo.uploadBlob";

/// Supplies the `Authorization` header value for outgoing requests.
///
/// The provider is consulted before every dispatch, so token refresh can
/// happen behind it.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    /// Returns the full header value (e.g. `Bearer <token>` or `DPoP <token>`).
    async fn authorization(&self) -> Result<String>;
}

/// Response body of a blob upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobUploadResponse {
    /// Reference to the stored blob.
    pub blob: BlobRef,
}

/// Error body shape XRPC servers return.
#[derive(Debug, Clone, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// XRPC client bound to one service.
pub struct XrpcClient {
    service_url: String,
    executor: Arc<dyn HttpExecutor>,
    authorization_provider: RwLock<Option<Arc<dyn AuthorizationProvider>>>,
}

impl XrpcClient {
    /// Creates a client for the given service base URL.
    #[must_use]
    pub fn new(service_url: impl Into<String>, executor: Arc<dyn HttpExecutor>) -> Self {
        Self {
            service_url: service_url.into(),
            executor,
            authorization_provider: RwLock::new(None),
        }
    }

    /// Returns the service base URL this client targets.
    #[must_use]
    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    /// Installs an authorization provider consulted on every request.
    pub fn set_authorization_provider(&self, provider: Arc<dyn AuthorizationProvider>) {
        *self.authorization_provider.write() = Some(provider);
    }

    /// Removes the authorization provider.
    pub fn clear_authorization_provider(&self) {
        *self.authorization_provider.write() = None;
    }

    /// Executes a query (GET) and decodes the response body.
    ///
    /// # Errors
    /// Returns an error on invalid NSID, transport failure, non-success
    /// status, or an undecodable body.
    pub async fn query<T: DeserializeOwned>(
        &self,
        nsid: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        Nsid::validate(nsid)?;
        debug!(nsid, "XRPC query");

        let request = RequestBuilder::get(&self.service_url, nsid)
            .params(params.iter().map(|(k, v)| (*k, *v)))
            .build();
        let response = self.dispatch(request).await?;
        self.decode_success(nsid, &response)
    }

    /// Executes a procedure (POST) with an optional JSON input, decoding the
    /// response body.
    ///
    /// # Errors
    /// Returns an error on invalid NSID, encoding failure, transport
    /// failure, non-success status, or an undecodable body.
    pub async fn procedure<I, O>(&self, nsid: &str, input: Option<&I>) -> Result<O>
    where
        I: Serialize + Sync,
        O: DeserializeOwned,
    {
        Nsid::validate(nsid)?;
        debug!(nsid, "XRPC procedure");

        let response = self.dispatch_procedure(nsid, input).await?;
        self.decode_success(nsid, &response)
    }

    /// Executes a procedure whose response body is ignored; only the HTTP
    /// status is validated.
    ///
    /// # Errors
    /// Returns an error on invalid NSID, transport failure, or non-success
    /// status.
    pub async fn procedure_unit<I>(&self, nsid: &str, input: Option<&I>) -> Result<()>
    where
        I: Serialize + Sync,
    {
        Nsid::validate(nsid)?;
        debug!(nsid, "XRPC procedure (no output)");

        self.dispatch_procedure(nsid, input).await?;
        Ok(())
    }

    /// Uploads raw blob bytes with the given MIME type.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-success status, or an
    /// undecodable body.
    pub async fn upload_blob(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<BlobUploadResponse> {
        debug!(mime_type, size = bytes.len(), "XRPC blob upload");

        let request = RequestBuilder::post(&self.service_url, UPLOAD_BLOB_NSID)
            .header("Content-Type", mime_type)
            .body(bytes)
            .build();
        let response = self.dispatch(request).await?;
        self.decode_success(UPLOAD_BLOB_NSID, &response)
    }

    async fn dispatch_procedure<I>(&self, nsid: &str, input: Option<&I>) -> Result<HttpResponse>
    where
        I: Serialize + Sync,
    {
        let mut builder = RequestBuilder::post(&self.service_url, nsid);
        if let Some(input) = input {
            let body =
                serde_json::to_vec(input).map_err(|e| Error::Encoding(e.to_string()))?;
            builder = builder.body(body);
        }
        self.dispatch(builder.build()).await
    }

    async fn dispatch(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        let provider = self.authorization_provider.read().clone();
        if let Some(provider) = provider {
            let authorization = provider.authorization().await?;
            request.set_header("authorization", authorization);
        }

        let response = self.executor.execute(request).await?;
        trace!(status = response.status, "XRPC response");

        if response.is_success() {
            Ok(response)
        } else {
            Err(map_error(&response))
        }
    }

    fn decode_success<T: DeserializeOwned>(
        &self,
        nsid: &str,
        response: &HttpResponse,
    ) -> Result<T> {
        serde_json::from_slice(&response.body)
            .map_err(|e| Error::Decoding(format!("{nsid} response: {e}")))
    }
}

/// Maps a non-success response to an error kind.
fn map_error(response: &HttpResponse) -> Error {
    let body: Option<XrpcErrorBody> = serde_json::from_slice(&response.body).ok();
    let (error, message) = body
        .map(|b| (b.error, b.message))
        .unwrap_or((None, None));

    match response.status {
        401 if error.as_deref() == Some("ExpiredToken") => Error::TokenExpired,
        401 => Error::Unauthorized,
        429 => {
            let limits = RateLimit::from_response(response);
            warn!(?limits, "rate limited");
            Error::Xrpc {
                status: 429,
                error: Some(error.unwrap_or_else(|| "RateLimitExceeded".to_string())),
                message: Some(message.unwrap_or_else(|| "Rate limit exceeded".to_string())),
            }
        }
        status => Error::Xrpc {
            status,
            error,
            message,
        },
    }
}
