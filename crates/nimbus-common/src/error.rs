//! The common error type for the nimbus SDK.
//!
//! Every crate in the workspace surfaces failures through this single enum so
//! that callers match on error kinds, not on crate-local types.

use thiserror::Error;

/// Result type alias using the common `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur across the nimbus SDK.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid DID format.
    #[error("invalid DID: {0}")]
    InvalidDid(String),

    /// Invalid handle format.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// Invalid NSID format.
    #[error("invalid NSID: {0}")]
    InvalidNsid(String),

    /// Invalid AT URI format.
    #[error("invalid AT URI: {0}")]
    InvalidAtUri(String),

    /// Invalid TID format.
    #[error("invalid TID: {0}")]
    InvalidTid(String),

    /// Invalid CID format.
    #[error("invalid CID: {0}")]
    InvalidCid(String),

    /// Underlying transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded its timeout.
    #[error("request timed out")]
    Timeout,

    /// A URL could not be parsed or constructed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Structured XRPC error returned by the server.
    #[error("XRPC error {status}: {}: {}", .error.as_deref().unwrap_or("Unknown"), .message.as_deref().unwrap_or("no message"))]
    Xrpc {
        /// HTTP status code.
        status: u16,
        /// Error code from the response body, when present.
        error: Option<String>,
        /// Human-readable message from the response body, when present.
        message: Option<String>,
    },

    /// The response shape did not match what the endpoint declares.
    #[error("invalid response")]
    InvalidResponse,

    /// A success body failed to decode into the expected type.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// A request body failed to encode.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The request was rejected for lack of valid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// The access token has expired.
    #[error("token expired")]
    TokenExpired,

    /// A token refresh attempt failed.
    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// Structured OAuth error response.
    #[error("OAuth error {error}: {}", .description.as_deref().unwrap_or("no description"))]
    OAuth {
        /// The OAuth error code (e.g. `invalid_grant`).
        error: String,
        /// Optional `error_description` field.
        description: Option<String>,
        /// Optional `error_uri` field.
        uri: Option<String>,
    },

    /// An authenticated session is required but none is active.
    #[error("session required")]
    SessionRequired,

    /// A DID could not be resolved to a document.
    #[error("DID resolution failed: {0}")]
    DidResolution(String),

    /// A handle could not be resolved to a DID.
    #[error("handle resolution failed: {0}")]
    HandleResolution(String),

    /// No PDS endpoint could be located for an identity.
    #[error("PDS not found: {0}")]
    PdsNotFound(String),

    /// A record payload failed validation.
    #[error("invalid record")]
    InvalidRecord,

    /// A record does not exist at the given location.
    #[error("record not found: {collection}/{rkey}")]
    RecordNotFound {
        /// The record's collection NSID.
        collection: String,
        /// The record key.
        rkey: String,
    },

    /// Repository-level failure (CAR framing, block storage).
    #[error("repository error: {0}")]
    Repository(String),

    /// Merkle search tree traversal failure.
    #[error("MST error: {0}")]
    Mst(String),

    /// Cryptographic operation failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// A signature failed verification.
    #[error("invalid signature")]
    InvalidSignature,

    /// A key or signature algorithm this SDK does not support.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The event stream connection was closed.
    #[error("connection closed: {}", .0.as_deref().unwrap_or("no reason"))]
    ConnectionClosed(Option<String>),

    /// A firehose frame could not be decoded.
    #[error("frame decoding error: {0}")]
    FrameDecoding(String),

    /// Invariant violation inside the SDK itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Decoding(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Self::Decoding(format!("base64: {e}"))
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidUrl(e.to_string())
    }
}
