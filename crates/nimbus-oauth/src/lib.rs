//! OAuth 2.1 client flow for the nimbus SDK.
//!
//! This crate implements the client side of:
//! - RFC 7636 PKCE (Proof Key for Code Exchange, S256)
//! - RFC 9126 PAR (Pushed Authorization Requests)
//! - RFC 9449 `DPoP` (Demonstrating Proof of Possession) with bounded
//!   nonce retry
//! - Token lifecycle with optional secure-storage persistence

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod dpop;
pub mod form;
pub mod metadata;
pub mod pkce;
pub mod session;
pub mod storage;
pub mod tokens;

pub use client::{OAuthClient, OAuthConfig};
pub use dpop::DpopManager;
pub use metadata::{AuthServerDiscovery, AuthServerMetadata};
pub use pkce::Pkce;
pub use session::OAuthSession;
pub use storage::{MemorySecureStorage, SecureStorage};
pub use tokens::{TokenManager, TokenSet};
