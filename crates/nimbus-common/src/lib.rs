//! Common types and utilities for the nimbus AT Protocol client SDK.
//!
//! This crate provides the shared primitives used across the workspace:
//! - AT Protocol identifiers (DID, Handle, NSID, `AtUri`, TID)
//! - CID handling and the `CidLink`/`BlobRef` JSON envelopes
//! - CBOR encoding/decoding utilities
//! - P-256 cryptography (ES256, JWK, multikey)
//! - The common error type

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod atproto;
pub mod blob;
pub mod cbor;
pub mod cid;
pub mod crypto;
pub mod error;

pub use atproto::{AtUri, Did, DidMethod, Handle, Nsid, Tid};
pub use blob::BlobRef;
pub use cid::{Cid, CidLink};
pub use error::{Error, Result};
