//! Identity resolution for the nimbus client SDK.
//!
//! This crate resolves the three layers of AT Protocol identity:
//! - DID → DID document (PLC directory and `did:web`)
//! - Handle → DID (HTTPS well-known)
//! - DID/handle → PDS endpoint → authorization server

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod doc;
pub mod handle;
pub mod pds;
pub mod resolver;

pub use doc::{DidDocument, Service, VerificationMethod};
pub use handle::HandleResolver;
pub use pds::PdsDiscovery;
pub use resolver::{DidResolver, PlcResolver, WebResolver, PLC_DIRECTORY_URL};
