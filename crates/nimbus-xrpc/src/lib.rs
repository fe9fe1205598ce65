//! XRPC request engine for the nimbus client SDK.
//!
//! This crate provides:
//! - A transport-agnostic HTTP request/response model and the
//!   [`executor::HttpExecutor`] capability (with a `reqwest` default)
//! - XRPC request construction with stable, key-sorted query strings
//! - The [`client::XrpcClient`] with typed queries, procedures, blob
//!   uploads, and structured error mapping
//! - Rate-limit header parsing
//! - A [`testing::MockExecutor`] for consumers' tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod executor;
pub mod rate_limit;
pub mod request;
pub mod testing;

pub use client::{AuthorizationProvider, BlobUploadResponse, XrpcClient};
pub use executor::{HttpExecutor, HttpMethod, HttpRequest, HttpResponse, ReqwestExecutor};
pub use rate_limit::RateLimit;
