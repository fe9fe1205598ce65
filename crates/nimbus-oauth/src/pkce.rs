//! PKCE (Proof Key for Code Exchange) implementation.
//!
//! RFC 7636 with the S256 method. Verifiers are fixed at 43 characters of
//! the base64url alphabet (32 bytes of entropy).

use nimbus_common::cid::{base64url_encode, sha256};
use nimbus_common::crypto::generate_random_bytes;

/// The only challenge method this SDK emits.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// A PKCE verifier/challenge pair.
#[derive(Debug, Clone)]
pub struct Pkce {
    /// The code verifier sent at token exchange.
    pub verifier: String,
    /// The S256 challenge sent at authorization.
    pub challenge: String,
}

impl Pkce {
    /// Generates a fresh verifier and its challenge.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = base64url_encode(&generate_random_bytes(32));
        let challenge = compute_s256_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// Computes the S256 code challenge: `BASE64URL(SHA256(verifier))`.
#[must_use]
pub fn compute_s256_challenge(verifier: &str) -> String {
    base64url_encode(&sha256(verifier.as_bytes()))
}
