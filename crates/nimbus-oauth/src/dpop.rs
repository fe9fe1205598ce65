//! `DPoP` (Demonstrating Proof of Possession) proof generation.
//!
//! RFC 9449: each request to a DPoP-protected endpoint carries a compact
//! ES256 JWT signed by a per-client P-256 key, binding the request method
//! and URL (and, for resource requests, the access token hash).

use parking_lot::Mutex;
use serde_json::json;

use nimbus_common::cid::{base64url_encode, sha256};
use nimbus_common::crypto::{der_signature_to_raw, Jwk, Keypair};
use nimbus_common::{Error, Result};

/// Generates `DPoP` proofs and tracks the server-issued nonce.
pub struct DpopManager {
    keypair: Keypair,
    server_nonce: Mutex<Option<String>>,
}

impl Default for DpopManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DpopManager {
    /// Creates a manager with a freshly generated P-256 key pair.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keypair: Keypair::generate(),
            server_nonce: Mutex::new(None),
        }
    }

    /// Creates a manager around an existing key pair.
    #[must_use]
    pub fn with_keypair(keypair: Keypair) -> Self {
        Self {
            keypair,
            server_nonce: Mutex::new(None),
        }
    }

    /// Returns the public JWK embedded in proof headers.
    #[must_use]
    pub fn public_jwk(&self) -> Jwk {
        Jwk::from_public_key(&self.keypair.public_key())
    }

    /// Returns the key's RFC 7638 thumbprint.
    ///
    /// # Errors
    /// Returns an error if thumbprint computation fails.
    pub fn thumbprint(&self) -> Result<String> {
        self.public_jwk().thumbprint()
    }

    /// Stores a server-provided nonce for inclusion in subsequent proofs.
    /// A later nonce replaces the current one.
    pub fn update_nonce(&self, nonce: impl Into<String>) {
        *self.server_nonce.lock() = Some(nonce.into());
    }

    /// Returns the currently stored nonce, if any.
    #[must_use]
    pub fn nonce(&self) -> Option<String> {
        self.server_nonce.lock().clone()
    }

    /// Creates a compact `DPoP` proof JWT for a request.
    ///
    /// The `htu` claim strips any query string or fragment from `url`; the
    /// `htm` claim upper-cases `method`. When an access token is supplied
    /// its SHA-256 hash is bound via `ath`. The stored nonce, if any, is
    /// included.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn create_proof(
        &self,
        method: &str,
        url: &str,
        access_token: Option<&str>,
    ) -> Result<String> {
        let jwk = self.public_jwk();
        // serde_json maps serialize with lexicographically ordered keys.
        let header = json!({
            "typ": "dpop+jwt",
            "alg": "ES256",
            "jwk": {
                "kty": jwk.kty,
                "crv": jwk.crv,
                "x": jwk.x,
                "y": jwk.y,
            },
        });

        let htu = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_string();

        let mut payload = json!({
            "jti": uuid::Uuid::new_v4().to_string(),
            "htm": method.to_uppercase(),
            "htu": htu,
            "iat": unix_now(),
        });
        if let Some(nonce) = self.nonce() {
            payload["nonce"] = json!(nonce);
        }
        if let Some(token) = access_token {
            payload["ath"] = json!(base64url_encode(&sha256(token.as_bytes())));
        }

        let header_b64 = base64url_encode(
            serde_json::to_string(&header)
                .map_err(|e| Error::Crypto(format!("failed to serialize header: {e}")))?
                .as_bytes(),
        );
        let payload_b64 = base64url_encode(
            serde_json::to_string(&payload)
                .map_err(|e| Error::Crypto(format!("failed to serialize payload: {e}")))?
                .as_bytes(),
        );

        let signing_input = format!("{header_b64}.{payload_b64}");
        let der = self.keypair.sign(signing_input.as_bytes())?;
        let raw = der_signature_to_raw(&der)?;
        let signature_b64 = base64url_encode(&raw);

        Ok(format!("{signing_input}.{signature_b64}"))
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
