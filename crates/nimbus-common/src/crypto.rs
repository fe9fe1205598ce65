//! Cryptography utilities.
//!
//! This module provides P-256 key management and ES256 signing used for
//! `DPoP` proofs and token binding, along with JWK conversion, RFC 7638
//! thumbprints, DER signature handling, and multikey encoding.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::cid::{base64url_encode, sha256};
use crate::error::Error;

/// Multicodec prefix for a compressed P-256 public key.
pub const P256_MULTICODEC_PREFIX: [u8; 2] = [0x80, 0x24];

/// Multicodec prefix for a compressed secp256k1 public key.
pub const SECP256K1_MULTICODEC_PREFIX: [u8; 2] = [0xe7, 0x01];

/// Key algorithms recognized in multikey encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// NIST P-256 (ES256).
    P256,
    /// secp256k1 (ES256K).
    Secp256k1,
}

/// A P-256 key pair for ES256 signing operations.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generates a new random key pair.
    #[must_use]
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        Self { signing_key }
    }

    /// Creates a key pair from a raw 32-byte private scalar.
    ///
    /// # Errors
    /// Returns an error if the key is not exactly 32 bytes or is not a
    /// valid scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 32 {
            return Err(Error::Crypto(format!(
                "private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| Error::Crypto(format!("invalid private key: {e}")))?;
        Ok(Self { signing_key })
    }

    /// Creates a key pair from a hex-encoded private key.
    ///
    /// # Errors
    /// Returns an error if the hex string or key is invalid.
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        let bytes = hex::decode(hex).map_err(|e| Error::Crypto(format!("invalid hex: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Returns the raw private key scalar.
    #[must_use]
    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }

    /// Returns the private key as a hex string.
    #[must_use]
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.private_key_bytes())
    }

    /// Returns the public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: *self.signing_key.verifying_key(),
        }
    }

    /// Signs data, producing a DER-encoded ECDSA signature.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let signature: Signature = self.signing_key.sign(data);
        Ok(signature.to_der().as_bytes().to_vec())
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key().to_multikey())
            .finish_non_exhaustive()
    }
}

/// A P-256 public key for verification.
#[derive(Clone)]
pub struct PublicKey {
    verifying_key: VerifyingKey,
}

impl PublicKey {
    /// Creates a public key from SEC1 bytes (compressed 33-byte form).
    ///
    /// # Errors
    /// Returns an error if the key bytes are invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let verifying_key = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| Error::Crypto(format!("invalid public key: {e}")))?;
        Ok(Self { verifying_key })
    }

    /// Returns the compressed public key bytes (33 bytes).
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.verifying_key
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    /// Returns the uncompressed x and y coordinates (32 bytes each).
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn coordinates(&self) -> ([u8; 32], [u8; 32]) {
        let point = self.verifying_key.to_encoded_point(false);
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        // Safety: uncompressed points always carry both coordinates
        x.copy_from_slice(point.x().expect("uncompressed point has x"));
        y.copy_from_slice(point.y().expect("uncompressed point has y"));
        (x, y)
    }

    /// Verifies a DER-encoded ECDSA signature against this public key.
    #[must_use]
    pub fn verify(&self, signature: &[u8], data: &[u8]) -> bool {
        let Ok(sig) = Signature::from_der(signature) else {
            return false;
        };
        self.verifying_key.verify(data, &sig).is_ok()
    }

    /// Returns the key as a `did:key` multikey string.
    #[must_use]
    pub fn to_multikey(&self) -> String {
        let mut bytes = P256_MULTICODEC_PREFIX.to_vec();
        bytes.extend_from_slice(&self.to_bytes());
        format!(
            "did:key:{}",
            multibase::encode(multibase::Base::Base58Btc, bytes)
        )
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("multikey", &self.to_multikey())
            .finish()
    }
}

/// Generates a new P-256 key pair.
#[must_use]
pub fn generate_p256_keypair() -> Keypair {
    Keypair::generate()
}

/// Signs data with a raw 32-byte private key, producing a DER signature.
///
/// # Errors
/// Returns an error if the private key is invalid.
pub fn sign(data: &[u8], private_key: &[u8]) -> Result<Vec<u8>, Error> {
    Keypair::from_bytes(private_key)?.sign(data)
}

/// Verifies a DER signature against a compressed public key.
#[must_use]
pub fn verify(signature: &[u8], data: &[u8], public_key: &[u8]) -> bool {
    PublicKey::from_bytes(public_key).is_ok_and(|pk| pk.verify(signature, data))
}

/// Generates `n` cryptographically secure random bytes.
#[must_use]
pub fn generate_random_bytes(n: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; n];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Converts a DER-encoded ECDSA signature to the raw 64-byte `R || S` form
/// ES256 JWTs carry.
///
/// # Errors
/// Returns an error if the DER structure is invalid.
pub fn der_signature_to_raw(der: &[u8]) -> Result<[u8; 64], Error> {
    if der.len() < 8 || der[0] != 0x30 {
        return Err(Error::Crypto("invalid DER signature prefix".into()));
    }

    let mut pos = 2; // skip SEQUENCE header
    let r = read_der_integer(der, &mut pos)?;
    let s = read_der_integer(der, &mut pos)?;

    let mut raw = [0u8; 64];
    write_padded(&mut raw[..32], &r)?;
    write_padded(&mut raw[32..], &s)?;
    Ok(raw)
}

fn read_der_integer<'a>(der: &'a [u8], pos: &mut usize) -> Result<&'a [u8], Error> {
    if der.len() < *pos + 2 || der[*pos] != 0x02 {
        return Err(Error::Crypto("invalid DER integer tag".into()));
    }
    let len = der[*pos + 1] as usize;
    let start = *pos + 2;
    let end = start + len;
    if der.len() < end {
        return Err(Error::Crypto("DER integer truncated".into()));
    }
    *pos = end;

    let mut bytes = &der[start..end];
    // A leading zero pads integers whose high bit is set; strip it.
    if bytes.len() == 33 && bytes[0] == 0x00 {
        bytes = &bytes[1..];
    }
    Ok(bytes)
}

fn write_padded(out: &mut [u8], value: &[u8]) -> Result<(), Error> {
    if value.len() > out.len() {
        return Err(Error::Crypto("DER integer too large".into()));
    }
    let start = out.len() - value.len();
    out[start..].copy_from_slice(value);
    Ok(())
}

/// Encodes a compressed public key as a `did:key` multikey string.
#[must_use]
pub fn encode_multikey(public_key: &PublicKey) -> String {
    public_key.to_multikey()
}

/// Decodes a multikey string into its algorithm and key bytes.
///
/// Accepts the bare multibase form or the full `did:key:` form.
///
/// # Errors
/// Returns an error if the encoding is invalid or the algorithm unknown.
pub fn decode_multikey(s: &str) -> Result<(KeyAlgorithm, Vec<u8>), Error> {
    let s = s.strip_prefix("did:key:").unwrap_or(s);
    if !s.starts_with('z') {
        return Err(Error::Crypto("missing base58btc multibase marker".into()));
    }

    let (base, bytes) =
        multibase::decode(s).map_err(|e| Error::Crypto(format!("invalid multibase: {e}")))?;
    if base != multibase::Base::Base58Btc {
        return Err(Error::Crypto("multikey must be base58btc".into()));
    }
    if bytes.len() < 2 {
        return Err(Error::Crypto("multikey too short".into()));
    }

    let prefix = [bytes[0], bytes[1]];
    let algorithm = if prefix == P256_MULTICODEC_PREFIX {
        KeyAlgorithm::P256
    } else if prefix == SECP256K1_MULTICODEC_PREFIX {
        KeyAlgorithm::Secp256k1
    } else {
        return Err(Error::UnsupportedAlgorithm(format!(
            "unknown multicodec prefix: {:02x}{:02x}",
            prefix[0], prefix[1]
        )));
    };

    Ok((algorithm, bytes[2..].to_vec()))
}

/// JWK (JSON Web Key) representation for EC keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (always "EC" here).
    pub kty: String,
    /// Curve name.
    pub crv: String,
    /// X coordinate (base64url, no padding).
    pub x: String,
    /// Y coordinate (base64url, no padding).
    pub y: String,
    /// Private scalar (base64url, no padding).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    /// Key id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Intended use.
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    /// Algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
}

impl Jwk {
    /// Creates a public JWK from a P-256 public key.
    #[must_use]
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let (x, y) = public_key.coordinates();
        Self {
            kty: "EC".to_string(),
            crv: "P-256".to_string(),
            x: base64url_encode(&x),
            y: base64url_encode(&y),
            d: None,
            kid: None,
            use_: None,
            alg: None,
        }
    }

    /// Creates a JWK from a key pair, including the private scalar.
    #[must_use]
    pub fn from_keypair(keypair: &Keypair) -> Self {
        let mut jwk = Self::from_public_key(&keypair.public_key());
        jwk.d = Some(base64url_encode(&keypair.private_key_bytes()));
        jwk.alg = Some("ES256".to_string());
        jwk
    }

    /// Computes the RFC 7638 thumbprint: SHA-256 of the canonical JSON
    /// `{"crv","kty","x","y"}` with lexicographically ordered keys.
    ///
    /// # Errors
    /// Returns an error if the key type is not "EC".
    pub fn thumbprint(&self) -> Result<String, Error> {
        if self.kty != "EC" {
            return Err(Error::Crypto(format!(
                "unsupported key type for thumbprint: {}",
                self.kty
            )));
        }
        let canonical = format!(
            r#"{{"crv":"{}","kty":"{}","x":"{}","y":"{}"}}"#,
            self.crv, self.kty, self.x, self.y
        );
        Ok(base64url_encode(&sha256(canonical.as_bytes())))
    }
}
