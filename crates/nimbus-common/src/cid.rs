//! CID (Content Identifier) utilities.
//!
//! Two representations live here: [`Cid`], the binary CIDv1 used for block
//! addressing in repositories and CAR files, and [`CidLink`], the JSON
//! envelope (`{"$link": "..."}`) records use to reference content addresses.

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Multicodec code for raw bytes.
const RAW_CODEC: u64 = 0x55;

/// Multicodec code for DAG-CBOR.
const DAG_CBOR_CODEC: u64 = 0x71;

/// Multihash code for SHA-256.
const SHA256_CODE: u8 = 0x12;

/// CID version 1.
const CID_VERSION: u8 = 1;

/// A binary Content Identifier (CIDv1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cid {
    /// CID version (always 1).
    pub version: u8,
    /// Multicodec code for the content type.
    pub codec: u64,
    /// The multihash bytes.
    pub hash: Vec<u8>,
}

impl Cid {
    /// Creates a CID for DAG-CBOR content.
    #[must_use]
    pub fn for_cbor(data: &[u8]) -> Self {
        Self::new(DAG_CBOR_CODEC, data)
    }

    /// Creates a CID for raw bytes.
    #[must_use]
    pub fn for_raw(data: &[u8]) -> Self {
        Self::new(RAW_CODEC, data)
    }

    /// Creates a new CID with the given codec and data.
    #[must_use]
    pub fn new(codec: u64, data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut multihash = Vec::with_capacity(2 + 32);
        multihash.push(SHA256_CODE);
        multihash.push(32);
        multihash.extend_from_slice(&digest);
        Self {
            version: CID_VERSION,
            codec,
            hash: multihash,
        }
    }

    /// Encodes the CID to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.push(self.version);
        bytes.extend(encode_varint(self.codec));
        bytes.extend(&self.hash);
        bytes
    }

    /// Encodes the CID to its base32 string form (the default rendering).
    #[must_use]
    pub fn to_string_base32(&self) -> String {
        multibase::encode(multibase::Base::Base32Lower, self.to_bytes())
    }

    /// Parses a CID from a multibase-encoded string.
    ///
    /// # Errors
    /// Returns an error if the CID format is invalid.
    pub fn from_string(s: &str) -> Result<Self, Error> {
        let (_, bytes) = multibase::decode(s)
            .map_err(|e| Error::InvalidCid(format!("multibase decode error: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Parses a CID from bytes.
    ///
    /// # Errors
    /// Returns an error if the CID format is invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let (cid, _) = Self::from_bytes_with_len(bytes)?;
        Ok(cid)
    }

    /// Parses a CID from bytes and returns the number of bytes consumed.
    ///
    /// # Errors
    /// Returns an error if the CID format is invalid.
    pub fn from_bytes_with_len(bytes: &[u8]) -> Result<(Self, usize), Error> {
        if bytes.is_empty() {
            return Err(Error::InvalidCid("empty CID".into()));
        }

        let mut pos = 0;
        let version = bytes[pos];
        pos += 1;

        if version != CID_VERSION {
            return Err(Error::InvalidCid(format!(
                "unsupported CID version: {version}"
            )));
        }

        let (codec, consumed) = decode_varint(&bytes[pos..])
            .ok_or_else(|| Error::InvalidCid("invalid codec varint".into()))?;
        pos += consumed;

        // Multihash: hash code + length + digest
        if bytes.len() < pos + 2 {
            return Err(Error::InvalidCid("multihash too short".into()));
        }

        let hash_len = bytes[pos + 1] as usize;
        let total_hash_len = 2 + hash_len;
        if bytes.len() < pos + total_hash_len {
            return Err(Error::InvalidCid("multihash truncated".into()));
        }

        let hash = bytes[pos..pos + total_hash_len].to_vec();
        pos += total_hash_len;

        Ok((
            Self {
                version,
                codec,
                hash,
            },
            pos,
        ))
    }

    /// Returns the SHA-256 digest bytes (without multihash prefix).
    #[must_use]
    pub fn digest(&self) -> Option<&[u8]> {
        if self.hash.len() >= 2 && self.hash[0] == SHA256_CODE {
            Some(&self.hash[2..])
        } else {
            None
        }
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_base32())
    }
}

impl FromStr for Cid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

fn encode_varint(mut value: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        bytes.push(byte);
        if value == 0 {
            break;
        }
    }
    bytes
}

fn decode_varint(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
    None
}

/// A content-address reference as records carry it in JSON.
///
/// Serializes as the single-field map `{"$link": "<cid>"}`; decodes from
/// that form or from a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CidLink(String);

impl CidLink {
    /// Creates a new link. The only structural requirement is non-emptiness.
    ///
    /// # Errors
    /// Returns an error if the string is empty.
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();
        if s.is_empty() {
            return Err(Error::InvalidCid("CID link cannot be empty".into()));
        }
        Ok(Self(s))
    }

    /// Returns the CID string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CidLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Cid> for CidLink {
    fn from(cid: Cid) -> Self {
        Self(cid.to_string_base32())
    }
}

impl Serialize for CidLink {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("$link", &self.0)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for CidLink {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Linked {
                #[serde(rename = "$link")]
                link: String,
            },
            Plain(String),
        }

        let s = match Repr::deserialize(deserializer)? {
            Repr::Linked { link } => link,
            Repr::Plain(s) => s,
        };
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// Computes the SHA-256 hash of data.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(data);
    let mut result = [0u8; 32];
    result.copy_from_slice(&digest);
    result
}

/// Encodes bytes as base64url (no padding).
#[must_use]
pub fn base64url_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

/// Decodes a base64url string to bytes.
///
/// # Errors
/// Returns an error if the input is not valid base64url.
pub fn base64url_decode(s: &str) -> Result<Vec<u8>, Error> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(s)
        .map_err(Error::from)
}
