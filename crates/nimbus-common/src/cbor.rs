//! CBOR encoding and decoding utilities.
//!
//! Serde-backed helpers for structured types, plus `ciborium::Value`
//! accessors used when decoding schemaless maps (MST nodes, event frames).

use ciborium::Value as CborValue;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Error;

/// Encodes a value to CBOR bytes.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| Error::Encoding(e.to_string()))?;
    Ok(buf)
}

/// Decodes CBOR bytes to a value.
///
/// # Errors
/// Returns an error if deserialization fails.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    ciborium::from_reader(bytes).map_err(|e| Error::Decoding(e.to_string()))
}

/// Decodes a single CBOR item into a dynamic `Value`.
///
/// # Errors
/// Returns an error if deserialization fails.
pub fn decode_value(bytes: &[u8]) -> Result<CborValue, Error> {
    ciborium::from_reader(bytes).map_err(|e| Error::Decoding(e.to_string()))
}

/// Looks up a map entry by text key.
#[must_use]
pub fn map_get<'a>(map: &'a [(CborValue, CborValue)], key: &str) -> Option<&'a CborValue> {
    map.iter()
        .find(|(k, _)| matches!(k, CborValue::Text(t) if t == key))
        .map(|(_, v)| v)
}

/// Extracts a text value.
#[must_use]
pub fn as_text(value: &CborValue) -> Option<&str> {
    match value {
        CborValue::Text(s) => Some(s),
        _ => None,
    }
}

/// Extracts an integer value as i64.
#[must_use]
pub fn as_i64(value: &CborValue) -> Option<i64> {
    match value {
        CborValue::Integer(i) => i64::try_from(*i).ok(),
        _ => None,
    }
}

/// Extracts a boolean value.
#[must_use]
pub fn as_bool(value: &CborValue) -> Option<bool> {
    match value {
        CborValue::Bool(b) => Some(*b),
        _ => None,
    }
}

/// Extracts byte-string contents.
#[must_use]
pub fn as_bytes(value: &CborValue) -> Option<&[u8]> {
    match value {
        CborValue::Bytes(b) => Some(b),
        _ => None,
    }
}

/// Extracts a CID string from a DAG-CBOR link (tag 42 over the
/// identity-prefixed CID bytes) or a plain text value.
#[must_use]
pub fn as_cid_string(value: &CborValue) -> Option<String> {
    match value {
        CborValue::Tag(42, inner) => {
            let bytes = as_bytes(inner)?;
            // DAG-CBOR links carry a 0x00 identity multibase prefix.
            let cid_bytes = bytes.strip_prefix(&[0x00]).unwrap_or(bytes);
            crate::cid::Cid::from_bytes(cid_bytes)
                .ok()
                .map(|c| c.to_string_base32())
        }
        CborValue::Text(s) => Some(s.clone()),
        _ => None,
    }
}
