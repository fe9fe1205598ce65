//! Blob reference type.
//!
//! Blobs (media uploads) are referenced from records by CID plus MIME type
//! and size. On the wire a blob reference is tagged `"$type": "blob"`.

use serde::{Deserialize, Serialize};

use crate::cid::CidLink;
use crate::error::Error;

/// A reference to an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BlobRefWire", into = "BlobRefWire")]
pub struct BlobRef {
    /// Content address of the blob bytes.
    pub r#ref: CidLink,
    /// MIME type declared at upload time.
    pub mime_type: String,
    /// Size of the blob in bytes.
    pub size: u64,
}

impl BlobRef {
    /// Creates a new blob reference.
    #[must_use]
    pub fn new(r#ref: CidLink, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            r#ref,
            mime_type: mime_type.into(),
            size,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct BlobRefWire {
    #[serde(rename = "$type", skip_serializing_if = "Option::is_none")]
    type_: Option<String>,
    r#ref: CidLink,
    #[serde(rename = "mimeType")]
    mime_type: String,
    size: u64,
}

impl TryFrom<BlobRefWire> for BlobRef {
    type Error = Error;

    fn try_from(wire: BlobRefWire) -> Result<Self, Error> {
        // "$type" may be omitted, but when present it must be exactly "blob".
        if let Some(t) = &wire.type_ {
            if t != "blob" {
                return Err(Error::Decoding(format!(
                    "expected $type \"blob\", got \"{t}\""
                )));
            }
        }
        Ok(Self {
            r#ref: wire.r#ref,
            mime_type: wire.mime_type,
            size: wire.size,
        })
    }
}

impl From<BlobRef> for BlobRefWire {
    fn from(blob: BlobRef) -> Self {
        Self {
            type_: Some("blob".to_string()),
            r#ref: blob.r#ref,
            mime_type: blob.mime_type,
            size: blob.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_ref_serializes_with_type_tag() {
        let blob = BlobRef::new(CidLink::new("bafyblob").unwrap(), "image/png", 1024);
        let json = serde_json::to_string(&blob).unwrap();
        assert!(json.contains("\"$type\":\"blob\""));
        assert!(json.contains("\"mimeType\":\"image/png\""));
        assert!(json.contains("\"size\":1024"));
    }

    #[test]
    fn test_blob_ref_json_roundtrip() {
        let blob = BlobRef::new(CidLink::new("bafyblob").unwrap(), "image/jpeg", 42);
        let json = serde_json::to_string(&blob).unwrap();
        let parsed: BlobRef = serde_json::from_str(&json).unwrap();
        assert_eq!(blob, parsed);
    }

    #[test]
    fn test_blob_ref_decodes_without_type_tag() {
        let json = r#"{"ref":{"$link":"bafyblob"},"mimeType":"text/plain","size":7}"#;
        let blob: BlobRef = serde_json::from_str(json).unwrap();
        assert_eq!(blob.mime_type, "text/plain");
        assert_eq!(blob.size, 7);
    }

    #[test]
    fn test_blob_ref_rejects_wrong_type_tag() {
        let json = r#"{"$type":"record","ref":"bafyblob","mimeType":"text/plain","size":7}"#;
        assert!(serde_json::from_str::<BlobRef>(json).is_err());
    }
}
