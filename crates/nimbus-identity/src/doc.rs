//! DID document model.

use serde::{Deserialize, Serialize};

/// A DID document as resolvers return it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidDocument {
    /// JSON-LD context.
    #[serde(rename = "@context", default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    /// The DID this document describes.
    pub id: String,
    /// Alternative identifiers (e.g. `at://` handles).
    #[serde(rename = "alsoKnownAs", default)]
    pub also_known_as: Vec<String>,
    /// Verification methods (keys).
    #[serde(rename = "verificationMethod", default)]
    pub verification_method: Vec<VerificationMethod>,
    /// Declared services.
    #[serde(default)]
    pub service: Vec<Service>,
}

/// Verification method (key) in a DID document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationMethod {
    /// Key id.
    pub id: String,
    /// Key type.
    #[serde(rename = "type")]
    pub key_type: String,
    /// Controller DID.
    pub controller: String,
    /// Public key in multikey format.
    #[serde(rename = "publicKeyMultibase", skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<String>,
}

/// Service entry in a DID document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Service id (e.g. `#atproto_pds`).
    pub id: String,
    /// Service type (e.g. `AtprotoPersonalDataServer`).
    #[serde(rename = "type")]
    pub service_type: String,
    /// Service endpoint URL.
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_decodes_with_minimal_fields() {
        let json = r#"{"id": "did:plc:abc123"}"#;
        let doc: DidDocument = serde_json::from_str(json).unwrap();

        assert_eq!(doc.id, "did:plc:abc123");
        assert!(doc.service.is_empty());
        assert!(doc.also_known_as.is_empty());
    }

    #[test]
    fn test_document_decodes_services() {
        let json = r##"{
            "id": "did:plc:abc123",
            "alsoKnownAs": ["at://alice.bsky.social"],
            "service": [{
                "id": "#atproto_pds",
                "type": "AtprotoPersonalDataServer",
                "serviceEndpoint": "https://pds.example.com"
            }]
        }"##;
        let doc: DidDocument = serde_json::from_str(json).unwrap();

        assert_eq!(doc.service.len(), 1);
        assert_eq!(doc.service[0].service_endpoint, "https://pds.example.com");
    }
}
