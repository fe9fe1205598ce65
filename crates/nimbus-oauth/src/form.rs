//! `application/x-www-form-urlencoded` body encoding.
//!
//! The allowed (unescaped) character set is alphanumerics plus `-._~`.

use nimbus_xrpc::request::encode_component;

/// Encodes key/value pairs as a form body.
#[must_use]
pub fn encode(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}
