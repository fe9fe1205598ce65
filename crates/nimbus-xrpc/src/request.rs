//! XRPC request construction.
//!
//! Endpoint URLs have the form `<service_base>/xrpc/<nsid>`; query
//! parameters are emitted in key-sorted order so request URLs are stable.

use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::executor::{HttpMethod, HttpRequest};

/// Characters NOT escaped in query values: unreserved per RFC 3986.
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Builds an XRPC endpoint URL, preserving any base path and collapsing a
/// trailing slash on the service base.
#[must_use]
pub fn endpoint_url(service_base: &str, nsid: &str) -> String {
    let base = service_base.trim_end_matches('/');
    format!("{base}/xrpc/{nsid}")
}

/// Percent-encodes a query component with the form-encoding character set.
#[must_use]
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, QUERY_ESCAPE).to_string()
}

/// Builder for XRPC requests.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: HttpMethod,
    url: String,
    params: BTreeMap<String, String>,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl RequestBuilder {
    /// Starts a GET request against an XRPC endpoint.
    #[must_use]
    pub fn get(service_base: &str, nsid: &str) -> Self {
        Self::new(HttpMethod::Get, service_base, nsid)
    }

    /// Starts a POST request against an XRPC endpoint.
    #[must_use]
    pub fn post(service_base: &str, nsid: &str) -> Self {
        Self::new(HttpMethod::Post, service_base, nsid)
    }

    fn new(method: HttpMethod, service_base: &str, nsid: &str) -> Self {
        Self {
            method,
            url: endpoint_url(service_base, nsid),
            params: BTreeMap::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Adds query parameters from an iterator.
    #[must_use]
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in params {
            self.params.insert(key.into(), value.into());
        }
        self
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Assembles the final request.
    ///
    /// `Accept: application/json` is set unless the caller set its own, and
    /// a POST with a body defaults `Content-Type: application/json`.
    #[must_use]
    pub fn build(self) -> HttpRequest {
        let mut url = self.url;
        if !self.params.is_empty() {
            let query: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
                .collect();
            url.push('?');
            url.push_str(&query.join("&"));
        }

        let mut request = HttpRequest::new(self.method, url);
        for (name, value) in self.headers {
            request.set_header(&name, value);
        }
        request.set_header_if_absent("accept", "application/json");

        if let Some(body) = self.body {
            if self.method == HttpMethod::Post {
                request.set_header_if_absent("content-type", "application/json");
            }
            request.body = Some(body);
        }

        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("https://bsky.social", "app.bsky.actor.getProfile"),
            "https://bsky.social/xrpc/app.bsky.actor.getProfile"
        );
    }

    #[test]
    fn test_endpoint_url_collapses_trailing_slash() {
        assert_eq!(
            endpoint_url("https://bsky.social/", "app.bsky.actor.getProfile"),
            "https://bsky.social/xrpc/app.bsky.actor.getProfile"
        );
    }

    #[test]
    fn test_endpoint_url_preserves_base_path() {
        assert_eq!(
            endpoint_url("https://example.com/service/", "com.example.query"),
            "https://example.com/service/xrpc/com.example.query"
        );
    }

    #[test]
    fn test_params_emitted_in_sorted_order() {
        let request = RequestBuilder::get("https://bsky.social", "com.example.query")
            .param("zebra", "1")
            .param("alpha", "2")
            .param("mike", "3")
            .build();

        assert_eq!(
            request.url,
            "https://bsky.social/xrpc/com.example.query?alpha=2&mike=3&zebra=1"
        );
    }

    #[test]
    fn test_param_values_percent_encoded() {
        let request = RequestBuilder::get("https://bsky.social", "com.example.query")
            .param("q", "hello world/and?more")
            .build();

        assert_eq!(
            request.url,
            "https://bsky.social/xrpc/com.example.query?q=hello%20world%2Fand%3Fmore"
        );
    }

    #[test]
    fn test_accept_header_defaulted() {
        let request = RequestBuilder::get("https://bsky.social", "com.example.query").build();
        assert_eq!(request.header("accept"), Some("application/json"));
    }

    #[test]
    fn test_accept_header_not_overridden() {
        let request = RequestBuilder::get("https://bsky.social", "com.example.query")
            .header("Accept", "text/plain")
            .build();
        assert_eq!(request.header("accept"), Some("text/plain"));
    }

    #[test]
    fn test_post_body_defaults_content_type() {
        let request = RequestBuilder::post("https://bsky.social", "com.example.proc")
            .body(b"{}".to_vec())
            .build();
        assert_eq!(request.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_caller_content_type_wins() {
        let request = RequestBuilder::post("https://bsky.social", "com.example.proc")
            .header("Content-Type", "image/png")
            .body(vec![1, 2, 3])
            .build();
        assert_eq!(request.header("content-type"), Some("image/png"));
    }
}
