//! OAuth 2.1 client flow.
//!
//! The full authorization sequence: server metadata discovery, a pushed
//! authorization request (PAR) with PKCE, the callback exchange at the
//! token endpoint, and token refresh. Every request to the authorization
//! server carries a `DPoP` proof, with a single bounded retry when the
//! server demands a nonce.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use nimbus_common::cid::base64url_encode;
use nimbus_common::crypto::generate_random_bytes;
use nimbus_common::{Error, Result};
use nimbus_xrpc::client::AuthorizationProvider;
use nimbus_xrpc::executor::{HttpExecutor, HttpMethod, HttpRequest, HttpResponse};
use nimbus_xrpc::request::encode_component;

use crate::dpop::DpopManager;
use crate::form;
use crate::metadata::{AuthServerDiscovery, AuthServerMetadata};
use crate::pkce::{Pkce, CODE_CHALLENGE_METHOD};
use crate::session::OAuthSession;
use crate::storage::SecureStorage;
use crate::tokens::{TokenManager, TokenSet};

/// OAuth client configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// OAuth client identifier (a URL under this protocol).
    pub client_id: String,
    /// Redirect URI registered for the client.
    pub redirect_uri: String,
}

/// Response body of a pushed authorization request.
#[derive(Debug, Deserialize)]
struct ParResponse {
    request_uri: String,
    #[serde(default)]
    #[allow(dead_code)]
    expires_in: Option<u64>,
}

/// OAuth error body shape.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_uri: Option<String>,
}

#[derive(Default)]
struct FlowState {
    pkce: Option<Pkce>,
    state: Option<String>,
    metadata: Option<AuthServerMetadata>,
}

/// OAuth 2.1 client with PAR, PKCE, and `DPoP`.
pub struct OAuthClient {
    config: OAuthConfig,
    executor: Arc<dyn HttpExecutor>,
    dpop: DpopManager,
    discovery: AuthServerDiscovery,
    tokens: TokenManager,
    flow: Mutex<FlowState>,
}

impl OAuthClient {
    /// Creates a client with memory-only token storage.
    #[must_use]
    pub fn new(config: OAuthConfig, executor: Arc<dyn HttpExecutor>) -> Self {
        Self {
            config,
            executor: executor.clone(),
            dpop: DpopManager::new(),
            discovery: AuthServerDiscovery::new(executor),
            tokens: TokenManager::new(),
            flow: Mutex::new(FlowState::default()),
        }
    }

    /// Creates a client persisting tokens in secure storage under
    /// `storage_key`.
    #[must_use]
    pub fn with_storage(
        config: OAuthConfig,
        executor: Arc<dyn HttpExecutor>,
        storage: Arc<dyn SecureStorage>,
        storage_key: impl Into<String>,
    ) -> Self {
        Self {
            config,
            executor: executor.clone(),
            dpop: DpopManager::new(),
            discovery: AuthServerDiscovery::new(executor),
            tokens: TokenManager::with_storage(storage, storage_key),
            flow: Mutex::new(FlowState::default()),
        }
    }

    /// Returns the `DPoP` manager backing this client.
    #[must_use]
    pub fn dpop(&self) -> &DpopManager {
        &self.dpop
    }

    /// Returns the token manager backing this client.
    #[must_use]
    pub fn token_manager(&self) -> &TokenManager {
        &self.tokens
    }

    /// Starts an authorization flow against `auth_server_url`, returning
    /// the URL to present to the user.
    ///
    /// A fresh PKCE pair and `state` replace any pending flow wholesale.
    ///
    /// # Errors
    /// Returns an error when discovery fails, the server offers no PAR
    /// endpoint, or the pushed request is rejected.
    pub async fn authorize(&self, auth_server_url: &str, scope: &str) -> Result<String> {
        let metadata = self.discovery.discover(auth_server_url).await?;
        let par_endpoint = metadata
            .pushed_authorization_request_endpoint
            .clone()
            .ok_or_else(|| Error::OAuth {
                error: "invalid_request".to_string(),
                description: Some(
                    "authorization server does not support pushed authorization requests"
                        .to_string(),
                ),
                uri: None,
            })?;

        let pkce = Pkce::generate();
        let state = base64url_encode(&generate_random_bytes(16));

        let body = form::encode(&[
            ("client_id", &self.config.client_id),
            ("redirect_uri", &self.config.redirect_uri),
            ("response_type", "code"),
            ("scope", scope),
            ("state", &state),
            ("code_challenge", &pkce.challenge),
            ("code_challenge_method", CODE_CHALLENGE_METHOD),
        ]);

        debug!(%par_endpoint, "pushing authorization request");
        let response = self.post_form_with_dpop(&par_endpoint, &body).await?;
        let par: ParResponse = serde_json::from_slice(&response.body)
            .map_err(|e| Error::Decoding(format!("PAR response: {e}")))?;

        {
            let mut flow = self.flow.lock();
            flow.pkce = Some(pkce);
            flow.state = Some(state);
            flow.metadata = Some(metadata.clone());
        }

        Ok(format!(
            "{}?client_id={}&request_uri={}",
            metadata.authorization_endpoint,
            encode_component(&self.config.client_id),
            encode_component(&par.request_uri)
        ))
    }

    /// Completes the flow from the redirect callback URL, exchanging the
    /// code for tokens.
    ///
    /// On success the pending PKCE/state pair is cleared atomically and an
    /// `Authenticated` session is returned.
    ///
    /// # Errors
    /// Returns an error when the callback carries an OAuth error, the
    /// state does not match, or the token exchange fails.
    pub async fn handle_callback(&self, url: &str) -> Result<OAuthSession> {
        let parsed = Url::parse(url)?;
        let params: HashMap<String, String> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if let Some(error) = params.get("error") {
            return Err(Error::OAuth {
                error: error.clone(),
                description: params.get("error_description").cloned(),
                uri: params.get("error_uri").cloned(),
            });
        }

        let code = params.get("code").ok_or_else(|| Error::OAuth {
            error: "invalid_request".to_string(),
            description: Some("callback is missing 'code'".to_string()),
            uri: None,
        })?;
        let state = params.get("state").ok_or_else(|| Error::OAuth {
            error: "invalid_request".to_string(),
            description: Some("callback is missing 'state'".to_string()),
            uri: None,
        })?;

        let (verifier, token_endpoint) = {
            let flow = self.flow.lock();
            if flow.state.as_deref() != Some(state.as_str()) {
                return Err(Error::OAuth {
                    error: "invalid_state".to_string(),
                    description: Some("state does not match the pending flow".to_string()),
                    uri: None,
                });
            }
            let verifier = flow
                .pkce
                .as_ref()
                .map(|p| p.verifier.clone())
                .ok_or_else(|| Error::OAuth {
                    error: "invalid_state".to_string(),
                    description: Some("no authorization flow in progress".to_string()),
                    uri: None,
                })?;
            let token_endpoint = flow
                .metadata
                .as_ref()
                .map(|m| m.token_endpoint.clone())
                .ok_or_else(|| Error::OAuth {
                    error: "invalid_state".to_string(),
                    description: Some("no authorization flow in progress".to_string()),
                    uri: None,
                })?;
            (verifier, token_endpoint)
        };

        let body = form::encode(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.config.redirect_uri),
            ("client_id", &self.config.client_id),
            ("code_verifier", &verifier),
        ]);

        debug!("exchanging authorization code");
        let response = self.post_form_with_dpop(&token_endpoint, &body).await?;
        let tokens: TokenSet = serde_json::from_slice(&response.body)
            .map_err(|e| Error::Decoding(format!("token response: {e}")))?;
        let did = tokens.sub.clone();

        self.tokens.store_tokens(tokens).await?;

        {
            let mut flow = self.flow.lock();
            flow.pkce = None;
            flow.state = None;
        }

        Ok(OAuthSession::Authenticated { did })
    }

    /// Exchanges the stored refresh token for a fresh token set.
    ///
    /// # Errors
    /// Returns [`Error::TokenRefreshFailed`] when no refresh token is
    /// stored, or the server's error on a rejected exchange.
    pub async fn refresh_tokens(&self) -> Result<TokenSet> {
        let current = self.tokens.get_tokens().await?;
        let refresh_token = current
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or_else(|| Error::TokenRefreshFailed("no refresh token stored".to_string()))?;

        let token_endpoint = self
            .flow
            .lock()
            .metadata
            .as_ref()
            .map(|m| m.token_endpoint.clone())
            .ok_or_else(|| {
                Error::TokenRefreshFailed(
                    "no authorization server metadata; authorize first".to_string(),
                )
            })?;

        let body = form::encode(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_token),
            ("client_id", &self.config.client_id),
        ]);

        debug!("refreshing tokens");
        let response = self.post_form_with_dpop(&token_endpoint, &body).await?;
        let mut tokens: TokenSet = serde_json::from_slice(&response.body)
            .map_err(|e| Error::Decoding(format!("token response: {e}")))?;

        // Servers may rotate or omit the refresh token; keep the old one
        // when omitted.
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token);
        }

        self.tokens.store_tokens(tokens.clone()).await?;
        Ok(tokens)
    }

    /// Returns a valid access token, refreshing first when needed.
    ///
    /// # Errors
    /// Returns an error when no session is active or refresh fails.
    pub async fn get_access_token(&self) -> Result<String> {
        if self.tokens.needs_refresh().await? {
            self.refresh_tokens().await?;
        }
        self.tokens
            .get_tokens()
            .await?
            .map(|t| t.access_token)
            .ok_or(Error::SessionRequired)
    }

    /// Reports the current session state.
    pub async fn get_session(&self) -> OAuthSession {
        if let Some(state) = self.flow.lock().state.clone() {
            return OAuthSession::Authorizing { state };
        }

        match self.tokens.get_tokens().await {
            Ok(None) => OAuthSession::Unauthenticated,
            Ok(Some(tokens)) => match self.tokens.is_expired().await {
                Ok(true) => OAuthSession::Expired,
                Ok(false) => OAuthSession::Authenticated { did: tokens.sub },
                Err(e) => OAuthSession::Failed {
                    error: e.to_string(),
                },
            },
            Err(e) => OAuthSession::Failed {
                error: e.to_string(),
            },
        }
    }

    /// POSTs a form body with a `DPoP` proof, retrying exactly once when a
    /// 400 response carries a `DPoP-Nonce` header.
    async fn post_form_with_dpop(&self, url: &str, body: &str) -> Result<HttpResponse> {
        let mut response = self.send_form(url, body).await?;

        if response.status == 400 {
            if let Some(nonce) = response.header("dpop-nonce") {
                debug!("server demanded a DPoP nonce; retrying once");
                self.dpop.update_nonce(nonce);
                response = self.send_form(url, body).await?;
            }
        }

        if response.is_success() {
            Ok(response)
        } else {
            Err(oauth_error(&response))
        }
    }

    async fn send_form(&self, url: &str, body: &str) -> Result<HttpResponse> {
        let proof = self.dpop.create_proof("POST", url, None)?;

        let mut request = HttpRequest::new(HttpMethod::Post, url);
        request.set_header("content-type", "application/x-www-form-urlencoded");
        request.set_header("accept", "application/json");
        request.set_header("dpop", proof);
        request.body = Some(body.as_bytes().to_vec());

        self.executor.execute(request).await
    }
}

/// Maps a non-success authorization-server response to an error.
fn oauth_error(response: &HttpResponse) -> Error {
    match serde_json::from_slice::<OAuthErrorBody>(&response.body) {
        Ok(body) => Error::OAuth {
            error: body.error,
            description: body.error_description,
            uri: body.error_uri,
        },
        Err(_) => {
            warn!(status = response.status, "unparsable authorization server error");
            Error::Xrpc {
                status: response.status,
                error: None,
                message: None,
            }
        }
    }
}

#[async_trait]
impl AuthorizationProvider for OAuthClient {
    async fn authorization(&self) -> Result<String> {
        let token = self.get_access_token().await?;
        let token_type = self
            .tokens
            .get_tokens()
            .await?
            .map_or_else(|| "DPoP".to_string(), |t| t.token_type);
        Ok(format!("{token_type} {token}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_common::cid::base64url_decode;
    use nimbus_xrpc::testing::MockExecutor;

    const AUTH_SERVER: &str = "https://auth.example.com";

    fn metadata_json() -> String {
        format!(
            r#"{{
                "issuer": "{AUTH_SERVER}",
                "authorization_endpoint": "{AUTH_SERVER}/authorize",
                "token_endpoint": "{AUTH_SERVER}/token",
                "pushed_authorization_request_endpoint": "{AUTH_SERVER}/par"
            }}"#
        )
    }

    fn token_json() -> &'static str {
        r#"{
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "token_type": "DPoP",
            "expires_in": 3600,
            "scope": "atproto",
            "sub": "did:plc:alice"
        }"#
    }

    fn client(mock: &Arc<MockExecutor>) -> OAuthClient {
        OAuthClient::new(
            OAuthConfig {
                client_id: "https://app.example.com/client-metadata.json".to_string(),
                redirect_uri: "https://app.example.com/callback".to_string(),
            },
            mock.clone(),
        )
    }

    fn proof_payload(request: &HttpRequest) -> serde_json::Value {
        let proof = request.header("dpop").unwrap();
        let payload = proof.split('.').nth(1).unwrap();
        serde_json::from_slice(&base64url_decode(payload).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_authorize_with_nonce_retry() {
        let mock = Arc::new(MockExecutor::new());
        mock.enqueue_json(200, &metadata_json());
        mock.enqueue_with_headers(
            400,
            r#"{"error":"use_dpop_nonce"}"#,
            &[("DPoP-Nonce", "n1")],
        );
        mock.enqueue_json(
            200,
            r#"{"request_uri":"urn:ietf:params:oauth:request_uri:abc","expires_in":60}"#,
        );

        let client = client(&mock);
        let url = client.authorize(AUTH_SERVER, "atproto").await.unwrap();

        // Nonce stored, exactly one retry issued.
        assert_eq!(client.dpop().nonce().as_deref(), Some("n1"));
        let captured = mock.captured();
        assert_eq!(captured.len(), 3); // metadata + PAR + retried PAR

        // First PAR proof has no nonce, retry carries n1.
        assert!(proof_payload(&captured[1])["nonce"].is_null());
        assert_eq!(proof_payload(&captured[2])["nonce"], "n1");

        assert_eq!(
            url,
            format!(
                "{AUTH_SERVER}/authorize?client_id={}&request_uri=urn%3Aietf%3Aparams%3Aoauth%3Arequest_uri%3Aabc",
                encode_component("https://app.example.com/client-metadata.json")
            )
        );

        // Flow is now pending.
        match client.get_session().await {
            OAuthSession::Authorizing { state } => assert!(!state.is_empty()),
            other => panic!("expected authorizing session, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_authorize_par_form_contents() {
        let mock = Arc::new(MockExecutor::new());
        mock.enqueue_json(200, &metadata_json());
        mock.enqueue_json(200, r#"{"request_uri":"urn:ietf:params:oauth:request_uri:xyz"}"#);

        let client = client(&mock);
        client.authorize(AUTH_SERVER, "atproto").await.unwrap();

        let captured = mock.captured();
        let par = &captured[1];
        assert_eq!(par.url, format!("{AUTH_SERVER}/par"));
        assert_eq!(
            par.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );

        let body = String::from_utf8(par.body.clone().unwrap()).unwrap();
        assert!(body.contains("response_type=code"));
        assert!(body.contains("code_challenge_method=S256"));
        assert!(body.contains("code_challenge="));
        assert!(body.contains("state="));
        assert!(body.contains("scope=atproto"));
    }

    #[tokio::test]
    async fn test_authorize_requires_par_endpoint() {
        let mock = Arc::new(MockExecutor::new());
        mock.enqueue_json(
            200,
            &format!(
                r#"{{
                    "issuer": "{AUTH_SERVER}",
                    "authorization_endpoint": "{AUTH_SERVER}/authorize",
                    "token_endpoint": "{AUTH_SERVER}/token"
                }}"#
            ),
        );

        let client = client(&mock);
        assert!(matches!(
            client.authorize(AUTH_SERVER, "atproto").await,
            Err(Error::OAuth { .. })
        ));
    }

    #[tokio::test]
    async fn test_second_400_surfaces_oauth_error() {
        let mock = Arc::new(MockExecutor::new());
        mock.enqueue_json(200, &metadata_json());
        mock.enqueue_with_headers(
            400,
            r#"{"error":"use_dpop_nonce"}"#,
            &[("DPoP-Nonce", "n1")],
        );
        mock.enqueue_with_headers(
            400,
            r#"{"error":"invalid_request","error_description":"still bad"}"#,
            &[("DPoP-Nonce", "n2")],
        );

        let client = client(&mock);
        match client.authorize(AUTH_SERVER, "atproto").await {
            Err(Error::OAuth { error, description, .. }) => {
                assert_eq!(error, "invalid_request");
                assert_eq!(description.as_deref(), Some("still bad"));
            }
            other => panic!("expected oauth error, got {other:?}"),
        }
        // Exactly one retry: metadata + two PAR attempts.
        assert_eq!(mock.captured().len(), 3);
    }

    async fn authorized_client(mock: &Arc<MockExecutor>) -> (OAuthClient, String) {
        mock.enqueue_json(200, &metadata_json());
        mock.enqueue_json(200, r#"{"request_uri":"urn:ietf:params:oauth:request_uri:abc"}"#);

        let client = client(mock);
        client.authorize(AUTH_SERVER, "atproto").await.unwrap();
        let state = match client.get_session().await {
            OAuthSession::Authorizing { state } => state,
            other => panic!("expected authorizing, got {other:?}"),
        };
        (client, state)
    }

    #[tokio::test]
    async fn test_handle_callback_success() {
        let mock = Arc::new(MockExecutor::new());
        let (client, state) = authorized_client(&mock).await;
        mock.enqueue_json(200, token_json());

        let callback = format!(
            "https://app.example.com/callback?code=authcode&state={}",
            encode_component(&state)
        );
        let session = client.handle_callback(&callback).await.unwrap();

        assert_eq!(
            session,
            OAuthSession::Authenticated {
                did: "did:plc:alice".to_string()
            }
        );
        assert!(session.is_authenticated());

        // Token request shape.
        let captured = mock.captured();
        let token_request = captured.last().unwrap();
        assert_eq!(token_request.url, format!("{AUTH_SERVER}/token"));
        let body = String::from_utf8(token_request.body.clone().unwrap()).unwrap();
        assert!(body.contains("grant_type=authorization_code"));
        assert!(body.contains("code=authcode"));
        assert!(body.contains("code_verifier="));

        // PKCE/state cleared; session now authenticated.
        assert!(client.get_session().await.is_authenticated());
    }

    #[tokio::test]
    async fn test_handle_callback_state_mismatch() {
        let mock = Arc::new(MockExecutor::new());
        let (client, _state) = authorized_client(&mock).await;

        let result = client
            .handle_callback("https://app.example.com/callback?code=authcode&state=wrong")
            .await;
        match result {
            Err(Error::OAuth { error, .. }) => assert_eq!(error, "invalid_state"),
            other => panic!("expected invalid_state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handle_callback_error_param() {
        let mock = Arc::new(MockExecutor::new());
        let (client, _state) = authorized_client(&mock).await;

        let result = client
            .handle_callback(
                "https://app.example.com/callback?error=access_denied&error_description=user%20said%20no",
            )
            .await;
        match result {
            Err(Error::OAuth { error, description, .. }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(description.as_deref(), Some("user said no"));
            }
            other => panic!("expected oauth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_without_token_fails() {
        let mock = Arc::new(MockExecutor::new());
        let client = client(&mock);

        assert!(matches!(
            client.refresh_tokens().await,
            Err(Error::TokenRefreshFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_keeps_old_refresh_token_when_omitted() {
        let mock = Arc::new(MockExecutor::new());
        let (client, state) = authorized_client(&mock).await;
        mock.enqueue_json(200, token_json());
        client
            .handle_callback(&format!(
                "https://app.example.com/callback?code=c&state={}",
                encode_component(&state)
            ))
            .await
            .unwrap();

        mock.enqueue_json(
            200,
            r#"{"access_token":"access-2","token_type":"DPoP","expires_in":3600,"sub":"did:plc:alice"}"#,
        );
        let refreshed = client.refresh_tokens().await.unwrap();

        assert_eq!(refreshed.access_token, "access-2");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh-1"));

        let body = String::from_utf8(mock.captured().last().unwrap().body.clone().unwrap()).unwrap();
        assert!(body.contains("grant_type=refresh_token"));
        assert!(body.contains("refresh_token=refresh-1"));
    }

    #[tokio::test]
    async fn test_get_access_token_skips_refresh_when_fresh() {
        let mock = Arc::new(MockExecutor::new());
        let (client, state) = authorized_client(&mock).await;
        mock.enqueue_json(200, token_json());
        client
            .handle_callback(&format!(
                "https://app.example.com/callback?code=c&state={}",
                encode_component(&state)
            ))
            .await
            .unwrap();

        let requests_before = mock.captured().len();
        let token = client.get_access_token().await.unwrap();
        assert_eq!(token, "access-1");
        assert_eq!(mock.captured().len(), requests_before);
    }

    #[tokio::test]
    async fn test_session_states() {
        let mock = Arc::new(MockExecutor::new());
        let client = client(&mock);
        assert_eq!(client.get_session().await, OAuthSession::Unauthenticated);

        client
            .token_manager()
            .store_tokens(TokenSet {
                access_token: "a".to_string(),
                refresh_token: None,
                token_type: "DPoP".to_string(),
                expires_in: None,
                scope: None,
                sub: "did:plc:alice".to_string(),
                expires_at: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(client.get_session().await, OAuthSession::Expired);
    }

    #[tokio::test]
    async fn test_authorization_provider_header_value() {
        let mock = Arc::new(MockExecutor::new());
        let client = client(&mock);
        client
            .token_manager()
            .store_tokens(TokenSet {
                access_token: "tok".to_string(),
                refresh_token: None,
                token_type: "DPoP".to_string(),
                expires_in: Some(3600),
                scope: None,
                sub: "did:plc:alice".to_string(),
                expires_at: None,
            })
            .await
            .unwrap();

        let header = client.authorization().await.unwrap();
        assert_eq!(header, "DPoP tok");
    }
}
