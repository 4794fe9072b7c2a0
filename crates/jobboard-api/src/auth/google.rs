//! Google OAuth 2.0 authorization-code flow.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::AuthConfig;
use crate::error::ApiError;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested at login.
const SCOPES: &str = "openid profile email";

/// Token endpoint response. Only the ID token is used.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub id_token: Option<String>,
    pub access_token: Option<String>,
    pub expires_in: Option<u64>,
}

/// Google OAuth client.
#[derive(Clone)]
pub struct GoogleOAuth {
    http: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
}

impl GoogleOAuth {
    pub fn new(config: &AuthConfig) -> Result<Self, ApiError> {
        Self::with_endpoints(config, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL)
    }

    /// Client with non-default endpoints.
    pub fn with_endpoints(
        config: &AuthConfig,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            redirect_uri: config.callback_url.clone(),
            auth_url: auth_url.into(),
            token_url: token_url.into(),
        })
    }

    /// URL of Google's consent screen carrying our CSRF `state`.
    pub fn authorization_url(&self, state: &str) -> Result<String, ApiError> {
        let url = Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
                ("access_type", "online"),
                ("prompt", "select_account"),
            ],
        )
        .map_err(|e| ApiError::internal(format!("Invalid authorization URL: {}", e)))?;
        Ok(url.into())
    }

    /// Exchange an authorization code for the user's ID token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, ApiError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| ApiError::internal(format!("Token exchange failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = %status, body = %body, "Google rejected authorization code");
            return Err(ApiError::unauthorized("Authorization code was rejected"));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::internal(format!("Invalid token response: {}", e)))?;

        tokens
            .id_token
            .ok_or_else(|| ApiError::unauthorized("Token response has no id_token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> AuthConfig {
        AuthConfig {
            google_client_id: "client-id".into(),
            google_client_secret: "client-secret".into(),
            callback_url: "http://localhost:1967/api/auth/google/callback".into(),
            login_success_redirect: "http://localhost:3000".into(),
            session_secret: "s".repeat(32),
            session_ttl: Duration::from_secs(60),
            secure_cookies: false,
        }
    }

    #[test]
    fn test_authorization_url() {
        let oauth = GoogleOAuth::new(&config()).unwrap();
        let url = Url::parse(&oauth.authorization_url("abc").unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(params["state"], "abc");
        assert_eq!(params["scope"], "openid profile email");
        assert_eq!(params["redirect_uri"], "http://localhost:1967/api/auth/google/callback");
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "id_token": "header.payload.sig",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;

        let oauth = GoogleOAuth::with_endpoints(
            &config(),
            GOOGLE_AUTH_URL,
            format!("{}/token", server.uri()),
        )
        .unwrap();
        assert_eq!(oauth.exchange_code("the-code").await.unwrap(), "header.payload.sig");
    }

    #[tokio::test]
    async fn test_rejected_code_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let oauth = GoogleOAuth::with_endpoints(&config(), GOOGLE_AUTH_URL, server.uri()).unwrap();
        let err = oauth.exchange_code("stale").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
