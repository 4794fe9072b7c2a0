//! Google ID token verification.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use jobboard_models::GoogleProfile;

use crate::error::ApiError;

/// Google's signing keys for OpenID Connect ID tokens.
pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Issuers Google puts in ID tokens.
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];

/// JWKS cache TTL.
const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600); // 1 hour

/// Minimum time between forced refreshes triggered by unknown key IDs.
const JWKS_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Decoded Google ID token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleIdClaims {
    /// Stable Google account ID
    pub sub: String,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl GoogleIdClaims {
    /// Identity fields we keep on the user record.
    pub fn into_profile(self) -> GoogleProfile {
        // Unverified addresses are not attached to the account
        let email = match self.email_verified {
            Some(false) => None,
            _ => self.email,
        };
        GoogleProfile {
            google_id: self.sub,
            display_name: self.name,
            email,
            picture: self.picture,
        }
    }
}

/// JWKS response from Google.
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkKey>,
}

#[derive(Debug, Clone, Deserialize)]
struct JwkKey {
    kid: String,
    n: String,
    e: String,
}

struct KeySet {
    keys: HashMap<String, DecodingKey>,
    refreshed_at: Option<Instant>,
}

/// Lazily fetched, cached Google signing keys.
pub struct JwksCache {
    http: Client,
    jwks_url: String,
    client_id: String,
    state: RwLock<KeySet>,
}

impl JwksCache {
    /// Create a cache for tokens issued to `client_id`. Keys are fetched on
    /// first use.
    pub fn new(client_id: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_url(client_id, GOOGLE_JWKS_URL)
    }

    pub fn with_url(client_id: impl Into<String>, jwks_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            jwks_url: jwks_url.into(),
            client_id: client_id.into(),
            state: RwLock::new(KeySet {
                keys: HashMap::new(),
                refreshed_at: None,
            }),
        })
    }

    /// Refresh JWKS keys from Google.
    async fn refresh_keys(&self) -> Result<(), ApiError> {
        debug!("Refreshing JWKS keys");

        let jwks: JwksResponse = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ApiError::internal(format!("Failed to fetch JWKS: {}", e)))?
            .json()
            .await
            .map_err(|e| ApiError::internal(format!("Invalid JWKS response: {}", e)))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => {
                    keys.insert(jwk.kid, key);
                }
                Err(e) => warn!(kid = %jwk.kid, error = %e, "Skipping unusable JWK"),
            }
        }

        let key_count = keys.len();
        let mut state = self.state.write().await;
        state.keys = keys;
        state.refreshed_at = Some(Instant::now());

        debug!("Refreshed {} JWKS keys", key_count);
        Ok(())
    }

    /// Get decoding key for a key ID, refreshing when stale or unknown.
    async fn get_key(&self, kid: &str) -> Option<DecodingKey> {
        let (cached, refreshed_at) = {
            let state = self.state.read().await;
            (state.keys.get(kid).cloned(), state.refreshed_at)
        };

        let stale = refreshed_at.map_or(true, |t| t.elapsed() > JWKS_CACHE_TTL);
        // Unknown kid usually means Google rotated keys
        let rotated = cached.is_none()
            && refreshed_at.map_or(true, |t| t.elapsed() > JWKS_MIN_REFRESH_INTERVAL);

        if stale || rotated {
            if let Err(e) = self.refresh_keys().await {
                warn!("Failed to refresh JWKS keys: {}", e);
                return cached;
            }
            return self.state.read().await.keys.get(kid).cloned();
        }

        cached
    }

    /// Verify a Google ID token issued to this client.
    pub async fn verify_id_token(&self, token: &str) -> Result<GoogleIdClaims, ApiError> {
        let header = decode_header(token)
            .map_err(|e| ApiError::unauthorized(format!("Invalid token header: {}", e)))?;

        let kid = header
            .kid
            .ok_or_else(|| ApiError::unauthorized("Token missing key ID"))?;

        let key = self
            .get_key(&kid)
            .await
            .ok_or_else(|| ApiError::unauthorized("Unknown key ID"))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.set_audience(&[&self.client_id]);

        let token_data = decode::<GoogleIdClaims>(token, &key, &validation)
            .map_err(|e| ApiError::unauthorized(format!("Token validation failed: {}", e)))?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(email_verified: Option<bool>) -> GoogleIdClaims {
        GoogleIdClaims {
            sub: "1234".into(),
            email: Some("ada@example.com".into()),
            email_verified,
            name: Some("Ada".into()),
            picture: None,
            iss: GOOGLE_ISSUERS[0].into(),
            aud: "client".into(),
            iat: 0,
            exp: 0,
        }
    }

    #[test]
    fn test_unverified_email_is_dropped() {
        assert_eq!(claims(Some(false)).into_profile().email, None);
        assert_eq!(
            claims(Some(true)).into_profile().email.as_deref(),
            Some("ada@example.com")
        );
        assert_eq!(claims(None).into_profile().google_id, "1234");
    }

    #[tokio::test]
    async fn test_garbage_token_is_unauthorized() {
        let cache = JwksCache::with_url("client", "http://127.0.0.1:9/certs").unwrap();
        let err = cache.verify_id_token("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
