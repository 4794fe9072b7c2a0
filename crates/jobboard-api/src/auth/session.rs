//! Signed session cookies and the authenticated-user extractor.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use jobboard_models::{SessionId, User};

use crate::config::{AuthConfig, SESSION_COOKIE_MAX_AGE_SECS};
use crate::error::ApiError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "jobboard.sid";

/// CSRF state cookie for the OAuth round trip.
pub const OAUTH_STATE_COOKIE: &str = "jobboard.oauth_state";

/// Lifetime of the OAuth state cookie.
const OAUTH_STATE_MAX_AGE_SECS: i64 = 10 * 60;

/// Sign a session ID as `<sid>.<base64url(hmac)>`.
pub fn sign_session_id(secret: &str, session_id: &SessionId) -> String {
    format!("{}.{}", session_id, URL_SAFE_NO_PAD.encode(mac(secret, session_id.as_str())))
}

/// Check a cookie value and return the session ID it carries.
pub fn verify_session_cookie(secret: &str, value: &str) -> Option<SessionId> {
    let (sid, sig_encoded) = value.rsplit_once('.')?;
    let session_id = SessionId::from(sid);
    if !session_id.is_valid() {
        return None;
    }

    let sig_bytes = URL_SAFE_NO_PAD.decode(sig_encoded).ok()?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(sid.as_bytes());
    // Constant-time comparison
    mac.verify_slice(&sig_bytes).ok()?;

    Some(session_id)
}

fn mac(secret: &str, payload: &str) -> Vec<u8> {
    // HMAC accepts keys of any length
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(payload.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        Err(_) => Vec::new(),
    }
}

/// Session cookie carrying a signed session ID.
pub fn session_cookie(config: &AuthConfig, session_id: &SessionId) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, sign_session_id(&config.session_secret, session_id)))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies)
        .max_age(cookie::time::Duration::seconds(SESSION_COOKIE_MAX_AGE_SECS as i64))
        .build()
}

/// Short-lived cookie holding the OAuth `state` value.
pub fn oauth_state_cookie(config: &AuthConfig, state: &str) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE, state.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies)
        .max_age(cookie::time::Duration::seconds(OAUTH_STATE_MAX_AGE_SECS))
        .build()
}

/// Cookie that deletes `name` when passed to `CookieJar::remove`.
pub fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

/// Authenticated user extracted from the session cookie.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub session_id: SessionId,
    pub user: User,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        let value = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or_else(|| ApiError::unauthorized("Not logged in"))?;

        let session_id = verify_session_cookie(&state.auth.session_secret, &value)
            .ok_or_else(|| ApiError::unauthorized("Invalid session"))?;

        let session = state
            .sessions
            .get(&session_id)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Session not found"))?;

        if session.is_expired() {
            debug!(session_id = %session_id, "Rejecting expired session");
            if let Err(e) = state.sessions.delete(&session_id).await {
                warn!(session_id = %session_id, error = %e, "Failed to delete expired session");
            }
            return Err(ApiError::unauthorized("Session expired"));
        }

        let user = state
            .users
            .get(&session.user_id)
            .await?
            .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

        Ok(AuthUser { session_id, user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_sign_and_verify() {
        let sid = SessionId::from("6f1c2a9e-6a86-4c1f-9b4c-6a1d2b3c4d5e");
        let signed = sign_session_id(SECRET, &sid);
        assert!(signed.starts_with("6f1c2a9e-6a86-4c1f-9b4c-6a1d2b3c4d5e."));
        assert_eq!(verify_session_cookie(SECRET, &signed), Some(sid));
    }

    #[test]
    fn test_tampered_cookie_rejected() {
        let signed = sign_session_id(SECRET, &SessionId::from("abc"));
        let forged = signed.replacen("abc", "abd", 1);
        assert_eq!(verify_session_cookie(SECRET, &forged), None);
        assert_eq!(verify_session_cookie("another-secret-another-secret-xx", &signed), None);
        assert_eq!(verify_session_cookie(SECRET, "abc"), None);
        assert_eq!(verify_session_cookie(SECRET, "../x.c2ln"), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let config = AuthConfig {
            google_client_id: "id".into(),
            google_client_secret: "secret".into(),
            callback_url: "http://localhost/cb".into(),
            login_success_redirect: "/".into(),
            session_secret: SECRET.into(),
            session_ttl: std::time::Duration::from_secs(60),
            secure_cookies: true,
        };
        let cookie = session_cookie(&config, &SessionId::from("abc"));
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }
}
