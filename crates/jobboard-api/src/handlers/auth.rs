//! Google login, OAuth callback and logout.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use jobboard_models::{Session, User};

use crate::auth::{
    oauth_state_cookie, removal, session_cookie, verify_session_cookie, OAUTH_STATE_COOKIE,
    SESSION_COOKIE,
};
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Where the browser goes after a failed login or a logout.
const HOME: &str = "/";

/// Query string Google sends back to the callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /api/auth/google
///
/// Redirect to Google's consent screen with a fresh CSRF `state`.
pub async fn google_login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Redirect)> {
    let csrf = Uuid::new_v4().simple().to_string();
    let url = state.google.authorization_url(&csrf)?;
    let jar = jar.add(oauth_state_cookie(&state.auth, &csrf));
    Ok((jar, Redirect::to(&url)))
}

/// GET /api/auth/google/callback
///
/// Any failure sends the browser home without a session.
pub async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    query: Option<Query<CallbackQuery>>,
) -> Response {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let expected_state = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(removal(OAUTH_STATE_COOKIE));

    match complete_login(&state, query, expected_state).await {
        Ok((user, session)) => {
            metrics::record_login("success");
            info!(user_id = %user.id, "User logged in");
            let jar = jar.add(session_cookie(&state.auth, &session.id));
            (jar, Redirect::to(&state.auth.login_success_redirect)).into_response()
        }
        Err((reason, e)) => {
            metrics::record_login(reason);
            warn!(reason = reason, error = %e, "Google login failed");
            (jar, Redirect::to(HOME)).into_response()
        }
    }
}

type LoginFailure = (&'static str, ApiError);

async fn complete_login(
    state: &AppState,
    query: CallbackQuery,
    expected_state: Option<String>,
) -> Result<(User, Session), LoginFailure> {
    if let Some(error) = query.error {
        return Err(("denied", ApiError::unauthorized(error)));
    }

    match (query.state.as_deref(), expected_state.as_deref()) {
        (Some(got), Some(want)) if !got.is_empty() && got == want => {}
        _ => {
            return Err((
                "state_mismatch",
                ApiError::unauthorized("OAuth state does not match"),
            ))
        }
    }

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ("missing_code", ApiError::bad_request("Missing authorization code")))?;

    let id_token = state
        .google
        .exchange_code(&code)
        .await
        .map_err(|e| ("token_exchange", e))?;

    let claims = state
        .jwks
        .verify_id_token(&id_token)
        .await
        .map_err(|e| ("invalid_id_token", e))?;

    let user = state
        .user_service
        .find_or_create(claims.into_profile())
        .await
        .map_err(|e| ("user_store", e))?;

    let ttl = chrono::Duration::from_std(state.auth.session_ttl)
        .map_err(|e| ("session_store", ApiError::internal(e.to_string())))?;
    let session = Session::new(user.id.clone(), ttl);
    state
        .sessions
        .create(&session)
        .await
        .map_err(|e| ("session_store", ApiError::from(e)))?;

    Ok((user, session))
}

/// GET /api/logout
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    let session_id = jar
        .get(SESSION_COOKIE)
        .and_then(|c| verify_session_cookie(&state.auth.session_secret, c.value()));

    if let Some(session_id) = session_id {
        match state.sessions.delete(&session_id).await {
            Ok(()) => info!(session_id = %session_id, "Session ended"),
            Err(e) => warn!(session_id = %session_id, error = %e, "Failed to delete session"),
        }
    }

    (jar.remove(removal(SESSION_COOKIE)), Redirect::to(HOME))
}
