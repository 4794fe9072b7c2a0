//! Current user and employer profile handlers.

use axum::extract::State;
use axum::Json;
use axum_extra::extract::WithRejection;
use serde::Serialize;
use tracing::info;
use validator::Validate;

use jobboard_models::{JobId, ProfileUpdate, User};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Logged-in user with the jobs they have applied to.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUserResponse {
    #[serde(flatten)]
    pub user: User,
    pub applied_jobs: Vec<JobId>,
}

/// GET /api/current_user
///
/// 401 when logged out, so the client can tell the two states apart.
pub async fn current_user(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<CurrentUserResponse>> {
    let applied_jobs = state
        .applications
        .list_by_applicant(&user.user.id)
        .await?
        .into_iter()
        .map(|a| a.job_id)
        .collect();

    Ok(Json(CurrentUserResponse {
        user: user.user,
        applied_jobs,
    }))
}

/// PUT /api/profile
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(update), _): WithRejection<Json<ProfileUpdate>, ApiError>,
) -> ApiResult<Json<User>> {
    update.validate().map_err(|e| ApiError::validation(&e))?;

    let user_id = user.user.id.clone();
    let updated = state.user_service.update_profile(user.user, update).await?;
    info!(user_id = %user_id, "Profile updated");

    Ok(Json(updated))
}
