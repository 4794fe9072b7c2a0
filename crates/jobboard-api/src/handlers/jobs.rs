//! Job posting handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use jobboard_models::{Job, JobId, JobUpdate, JobView, NewJob};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Largest page a client may ask for with `_limit`.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Cap on the unpaged job list.
pub const MAX_QUERY_LIMIT: u32 = 1000;

/// Query parameters for the job list.
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    /// Kept as a string so a bad value gets a JSON error instead of a
    /// plain-text query rejection.
    #[serde(rename = "_limit")]
    pub limit: Option<String>,
}

impl ListJobsQuery {
    fn page_size(&self) -> ApiResult<u32> {
        match self.limit.as_deref().map(str::trim) {
            None | Some("") => Ok(MAX_QUERY_LIMIT),
            Some(raw) => raw
                .parse::<u32>()
                .map(|n| n.clamp(1, MAX_PAGE_LIMIT))
                .map_err(|_| ApiError::bad_request("_limit must be a positive integer")),
        }
    }
}

pub(crate) fn parse_job_id(raw: String) -> ApiResult<JobId> {
    let id = JobId::from(raw);
    if id.is_valid() {
        Ok(id)
    } else {
        Err(ApiError::not_found("Job not found"))
    }
}

/// Attach poster summaries to jobs, preserving order.
pub(crate) async fn job_views(state: &AppState, jobs: Vec<Job>) -> ApiResult<Vec<JobView>> {
    let poster_ids: Vec<_> = jobs.iter().map(|j| j.posted_by.clone()).collect();
    let posters = state.user_service.summaries(&poster_ids).await?;
    Ok(jobs
        .into_iter()
        .map(|job| {
            let poster = posters.get(&job.posted_by).cloned();
            job.into_view(poster)
        })
        .collect())
}

async fn load_owned_job(state: &AppState, raw_id: String, user: &AuthUser) -> ApiResult<Job> {
    let job_id = parse_job_id(raw_id)?;
    let job = state
        .jobs
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    if !job.is_owned_by(&user.user.id) {
        return Err(ApiError::forbidden("You can only modify your own job postings"));
    }
    Ok(job)
}

/// GET /api/jobs
///
/// Newest jobs first. `_limit` is clamped to 1..=100.
pub async fn list_jobs(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<ListJobsQuery>, ApiError>,
) -> ApiResult<Json<Vec<JobView>>> {
    let limit = query.page_size()?;
    let jobs = state.jobs.list_recent(limit).await?;
    Ok(Json(job_views(&state, jobs).await?))
}

/// GET /api/jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobView>> {
    let job_id = parse_job_id(job_id)?;
    let job = state
        .jobs
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    let poster = state
        .user_service
        .summaries(std::slice::from_ref(&job.posted_by))
        .await?
        .remove(&job.posted_by);

    Ok(Json(job.into_view(poster)))
}

/// POST /api/jobs
pub async fn create_job(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(Json(input), _): WithRejection<Json<NewJob>, ApiError>,
) -> ApiResult<(StatusCode, Json<JobView>)> {
    input.validate().map_err(|e| ApiError::validation(&e))?;

    let job = Job::new(input, user.user.id.clone());
    state.jobs.create(&job).await?;
    metrics::record_job_posted();

    info!(job_id = %job.id, user_id = %user.user.id, "Job posted");

    Ok((StatusCode::CREATED, Json(job.into_view(Some(user.user.summary())))))
}

/// PUT /api/jobs/:id
///
/// Merge the supplied fields into the posting. Owner only.
pub async fn update_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    user: AuthUser,
    WithRejection(Json(update), _): WithRejection<Json<JobUpdate>, ApiError>,
) -> ApiResult<Json<JobView>> {
    update.validate().map_err(|e| ApiError::validation(&e))?;

    let mut job = load_owned_job(&state, job_id, &user).await?;
    let changed = update.apply(&mut job);
    if !changed.is_empty() {
        state.jobs.update(&job, &changed).await?;
        info!(job_id = %job.id, fields = ?changed, "Job updated");
    }

    Ok(Json(job.into_view(Some(user.user.summary()))))
}

/// DELETE /api/jobs/:id
///
/// Applications for the job are left in place.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    user: AuthUser,
) -> ApiResult<StatusCode> {
    let job = load_owned_job(&state, job_id, &user).await?;
    state.jobs.delete(&job.id).await?;

    info!(job_id = %job.id, user_id = %user.user.id, "Job deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/user_jobs
pub async fn list_user_jobs(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<JobView>>> {
    let jobs = state.jobs.list_by_poster(&user.user.id).await?;
    let summary = user.user.summary();
    Ok(Json(
        jobs.into_iter()
            .map(|job| job.into_view(Some(summary.clone())))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(limit: Option<&str>) -> ListJobsQuery {
        ListJobsQuery {
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn test_page_size() {
        assert_eq!(query(None).page_size().unwrap(), MAX_QUERY_LIMIT);
        assert_eq!(query(Some("")).page_size().unwrap(), MAX_QUERY_LIMIT);
        assert_eq!(query(Some("5")).page_size().unwrap(), 5);
        assert_eq!(query(Some("0")).page_size().unwrap(), 1);
        assert_eq!(query(Some("5000")).page_size().unwrap(), MAX_PAGE_LIMIT);
        assert!(matches!(
            query(Some("ten")).page_size(),
            Err(ApiError::BadRequest(_))
        ));
        assert!(query(Some("-1")).page_size().is_err());
    }

    #[test]
    fn test_parse_job_id() {
        assert!(parse_job_id("4b1e0c2a-9d5f-4e8a-a1b2-c3d4e5f6a7b8".into()).is_ok());
        assert!(matches!(
            parse_job_id("../users".into()),
            Err(ApiError::NotFound(_))
        ));
    }
}
