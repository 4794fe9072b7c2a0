//! Job application handlers.
//!
//! Submission is a multipart form carrying the text fields plus an optional
//! CV and supporting document. Files are stored in R2 under the new
//! application's id before the Firestore document is written.

use std::collections::HashSet;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use axum_extra::extract::WithRejection;
use serde::Serialize;
use tracing::{debug, info, warn};
use validator::Validate;

use jobboard_models::{
    ApplicationFields, ApplicationId, ApplicationStatus, ApplicationView, DocumentKind,
    JobApplication, JobId, JobSummary, StatusUpdate, StoredDocument,
};
use jobboard_storage::{signed_document_url, upload_application_document, SignedUrl};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::jobs::parse_job_id;
use crate::metrics;
use crate::security::{sanitize_string, validate_cv, validate_supporting_doc};
use crate::state::AppState;

// ============================================================================
// Types
// ============================================================================

/// Applications the current user sent and received.
#[derive(Debug, Serialize)]
pub struct ApplicationsResponse {
    pub sent: Vec<ApplicationView>,
    pub received: Vec<ApplicationView>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: usize,
}

/// A validated file from the submission form.
#[derive(Debug)]
struct UploadedFile {
    file_name: String,
    content_type: &'static str,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct Submission {
    fields: ApplicationFields,
    cv: Option<UploadedFile>,
    supporting_docs: Option<UploadedFile>,
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_application_id(raw: String) -> ApiResult<ApplicationId> {
    let id = ApplicationId::from(raw);
    if id.is_valid() {
        Ok(id)
    } else {
        Err(ApiError::not_found("Application not found"))
    }
}

/// Load an application the current user is party to.
async fn load_visible(
    state: &AppState,
    raw_id: String,
    user: &AuthUser,
) -> ApiResult<JobApplication> {
    let id = parse_application_id(raw_id)?;
    let application = state
        .applications
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Application not found"))?;

    if !application.can_view(&user.user.id) {
        return Err(ApiError::forbidden("Not authorized to access this application"));
    }
    Ok(application)
}

/// Populate jobs and applicants for a list of applications.
async fn application_views(
    state: &AppState,
    applications: Vec<JobApplication>,
) -> ApiResult<Vec<ApplicationView>> {
    if applications.is_empty() {
        return Ok(Vec::new());
    }

    let job_ids: Vec<JobId> = applications
        .iter()
        .map(|a| a.job_id.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let applicant_ids: Vec<_> = applications.iter().map(|a| a.applicant_id.clone()).collect();

    let jobs = state.jobs.get_many(&job_ids).await?;
    let applicants = state.user_service.summaries(&applicant_ids).await?;

    Ok(applications
        .into_iter()
        .map(|app| {
            let job = jobs.get(&app.job_id).map(JobSummary::from);
            let applicant = applicants.get(&app.applicant_id).cloned();
            app.into_view(job, applicant)
        })
        .collect())
}

async fn application_view(state: &AppState, application: JobApplication) -> ApiResult<ApplicationView> {
    let mut views = application_views(state, vec![application]).await?;
    views
        .pop()
        .ok_or_else(|| ApiError::internal("Application view was not built"))
}

/// Read a file part, failing as soon as it grows past `max_bytes`.
async fn read_capped(field: &mut Field<'_>, max_bytes: usize) -> ApiResult<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        if data.len() + chunk.len() > max_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "Each file must be at most {} bytes",
                max_bytes
            )));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn read_submission(mut multipart: Multipart, max_file_bytes: usize) -> ApiResult<Submission> {
    let mut submission = Submission::default();

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(kind) = DocumentKind::from_field_name(&name) {
            let file_name = field
                .file_name()
                .map(str::to_string)
                .filter(|n| !n.trim().is_empty());
            let declared_type = field.content_type().map(str::to_string);
            let data = read_capped(&mut field, max_file_bytes).await?;

            // Forms send an unnamed empty part when no file was chosen
            let file_name = match file_name {
                Some(file_name) => file_name,
                None if data.is_empty() => {
                    debug!(field = %name, "Skipping empty file field");
                    continue;
                }
                None => kind.field_name().to_string(),
            };

            let checked = match kind {
                DocumentKind::Cv => validate_cv(&file_name, declared_type.as_deref(), &data),
                DocumentKind::SupportingDocs => {
                    validate_supporting_doc(&file_name, declared_type.as_deref(), &data)
                }
            };
            let content_type = checked.into_result().map_err(ApiError::bad_request)?;

            let upload = UploadedFile {
                file_name,
                content_type,
                data,
            };
            match kind {
                DocumentKind::Cv => submission.cv = Some(upload),
                DocumentKind::SupportingDocs => submission.supporting_docs = Some(upload),
            }
            continue;
        }

        let value = sanitize_string(&field.text().await?);
        let optional = |v: String| Some(v).filter(|v| !v.trim().is_empty());
        let fields = &mut submission.fields;
        match name.as_str() {
            "job" => fields.job = value.trim().to_string(),
            "message" => fields.message = value,
            "skills" => fields.skills = value,
            "projectLinks" => fields.project_links = optional(value),
            "phone" => fields.phone = optional(value),
            "email" => fields.email = value.trim().to_string(),
            other => debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    Ok(submission)
}

/// Best-effort cleanup of objects written for a failed or withdrawn application.
async fn discard_uploads(state: &AppState, keys: Vec<String>) {
    if keys.is_empty() {
        return;
    }
    if let Err(e) = state.storage.delete_objects(&keys).await {
        warn!(keys = ?keys, error = %e, "Failed to delete application documents");
    }
}

async fn store_uploads(
    state: &AppState,
    application: &mut JobApplication,
    cv: Option<UploadedFile>,
    supporting_docs: Option<UploadedFile>,
) -> ApiResult<u64> {
    let mut uploaded_bytes = 0;
    for (kind, file) in [
        (DocumentKind::Cv, cv),
        (DocumentKind::SupportingDocs, supporting_docs),
    ] {
        let Some(file) = file else { continue };

        let stored: StoredDocument = upload_application_document(
            &state.storage,
            &application.id,
            kind,
            &file.file_name,
            file.content_type,
            file.data,
        )
        .await?;

        uploaded_bytes += stored.size_bytes;
        match kind {
            DocumentKind::Cv => application.cv = Some(stored),
            DocumentKind::SupportingDocs => application.supporting_docs = Some(stored),
        }
    }
    Ok(uploaded_bytes)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/job-applications
///
/// Returns:
/// - 201: Application created
/// - 400: Invalid form, bad file, or applying to one's own job
/// - 404: Job not found
/// - 409: Already applied to this job
/// - 413: File too large
pub async fn submit_application(
    State(state): State<AppState>,
    user: AuthUser,
    WithRejection(multipart, _): WithRejection<Multipart, ApiError>,
) -> ApiResult<(StatusCode, Json<ApplicationView>)> {
    let Submission {
        fields,
        cv,
        supporting_docs,
    } = read_submission(multipart, state.config.max_upload_bytes).await?;

    fields.validate().map_err(|e| ApiError::validation(&e))?;

    let job_id = parse_job_id(fields.job.clone())?;
    let job = state
        .jobs
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    if job.is_owned_by(&user.user.id) {
        return Err(ApiError::bad_request("You cannot apply to your own job"));
    }

    if state
        .applications
        .find_by_job_and_applicant(&job.id, &user.user.id)
        .await?
        .is_some()
    {
        return Err(ApiError::conflict("You have already applied to this job"));
    }

    let mut application = JobApplication::new(
        ApplicationId::new(),
        fields,
        user.user.id.clone(),
        job.posted_by.clone(),
    );

    let uploaded_bytes = match store_uploads(&state, &mut application, cv, supporting_docs).await {
        Ok(bytes) => bytes,
        Err(e) => {
            discard_uploads(&state, application.document_keys()).await;
            return Err(e);
        }
    };

    if let Err(e) = state.applications.create(&application).await {
        discard_uploads(&state, application.document_keys()).await;
        return Err(e.into());
    }

    metrics::record_application_submitted(uploaded_bytes);
    info!(
        application_id = %application.id,
        job_id = %job.id,
        applicant_id = %user.user.id,
        uploaded_bytes,
        "Application submitted"
    );

    let view = application.into_view(Some(JobSummary::from(&job)), Some(user.user.summary()));
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/job-applications
pub async fn list_applications(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<ApplicationsResponse>> {
    let (sent, received) = tokio::try_join!(
        state.applications.list_by_applicant(&user.user.id),
        state.applications.list_received(&user.user.id),
    )?;

    Ok(Json(ApplicationsResponse {
        sent: application_views(&state, sent).await?,
        received: application_views(&state, received).await?,
    }))
}

/// GET /api/pending-applications-count
pub async fn pending_applications_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<CountResponse>> {
    let count = state.applications.count_pending(&user.user.id).await?;
    Ok(Json(CountResponse { count }))
}

/// GET /api/applications/:id
pub async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<ApplicationView>> {
    let application = load_visible(&state, id, &user).await?;
    Ok(Json(application_view(&state, application).await?))
}

async fn document_url(
    state: &AppState,
    raw_id: String,
    user: &AuthUser,
    kind: DocumentKind,
) -> ApiResult<Json<SignedUrl>> {
    let application = load_visible(state, raw_id, user).await?;
    let document = application.document(kind).ok_or_else(|| match kind {
        DocumentKind::Cv => ApiError::not_found("No CV uploaded for this application"),
        DocumentKind::SupportingDocs => {
            ApiError::not_found("No supporting documents uploaded for this application")
        }
    })?;

    let signed = signed_document_url(&state.storage, &state.signed_urls, document).await?;
    debug!(application_id = %application.id, kind = %kind, "Issued signed document URL");
    Ok(Json(signed))
}

/// GET /api/applications/:id/cv-url
pub async fn get_cv_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<SignedUrl>> {
    document_url(&state, id, &user, DocumentKind::Cv).await
}

/// GET /api/applications/:id/supporting-docs-url
pub async fn get_supporting_docs_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<SignedUrl>> {
    document_url(&state, id, &user, DocumentKind::SupportingDocs).await
}

/// PATCH /api/applications/:id/status
///
/// Employer only. Any status may be set.
pub async fn update_application_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
    WithRejection(Json(update), _): WithRejection<Json<StatusUpdate>, ApiError>,
) -> ApiResult<Json<ApplicationView>> {
    let mut application = load_visible(&state, id, &user).await?;
    if !application.is_employer(&user.user.id) {
        return Err(ApiError::forbidden("Only the employer can change the status"));
    }

    if application.status != update.status {
        state
            .applications
            .update_status(&application.id, update.status)
            .await?;
        application.status = update.status;
        application.updated_at = chrono::Utc::now();
    }

    Ok(Json(application_view(&state, application).await?))
}

/// DELETE /api/applications/:id
///
/// The employer hides the application from their inbox; the applicant
/// withdraws it, which is only possible while it is still pending.
pub async fn delete_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> ApiResult<StatusCode> {
    let application = load_visible(&state, id, &user).await?;

    if application.is_employer(&user.user.id) {
        state
            .applications
            .mark_deleted_by_employer(&application.id)
            .await?;
        return Ok(StatusCode::NO_CONTENT);
    }

    if application.status != ApplicationStatus::Pending {
        return Err(ApiError::conflict(
            "Only pending applications can be withdrawn",
        ));
    }

    state.applications.delete(&application.id).await?;
    discard_uploads(&state, application.document_keys()).await;

    info!(application_id = %application.id, "Application withdrawn");
    Ok(StatusCode::NO_CONTENT)
}
