//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, patch, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::error::ApiError;
use crate::handlers::{
    create_job, current_user, delete_application, delete_job, get_application, get_cv_url,
    get_job, get_supporting_docs_url, google_callback, google_login, health, list_applications,
    list_jobs, list_user_jobs, logout, pending_applications_count, ready, submit_application,
    update_application_status, update_job, update_profile,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

async fn api_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs", get(list_jobs).post(create_job))
        .route("/jobs/:id", get(get_job).put(update_job).delete(delete_job))
        .route("/user_jobs", get(list_user_jobs));

    let application_routes = Router::new()
        // Multipart bodies exceed axum's 2 MB extractor default
        .route(
            "/job-applications",
            get(list_applications)
                .post(submit_application)
                .layer(DefaultBodyLimit::max(state.config.max_body_size)),
        )
        .route("/pending-applications-count", get(pending_applications_count))
        .route(
            "/applications/:id",
            get(get_application).delete(delete_application),
        )
        .route("/applications/:id/cv-url", get(get_cv_url))
        .route(
            "/applications/:id/supporting-docs-url",
            get(get_supporting_docs_url),
        )
        .route("/applications/:id/status", patch(update_application_status));

    let user_routes = Router::new()
        .route("/current_user", get(current_user))
        .route("/profile", put(update_profile));

    let auth_routes = Router::new()
        .route("/auth/google", get(google_login))
        .route("/auth/google/callback", get(google_callback))
        .route("/logout", get(logout));

    let rate_limiter = Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    let api_routes = Router::new()
        .merge(job_routes)
        .merge(application_routes)
        .merge(user_routes)
        .merge(auth_routes)
        .fallback(api_not_found)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let router = Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes);

    // Client-side routes fall back to index.html
    let router = match &state.config.static_dir {
        Some(dir) => router.fallback_service(
            ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
        ),
        None => router,
    };

    router
        // SECURITY: Request body size limit to prevent DoS attacks
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
