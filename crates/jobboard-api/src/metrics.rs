//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "jobboard_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "jobboard_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "jobboard_http_requests_in_flight";

    // Domain metrics
    pub const APPLICATIONS_SUBMITTED_TOTAL: &str = "jobboard_applications_submitted_total";
    pub const UPLOAD_BYTES_TOTAL: &str = "jobboard_upload_bytes_total";
    pub const JOBS_POSTED_TOTAL: &str = "jobboard_jobs_posted_total";
    pub const LOGINS_TOTAL: &str = "jobboard_logins_total";
    pub const SESSIONS_SWEPT_TOTAL: &str = "jobboard_sessions_swept_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "jobboard_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a submitted application and the bytes it uploaded.
pub fn record_application_submitted(upload_bytes: u64) {
    counter!(names::APPLICATIONS_SUBMITTED_TOTAL).increment(1);
    counter!(names::UPLOAD_BYTES_TOTAL).increment(upload_bytes);
}

pub fn record_job_posted() {
    counter!(names::JOBS_POSTED_TOTAL).increment(1);
}

/// Record a login attempt. `outcome` is `success` or a short failure reason.
pub fn record_login(outcome: &'static str) {
    counter!(names::LOGINS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_sessions_swept(count: usize) {
    counter!(names::SESSIONS_SWEPT_TOTAL).increment(count as u64);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

// Document ids directly under a collection route
static ID_SEGMENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^/api/(jobs|applications)/[A-Za-z0-9_-]+").ok());

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    if !path.starts_with("/api/") && path != "/api" {
        // SPA assets would explode label cardinality
        return match path {
            "/health" | "/healthz" | "/ready" | "/metrics" => path.to_string(),
            _ => "/static".to_string(),
        };
    }
    match ID_SEGMENT.as_ref() {
        Some(re) => re.replace(path, "/api/$1/:id").into_owned(),
        None => path.to_string(),
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    // Increment in-flight counter
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    // Decrement in-flight counter
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/jobs/550e8400-e29b-41d4-a716-446655440000"),
            "/api/jobs/:id"
        );
        assert_eq!(
            sanitize_path("/api/applications/abc_123/cv-url"),
            "/api/applications/:id/cv-url"
        );
        assert_eq!(sanitize_path("/api/job-applications"), "/api/job-applications");
        assert_eq!(sanitize_path("/assets/index-4f2a.js"), "/static");
        assert_eq!(sanitize_path("/ready"), "/ready");
    }
}
