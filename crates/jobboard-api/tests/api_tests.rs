//! Router tests against a wiremock server standing in for both the
//! Firestore emulator and the R2 bucket (path-style, under `/jobboard-test`).

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jobboard_api::auth::{sign_session_id, GoogleOAuth, JwksCache, OAUTH_STATE_COOKIE, SESSION_COOKIE};
use jobboard_api::{create_router, ApiConfig, AppState, AuthConfig};
use jobboard_firestore::{FirestoreClient, FirestoreConfig, RetryConfig};
use jobboard_models::SessionId;
use jobboard_storage::{R2Client, R2Config, SignedUrlConfig};

// =============================================================================
// Test Helpers
// =============================================================================

const DOCS: &str = "/v1/projects/test-project/databases/(default)/documents";
const DOC_NAME_PREFIX: &str = "projects/test-project/databases/(default)/documents";
const SECRET: &str = "test-session-secret-0123456789abcdef";
const SESSION_ID: &str = "sess-1";

fn auth_config() -> AuthConfig {
    AuthConfig {
        google_client_id: "client-id.apps.googleusercontent.com".into(),
        google_client_secret: "client-secret".into(),
        callback_url: "http://localhost:1967/api/auth/google/callback".into(),
        login_success_redirect: "http://localhost:3000".into(),
        session_secret: SECRET.into(),
        session_ttl: Duration::from_secs(3600),
        secure_cookies: false,
    }
}

async fn app(server: &MockServer) -> Router {
    let firestore = FirestoreClient::new(FirestoreConfig {
        retry: RetryConfig {
            max_retries: 0,
            base_delay_ms: 1,
            max_delay_ms: 1,
        },
        ..FirestoreConfig::emulator("test-project", server.address().to_string())
    })
    .await
    .unwrap();

    let storage = R2Client::new(R2Config {
        endpoint_url: server.uri(),
        access_key_id: "test-access-key".into(),
        secret_access_key: "test-secret-key".into(),
        bucket_name: "jobboard-test".into(),
        region: "auto".into(),
    })
    .await
    .unwrap();

    let auth = auth_config();
    let jwks = JwksCache::with_url(auth.google_client_id.clone(), format!("{}/certs", server.uri()))
        .unwrap();
    let google = GoogleOAuth::with_endpoints(
        &auth,
        "https://accounts.google.com/o/oauth2/v2/auth",
        format!("{}/token", server.uri()),
    )
    .unwrap();

    let state = AppState::from_parts(
        ApiConfig::default(),
        auth,
        storage,
        SignedUrlConfig::default(),
        firestore,
        jwks,
        google,
    );
    create_router(state, None)
}

fn session_cookie() -> String {
    format!(
        "{}={}",
        SESSION_COOKIE,
        sign_session_id(SECRET, &SessionId::from(SESSION_ID))
    )
}

fn timestamp(offset: chrono::Duration) -> String {
    (Utc::now() + offset).to_rfc3339_opts(SecondsFormat::Secs, true)
}

async fn mount_session(server: &MockServer, user_id: &str, expires_in: chrono::Duration) {
    Mock::given(method("GET"))
        .and(path(format!("{}/sessions/{}", DOCS, SESSION_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": format!("{}/sessions/{}", DOC_NAME_PREFIX, SESSION_ID),
            "fields": {
                "user_id": { "stringValue": user_id },
                "created_at": { "timestampValue": timestamp(-chrono::Duration::hours(1)) },
                "expires_at": { "timestampValue": timestamp(expires_in) }
            }
        })))
        .mount(server)
        .await;
}

fn user_doc(id: &str, name: &str) -> Value {
    json!({
        "name": format!("{}/users/{}", DOC_NAME_PREFIX, id),
        "fields": {
            "google_id": { "stringValue": format!("google-{}", id) },
            "display_name": { "stringValue": name },
            "emails": { "arrayValue": { "values": [{ "stringValue": format!("{}@example.com", id) }] } },
            "use_company_name": { "booleanValue": false },
            "created_at": { "timestampValue": "2024-05-01T10:00:00Z" }
        }
    })
}

async fn mount_user(server: &MockServer, id: &str, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("{}/users/{}", DOCS, id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_doc(id, name)))
        .mount(server)
        .await;
}

/// Logged in as `u1`.
async fn mount_login(server: &MockServer) {
    mount_session(server, "u1", chrono::Duration::days(1)).await;
    mount_user(server, "u1", "Ada").await;
}

fn job_doc(id: &str, posted_by: &str) -> Value {
    json!({
        "name": format!("{}/jobs/{}", DOC_NAME_PREFIX, id),
        "fields": {
            "title": { "stringValue": "Backend engineer" },
            "job_type": { "stringValue": "On Going" },
            "location": { "stringValue": "Remote" },
            "description": { "stringValue": "Build APIs" },
            "price": { "stringValue": "$80/h" },
            "company": { "mapValue": { "fields": { "name": { "stringValue": "Acme" } } } },
            "posted_by": { "stringValue": posted_by },
            "created_at": { "timestampValue": "2024-05-02T10:00:00Z" }
        }
    })
}

async fn mount_job(server: &MockServer, id: &str, posted_by: &str) {
    Mock::given(method("GET"))
        .and(path(format!("{}/jobs/{}", DOCS, id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_doc(id, posted_by)))
        .mount(server)
        .await;
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn authed(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, session_cookie());
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// A file part: field name, file name, content type and bytes.
type FilePart<'a> = (&'a str, &'a str, &'a str, &'a [u8]);

fn multipart_request(fields: &[(&str, &str)]) -> Request<Body> {
    multipart_with_files(fields, &[])
}

fn multipart_with_files(fields: &[(&str, &str)], files: &[FilePart<'_>]) -> Request<Body> {
    const BOUNDARY: &str = "XJOBBOARDX";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    for (name, file_name, content_type, data) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, file_name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/job-applications")
        .header(header::COOKIE, session_cookie())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn application_form() -> Vec<(&'static str, &'static str)> {
    vec![
        ("job", "j1"),
        ("message", "I would love to help"),
        ("skills", "Rust, SQL"),
        ("email", "ada@example.com"),
    ]
}

// =============================================================================
// Public Routes
// =============================================================================

#[tokio::test]
async fn test_health_has_security_headers() {
    let server = MockServer::start().await;
    let (status, headers, body) = send(app(&server).await, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_list_jobs_with_poster_summary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", DOCS)))
        .and(body_partial_json(json!({
            "structuredQuery": { "from": [{ "collectionId": "jobs" }], "limit": 5 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "document": job_doc("j1", "u1"), "readTime": "2024-05-03T00:00:00Z" }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}:batchGet", DOCS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "found": user_doc("u1", "Ada") }
        ])))
        .mount(&server)
        .await;

    let (status, _, body) = send(app(&server).await, get("/api/jobs?_limit=5")).await;

    assert_eq!(status, StatusCode::OK);
    let jobs = body.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], "j1");
    assert_eq!(jobs[0]["type"], "On Going");
    assert_eq!(jobs[0]["postedBy"]["id"], "u1");
    assert_eq!(jobs[0]["postedBy"]["displayName"], "Ada");
}

#[tokio::test]
async fn test_list_jobs_rejects_bad_limit() {
    let server = MockServer::start().await;
    let (status, _, body) = send(app(&server).await, get("/api/jobs?_limit=ten")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("_limit"));
}

#[tokio::test]
async fn test_missing_job_is_json_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/jobs/nope", DOCS)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "status": "NOT_FOUND" }
        })))
        .mount(&server)
        .await;

    let (status, _, body) = send(app(&server).await, get("/api/jobs/nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Job not found" }));
}

#[tokio::test]
async fn test_unknown_api_route_is_json_404() {
    let server = MockServer::start().await;
    let (status, _, body) = send(app(&server).await, get("/api/does-not-exist")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_create_job_requires_login() {
    let server = MockServer::start().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/jobs")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let (status, _, body) = send(app(&server).await, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_forged_cookie_is_rejected() {
    let server = MockServer::start().await;
    let request = Request::builder()
        .uri("/api/current_user")
        .header(header::COOKIE, format!("{}={}.bm90LWEtc2ln", SESSION_COOKIE, SESSION_ID))
        .body(Body::empty())
        .unwrap();

    let (status, _, _) = send(app(&server).await, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_session_is_deleted_and_rejected() {
    let server = MockServer::start().await;
    mount_session(&server, "u1", -chrono::Duration::minutes(5)).await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/sessions/{}", DOCS, SESSION_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let (status, _, _) = send(
        app(&server).await,
        authed(Method::GET, "/api/current_user", None),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_current_user_includes_applied_jobs() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", DOCS)))
        .and(body_partial_json(json!({
            "structuredQuery": { "from": [{ "collectionId": "job_applications" }] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "document": {
                "name": format!("{}/job_applications/a1", DOC_NAME_PREFIX),
                "fields": {
                    "job_id": { "stringValue": "j9" },
                    "applicant_id": { "stringValue": "u1" },
                    "employer_id": { "stringValue": "u2" },
                    "email": { "stringValue": "ada@example.com" },
                    "status": { "stringValue": "Pending" }
                }
            }
        }])))
        .mount(&server)
        .await;

    let (status, _, body) = send(
        app(&server).await,
        authed(Method::GET, "/api/current_user", None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "u1");
    assert_eq!(body["displayName"], "Ada");
    assert_eq!(body["appliedJobs"], json!(["j9"]));
}

// =============================================================================
// Jobs
// =============================================================================

#[tokio::test]
async fn test_create_job_sets_poster() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/jobs", DOCS)))
        .and(body_partial_json(json!({
            "fields": { "posted_by": { "stringValue": "u1" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_doc("new", "u1")))
        .expect(1)
        .mount(&server)
        .await;

    let payload = json!({
        "title": "Backend engineer",
        "type": "One Off",
        "location": "Remote",
        "description": "Build APIs",
        "price": "$500",
        "company": { "name": "Acme" }
    });
    let (status, _, body) = send(
        app(&server).await,
        authed(Method::POST, "/api/jobs", Some(payload)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["title"], "Backend engineer");
    assert_eq!(body["type"], "One Off");
    assert_eq!(body["postedBy"]["id"], "u1");
}

#[tokio::test]
async fn test_create_job_validates_payload() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let payload = json!({
        "title": "",
        "location": "Remote",
        "description": "Build APIs",
        "price": "$500",
        "company": { "name": "Acme" }
    });
    let (status, _, body) = send(
        app(&server).await,
        authed(Method::POST, "/api/jobs", Some(payload)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("title"));
}

#[tokio::test]
async fn test_blank_title_is_rejected_on_create_and_update() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/jobs", DOCS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_doc("new", "u1")))
        .expect(0)
        .mount(&server)
        .await;

    let payload = json!({
        "title": "   ",
        "location": "Remote",
        "description": "Build APIs",
        "price": "$500",
        "company": { "name": "Acme" }
    });
    let (status, _, body) = send(
        app(&server).await,
        authed(Method::POST, "/api/jobs", Some(payload)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("title"));

    let (status, _, _) = send(
        app(&server).await,
        authed(Method::PUT, "/api/jobs/j1", Some(json!({ "title": "  " }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_only_owner_can_update_job() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_job(&server, "j1", "u2").await;

    let (status, _, _) = send(
        app(&server).await,
        authed(Method::PUT, "/api/jobs/j1", Some(json!({ "title": "Mine now" }))),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_owner_deletes_job() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_job(&server, "j1", "u1").await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/jobs/j1", DOCS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let (status, _, _) = send(
        app(&server).await,
        authed(Method::DELETE, "/api/jobs/j1", None),
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
}

// =============================================================================
// Applications
// =============================================================================

#[tokio::test]
async fn test_cannot_apply_to_own_job() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_job(&server, "j1", "u1").await;

    let (status, _, body) = send(
        app(&server).await,
        multipart_request(&application_form()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "You cannot apply to your own job");
}

#[tokio::test]
async fn test_duplicate_application_conflicts() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_job(&server, "j1", "u2").await;
    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", DOCS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "document": {
                "name": format!("{}/job_applications/a1", DOC_NAME_PREFIX),
                "fields": {
                    "job_id": { "stringValue": "j1" },
                    "applicant_id": { "stringValue": "u1" },
                    "employer_id": { "stringValue": "u2" }
                }
            }
        }])))
        .mount(&server)
        .await;

    let (status, _, _) = send(
        app(&server).await,
        multipart_request(&application_form()),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_application_requires_valid_email() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let mut form = application_form();
    form.retain(|(name, _)| *name != "email");
    form.push(("email", "not-an-email"));

    let (status, _, body) = send(app(&server).await, multipart_request(&form)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("email"));
}

async fn mount_application(server: &MockServer, applicant: &str, employer: &str, status: &str) {
    Mock::given(method("GET"))
        .and(path(format!("{}/job_applications/a1", DOCS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": format!("{}/job_applications/a1", DOC_NAME_PREFIX),
            "fields": {
                "job_id": { "stringValue": "j1" },
                "applicant_id": { "stringValue": applicant },
                "employer_id": { "stringValue": employer },
                "message": { "stringValue": "Hello" },
                "skills": { "stringValue": "Rust" },
                "email": { "stringValue": "ada@example.com" },
                "status": { "stringValue": status },
                "cv": { "mapValue": { "fields": {
                    "key": { "stringValue": "applications/a1/cv/My_CV.pdf" },
                    "file_name": { "stringValue": "My_CV.pdf" },
                    "content_type": { "stringValue": "application/pdf" },
                    "size_bytes": { "integerValue": "2048" }
                } } }
            }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_cv_url_is_signed_for_applicant() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_application(&server, "u1", "u2", "Accepted").await;

    let (status, _, body) = send(
        app(&server).await,
        authed(Method::GET, "/api/applications/a1/cv-url", None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let url = body["url"].as_str().unwrap();
    assert!(url.contains("applications/a1/cv/My_CV.pdf"));
    assert!(url.contains("X-Amz-Signature="));
    assert!(url.contains("response-content-disposition="));
    assert_eq!(body["expiresInSecs"], 900);
}

#[tokio::test]
async fn test_missing_supporting_docs_is_404() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_application(&server, "u1", "u2", "Accepted").await;

    let (status, _, _) = send(
        app(&server).await,
        authed(Method::GET, "/api/applications/a1/supporting-docs-url", None),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_strangers_cannot_read_application() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_application(&server, "u7", "u2", "Accepted").await;

    let (status, _, _) = send(
        app(&server).await,
        authed(Method::GET, "/api/applications/a1", None),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_applicant_cannot_change_status() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_application(&server, "u1", "u2", "Accepted").await;

    let (status, _, _) = send(
        app(&server).await,
        authed(
            Method::PATCH,
            "/api/applications/a1/status",
            Some(json!({ "status": "Accepted" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_decided_application_cannot_be_withdrawn() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_application(&server, "u1", "u2", "Accepted").await;

    let (status, _, _) = send(
        app(&server).await,
        authed(Method::DELETE, "/api/applications/a1", None),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_employer_delete_is_soft() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_application(&server, "u2", "u1", "Accepted").await;
    Mock::given(method("PATCH"))
        .and(path(format!("{}/job_applications/a1", DOCS)))
        .and(body_partial_json(json!({
            "fields": { "deleted_by_employer": { "booleanValue": true } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "fields": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let (status, _, _) = send(
        app(&server).await,
        authed(Method::DELETE, "/api/applications/a1", None),
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
}

fn application_doc(id: &str, job: &str, applicant: &str, employer: &str, status: &str) -> Value {
    json!({
        "name": format!("{}/job_applications/{}", DOC_NAME_PREFIX, id),
        "fields": {
            "job_id": { "stringValue": job },
            "applicant_id": { "stringValue": applicant },
            "employer_id": { "stringValue": employer },
            "message": { "stringValue": "Hello" },
            "skills": { "stringValue": "Rust" },
            "email": { "stringValue": format!("{}@example.com", applicant) },
            "status": { "stringValue": status },
            "deleted_by_employer": { "booleanValue": false },
            "created_at": { "timestampValue": "2024-05-03T10:00:00Z" }
        }
    })
}

/// Answer batchGet calls for one collection with `docs`.
async fn mount_batch_get(server: &MockServer, collection: &str, docs: Vec<Value>) {
    let found: Vec<Value> = docs.into_iter().map(|d| json!({ "found": d })).collect();
    Mock::given(method("POST"))
        .and(path(format!("{}:batchGet", DOCS)))
        .and(body_string_contains(format!("/documents/{}/", collection)))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(found)))
        .mount(server)
        .await;
}

async fn mount_no_existing_application(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", DOCS)))
        .and(body_partial_json(json!({
            "structuredQuery": { "from": [{ "collectionId": "job_applications" }], "limit": 1 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "readTime": "2024-05-03T00:00:00Z" }
        ])))
        .mount(server)
        .await;
}

async fn mount_cv_upload(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path_regex(r"^/jobboard-test/applications/[0-9a-f-]+/cv/My_CV\.pdf$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_bucket_delete(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/jobboard-test/?$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<?xml version="1.0" encoding="UTF-8"?><DeleteResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"></DeleteResult>"#,
        ))
        .expect(expected_calls)
        .mount(server)
        .await;
}

const PDF: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\n%%EOF\n";

fn cv_submission() -> Request<Body> {
    multipart_with_files(
        &application_form(),
        &[("cv", "My CV.pdf", "application/pdf", PDF)],
    )
}

#[tokio::test]
async fn test_submit_application_uploads_cv_then_writes() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_job(&server, "j1", "u2").await;
    mount_no_existing_application(&server).await;
    mount_cv_upload(&server).await;
    mount_bucket_delete(&server, 0).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/job_applications", DOCS)))
        .and(body_partial_json(json!({
            "fields": {
                "job_id": { "stringValue": "j1" },
                "applicant_id": { "stringValue": "u1" },
                "employer_id": { "stringValue": "u2" },
                "status": { "stringValue": "Pending" }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "fields": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let (status, _, body) = send(app(&server).await, cv_submission()).await;

    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();
    let expected_key = format!("applications/{}/cv/My_CV.pdf", id);
    assert_eq!(body["cv"]["key"], expected_key.as_str());
    assert_eq!(body["cv"]["fileName"], "My_CV.pdf");
    assert_eq!(body["status"], "Pending");
    assert_eq!(body["job"]["title"], "Backend engineer");

    let requests = server.received_requests().await.unwrap();
    let upload_at = requests
        .iter()
        .position(|r| r.method.to_string() == "PUT")
        .unwrap();
    let write_at = requests
        .iter()
        .position(|r| {
            r.method.to_string() == "POST"
                && r.url.path() == format!("{}/job_applications", DOCS)
        })
        .unwrap();
    assert!(upload_at < write_at);
    assert_eq!(
        requests[upload_at].url.path(),
        format!("/jobboard-test/{}", expected_key)
    );

    let written: Value = serde_json::from_slice(&requests[write_at].body).unwrap();
    assert_eq!(
        written["fields"]["cv"]["mapValue"]["fields"]["key"]["stringValue"],
        expected_key.as_str()
    );
}

#[tokio::test]
async fn test_failed_write_discards_uploaded_cv() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_job(&server, "j1", "u2").await;
    mount_no_existing_application(&server).await;
    mount_cv_upload(&server).await;
    mount_bucket_delete(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/job_applications", DOCS)))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "code": 500, "status": "INTERNAL" }
        })))
        .mount(&server)
        .await;

    let (status, _, body) = send(app(&server).await, cv_submission()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_list_applications_sent_and_received() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", DOCS)))
        .and(body_partial_json(json!({
            "structuredQuery": {
                "where": { "fieldFilter": { "field": { "fieldPath": "applicant_id" } } }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "document": application_doc("a1", "j1", "u1", "u2", "Pending") }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", DOCS)))
        .and(body_partial_json(json!({
            "structuredQuery": {
                "where": { "compositeFilter": { "filters": [
                    { "fieldFilter": { "field": { "fieldPath": "employer_id" } } }
                ] } }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "document": application_doc("a2", "j2", "u3", "u1", "Accepted") }
        ])))
        .mount(&server)
        .await;
    mount_batch_get(&server, "jobs", vec![job_doc("j1", "u2"), job_doc("j2", "u1")]).await;
    mount_batch_get(&server, "users", vec![user_doc("u1", "Ada"), user_doc("u3", "Cy")]).await;

    let (status, _, body) = send(
        app(&server).await,
        authed(Method::GET, "/api/job-applications", None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let sent = body["sent"].as_array().unwrap();
    let received = body["received"].as_array().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(received.len(), 1);
    assert_eq!(sent[0]["id"], "a1");
    assert_eq!(sent[0]["job"]["id"], "j1");
    assert_eq!(sent[0]["applicant"]["displayName"], "Ada");
    assert_eq!(received[0]["id"], "a2");
    assert_eq!(received[0]["status"], "Accepted");
    assert_eq!(received[0]["applicant"]["displayName"], "Cy");
}

#[tokio::test]
async fn test_pending_count_for_employer() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", DOCS)))
        .and(body_partial_json(json!({
            "structuredQuery": {
                "where": { "compositeFilter": { "filters": [
                    { "fieldFilter": { "field": { "fieldPath": "employer_id" }, "value": { "stringValue": "u1" } } },
                    { "fieldFilter": { "field": { "fieldPath": "deleted_by_employer" } } },
                    { "fieldFilter": { "field": { "fieldPath": "status" }, "value": { "stringValue": "Pending" } } }
                ] } }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "document": application_doc("a1", "j1", "u2", "u1", "Pending") },
            { "document": application_doc("a2", "j1", "u3", "u1", "Pending") }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let (status, _, body) = send(
        app(&server).await,
        authed(Method::GET, "/api/pending-applications-count", None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "count": 2 }));
}

#[tokio::test]
async fn test_employer_sets_status() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_application(&server, "u2", "u1", "Pending").await;
    Mock::given(method("PATCH"))
        .and(path(format!("{}/job_applications/a1", DOCS)))
        .and(body_partial_json(json!({
            "fields": { "status": { "stringValue": "Rejected" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "fields": {} })))
        .expect(1)
        .mount(&server)
        .await;
    mount_batch_get(&server, "jobs", vec![job_doc("j1", "u1")]).await;
    mount_batch_get(&server, "users", vec![user_doc("u2", "Bo")]).await;

    let (status, _, body) = send(
        app(&server).await,
        authed(
            Method::PATCH,
            "/api/applications/a1/status",
            Some(json!({ "status": "Rejected" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "a1");
    assert_eq!(body["status"], "Rejected");
    assert_eq!(body["applicant"]["displayName"], "Bo");
}

#[tokio::test]
async fn test_applicant_withdraws_pending_application() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_application(&server, "u1", "u2", "Pending").await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/job_applications/a1", DOCS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    mount_bucket_delete(&server, 1).await;

    let (status, _, _) = send(
        app(&server).await,
        authed(Method::DELETE, "/api/applications/a1", None),
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
}

// =============================================================================
// OAuth
// =============================================================================

#[tokio::test]
async fn test_google_login_redirects_with_state_cookie() {
    let server = MockServer::start().await;
    let response = app(&server)
        .await
        .oneshot(get("/api/auth/google"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    assert!(location.contains("client_id=client-id.apps.googleusercontent.com"));

    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with(&format!("{}=", OAUTH_STATE_COOKIE)));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_callback_with_wrong_state_goes_home() {
    let server = MockServer::start().await;
    let request = Request::builder()
        .uri("/api/auth/google/callback?code=abc&state=attacker")
        .header(header::COOKIE, format!("{}=expected", OAUTH_STATE_COOKIE))
        .body(Body::empty())
        .unwrap();

    let response = app(&server).await.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
    let cookies: Vec<_> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().all(|c| !c.starts_with(&format!("{}=", SESSION_COOKIE))));
}

#[tokio::test]
async fn test_logout_destroys_session() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/sessions/{}", DOCS, SESSION_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&server)
        .await
        .oneshot(authed(Method::GET, "/api/logout", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with(&format!("{}=", SESSION_COOKIE)));
    assert!(cookie.contains("Max-Age=0"));
}
