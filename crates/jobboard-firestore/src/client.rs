//! Firestore REST API client.
//!
//! - Token caching with refresh margin (or the emulator's fixed token)
//! - HTTP client tuning (pooling, timeouts)
//! - Exponential backoff with jitter for 429/5xx/network failures
//! - Observability (tracing spans, metrics)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{FirestoreError, FirestoreResult, DEFAULT_RATE_LIMIT_BACKOFF_MS};
use crate::metrics::{record_documents_read, record_request};
use crate::retry::{with_retry, RetryConfig};
use crate::token_cache::{TokenCache, EMULATOR_TOKEN};
use crate::types::{
    BatchGetDocumentsRequest, BatchGetDocumentsResponse, BatchWriteRequest, BatchWriteResponse,
    Document, DocumentMask, ListDocumentsResponse, RunQueryRequest, RunQueryResponse,
    Cursor, FieldReference, Order, StructuredQuery, Value, Write,
};

/// Firestore limit on documents per batchGet.
pub const MAX_BATCH_GET: usize = 100;

/// Firestore limit on writes per batchWrite.
pub const MAX_BATCH_WRITE: usize = 500;

/// Upper bound on pages fetched by [`FirestoreClient::run_query_paged`].
pub const MAX_QUERY_PAGES: usize = 100;

// =============================================================================
// Configuration
// =============================================================================

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// `host:port` of a Firestore emulator; disables credential loading
    pub emulator_host: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                FirestoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
                )
            })?;

        if project_id.is_empty() {
            return Err(FirestoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.is_empty()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }

    /// Config for a local emulator at `host` (`host:port`, no scheme).
    pub fn emulator(project_id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            emulator_host: Some(host.into()),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(2),
            retry: RetryConfig::default(),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Status and body of a finished request.
struct RawResponse {
    status: StatusCode,
    body: String,
}

impl RawResponse {
    fn json<T: DeserializeOwned>(&self, what: &str) -> FirestoreResult<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            FirestoreError::invalid_response(format!(
                "Failed to parse {} response: {} (body prefix: {})",
                what,
                e,
                self.body.chars().take(200).collect::<String>()
            ))
        })
    }

    fn into_error(self, url: &str) -> FirestoreError {
        FirestoreError::from_http_status(self.status.as_u16(), format!("{} failed: {}", url, self.body))
    }
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    token_cache: Arc<TokenCache>,
}

impl FirestoreClient {
    /// Create a new Firestore client.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let token_cache = match &config.emulator_host {
            Some(host) => {
                info!(host = %host, "Using Firestore emulator");
                TokenCache::fixed(EMULATOR_TOKEN)
            }
            None => TokenCache::new(Self::create_auth_provider()?),
        };

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("jobboard-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        let root = match &config.emulator_host {
            Some(host) => format!("http://{}", host.trim_end_matches('/')),
            None => "https://firestore.googleapis.com".to_string(),
        };
        let base_url = format!(
            "{}/v1/projects/{}/databases/{}/documents",
            root, config.project_id, config.database_id
        );

        Ok(Self {
            http,
            config,
            base_url,
            token_cache: Arc::new(token_cache),
        })
    }

    fn create_auth_provider() -> FirestoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env()
            .map_err(|e| FirestoreError::auth_error(format!("Failed to load service account: {}", e)))?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(FirestoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        let config = FirestoreConfig::from_env()?;
        Self::new(config).await
    }

    pub fn project_id(&self) -> &str {
        &self.config.project_id
    }

    pub fn is_emulator(&self) -> bool {
        self.config.emulator_host.is_some()
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Full resource name used by batch operations and reference values.
    pub fn full_document_name(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "projects/{}/databases/{}/documents/{}/{}",
            self.config.project_id, self.config.database_id, collection, doc_id
        )
    }

    // =========================================================================
    // CRUD Operations
    // =========================================================================

    /// Get a document. Missing documents are `None`.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);
        let raw = self
            .execute("get_document", collection, Some(doc_id), Method::GET, &url, None)
            .await?;

        match raw.status {
            StatusCode::OK => Ok(Some(raw.json("get")?)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(raw.into_error(&url)),
        }
    }

    /// Create a document with a caller-chosen ID.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!(
            "{}/{}?documentId={}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        );
        let body = serde_json::to_value(Document::new(fields))?;
        let raw = self
            .execute("create_document", collection, Some(doc_id), Method::POST, &url, Some(&body))
            .await?;

        match raw.status {
            StatusCode::OK | StatusCode::CREATED => raw.json("create"),
            StatusCode::CONFLICT => Err(FirestoreError::AlreadyExists(format!(
                "{}/{}",
                collection, doc_id
            ))),
            _ => Err(raw.into_error(&url)),
        }
    }

    /// Update fields of an existing document.
    ///
    /// With a mask only the listed paths are written; fields missing from
    /// `fields` but present in the mask are deleted. The document must
    /// exist, otherwise `NotFound` is returned.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
    ) -> FirestoreResult<Document> {
        let mut params: Vec<String> = update_mask
            .unwrap_or_default()
            .iter()
            .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f)))
            .collect();
        params.push("currentDocument.exists=true".to_string());
        let url = format!("{}?{}", self.document_path(collection, doc_id), params.join("&"));

        let body = serde_json::to_value(Document::new(fields))?;
        let raw = self
            .execute("update_document", collection, Some(doc_id), Method::PATCH, &url, Some(&body))
            .await?;

        match raw.status {
            StatusCode::OK => raw.json("update"),
            StatusCode::NOT_FOUND => Err(FirestoreError::not_found(format!("{}/{}", collection, doc_id))),
            _ => Err(raw.into_error(&url)),
        }
    }

    /// Delete a document. Deleting a missing document succeeds.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<()> {
        let url = self.document_path(collection, doc_id);
        let raw = self
            .execute("delete_document", collection, Some(doc_id), Method::DELETE, &url, None)
            .await?;

        match raw.status {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!("Document {}/{} already deleted", collection, doc_id);
                Ok(())
            }
            _ => Err(raw.into_error(&url)),
        }
    }

    /// List one page of documents in a collection.
    pub async fn list_documents(
        &self,
        collection: &str,
        page_size: Option<u32>,
        page_token: Option<&str>,
    ) -> FirestoreResult<ListDocumentsResponse> {
        let mut params = Vec::new();
        if let Some(size) = page_size {
            params.push(format!("pageSize={}", size));
        }
        if let Some(token) = page_token {
            params.push(format!("pageToken={}", urlencoding::encode(token)));
        }
        let mut url = format!("{}/{}", self.base_url, collection);
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }

        let raw = self
            .execute("list_documents", collection, None, Method::GET, &url, None)
            .await?;

        match raw.status {
            StatusCode::OK => {
                let list: ListDocumentsResponse = raw.json("list")?;
                record_documents_read(collection, list.documents.as_ref().map_or(0, Vec::len));
                Ok(list)
            }
            _ => Err(raw.into_error(&url)),
        }
    }

    /// Fetch up to [`MAX_BATCH_GET`] documents by ID in one request.
    ///
    /// Missing documents are omitted; order follows the response.
    pub async fn batch_get_documents(
        &self,
        collection: &str,
        doc_ids: &[String],
        mask: Option<DocumentMask>,
    ) -> FirestoreResult<Vec<Document>> {
        if doc_ids.is_empty() {
            return Ok(vec![]);
        }
        if doc_ids.len() > MAX_BATCH_GET {
            return Err(FirestoreError::request_failed(format!(
                "Batch get exceeds {} document limit",
                MAX_BATCH_GET
            )));
        }

        let url = format!("{}:batchGet", self.base_url);
        let request = BatchGetDocumentsRequest {
            documents: doc_ids
                .iter()
                .map(|id| self.full_document_name(collection, id))
                .collect(),
            mask,
        };
        let body = serde_json::to_value(&request)?;
        let raw = self
            .execute("batch_get_documents", collection, None, Method::POST, &url, Some(&body))
            .await?;

        match raw.status {
            StatusCode::OK => {
                let responses: Vec<BatchGetDocumentsResponse> = raw.json("batchGet")?;
                let docs: Vec<Document> = responses.into_iter().filter_map(|r| r.found).collect();
                record_documents_read(collection, docs.len());
                Ok(docs)
            }
            _ => Err(raw.into_error(&url)),
        }
    }

    /// Apply up to [`MAX_BATCH_WRITE`] writes in one request.
    ///
    /// Writes are applied independently; any per-write failure is reported
    /// as an error after the others have been applied.
    pub async fn batch_write(&self, writes: Vec<Write>) -> FirestoreResult<BatchWriteResponse> {
        if writes.is_empty() {
            return Ok(BatchWriteResponse::empty());
        }
        if writes.len() > MAX_BATCH_WRITE {
            return Err(FirestoreError::request_failed(format!(
                "Batch write exceeds {} document limit",
                MAX_BATCH_WRITE
            )));
        }

        let url = format!("{}:batchWrite", self.base_url);
        let body = serde_json::to_value(BatchWriteRequest { writes })?;
        let raw = self
            .execute("batch_write", "batch", None, Method::POST, &url, Some(&body))
            .await?;

        match raw.status {
            StatusCode::OK => {
                let response: BatchWriteResponse = raw.json("batchWrite")?;
                response.check_for_errors()?;
                Ok(response)
            }
            _ => Err(raw.into_error(&url)),
        }
    }

    // =========================================================================
    // Query Operations
    // =========================================================================

    /// Run a structured query.
    ///
    /// `parent_path` is the document containing the queried collection, or
    /// an empty string for top-level collections.
    pub async fn run_query(
        &self,
        parent_path: &str,
        query: StructuredQuery,
    ) -> FirestoreResult<Vec<Document>> {
        let url = if parent_path.is_empty() {
            format!("{}:runQuery", self.base_url)
        } else {
            format!("{}/{}:runQuery", self.base_url, parent_path.trim_matches('/'))
        };
        let collection = query
            .from
            .first()
            .map(|c| c.collection_id.clone())
            .unwrap_or_default();

        let body = serde_json::to_value(RunQueryRequest {
            structured_query: query,
        })?;
        let raw = self
            .execute("run_query", &collection, None, Method::POST, &url, Some(&body))
            .await?;

        match raw.status {
            StatusCode::OK => {
                let responses: Vec<RunQueryResponse> = raw.json("runQuery")?;
                let docs: Vec<Document> = responses.into_iter().filter_map(|r| r.document).collect();
                record_documents_read(&collection, docs.len());
                Ok(docs)
            }
            _ => Err(raw.into_error(&url)),
        }
    }

    /// Run a query to completion, `page_size` documents at a time.
    ///
    /// Pages are ordered by document name and chained with a `startAt`
    /// cursor on the last name seen, so equality filters need no composite
    /// index. Any `orderBy` or `limit` on `query` is replaced; callers sort
    /// the result themselves. Stops after [`MAX_QUERY_PAGES`] pages.
    pub async fn run_query_paged(
        &self,
        parent_path: &str,
        mut query: StructuredQuery,
        page_size: u32,
    ) -> FirestoreResult<Vec<Document>> {
        let page_size = page_size.clamp(1, i32::MAX as u32);
        query.order_by = Some(vec![Order {
            field: FieldReference {
                field_path: "__name__".to_string(),
            },
            direction: "ASCENDING".to_string(),
        }]);
        query.limit = Some(page_size as i32);
        query.start_at = None;

        let mut docs = Vec::new();
        for page in 1..=MAX_QUERY_PAGES {
            let batch = self.run_query(parent_path, query.clone()).await?;
            let full = batch.len() >= page_size as usize;
            let last_name = batch.last().and_then(|d| d.name.clone());
            docs.extend(batch);

            match last_name {
                Some(name) if full => {
                    query.start_at = Some(Cursor {
                        values: vec![Value::ReferenceValue(name)],
                        before: Some(false),
                    });
                }
                _ => return Ok(docs),
            }

            if page == MAX_QUERY_PAGES {
                warn!(
                    pages = page,
                    documents = docs.len(),
                    "Query truncated at page limit"
                );
            }
        }
        Ok(docs)
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Run a request with retry, inside a `firestore_request` span, and
    /// record its metrics.
    async fn execute(
        &self,
        operation: &'static str,
        collection: &str,
        doc_id: Option<&str>,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> FirestoreResult<RawResponse> {
        let span = match doc_id {
            Some(id) => {
                info_span!("firestore_request", operation = %operation, collection = %collection, doc_id = %id)
            }
            None => info_span!("firestore_request", operation = %operation, collection = %collection),
        };

        let start = Instant::now();
        let method = &method;
        let result = with_retry(&self.config.retry, operation, move || {
            self.send_once(method.clone(), url, body)
        })
        .instrument(span)
        .await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(raw) => raw.status.as_u16(),
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    /// One attempt. A 401 for an expired token invalidates the cache and
    /// retries once; 429 and 5xx become retryable errors.
    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> FirestoreResult<RawResponse> {
        let build = |token: &str| {
            let request = self.http.request(method.clone(), url).bearer_auth(token);
            match body {
                Some(b) => request.json(b),
                None => request,
            }
        };

        let token = self.token_cache.get_token().await?;
        let mut response = build(&token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let text = response.text().await.unwrap_or_default();
            if !Self::is_access_token_expired(&text) {
                return Err(FirestoreError::from_http_status(401, format!("{} failed: {}", url, text)));
            }
            self.token_cache.invalidate().await;
            let token = self.token_cache.get_token().await?;
            response = build(&token).send().await?;
        }

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF_MS);
            return Err(FirestoreError::RateLimited(retry_after_ms));
        }

        let body = response.text().await?;
        if status.is_server_error() {
            return Err(FirestoreError::ServerError(
                status.as_u16(),
                format!("{} failed: {}", url, body),
            ));
        }

        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env_validates_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIREBASE_PROJECT_ID");
        assert!(FirestoreConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_config_reads_emulator_host() {
        std::env::set_var("GCP_PROJECT_ID", "test-project");
        std::env::set_var("FIRESTORE_EMULATOR_HOST", "localhost:8080");
        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.emulator_host.as_deref(), Some("localhost:8080"));

        std::env::set_var("FIRESTORE_EMULATOR_HOST", "");
        let config = FirestoreConfig::from_env().unwrap();
        assert!(config.emulator_host.is_none());

        std::env::remove_var("FIRESTORE_EMULATOR_HOST");
        std::env::remove_var("GCP_PROJECT_ID");
    }

    #[tokio::test]
    async fn test_emulator_client_needs_no_credentials() {
        let client = FirestoreClient::new(FirestoreConfig::emulator("demo", "127.0.0.1:8080"))
            .await
            .unwrap();
        assert!(client.is_emulator());
        assert_eq!(
            client.document_path("jobs", "j1"),
            "http://127.0.0.1:8080/v1/projects/demo/databases/(default)/documents/jobs/j1"
        );
        assert_eq!(
            client.full_document_name("jobs", "j1"),
            "projects/demo/databases/(default)/documents/jobs/j1"
        );
    }
}
