//! Job application repository.
//!
//! Applications live in the top-level `job_applications` collection. The
//! employer's id is copied onto each application when it is submitted so
//! that "received" listings are a single equality query.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{info, warn};

use jobboard_models::{
    ApplicationId, ApplicationStatus, JobApplication, JobId, StoredDocument, UserId,
};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::query::{QueryBuilder, MAX_QUERY_LIMIT};
use crate::types::{Document, StructuredQuery, ToFirestoreValue, Value};

const COLLECTION: &str = "job_applications";

/// Repository for job application documents.
#[derive(Clone)]
pub struct ApplicationRepository {
    client: FirestoreClient,
}

impl ApplicationRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, id: &ApplicationId) -> FirestoreResult<Option<JobApplication>> {
        let doc = self.client.get_document(COLLECTION, id.as_str()).await?;
        doc.map(|d| document_to_application(&d, id.as_str())).transpose()
    }

    pub async fn create(&self, application: &JobApplication) -> FirestoreResult<()> {
        self.client
            .create_document(
                COLLECTION,
                application.id.as_str(),
                application_to_fields(application),
            )
            .await?;
        info!(
            application_id = %application.id,
            job_id = %application.job_id,
            applicant_id = %application.applicant_id,
            "Created application"
        );
        Ok(())
    }

    /// Applications submitted by `user_id`, newest first.
    pub async fn list_by_applicant(&self, user_id: &UserId) -> FirestoreResult<Vec<JobApplication>> {
        let query = QueryBuilder::new(COLLECTION)
            .where_eq("applicant_id", user_id.as_str().to_firestore_value())
            .build();
        self.run_all(query).await
    }

    /// Applications to jobs posted by `user_id` that the employer has not
    /// removed from their view, newest first.
    pub async fn list_received(&self, user_id: &UserId) -> FirestoreResult<Vec<JobApplication>> {
        let query = QueryBuilder::new(COLLECTION)
            .where_eq("employer_id", user_id.as_str().to_firestore_value())
            .where_eq("deleted_by_employer", false.to_firestore_value())
            .build();
        self.run_all(query).await
    }

    /// Number of visible received applications still awaiting a decision.
    pub async fn count_pending(&self, user_id: &UserId) -> FirestoreResult<usize> {
        let query = QueryBuilder::new(COLLECTION)
            .where_eq("employer_id", user_id.as_str().to_firestore_value())
            .where_eq("deleted_by_employer", false.to_firestore_value())
            .where_eq("status", ApplicationStatus::Pending.as_str().to_firestore_value())
            .build();
        let docs = self
            .client
            .run_query_paged("", query, MAX_QUERY_LIMIT as u32)
            .await?;
        Ok(docs.len())
    }

    /// Existing application by `applicant_id` for `job_id`, if any.
    pub async fn find_by_job_and_applicant(
        &self,
        job_id: &JobId,
        applicant_id: &UserId,
    ) -> FirestoreResult<Option<JobApplication>> {
        let query = QueryBuilder::new(COLLECTION)
            .where_eq("job_id", job_id.as_str().to_firestore_value())
            .where_eq("applicant_id", applicant_id.as_str().to_firestore_value())
            .limit(1)
            .build();
        Ok(self.run(query).await?.into_iter().next())
    }

    pub async fn update_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
    ) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), status.as_str().to_firestore_value());
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

        self.client
            .update_document(
                COLLECTION,
                id.as_str(),
                fields,
                Some(vec!["status".to_string(), "updated_at".to_string()]),
            )
            .await?;
        info!(application_id = %id, status = %status, "Updated application status");
        Ok(())
    }

    /// Hide the application from the employer's received list.
    pub async fn mark_deleted_by_employer(&self, id: &ApplicationId) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("deleted_by_employer".to_string(), true.to_firestore_value());
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

        self.client
            .update_document(
                COLLECTION,
                id.as_str(),
                fields,
                Some(vec![
                    "deleted_by_employer".to_string(),
                    "updated_at".to_string(),
                ]),
            )
            .await?;
        info!(application_id = %id, "Application removed from employer view");
        Ok(())
    }

    pub async fn delete(&self, id: &ApplicationId) -> FirestoreResult<()> {
        self.client.delete_document(COLLECTION, id.as_str()).await?;
        info!(application_id = %id, "Deleted application");
        Ok(())
    }

    async fn run(&self, query: StructuredQuery) -> FirestoreResult<Vec<JobApplication>> {
        let docs = self.client.run_query("", query).await?;
        Ok(parse_sorted(&docs))
    }

    /// Every match, fetched page by page.
    async fn run_all(&self, query: StructuredQuery) -> FirestoreResult<Vec<JobApplication>> {
        let docs = self
            .client
            .run_query_paged("", query, MAX_QUERY_LIMIT as u32)
            .await?;
        Ok(parse_sorted(&docs))
    }
}

/// Parse documents newest first, skipping (and logging) malformed ones.
fn parse_sorted(docs: &[Document]) -> Vec<JobApplication> {
    let mut applications: Vec<JobApplication> = docs
        .iter()
        .filter_map(|doc| {
            let id = doc.id()?;
            match document_to_application(doc, id) {
                Ok(app) => Some(app),
                Err(e) => {
                    warn!(application_id = %id, error = %e, "Failed to parse application document");
                    None
                }
            }
        })
        .collect();
    applications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    applications
}

fn stored_document_to_value(doc: &StoredDocument) -> Value {
    let mut fields = HashMap::new();
    fields.insert("key".to_string(), doc.key.to_firestore_value());
    fields.insert("file_name".to_string(), doc.file_name.to_firestore_value());
    fields.insert("content_type".to_string(), doc.content_type.to_firestore_value());
    fields.insert("size_bytes".to_string(), doc.size_bytes.to_firestore_value());
    Value::map(fields)
}

fn value_to_stored_document(value: Option<&Value>) -> Option<StoredDocument> {
    let doc = Document::new(value?.as_map()?.clone());
    Some(StoredDocument {
        key: doc.get("key")?,
        file_name: doc.get("file_name").unwrap_or_else(|| "document".to_string()),
        content_type: doc
            .get("content_type")
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        size_bytes: doc.get("size_bytes").unwrap_or(0),
    })
}

fn application_to_fields(app: &JobApplication) -> HashMap<String, Value> {
    let mut fields = HashMap::new();

    fields.insert("job_id".to_string(), app.job_id.as_str().to_firestore_value());
    fields.insert(
        "applicant_id".to_string(),
        app.applicant_id.as_str().to_firestore_value(),
    );
    fields.insert(
        "employer_id".to_string(),
        app.employer_id.as_str().to_firestore_value(),
    );
    fields.insert("message".to_string(), app.message.to_firestore_value());
    fields.insert("skills".to_string(), app.skills.to_firestore_value());
    fields.insert("project_links".to_string(), app.project_links.to_firestore_value());
    fields.insert("phone".to_string(), app.phone.to_firestore_value());
    fields.insert("email".to_string(), app.email.to_firestore_value());
    fields.insert("status".to_string(), app.status.as_str().to_firestore_value());
    fields.insert(
        "deleted_by_employer".to_string(),
        app.deleted_by_employer.to_firestore_value(),
    );

    if let Some(ref cv) = app.cv {
        fields.insert("cv".to_string(), stored_document_to_value(cv));
    }
    if let Some(ref docs) = app.supporting_docs {
        fields.insert("supporting_docs".to_string(), stored_document_to_value(docs));
    }

    fields.insert("created_at".to_string(), app.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), app.updated_at.to_firestore_value());

    fields
}

fn document_to_application(doc: &Document, id: &str) -> FirestoreResult<JobApplication> {
    let fields = doc.require_fields()?;

    let required = |key: &str| -> FirestoreResult<String> {
        doc.get(key).ok_or_else(|| {
            FirestoreError::invalid_response(format!("Application {} has no {}", id, key))
        })
    };

    let status = doc
        .get::<String>("status")
        .and_then(|s| s.parse::<ApplicationStatus>().ok())
        .unwrap_or_default();
    let created_at = doc.get("created_at").unwrap_or_else(Utc::now);

    Ok(JobApplication {
        id: ApplicationId::from(id),
        job_id: JobId::from(required("job_id")?),
        applicant_id: UserId::from(required("applicant_id")?),
        employer_id: UserId::from(required("employer_id")?),
        message: doc.get("message").unwrap_or_default(),
        skills: doc.get("skills").unwrap_or_default(),
        project_links: doc.get("project_links"),
        cv: value_to_stored_document(fields.get("cv")),
        supporting_docs: value_to_stored_document(fields.get("supporting_docs")),
        phone: doc.get("phone"),
        email: doc.get("email").unwrap_or_default(),
        status,
        deleted_by_employer: doc.get("deleted_by_employer").unwrap_or(false),
        created_at,
        updated_at: doc.get("updated_at").unwrap_or(created_at),
    })
}
