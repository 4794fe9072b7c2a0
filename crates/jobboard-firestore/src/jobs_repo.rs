//! Job posting repository.

use std::collections::HashMap;

use tracing::{info, warn};

use jobboard_models::{Company, Job, JobId, JobType, UserId};

use crate::client::{FirestoreClient, MAX_BATCH_GET};
use crate::error::{FirestoreError, FirestoreResult};
use crate::query::{QueryBuilder, SortDirection, MAX_QUERY_LIMIT};
use crate::types::{Document, ToFirestoreValue, Value};

const COLLECTION: &str = "jobs";

/// Repository for job postings in the top-level `jobs` collection.
#[derive(Clone)]
pub struct JobRepository {
    client: FirestoreClient,
}

impl JobRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, job_id: &JobId) -> FirestoreResult<Option<Job>> {
        let doc = self.client.get_document(COLLECTION, job_id.as_str()).await?;
        doc.map(|d| document_to_job(&d, job_id.as_str())).transpose()
    }

    /// Fetch several jobs at once. Deleted jobs are absent from the map.
    pub async fn get_many(&self, job_ids: &[JobId]) -> FirestoreResult<HashMap<JobId, Job>> {
        let mut ids: Vec<String> = job_ids.iter().map(|id| id.to_string()).collect();
        ids.sort();
        ids.dedup();

        let mut jobs = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BATCH_GET) {
            let docs = self.client.batch_get_documents(COLLECTION, chunk, None).await?;
            for job in parse_documents(&docs) {
                jobs.insert(job.id.clone(), job);
            }
        }
        Ok(jobs)
    }

    pub async fn create(&self, job: &Job) -> FirestoreResult<()> {
        self.client
            .create_document(COLLECTION, job.id.as_str(), job_to_fields(job))
            .await?;
        info!(job_id = %job.id, posted_by = %job.posted_by, "Created job");
        Ok(())
    }

    /// Persist the fields named in `changed`.
    pub async fn update(&self, job: &Job, changed: &[&str]) -> FirestoreResult<()> {
        if changed.is_empty() {
            return Ok(());
        }

        let mut all = job_to_fields(job);
        let fields: HashMap<String, Value> = changed
            .iter()
            .filter_map(|p| all.remove_entry(*p))
            .collect();
        let mask = changed.iter().map(|p| p.to_string()).collect();

        self.client
            .update_document(COLLECTION, job.id.as_str(), fields, Some(mask))
            .await?;
        info!(job_id = %job.id, fields = ?changed, "Updated job");
        Ok(())
    }

    pub async fn delete(&self, job_id: &JobId) -> FirestoreResult<()> {
        self.client.delete_document(COLLECTION, job_id.as_str()).await?;
        info!(job_id = %job_id, "Deleted job");
        Ok(())
    }

    /// Most recently created jobs, newest first.
    pub async fn list_recent(&self, limit: u32) -> FirestoreResult<Vec<Job>> {
        let query = QueryBuilder::new(COLLECTION)
            .order_by("created_at", SortDirection::Descending)
            .limit(limit)
            .build();

        let docs = self.client.run_query("", query).await?;
        Ok(parse_documents(&docs))
    }

    /// Jobs posted by `user_id`, newest first.
    pub async fn list_by_poster(&self, user_id: &UserId) -> FirestoreResult<Vec<Job>> {
        // Equality-only so no composite index is needed; sorted here instead
        let query = QueryBuilder::new(COLLECTION)
            .where_eq("posted_by", user_id.as_str().to_firestore_value())
            .build();

        let docs = self
            .client
            .run_query_paged("", query, MAX_QUERY_LIMIT as u32)
            .await?;
        let mut jobs = parse_documents(&docs);
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}

/// Parse documents, skipping (and logging) any that are malformed.
fn parse_documents(docs: &[Document]) -> Vec<Job> {
    docs.iter()
        .filter_map(|doc| {
            let id = doc.id()?;
            match document_to_job(doc, id) {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!(job_id = %id, error = %e, "Failed to parse job document");
                    None
                }
            }
        })
        .collect()
}

fn company_to_value(company: &Company) -> Value {
    let mut fields = HashMap::new();
    fields.insert("name".to_string(), company.name.to_firestore_value());
    fields.insert("description".to_string(), company.description.to_firestore_value());
    fields.insert(
        "contact_email".to_string(),
        company.contact_email.to_firestore_value(),
    );
    fields.insert(
        "contact_phone".to_string(),
        company.contact_phone.to_firestore_value(),
    );
    Value::map(fields)
}

fn value_to_company(value: Option<&Value>) -> Company {
    let Some(fields) = value.and_then(Value::as_map) else {
        return Company::default();
    };
    let doc = Document::new(fields.clone());
    Company {
        name: doc.get("name").unwrap_or_default(),
        description: doc.get("description"),
        contact_email: doc.get("contact_email"),
        contact_phone: doc.get("contact_phone"),
    }
}

fn job_to_fields(job: &Job) -> HashMap<String, Value> {
    let mut fields = HashMap::new();

    fields.insert("title".to_string(), job.title.to_firestore_value());
    fields.insert("job_type".to_string(), job.job_type.as_str().to_firestore_value());
    fields.insert("location".to_string(), job.location.to_firestore_value());
    fields.insert("description".to_string(), job.description.to_firestore_value());
    fields.insert("price".to_string(), job.price.to_firestore_value());
    fields.insert("company".to_string(), company_to_value(&job.company));
    fields.insert("posted_by".to_string(), job.posted_by.as_str().to_firestore_value());
    fields.insert("created_at".to_string(), job.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), job.updated_at.to_firestore_value());

    fields
}

fn document_to_job(doc: &Document, job_id: &str) -> FirestoreResult<Job> {
    let fields = doc.require_fields()?;

    let posted_by: String = doc.get("posted_by").ok_or_else(|| {
        FirestoreError::invalid_response(format!("Job {} has no posted_by", job_id))
    })?;

    let job_type = doc
        .get::<String>("job_type")
        .and_then(|s| s.parse::<JobType>().ok())
        .unwrap_or_default();
    let created_at = doc.get("created_at").unwrap_or_else(chrono::Utc::now);

    Ok(Job {
        id: JobId::from(job_id),
        title: doc.get("title").unwrap_or_default(),
        job_type,
        location: doc.get("location").unwrap_or_default(),
        description: doc.get("description").unwrap_or_default(),
        price: doc.get("price").unwrap_or_default(),
        company: value_to_company(fields.get("company")),
        posted_by: UserId::from(posted_by),
        created_at,
        updated_at: doc.get("updated_at").unwrap_or(created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobboard_models::NewJob;

    fn job() -> Job {
        Job::new(
            NewJob {
                title: "Backend engineer".into(),
                job_type: JobType::OnGoing,
                location: "Remote".into(),
                description: "Build APIs".into(),
                price: "$80/h".into(),
                company: Company {
                    name: "Acme".into(),
                    contact_email: Some("jobs@acme.test".into()),
                    ..Default::default()
                },
            },
            UserId::from("poster-1"),
        )
    }

    #[test]
    fn test_job_fields_round_trip() {
        let job = job();
        let doc = Document::new(job_to_fields(&job));

        assert_eq!(doc.get::<String>("job_type").as_deref(), Some("On Going"));

        let parsed = document_to_job(&doc, job.id.as_str()).unwrap();
        assert_eq!(parsed, job);
    }

    #[test]
    fn test_parse_documents_skips_malformed() {
        let mut good = Document::new(job_to_fields(&job()));
        good.name = Some("projects/p/databases/(default)/documents/jobs/a".into());

        let mut bad = Document::new(HashMap::from([(
            "title".to_string(),
            "orphan".to_firestore_value(),
        )]));
        bad.name = Some("projects/p/databases/(default)/documents/jobs/b".into());

        let jobs = parse_documents(&[good, bad]);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id.as_str(), "a");
    }

    #[test]
    fn test_missing_company_defaults() {
        assert_eq!(value_to_company(None), Company::default());
    }
}
