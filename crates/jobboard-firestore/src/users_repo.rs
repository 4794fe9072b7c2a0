//! User repository.
//!
//! Users live in the top-level `users` collection keyed by [`UserId`] and
//! are looked up by Google subject on every login.

use std::collections::HashMap;

use tracing::{info, warn};

use jobboard_models::{User, UserId};

use crate::client::{FirestoreClient, MAX_BATCH_GET};
use crate::error::{FirestoreError, FirestoreResult};
use crate::query::QueryBuilder;
use crate::types::{Document, ToFirestoreValue, Value};

const COLLECTION: &str = "users";

/// Repository for user documents.
#[derive(Clone)]
pub struct UserRepository {
    client: FirestoreClient,
}

impl UserRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, user_id: &UserId) -> FirestoreResult<Option<User>> {
        let doc = self.client.get_document(COLLECTION, user_id.as_str()).await?;
        doc.map(|d| document_to_user(&d, user_id.as_str())).transpose()
    }

    /// Fetch several users at once. Unknown IDs are absent from the map.
    pub async fn get_many(&self, user_ids: &[UserId]) -> FirestoreResult<HashMap<UserId, User>> {
        let mut ids: Vec<String> = user_ids.iter().map(|id| id.to_string()).collect();
        ids.sort();
        ids.dedup();

        let mut users = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BATCH_GET) {
            for doc in self.client.batch_get_documents(COLLECTION, chunk, None).await? {
                let Some(id) = doc.id().map(str::to_string) else {
                    continue;
                };
                match document_to_user(&doc, &id) {
                    Ok(user) => {
                        users.insert(user.id.clone(), user);
                    }
                    Err(e) => warn!(user_id = %id, error = %e, "Failed to parse user document"),
                }
            }
        }
        Ok(users)
    }

    pub async fn find_by_google_id(&self, google_id: &str) -> FirestoreResult<Option<User>> {
        let query = QueryBuilder::new(COLLECTION)
            .where_eq("google_id", google_id.to_firestore_value())
            .limit(1)
            .build();

        let docs = self.client.run_query("", query).await?;
        match docs.first() {
            Some(doc) => {
                let id = doc
                    .id()
                    .ok_or_else(|| FirestoreError::invalid_response("User document has no name"))?;
                Ok(Some(document_to_user(doc, id)?))
            }
            None => Ok(None),
        }
    }

    pub async fn create(&self, user: &User) -> FirestoreResult<()> {
        self.client
            .create_document(COLLECTION, user.id.as_str(), user_to_fields(user))
            .await?;
        info!(user_id = %user.id, "Created user");
        Ok(())
    }

    /// Persist the Google-sourced identity fields.
    pub async fn update_identity(&self, user: &User) -> FirestoreResult<()> {
        self.update_fields(user, &["display_name", "emails", "photos", "updated_at"])
            .await
    }

    /// Persist the profile fields named in `changed`.
    pub async fn update_profile(&self, user: &User, changed: &[&str]) -> FirestoreResult<()> {
        if changed.is_empty() {
            return Ok(());
        }
        self.update_fields(user, changed).await
    }

    async fn update_fields(&self, user: &User, paths: &[&str]) -> FirestoreResult<()> {
        let mut all = user_to_fields(user);
        let fields: HashMap<String, Value> = paths
            .iter()
            .filter_map(|p| all.remove_entry(*p))
            .collect();
        let mask = paths.iter().map(|p| p.to_string()).collect();

        self.client
            .update_document(COLLECTION, user.id.as_str(), fields, Some(mask))
            .await?;
        Ok(())
    }
}

fn user_to_fields(user: &User) -> HashMap<String, Value> {
    let mut fields = HashMap::new();

    fields.insert("google_id".to_string(), user.google_id.to_firestore_value());
    fields.insert("display_name".to_string(), user.display_name.to_firestore_value());
    fields.insert("emails".to_string(), user.emails.to_firestore_value());
    fields.insert("photos".to_string(), user.photos.to_firestore_value());
    fields.insert("company_name".to_string(), user.company_name.to_firestore_value());
    fields.insert("location".to_string(), user.location.to_firestore_value());
    fields.insert(
        "company_description".to_string(),
        user.company_description.to_firestore_value(),
    );
    fields.insert("tech_stack".to_string(), user.tech_stack.to_firestore_value());
    fields.insert(
        "profile_picture".to_string(),
        user.profile_picture.to_firestore_value(),
    );
    fields.insert(
        "use_company_name".to_string(),
        user.use_company_name.to_firestore_value(),
    );
    fields.insert("created_at".to_string(), user.created_at.to_firestore_value());
    fields.insert("updated_at".to_string(), user.updated_at.to_firestore_value());

    fields
}

fn document_to_user(doc: &Document, user_id: &str) -> FirestoreResult<User> {
    doc.require_fields()?;

    let google_id: String = doc.get("google_id").ok_or_else(|| {
        FirestoreError::invalid_response(format!("User {} has no google_id", user_id))
    })?;
    let created_at = doc.get("created_at").unwrap_or_else(chrono::Utc::now);

    Ok(User {
        id: UserId::from(user_id),
        google_id,
        display_name: doc.get("display_name"),
        emails: doc.get("emails").unwrap_or_default(),
        photos: doc.get("photos").unwrap_or_default(),
        company_name: doc.get("company_name"),
        location: doc.get("location"),
        company_description: doc.get("company_description"),
        tech_stack: doc.get("tech_stack"),
        profile_picture: doc.get("profile_picture"),
        use_company_name: doc.get("use_company_name").unwrap_or(false),
        created_at,
        updated_at: doc.get("updated_at").unwrap_or(created_at),
    })
}
