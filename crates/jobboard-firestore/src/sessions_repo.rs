//! Login session repository.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use jobboard_models::{Session, SessionId, UserId};

use crate::client::{FirestoreClient, MAX_BATCH_WRITE};
use crate::error::{FirestoreError, FirestoreResult};
use crate::query::{FilterOp, QueryBuilder, SortDirection};
use crate::types::{Document, ToFirestoreValue, Value, Write};

const COLLECTION: &str = "sessions";

/// Repository for server-side session records.
#[derive(Clone)]
pub struct SessionRepository {
    client: FirestoreClient,
}

impl SessionRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, id: &SessionId) -> FirestoreResult<Option<Session>> {
        let doc = self.client.get_document(COLLECTION, id.as_str()).await?;
        doc.map(|d| document_to_session(&d, id.as_str())).transpose()
    }

    pub async fn create(&self, session: &Session) -> FirestoreResult<()> {
        self.client
            .create_document(COLLECTION, session.id.as_str(), session_to_fields(session))
            .await?;
        debug!(user_id = %session.user_id, "Created session");
        Ok(())
    }

    pub async fn delete(&self, id: &SessionId) -> FirestoreResult<()> {
        self.client.delete_document(COLLECTION, id.as_str()).await
    }

    /// IDs of sessions that expired before `now`, oldest first.
    pub async fn list_expired(&self, now: DateTime<Utc>, limit: u32) -> FirestoreResult<Vec<SessionId>> {
        let query = QueryBuilder::new(COLLECTION)
            .filter("expires_at", FilterOp::LessThan, now.to_firestore_value())
            .order_by("expires_at", SortDirection::Ascending)
            .limit(limit)
            .build();

        let docs = self.client.run_query("", query).await?;
        Ok(docs
            .iter()
            .filter_map(|d| d.id().map(SessionId::from))
            .collect())
    }

    /// Delete sessions in batches. Returns how many were deleted.
    pub async fn delete_many(&self, ids: &[SessionId]) -> FirestoreResult<usize> {
        let mut deleted = 0;
        for chunk in ids.chunks(MAX_BATCH_WRITE) {
            let writes = chunk
                .iter()
                .map(|id| Write::delete(self.client.full_document_name(COLLECTION, id.as_str())))
                .collect();
            match self.client.batch_write(writes).await {
                Ok(_) => deleted += chunk.len(),
                Err(e) => {
                    warn!(error = %e, batch = chunk.len(), "Failed to delete session batch");
                    return Err(e);
                }
            }
        }
        Ok(deleted)
    }
}

fn session_to_fields(session: &Session) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("user_id".to_string(), session.user_id.as_str().to_firestore_value());
    fields.insert("created_at".to_string(), session.created_at.to_firestore_value());
    fields.insert("expires_at".to_string(), session.expires_at.to_firestore_value());
    fields
}

fn document_to_session(doc: &Document, id: &str) -> FirestoreResult<Session> {
    doc.require_fields()?;

    let user_id: String = doc.get("user_id").ok_or_else(|| {
        FirestoreError::invalid_response(format!("Session {} has no user_id", id))
    })?;
    // A session without a readable expiry is treated as already expired
    let expires_at: DateTime<Utc> = doc.get("expires_at").unwrap_or(DateTime::UNIX_EPOCH);

    Ok(Session {
        id: SessionId::from(id),
        user_id: UserId::from(user_id),
        created_at: doc.get("created_at").unwrap_or(expires_at),
        expires_at,
    })
}
