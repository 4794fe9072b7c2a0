//! Firestore REST API client.
//!
//! This crate provides:
//! - Typed repositories for users, jobs, applications and sessions
//! - Service account authentication via gcp_auth, or the local emulator
//! - Structured queries, batch reads and batch deletes
//! - Retry with backoff and request metrics

pub mod applications_repo;
pub mod client;
pub mod error;
pub mod jobs_repo;
pub mod metrics;
pub mod query;
pub mod retry;
pub mod sessions_repo;
pub mod token_cache;
pub mod types;
pub mod users_repo;


pub use applications_repo::ApplicationRepository;
pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use jobs_repo::JobRepository;
pub use retry::RetryConfig;
pub use sessions_repo::SessionRepository;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
pub use users_repo::UserRepository;
