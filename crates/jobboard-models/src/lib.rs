//! Shared data models for the job board backend.
//!
//! This crate provides Serde-serializable types for:
//! - Users and employer profiles
//! - Job postings with embedded company metadata
//! - Job applications and their review status
//! - Login sessions
//! - Request payload validation

pub mod application;
pub mod ids;
pub mod job;
pub mod session;
pub mod user;
pub mod utils;

// Re-export common types
pub use application::{
    ApplicationFields, ApplicationStatus, ApplicationView, DocumentKind, JobApplication, StatusUpdate,
    StoredDocument,
};
pub use ids::{ApplicationId, JobId, SessionId, UserId};
pub use job::{Company, Job, JobSummary, JobType, JobUpdate, JobView, NewJob};
pub use session::Session;
pub use user::{GoogleProfile, ProfileUpdate, User, UserSummary};
pub use utils::{
    format_validation_errors, not_blank, sanitize_file_name, ParseEnumError, MAX_FILE_NAME_LENGTH,
};
