//! Cloudflare R2 storage client.
//!
//! This crate provides:
//! - Byte uploads to R2 under per-application keys
//! - Presigned GET URLs for CVs and supporting documents
//! - Object deletion for withdrawn applications
//! - Connectivity checks for readiness

pub mod client;
pub mod documents;
pub mod error;

pub use client::{R2Client, R2Config};
pub use documents::{
    content_disposition, document_key, signed_document_url, upload_application_document, SignedUrl,
    SignedUrlConfig, DEFAULT_SIGNED_URL_EXPIRY_SECS, MAX_SIGNED_URL_EXPIRY_SECS,
};
pub use error::{StorageError, StorageResult};
