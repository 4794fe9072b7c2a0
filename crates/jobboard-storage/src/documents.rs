//! Application document storage and signed URL delivery.
//!
//! Files live under `applications/{application_id}/{cv|supporting-docs}/{name}`
//! and are handed out to the browser as short-lived presigned GET URLs.

use std::time::Duration;

use jobboard_models::{sanitize_file_name, ApplicationId, DocumentKind, StoredDocument};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::R2Client;
use crate::error::{StorageError, StorageResult};

/// Key prefix for every application document.
pub const APPLICATIONS_PREFIX: &str = "applications/";

/// Default expiry for signed document URLs (15 minutes).
pub const DEFAULT_SIGNED_URL_EXPIRY_SECS: u64 = 900;

/// Maximum allowed expiry (7 days, the S3 presign limit).
pub const MAX_SIGNED_URL_EXPIRY_SECS: u64 = 604800;

/// Signed URL configuration.
#[derive(Debug, Clone)]
pub struct SignedUrlConfig {
    pub expiry: Duration,
}

impl Default for SignedUrlConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(DEFAULT_SIGNED_URL_EXPIRY_SECS),
        }
    }
}

impl SignedUrlConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let secs = std::env::var("SIGNED_URL_EXPIRY_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_SIGNED_URL_EXPIRY_SECS)
            .min(MAX_SIGNED_URL_EXPIRY_SECS);
        Self {
            expiry: Duration::from_secs(secs),
        }
    }
}

/// Response containing a signed document URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub url: String,
    /// When this URL expires (RFC 3339).
    pub expires_at: String,
    pub expires_in_secs: u64,
}

/// Build the object key for an application document.
pub fn document_key(application_id: &ApplicationId, kind: DocumentKind, file_name: &str) -> String {
    format!(
        "{}{}/{}/{}",
        APPLICATIONS_PREFIX,
        application_id,
        kind.path_segment(),
        sanitize_file_name(file_name)
    )
}

/// `Content-Disposition` value that opens the file in the browser.
///
/// Non-ASCII names get an RFC 5987 `filename*` parameter next to an ASCII
/// fallback.
pub fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    if ascii == file_name {
        format!("inline; filename=\"{}\"", ascii)
    } else {
        format!(
            "inline; filename=\"{}\"; filename*=UTF-8''{}",
            ascii,
            urlencoding::encode(file_name)
        )
    }
}

/// Store an uploaded file for an application.
pub async fn upload_application_document(
    client: &R2Client,
    application_id: &ApplicationId,
    kind: DocumentKind,
    file_name: &str,
    content_type: &str,
    data: Vec<u8>,
) -> StorageResult<StoredDocument> {
    if !application_id.is_valid() {
        return Err(StorageError::invalid_key(application_id.as_str()));
    }

    let file_name = sanitize_file_name(file_name);
    let key = document_key(application_id, kind, &file_name);
    let size_bytes = data.len() as u64;

    client.upload_bytes(data, &key, content_type).await?;

    info!(
        application_id = %application_id,
        kind = %kind,
        size_bytes,
        "Stored application document"
    );

    Ok(StoredDocument {
        key,
        file_name,
        content_type: content_type.to_string(),
        size_bytes,
    })
}

/// Exchange a stored document for a time-limited GET URL.
pub async fn signed_document_url(
    client: &R2Client,
    config: &SignedUrlConfig,
    document: &StoredDocument,
) -> StorageResult<SignedUrl> {
    // Only keys this service wrote may be signed
    if !document.key.starts_with(APPLICATIONS_PREFIX) || document.key.contains("..") {
        return Err(StorageError::invalid_key(&document.key));
    }

    let disposition = content_disposition(&document.file_name);
    let url = client
        .presign_get(&document.key, config.expiry, Some(&disposition))
        .await?;

    let expires_at = chrono::Utc::now() + chrono::Duration::from_std(config.expiry).unwrap_or_default();

    Ok(SignedUrl {
        url,
        expires_at: expires_at.to_rfc3339(),
        expires_in_secs: config.expiry.as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::R2Config;
    use serial_test::serial;
    use tokio_test::assert_err;

    async fn test_client() -> R2Client {
        R2Client::new(R2Config {
            endpoint_url: "http://127.0.0.1:9000".to_string(),
            access_key_id: "test-access-key".to_string(),
            secret_access_key: "test-secret-key".to_string(),
            bucket_name: "jobboard-test".to_string(),
            region: "auto".to_string(),
        })
        .await
        .unwrap()
    }

    fn stored(key: &str) -> StoredDocument {
        StoredDocument {
            key: key.to_string(),
            file_name: "My_CV.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes: 1024,
        }
    }

    #[test]
    fn test_document_key_layout() {
        let id = ApplicationId::from("app-1");
        assert_eq!(
            document_key(&id, DocumentKind::Cv, "My CV.pdf"),
            "applications/app-1/cv/My_CV.pdf"
        );
        assert_eq!(
            document_key(&id, DocumentKind::SupportingDocs, "../portfolio.zip"),
            "applications/app-1/supporting-docs/portfolio.zip"
        );
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(content_disposition("cv.pdf"), "inline; filename=\"cv.pdf\"");

        let value = content_disposition("résumé.pdf");
        assert!(value.starts_with("inline; filename=\"r_sum_.pdf\""));
        assert!(value.contains("filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"));
    }

    #[test]
    #[serial]
    fn test_signed_url_config_from_env() {
        std::env::remove_var("SIGNED_URL_EXPIRY_SECS");
        assert_eq!(SignedUrlConfig::from_env().expiry.as_secs(), DEFAULT_SIGNED_URL_EXPIRY_SECS);

        std::env::set_var("SIGNED_URL_EXPIRY_SECS", "60");
        assert_eq!(SignedUrlConfig::from_env().expiry.as_secs(), 60);

        std::env::set_var("SIGNED_URL_EXPIRY_SECS", "99999999");
        assert_eq!(SignedUrlConfig::from_env().expiry.as_secs(), MAX_SIGNED_URL_EXPIRY_SECS);

        std::env::set_var("SIGNED_URL_EXPIRY_SECS", "0");
        assert_eq!(SignedUrlConfig::from_env().expiry.as_secs(), DEFAULT_SIGNED_URL_EXPIRY_SECS);

        std::env::remove_var("SIGNED_URL_EXPIRY_SECS");
    }

    #[tokio::test]
    async fn test_signed_document_url() {
        let client = test_client().await;
        let signed = signed_document_url(
            &client,
            &SignedUrlConfig::default(),
            &stored("applications/app-1/cv/My_CV.pdf"),
        )
        .await
        .unwrap();

        assert_eq!(signed.expires_in_secs, 900);
        assert!(signed.url.contains("/jobboard-test/applications/app-1/cv/My_CV.pdf"));
        assert!(signed.url.contains("response-content-disposition="));

        let json = serde_json::to_value(&signed).unwrap();
        assert!(json.get("expiresAt").is_some());
    }

    #[tokio::test]
    async fn test_signed_url_rejects_foreign_keys() {
        let client = test_client().await;
        let config = SignedUrlConfig::default();

        let err = assert_err!(
            signed_document_url(&client, &config, &stored("private/secrets.txt")).await
        );
        assert!(matches!(err, StorageError::InvalidKey(_)));

        let err = assert_err!(
            signed_document_url(&client, &config, &stored("applications/../private/x")).await
        );
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_upload_rejects_invalid_application_id() {
        let client = test_client().await;
        let err = upload_application_document(
            &client,
            &ApplicationId::from("../x"),
            DocumentKind::Cv,
            "cv.pdf",
            "application/pdf",
            b"%PDF-1.4".to_vec(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
