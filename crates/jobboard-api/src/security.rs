//! Security utilities for input validation and sanitization.
//!
//! This module provides:
//! - Upload validation by extension, declared type and magic bytes
//! - Input sanitization utilities

use tracing::warn;

/// Maximum length of a free-text form field after sanitization.
pub const MAX_TEXT_FIELD_LENGTH: usize = 10_000;

/// Accepted document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Pdf,
    Doc,
    Docx,
    Png,
    Jpeg,
    Zip,
}

impl FileFormat {
    fn content_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Doc => "application/msword",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Zip => "application/zip",
        }
    }

    fn from_extension(file_name: &str) -> Option<Self> {
        let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "doc" => Some(Self::Doc),
            "docx" => Some(Self::Docx),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }

    fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
        [Self::Pdf, Self::Doc, Self::Docx, Self::Png, Self::Jpeg, Self::Zip]
            .into_iter()
            .find(|f| f.content_type() == mime)
            .or(match mime.as_str() {
                "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
                "application/x-zip-compressed" => Some(Self::Zip),
                _ => None,
            })
    }

    /// Whether `data` starts with this format's signature.
    fn matches_magic(self, data: &[u8]) -> bool {
        match self {
            Self::Pdf => data.starts_with(b"%PDF-"),
            Self::Doc => data.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]),
            // docx is a zip container
            Self::Docx | Self::Zip => data.starts_with(b"PK\x03\x04"),
            Self::Png => data.starts_with(b"\x89PNG\r\n\x1a\n"),
            Self::Jpeg => data.starts_with(&[0xFF, 0xD8, 0xFF]),
        }
    }
}

/// Result of upload validation.
#[derive(Debug, PartialEq, Eq)]
pub enum FileValidationResult {
    /// File is acceptable; carries the content type to store it with.
    Valid(&'static str),
    /// Upload has no bytes.
    Empty,
    /// Neither the name nor the declared type is an allowed format.
    UnsupportedType(String),
    /// Bytes do not match the claimed format.
    ContentMismatch(String),
}

impl FileValidationResult {
    /// Convert to Result for easy error handling.
    pub fn into_result(self) -> Result<&'static str, String> {
        match self {
            Self::Valid(content_type) => Ok(content_type),
            Self::Empty => Err("Uploaded file is empty".to_string()),
            Self::UnsupportedType(msg) => Err(msg),
            Self::ContentMismatch(name) => {
                Err(format!("File '{}' does not match its declared type", name))
            }
        }
    }
}

fn validate_against(
    allowed: &[FileFormat],
    file_name: &str,
    content_type: Option<&str>,
    data: &[u8],
    unsupported: &str,
) -> FileValidationResult {
    if data.is_empty() {
        return FileValidationResult::Empty;
    }

    let by_mime = content_type
        .and_then(FileFormat::from_content_type)
        .filter(|f| allowed.contains(f));
    let by_ext = FileFormat::from_extension(file_name).filter(|f| allowed.contains(f));

    let format = match by_mime.or(by_ext) {
        Some(f) => f,
        None => return FileValidationResult::UnsupportedType(unsupported.to_string()),
    };

    if !format.matches_magic(data) {
        // Browsers sometimes send a generic type; the extension may still be right
        match by_ext.filter(|f| *f != format && f.matches_magic(data)) {
            Some(f) => return FileValidationResult::Valid(f.content_type()),
            None => {
                warn!(file_name = %file_name, "Upload content does not match its type");
                return FileValidationResult::ContentMismatch(file_name.to_string());
            }
        }
    }

    FileValidationResult::Valid(format.content_type())
}

/// Validate a CV upload. Only PDF is accepted.
pub fn validate_cv(file_name: &str, content_type: Option<&str>, data: &[u8]) -> FileValidationResult {
    validate_against(
        &[FileFormat::Pdf],
        file_name,
        content_type,
        data,
        "CV must be a PDF file",
    )
}

/// Validate a supporting document upload.
pub fn validate_supporting_doc(
    file_name: &str,
    content_type: Option<&str>,
    data: &[u8],
) -> FileValidationResult {
    validate_against(
        &[
            FileFormat::Pdf,
            FileFormat::Doc,
            FileFormat::Docx,
            FileFormat::Png,
            FileFormat::Jpeg,
            FileFormat::Zip,
        ],
        file_name,
        content_type,
        data,
        "Supporting documents must be PDF, DOC, DOCX, PNG, JPEG or ZIP",
    )
}

/// Sanitize a user-provided string for safe logging and storage.
///
/// This removes control characters other than newlines and tabs.
pub fn sanitize_string(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(MAX_TEXT_FIELD_LENGTH)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDF: &[u8] = b"%PDF-1.7\n...";

    #[test]
    fn test_cv_accepts_pdf_by_type_or_name() {
        assert_eq!(
            validate_cv("resume", Some("application/pdf"), PDF),
            FileValidationResult::Valid("application/pdf")
        );
        assert_eq!(
            validate_cv("resume.PDF", Some("application/octet-stream"), PDF),
            FileValidationResult::Valid("application/pdf")
        );
    }

    #[test]
    fn test_cv_rejects_other_formats() {
        assert!(matches!(
            validate_cv("resume.docx", Some("application/msword"), b"PK\x03\x04"),
            FileValidationResult::UnsupportedType(_)
        ));
        assert!(matches!(
            validate_cv("resume.pdf", Some("application/pdf"), b"<html>"),
            FileValidationResult::ContentMismatch(_)
        ));
        assert_eq!(validate_cv("resume.pdf", None, b""), FileValidationResult::Empty);
    }

    #[test]
    fn test_supporting_docs() {
        assert_eq!(
            validate_supporting_doc("portfolio.zip", Some("application/x-zip-compressed"), b"PK\x03\x04rest"),
            FileValidationResult::Valid("application/zip")
        );
        assert_eq!(
            validate_supporting_doc("photo.jpg", Some("image/jpeg"), &[0xFF, 0xD8, 0xFF, 0xE0]),
            FileValidationResult::Valid("image/jpeg")
        );
        // Declared as pdf, really a docx
        assert_eq!(
            validate_supporting_doc("letter.docx", Some("application/pdf"), b"PK\x03\x04"),
            FileValidationResult::Valid(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            )
        );
        assert!(matches!(
            validate_supporting_doc("run.exe", Some("application/x-msdownload"), b"MZ"),
            FileValidationResult::UnsupportedType(_)
        ));
    }

    #[test]
    fn test_sanitize_string() {
        assert_eq!(sanitize_string("a\u{0}b\nc\td"), "ab\nc\td");
    }
}
