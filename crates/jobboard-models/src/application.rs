//! Job application models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::ids::{ApplicationId, JobId, UserId};
use crate::job::JobSummary;
use crate::user::UserSummary;
use crate::utils::ParseEnumError;

/// Review status of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum ApplicationStatus {
    /// Awaiting the employer's decision
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "Pending",
            ApplicationStatus::Accepted => "Accepted",
            ApplicationStatus::Rejected => "Rejected",
        }
    }

    /// Whether the employer has made a decision.
    pub fn is_final(&self) -> bool {
        !matches!(self, ApplicationStatus::Pending)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ApplicationStatus::Pending),
            "Accepted" => Ok(ApplicationStatus::Accepted),
            "Rejected" => Ok(ApplicationStatus::Rejected),
            other => Err(ParseEnumError::new("application status", other)),
        }
    }
}

/// Kind of file attached to an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DocumentKind {
    Cv,
    SupportingDocs,
}

impl DocumentKind {
    /// Object key segment.
    pub fn path_segment(&self) -> &'static str {
        match self {
            DocumentKind::Cv => "cv",
            DocumentKind::SupportingDocs => "supporting-docs",
        }
    }

    /// Multipart form field name.
    pub fn field_name(&self) -> &'static str {
        match self {
            DocumentKind::Cv => "cv",
            DocumentKind::SupportingDocs => "supportingDocs",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        match name {
            "cv" => Some(DocumentKind::Cv),
            "supportingDocs" => Some(DocumentKind::SupportingDocs),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path_segment())
    }
}

/// File stored in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    /// Object key in the bucket
    pub key: String,
    /// Sanitized original file name
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// Text fields of an application submission.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationFields {
    #[validate(length(min = 1, max = 128, message = "job is required"))]
    pub job: String,

    #[validate(length(min = 1, max = 5000, message = "message is required"))]
    pub message: String,

    #[validate(length(min = 1, max = 1000, message = "skills are required"))]
    pub skills: String,

    #[validate(length(max = 2000))]
    pub project_links: Option<String>,

    #[validate(length(max = 50))]
    pub phone: Option<String>,

    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
}

/// Request body for changing an application's status.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct StatusUpdate {
    pub status: ApplicationStatus,
}

/// Application document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobApplication {
    pub id: ApplicationId,
    pub job_id: JobId,
    pub applicant_id: UserId,
    /// Poster of the job when the application was submitted
    pub employer_id: UserId,
    pub message: String,
    pub skills: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_links: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv: Option<StoredDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supporting_docs: Option<StoredDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub email: String,
    #[serde(default)]
    pub status: ApplicationStatus,
    #[serde(default)]
    pub deleted_by_employer: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobApplication {
    /// Build a pending application. The id is chosen up front so that
    /// uploads can be keyed under it before the document is written.
    pub fn new(
        id: ApplicationId,
        fields: ApplicationFields,
        applicant_id: UserId,
        employer_id: UserId,
    ) -> Self {
        let now = Utc::now();
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            id,
            job_id: JobId::from(fields.job.trim()),
            applicant_id,
            employer_id,
            message: fields.message,
            skills: fields.skills,
            project_links: non_empty(fields.project_links),
            cv: None,
            supporting_docs: None,
            phone: non_empty(fields.phone),
            email: fields.email.trim().to_string(),
            status: ApplicationStatus::Pending,
            deleted_by_employer: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_applicant(&self, user_id: &UserId) -> bool {
        &self.applicant_id == user_id
    }

    pub fn is_employer(&self, user_id: &UserId) -> bool {
        &self.employer_id == user_id
    }

    /// Applicant or employer may read the application.
    pub fn can_view(&self, user_id: &UserId) -> bool {
        self.is_applicant(user_id) || self.is_employer(user_id)
    }

    pub fn document(&self, kind: DocumentKind) -> Option<&StoredDocument> {
        match kind {
            DocumentKind::Cv => self.cv.as_ref(),
            DocumentKind::SupportingDocs => self.supporting_docs.as_ref(),
        }
    }

    /// Keys of every stored file.
    pub fn document_keys(&self) -> Vec<String> {
        self.cv
            .iter()
            .chain(self.supporting_docs.iter())
            .map(|d| d.key.clone())
            .collect()
    }

    pub fn into_view(self, job: Option<JobSummary>, applicant: Option<UserSummary>) -> ApplicationView {
        let applicant = applicant.unwrap_or_else(|| UserSummary::unknown(self.applicant_id.clone()));
        ApplicationView {
            id: self.id,
            job_id: self.job_id,
            job,
            applicant,
            employer_id: self.employer_id,
            message: self.message,
            skills: self.skills,
            project_links: self.project_links,
            cv: self.cv,
            supporting_docs: self.supporting_docs,
            phone: self.phone,
            email: self.email,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Application with its job and applicant populated.
///
/// `job` is null when the posting has since been deleted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationView {
    pub id: ApplicationId,
    pub job_id: JobId,
    pub job: Option<JobSummary>,
    pub applicant: UserSummary,
    pub employer_id: UserId,
    pub message: String,
    pub skills: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_links: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv: Option<StoredDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supporting_docs: Option<StoredDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub email: String,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> ApplicationFields {
        ApplicationFields {
            job: "job-1".into(),
            message: "Hire me".into(),
            skills: "Rust, SQL".into(),
            project_links: Some("  ".into()),
            phone: None,
            email: "dev@example.com".into(),
        }
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&ApplicationStatus::Accepted).unwrap(),
            "\"Accepted\""
        );
        assert_eq!("Rejected".parse::<ApplicationStatus>().unwrap(), ApplicationStatus::Rejected);
        assert!("accepted".parse::<ApplicationStatus>().is_err());
        assert!(!ApplicationStatus::Pending.is_final());
        assert!(ApplicationStatus::Rejected.is_final());
    }

    #[test]
    fn test_new_application_defaults() {
        let app = JobApplication::new(
            ApplicationId::from("app-1"),
            fields(),
            UserId::from("applicant"),
            UserId::from("employer"),
        );
        assert_eq!(app.status, ApplicationStatus::Pending);
        assert!(!app.deleted_by_employer);
        assert_eq!(app.job_id, JobId::from("job-1"));
        assert!(app.project_links.is_none());
        assert!(app.can_view(&UserId::from("applicant")));
        assert!(app.can_view(&UserId::from("employer")));
        assert!(!app.can_view(&UserId::from("stranger")));
    }

    #[test]
    fn test_fields_validation() {
        assert!(fields().validate().is_ok());

        let mut bad = fields();
        bad.email = "nope".into();
        bad.message = String::new();
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("message"));
    }

    #[test]
    fn test_document_keys() {
        let mut app = JobApplication::new(
            ApplicationId::from("app-1"),
            fields(),
            UserId::from("applicant"),
            UserId::from("employer"),
        );
        assert!(app.document_keys().is_empty());

        app.cv = Some(StoredDocument {
            key: "applications/app-1/cv/cv.pdf".into(),
            file_name: "cv.pdf".into(),
            content_type: "application/pdf".into(),
            size_bytes: 10,
        });
        assert_eq!(app.document_keys(), vec!["applications/app-1/cv/cv.pdf".to_string()]);
        assert!(app.document(DocumentKind::Cv).is_some());
        assert!(app.document(DocumentKind::SupportingDocs).is_none());
    }

    #[test]
    fn test_document_kind_field_names() {
        assert_eq!(DocumentKind::from_field_name("supportingDocs"), Some(DocumentKind::SupportingDocs));
        assert_eq!(DocumentKind::from_field_name("other"), None);
        assert_eq!(DocumentKind::SupportingDocs.path_segment(), "supporting-docs");
    }
}
