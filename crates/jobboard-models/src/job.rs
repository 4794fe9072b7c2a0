//! Job posting models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::ids::{JobId, UserId};
use crate::user::UserSummary;
use crate::utils::{not_blank, ParseEnumError};

/// Engagement type of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum JobType {
    /// Single piece of work
    #[default]
    #[serde(rename = "One Off")]
    OneOff,
    /// Continuing engagement
    #[serde(rename = "On Going")]
    OnGoing,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::OneOff => "One Off",
            JobType::OnGoing => "On Going",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "One Off" => Ok(JobType::OneOff),
            "On Going" => Ok(JobType::OnGoing),
            other => Err(ParseEnumError::new("job type", other)),
        }
    }
}

/// Company details embedded in a job posting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    #[validate(
        length(max = 200),
        custom(function = "not_blank", message = "company name is required")
    )]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 5000))]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "must be a valid email address"))]
    pub contact_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 50))]
    pub contact_phone: Option<String>,
}

/// Job posting stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub title: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub location: String,
    pub description: String,
    pub price: String,
    pub company: Company,
    /// Owner of the posting
    pub posted_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a new posting owned by `posted_by`.
    pub fn new(input: NewJob, posted_by: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            title: input.title.trim().to_string(),
            job_type: input.job_type,
            location: input.location.trim().to_string(),
            description: input.description,
            price: input.price.trim().to_string(),
            company: input.company,
            posted_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether `user_id` owns this posting.
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.posted_by == user_id
    }

    /// Attach the poster summary for API responses.
    ///
    /// A deleted poster degrades to an id-only summary.
    pub fn into_view(self, poster: Option<UserSummary>) -> JobView {
        let posted_by = poster.unwrap_or_else(|| UserSummary::unknown(self.posted_by.clone()));
        JobView {
            id: self.id,
            title: self.title,
            job_type: self.job_type,
            location: self.location,
            description: self.description,
            price: self.price,
            company: self.company,
            posted_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Job posting with its poster populated.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: JobId,
    pub title: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub location: String,
    pub description: String,
    pub price: String,
    pub company: Company,
    pub posted_by: UserSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Short projection of a job embedded in applications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: JobId,
    pub title: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub location: String,
    pub company_name: String,
    pub posted_by: UserId,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            title: job.title.clone(),
            job_type: job.job_type,
            location: job.location.clone(),
            company_name: job.company.name.clone(),
            posted_by: job.posted_by.clone(),
        }
    }
}

/// Request body for creating a job.
#[derive(Debug, Clone, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    #[validate(
        length(max = 200),
        custom(function = "not_blank", message = "title is required")
    )]
    pub title: String,

    #[serde(rename = "type", default)]
    pub job_type: JobType,

    #[validate(
        length(max = 200),
        custom(function = "not_blank", message = "location is required")
    )]
    pub location: String,

    #[validate(
        length(max = 10000),
        custom(function = "not_blank", message = "description is required")
    )]
    pub description: String,

    #[validate(
        length(max = 100),
        custom(function = "not_blank", message = "price is required")
    )]
    pub price: String,

    #[validate(nested)]
    pub company: Company,
}

/// Request body for updating a job. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    #[validate(length(max = 200), custom(function = "not_blank"))]
    pub title: Option<String>,

    #[serde(rename = "type")]
    pub job_type: Option<JobType>,

    #[validate(length(max = 200), custom(function = "not_blank"))]
    pub location: Option<String>,

    #[validate(length(max = 10000), custom(function = "not_blank"))]
    pub description: Option<String>,

    #[validate(length(max = 100), custom(function = "not_blank"))]
    pub price: Option<String>,

    #[validate(nested)]
    pub company: Option<Company>,
}

impl JobUpdate {
    /// Merge present fields into `job`.
    ///
    /// Returns the storage names of the fields that actually changed, and
    /// bumps `updated_at` when anything did. Identity and ownership fields
    /// are never touched.
    pub fn apply(self, job: &mut Job) -> Vec<&'static str> {
        let mut changed = Vec::new();

        if let Some(title) = self.title {
            let title = title.trim().to_string();
            if job.title != title {
                job.title = title;
                changed.push("title");
            }
        }
        if let Some(job_type) = self.job_type {
            if job.job_type != job_type {
                job.job_type = job_type;
                changed.push("job_type");
            }
        }
        if let Some(location) = self.location {
            let location = location.trim().to_string();
            if job.location != location {
                job.location = location;
                changed.push("location");
            }
        }
        if let Some(description) = self.description {
            if job.description != description {
                job.description = description;
                changed.push("description");
            }
        }
        if let Some(price) = self.price {
            let price = price.trim().to_string();
            if job.price != price {
                job.price = price;
                changed.push("price");
            }
        }
        if let Some(company) = self.company {
            if job.company != company {
                job.company = company;
                changed.push("company");
            }
        }

        if !changed.is_empty() {
            job.updated_at = Utc::now();
            changed.push("updated_at");
        }
        changed
    }
}
