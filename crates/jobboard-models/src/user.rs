//! User and employer profile models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::ids::UserId;

/// Identity claims received from Google on login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleProfile {
    /// Stable Google subject identifier
    pub google_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
}

/// User document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub google_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub photos: Vec<String>,

    // Employer profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub use_company_name: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a user from a first Google login.
    pub fn from_google(profile: GoogleProfile) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            google_id: profile.google_id,
            display_name: profile.display_name,
            emails: profile.email.into_iter().collect(),
            photos: profile.picture.into_iter().collect(),
            company_name: None,
            location: None,
            company_description: None,
            tech_stack: None,
            profile_picture: None,
            use_company_name: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh identity fields from a later login.
    ///
    /// Returns true if anything changed.
    pub fn refresh_identity(&mut self, profile: &GoogleProfile) -> bool {
        let emails: Vec<String> = profile.email.iter().cloned().collect();
        let photos: Vec<String> = profile.picture.iter().cloned().collect();

        if self.display_name == profile.display_name && self.emails == emails && self.photos == photos {
            return false;
        }
        self.display_name = profile.display_name.clone();
        self.emails = emails;
        self.photos = photos;
        self.updated_at = Utc::now();
        true
    }

    /// Primary email, if Google provided one.
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }

    /// Name shown next to postings and applications.
    pub fn public_name(&self) -> Option<&str> {
        if self.use_company_name {
            if let Some(name) = self.company_name.as_deref().filter(|n| !n.is_empty()) {
                return Some(name);
            }
        }
        self.display_name.as_deref()
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            display_name: self.public_name().map(str::to_string),
            company_name: self.company_name.clone(),
            profile_picture: self
                .profile_picture
                .clone()
                .or_else(|| self.photos.first().cloned()),
            email: self.primary_email().map(str::to_string),
        }
    }
}

/// Public projection of a user embedded in jobs and applications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserSummary {
    /// Summary for a user whose document no longer exists.
    pub fn unknown(id: UserId) -> Self {
        Self {
            id,
            display_name: None,
            company_name: None,
            profile_picture: None,
            email: None,
        }
    }
}

/// Request body for editing the employer profile.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[validate(length(max = 200))]
    pub display_name: Option<String>,
    #[validate(length(max = 200))]
    pub company_name: Option<String>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    #[validate(length(max = 5000))]
    pub company_description: Option<String>,
    #[validate(length(max = 1000))]
    pub tech_stack: Option<String>,
    #[validate(url(message = "must be a valid URL"))]
    pub profile_picture: Option<String>,
    pub use_company_name: Option<bool>,
}

impl ProfileUpdate {
    /// Merge present fields into `user`, returning changed storage field names.
    ///
    /// Empty strings clear the field.
    pub fn apply(self, user: &mut User) -> Vec<&'static str> {
        fn merge(target: &mut Option<String>, value: Option<String>) -> bool {
            let Some(value) = value else {
                return false;
            };
            let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            if *target == value {
                return false;
            }
            *target = value;
            true
        }

        let mut changed = Vec::new();
        if merge(&mut user.display_name, self.display_name) {
            changed.push("display_name");
        }
        if merge(&mut user.company_name, self.company_name) {
            changed.push("company_name");
        }
        if merge(&mut user.location, self.location) {
            changed.push("location");
        }
        if merge(&mut user.company_description, self.company_description) {
            changed.push("company_description");
        }
        if merge(&mut user.tech_stack, self.tech_stack) {
            changed.push("tech_stack");
        }
        if merge(&mut user.profile_picture, self.profile_picture) {
            changed.push("profile_picture");
        }
        if let Some(flag) = self.use_company_name {
            if user.use_company_name != flag {
                user.use_company_name = flag;
                changed.push("use_company_name");
            }
        }

        if !changed.is_empty() {
            user.updated_at = Utc::now();
            changed.push("updated_at");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> GoogleProfile {
        GoogleProfile {
            google_id: "g-123".into(),
            display_name: Some("Ada Lovelace".into()),
            email: Some("ada@example.com".into()),
            picture: Some("https://example.com/ada.png".into()),
        }
    }

    #[test]
    fn test_from_google() {
        let user = User::from_google(profile());
        assert_eq!(user.google_id, "g-123");
        assert_eq!(user.primary_email(), Some("ada@example.com"));
        assert_eq!(user.photos.len(), 1);
        assert!(!user.use_company_name);
    }

    #[test]
    fn test_refresh_identity_detects_changes() {
        let mut user = User::from_google(profile());
        assert!(!user.refresh_identity(&profile()));

        let mut renamed = profile();
        renamed.display_name = Some("Ada King".into());
        assert!(user.refresh_identity(&renamed));
        assert_eq!(user.display_name.as_deref(), Some("Ada King"));
    }

    #[test]
    fn test_public_name_prefers_company_when_enabled() {
        let mut user = User::from_google(profile());
        user.company_name = Some("Analytical Engines".into());
        assert_eq!(user.public_name(), Some("Ada Lovelace"));

        user.use_company_name = true;
        assert_eq!(user.public_name(), Some("Analytical Engines"));
        assert_eq!(user.summary().display_name.as_deref(), Some("Analytical Engines"));
    }

    #[test]
    fn test_profile_update_apply() {
        let mut user = User::from_google(profile());
        let update = ProfileUpdate {
            company_name: Some(" Analytical Engines ".into()),
            tech_stack: Some("".into()),
            use_company_name: Some(true),
            ..Default::default()
        };

        let changed = update.apply(&mut user);
        assert_eq!(changed, vec!["company_name", "use_company_name", "updated_at"]);
        assert_eq!(user.company_name.as_deref(), Some("Analytical Engines"));
        assert!(user.tech_stack.is_none());
    }

    #[test]
    fn test_profile_update_rejects_bad_picture_url() {
        let update = ProfileUpdate {
            profile_picture: Some("not a url".into()),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }
}
