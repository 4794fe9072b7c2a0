//! User lookup, first-login provisioning and profile updates.

use std::collections::HashMap;

use tracing::{debug, info};

use jobboard_firestore::UserRepository;
use jobboard_models::{GoogleProfile, ProfileUpdate, User, UserId, UserSummary};

use crate::error::ApiResult;

/// User service.
#[derive(Clone)]
pub struct UserService {
    users: UserRepository,
}

impl UserService {
    pub fn new(users: UserRepository) -> Self {
        Self { users }
    }

    /// Load the user for a Google account, creating it on first login.
    ///
    /// Returning users get their display name, email and photo refreshed
    /// from the identity provider.
    pub async fn find_or_create(&self, profile: GoogleProfile) -> ApiResult<User> {
        if let Some(mut user) = self.users.find_by_google_id(&profile.google_id).await? {
            if user.refresh_identity(&profile) {
                self.users.update_identity(&user).await?;
                debug!(user_id = %user.id, "Refreshed identity from Google profile");
            }
            return Ok(user);
        }

        let user = User::from_google(profile);
        self.users.create(&user).await?;
        info!(user_id = %user.id, "Created user on first login");
        Ok(user)
    }

    /// Apply a profile update and persist the changed fields.
    pub async fn update_profile(&self, mut user: User, update: ProfileUpdate) -> ApiResult<User> {
        let changed = update.apply(&mut user);
        if !changed.is_empty() {
            self.users.update_profile(&user, &changed).await?;
        }
        Ok(user)
    }

    /// Public summaries for a set of users. Missing users are omitted.
    pub async fn summaries(&self, ids: &[UserId]) -> ApiResult<HashMap<UserId, UserSummary>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let users = self.users.get_many(ids).await?;
        Ok(users
            .into_iter()
            .map(|(id, user)| (id, user.summary()))
            .collect())
    }
}
