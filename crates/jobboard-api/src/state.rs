//! Application state.

use std::sync::Arc;

use jobboard_firestore::{
    ApplicationRepository, FirestoreClient, JobRepository, SessionRepository, UserRepository,
};
use jobboard_storage::{R2Client, SignedUrlConfig};

use crate::auth::{GoogleOAuth, JwksCache};
use crate::config::{ApiConfig, AuthConfig};
use crate::services::UserService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub auth: Arc<AuthConfig>,
    pub storage: Arc<R2Client>,
    pub signed_urls: SignedUrlConfig,
    pub firestore: Arc<FirestoreClient>,
    pub users: UserRepository,
    pub jobs: JobRepository,
    pub applications: ApplicationRepository,
    pub sessions: SessionRepository,
    pub jwks: Arc<JwksCache>,
    pub google: GoogleOAuth,
    pub user_service: UserService,
}

impl AppState {
    /// Create new application state.
    pub async fn new(
        config: ApiConfig,
        auth: AuthConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let storage = R2Client::from_env().await?;
        let firestore = FirestoreClient::from_env().await?;
        let jwks = JwksCache::new(auth.google_client_id.clone())?;
        let google = GoogleOAuth::new(&auth)?;

        Ok(Self::from_parts(
            config,
            auth,
            storage,
            SignedUrlConfig::from_env(),
            firestore,
            jwks,
            google,
        ))
    }

    /// Assemble state from already-built clients.
    pub fn from_parts(
        config: ApiConfig,
        auth: AuthConfig,
        storage: R2Client,
        signed_urls: SignedUrlConfig,
        firestore: FirestoreClient,
        jwks: JwksCache,
        google: GoogleOAuth,
    ) -> Self {
        let users = UserRepository::new(firestore.clone());
        let user_service = UserService::new(users.clone());

        Self {
            config,
            auth: Arc::new(auth),
            storage: Arc::new(storage),
            signed_urls,
            jobs: JobRepository::new(firestore.clone()),
            applications: ApplicationRepository::new(firestore.clone()),
            sessions: SessionRepository::new(firestore.clone()),
            firestore: Arc::new(firestore),
            users,
            jwks: Arc::new(jwks),
            google,
            user_service,
        }
    }
}
