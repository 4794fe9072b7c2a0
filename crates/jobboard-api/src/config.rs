//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Shortest accepted `SESSION_SECRET`.
pub const MIN_SESSION_SECRET_LEN: usize = 32;

/// Default store lifetime of a login session (14 days).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 14 * 24 * 60 * 60;

/// Max-age of the session cookie (30 days). The stored session's own
/// expiry is what actually ends a login.
pub const SESSION_COOKIE_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

/// Startup configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second
    pub rate_limit_rps: u32,
    /// Rate limit burst
    pub rate_limit_burst: u32,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Max size of a single uploaded file
    pub max_upload_bytes: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Built SPA to serve for non-API paths
    pub static_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1967,
            cors_origins: vec!["http://localhost:3000".to_string()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            request_timeout: Duration::from_secs(30),
            max_body_size: 12 * 1024 * 1024, // two files plus form fields
            max_upload_bytes: 5 * 1024 * 1024,
            environment: "development".to_string(),
            static_dir: None,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            request_timeout: env_parse("REQUEST_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            static_dir: std::env::var("STATIC_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Google OAuth and session settings.
#[derive(Clone)]
pub struct AuthConfig {
    pub google_client_id: String,
    pub google_client_secret: String,
    /// Absolute URL of `/api/auth/google/callback` as registered with Google
    pub callback_url: String,
    /// Where the browser lands after a successful login
    pub login_success_redirect: String,
    /// HMAC key for session cookies
    pub session_secret: String,
    /// Lifetime of a stored session
    pub session_ttl: Duration,
    /// Mark cookies `Secure`
    pub secure_cookies: bool,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("google_client_id", &self.google_client_id)
            .field("callback_url", &self.callback_url)
            .field("login_success_redirect", &self.login_success_redirect)
            .field("session_ttl", &self.session_ttl)
            .field("secure_cookies", &self.secure_cookies)
            .finish_non_exhaustive()
    }
}

impl AuthConfig {
    /// Create config from environment variables.
    ///
    /// Client credentials and the session secret are mandatory.
    pub fn from_env(api: &ApiConfig) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let session_secret = required("SESSION_SECRET")?;
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "SESSION_SECRET",
                reason: format!("must be at least {} characters", MIN_SESSION_SECRET_LEN),
            });
        }

        let callback_url = std::env::var("GOOGLE_CALLBACK_URL").unwrap_or_else(|_| {
            format!("http://localhost:{}/api/auth/google/callback", api.port)
        });
        url::Url::parse(&callback_url).map_err(|e| ConfigError::Invalid {
            name: "GOOGLE_CALLBACK_URL",
            reason: e.to_string(),
        })?;

        Ok(Self {
            google_client_id: required("GOOGLE_CLIENT_ID")?,
            google_client_secret: required("GOOGLE_CLIENT_SECRET")?,
            callback_url,
            login_success_redirect: std::env::var("LOGIN_SUCCESS_REDIRECT")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            session_secret,
            session_ttl: Duration::from_secs(
                env_parse("SESSION_TTL_SECS").unwrap_or(DEFAULT_SESSION_TTL_SECS),
            ),
            secure_cookies: api.is_production(),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_auth_env() {
        for key in [
            "SESSION_SECRET",
            "GOOGLE_CLIENT_ID",
            "GOOGLE_CLIENT_SECRET",
            "GOOGLE_CALLBACK_URL",
            "SESSION_TTL_SECS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_api_config_defaults() {
        std::env::remove_var("API_PORT");
        std::env::set_var("CORS_ORIGINS", "https://a.test, ,https://b.test");
        let config = ApiConfig::from_env();
        assert_eq!(config.port, 1967);
        assert_eq!(config.cors_origins, vec!["https://a.test", "https://b.test"]);
        assert!(!config.is_production());
        std::env::remove_var("CORS_ORIGINS");
    }

    #[test]
    #[serial]
    fn test_auth_config_requires_secret() {
        clear_auth_env();
        std::env::set_var("GOOGLE_CLIENT_ID", "id");
        std::env::set_var("GOOGLE_CLIENT_SECRET", "secret");
        let err = AuthConfig::from_env(&ApiConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SESSION_SECRET")));

        std::env::set_var("SESSION_SECRET", "too-short");
        let err = AuthConfig::from_env(&ApiConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SESSION_SECRET", .. }));
        clear_auth_env();
    }

    #[test]
    #[serial]
    fn test_auth_config_defaults() {
        clear_auth_env();
        std::env::set_var("GOOGLE_CLIENT_ID", "id");
        std::env::set_var("GOOGLE_CLIENT_SECRET", "secret");
        std::env::set_var("SESSION_SECRET", "x".repeat(MIN_SESSION_SECRET_LEN));
        let config = AuthConfig::from_env(&ApiConfig::default()).unwrap();
        assert_eq!(config.callback_url, "http://localhost:1967/api/auth/google/callback");
        assert_eq!(config.session_ttl, Duration::from_secs(DEFAULT_SESSION_TTL_SECS));
        assert!(!config.secure_cookies);
        assert!(!format!("{:?}", config).contains("xxxx"));
        clear_auth_env();
    }
}
