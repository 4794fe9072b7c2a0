//! Google OAuth login and cookie sessions.

pub mod google;
pub mod jwks;
pub mod session;

pub use google::GoogleOAuth;
pub use jwks::{GoogleIdClaims, JwksCache};
pub use session::{
    oauth_state_cookie, removal, session_cookie, sign_session_id, verify_session_cookie, AuthUser,
    OAUTH_STATE_COOKIE, SESSION_COOKIE,
};
