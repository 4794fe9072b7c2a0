//! Axum HTTP API server for the job board.
//!
//! This crate provides:
//! - REST endpoints for jobs, applications and employer profiles
//! - Google OAuth login with signed cookie sessions
//! - Multipart CV uploads to R2 and signed download URLs
//! - Rate limiting, security headers and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod services;
pub mod state;

pub use config::{ApiConfig, AuthConfig, ConfigError};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{SessionSweeper, UserService};
pub use state::AppState;
