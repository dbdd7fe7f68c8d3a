//! Axum HTTP gateway.
//!
//! This crate provides:
//! - Ingestion (`POST /upload`) and retrieval (`GET /download`) boundaries
//! - Login proxying to the external auth service
//! - Rate limiting, security headers, and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use auth::{Access, AuthClient, HttpAuthClient, StaticAuthClient};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
