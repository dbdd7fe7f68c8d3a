//! Auth collaborator client.
//!
//! Credential verification and token issuance live in an external auth
//! service; this module is only the capability the gateway consumes:
//! exchange credentials for a token, exchange a token for an identity.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Auth service misconfigured: {0}")]
    ConfigError(String),

    #[error("Auth service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

impl AuthError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
}

/// An authorized principal, as reported by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Access {
    /// Opaque identity (typically an address); the pipeline never
    /// interprets it
    pub identity: String,
    /// Whether the principal may upload and download
    pub is_admin: bool,
}

/// Capability consumed by the ingestion and retrieval boundaries.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Exchange credentials for a token.
    async fn login(&self, username: &str, password: &str) -> AuthResult<String>;

    /// Exchange a token for the principal it belongs to.
    async fn authorize(&self, token: &str) -> AuthResult<Access>;
}

/// Auth client backed by the external auth service's HTTP API.
pub struct HttpAuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthClient {
    pub fn new(base_url: impl Into<String>) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> AuthResult<Self> {
        let base_url = std::env::var("AUTH_SVC_URL")
            .map_err(|_| AuthError::ConfigError("AUTH_SVC_URL not set".to_string()))?;
        Self::new(base_url)
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn login(&self, username: &str, password: &str) -> AuthResult<String> {
        let response = self
            .http
            .post(format!("{}/login", self.base_url))
            .basic_auth(username, Some(password))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.text().await?)
        } else {
            let detail = response.text().await.unwrap_or_default();
            Err(AuthError::unauthorized(detail))
        }
    }

    async fn authorize(&self, token: &str) -> AuthResult<Access> {
        let response = self
            .http
            .post(format!("{}/validate", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(AuthError::unauthorized("invalid token"))
        }
    }
}

/// Auth client with a fixed credential and token table.
///
/// Stand-in for the external service in tests and local development.
#[derive(Default)]
pub struct StaticAuthClient {
    logins: HashMap<(String, String), String>,
    tokens: HashMap<String, Access>,
}

impl StaticAuthClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_login(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        self.logins
            .insert((username.into(), password.into()), token.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>, access: Access) -> Self {
        self.tokens.insert(token.into(), access);
        self
    }
}

#[async_trait]
impl AuthClient for StaticAuthClient {
    async fn login(&self, username: &str, password: &str) -> AuthResult<String> {
        self.logins
            .get(&(username.to_string(), password.to_string()))
            .cloned()
            .ok_or_else(|| AuthError::unauthorized("Invalid credentials"))
    }

    async fn authorize(&self, token: &str) -> AuthResult<Access> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::unauthorized("invalid token"))
    }
}

/// Extractor that authorizes the request's bearer token against the auth
/// collaborator.
#[async_trait]
impl FromRequestParts<AppState> for Access {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("Missing credentials"))?;

        match state.auth.authorize(token).await {
            Ok(access) => {
                debug!(identity = %access.identity, "Authorized request");
                Ok(access)
            }
            Err(AuthError::Unauthorized(msg)) => Err(ApiError::unauthorized(msg)),
            Err(e) => Err(ApiError::internal(e.to_string())),
        }
    }
}
