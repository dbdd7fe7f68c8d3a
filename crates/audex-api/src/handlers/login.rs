//! Login proxy.

use axum::extract::State;
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use tracing::info;

use crate::auth::{AuthClient, AuthError};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /login` — forward Basic credentials to the auth service and
/// return its token verbatim.
pub async fn login(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Basic>>>,
) -> ApiResult<String> {
    let Some(TypedHeader(auth)) = auth else {
        return Err(ApiError::unauthorized("Missing credentials"));
    };

    let token = state
        .auth
        .login(auth.username(), auth.password())
        .await
        .map_err(|e| match e {
            AuthError::Unauthorized(msg) => ApiError::unauthorized(msg),
            other => ApiError::internal(other.to_string()),
        })?;

    info!(username = auth.username(), "Login succeeded");
    Ok(token)
}
