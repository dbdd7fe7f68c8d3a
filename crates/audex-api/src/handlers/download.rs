//! Retrieval boundary.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use metrics::counter;
use serde::Deserialize;

use audex_models::BlobId;
use audex_storage::BlobStore;

use crate::auth::Access;
use crate::error::{ApiError, ApiResult};
use crate::metrics::names;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct DownloadParams {
    fid: Option<String>,
}

/// `GET /download?fid=` — stream a derived audio blob back to the caller.
pub async fn download(
    State(state): State<AppState>,
    access: Access,
    Query(params): Query<DownloadParams>,
) -> ApiResult<Response> {
    if !access.is_admin {
        return Err(ApiError::unauthorized("Not authorized"));
    }

    let fid = params
        .fid
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("fid is required"))?;

    let blob_id = BlobId::from(fid.as_str());
    let bytes = state.store.get(&blob_id).await.map_err(|e| {
        if e.is_not_found() {
            ApiError::not_found("Audio not found")
        } else {
            ApiError::Storage(e)
        }
    })?;

    counter!(names::DOWNLOADS_TOTAL).increment(1);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.mp3\"", fid),
        )
        .body(Body::from(bytes))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
