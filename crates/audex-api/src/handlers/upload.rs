//! Ingestion boundary.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use metrics::counter;
use tracing::{error, info};

use audex_pipeline::ingest_source;

use crate::auth::Access;
use crate::error::{ApiError, ApiResult};
use crate::metrics::names;
use crate::state::AppState;

/// `POST /upload` — store one video and enqueue its conversion.
///
/// A success response means a conversion job referencing a durably stored
/// blob is on the queue. A failure response means nothing from this call
/// persists (the saga deletes the blob when the publish fails).
pub async fn upload(
    State(state): State<AppState>,
    access: Access,
    mut multipart: Multipart,
) -> ApiResult<StatusCode> {
    if !access.is_admin {
        return Err(ApiError::unauthorized("Not authorized"));
    }

    // Exactly one file per call.
    let mut payload: Option<(Vec<u8>, String)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        if field.file_name().is_none() {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file: {}", e)))?;

        if payload.replace((bytes.to_vec(), content_type)).is_some() {
            return Err(ApiError::bad_request("Exactly 1 file required"));
        }
    }

    let Some((bytes, content_type)) = payload else {
        return Err(ApiError::bad_request("Exactly 1 file required"));
    };

    let announcement = ingest_source(
        state.store.as_ref(),
        state.queue.as_ref(),
        bytes,
        &content_type,
        &access.identity,
    )
    .await
    .map_err(|e| {
        error!(owner = %access.identity, "Ingestion failed: {}", e);
        e
    })?;

    counter!(names::UPLOADS_TOTAL).increment(1);
    info!(
        owner = %access.identity,
        source_blob_id = %announcement.blob_id,
        "Upload accepted"
    );

    Ok(StatusCode::OK)
}
