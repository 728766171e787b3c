//! Board snapshot routes.
//!
//! Snapshots travel in their binary encoding (`CHBS` header plus RGBA
//! bytes) as `application/octet-stream`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::snapshot::{Snapshot, SnapshotDecodeError};
use crate::state::AppState;
use crate::store::StoreError;

const OCTET_STREAM: &str = "application/octet-stream";

/// `GET /api/boards/:id/snapshot` — latest saved snapshot.
pub async fn get_snapshot(State(state): State<AppState>, Path(board_id): Path<Uuid>) -> Result<Response, StatusCode> {
    let snapshot = state
        .store
        .get(board_id)
        .await
        .map_err(|e| store_error_to_status(board_id, &e))?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(([(CONTENT_TYPE, OCTET_STREAM)], snapshot.encode()).into_response())
}

/// `PUT /api/boards/:id/snapshot` — replace the saved snapshot.
pub async fn put_snapshot(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    let snapshot = Snapshot::decode(&body).map_err(|e| decode_error_to_status(board_id, &e))?;
    state
        .store
        .put(board_id, &snapshot)
        .await
        .map_err(|e| store_error_to_status(board_id, &e))?;

    info!(%board_id, width = snapshot.width(), height = snapshot.height(), "snapshot saved");
    Ok(StatusCode::NO_CONTENT)
}

fn store_error_to_status(board_id: Uuid, err: &StoreError) -> StatusCode {
    error!(%board_id, error = %err, "snapshot store failed");
    match err {
        StoreError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Corrupt(_) | StoreError::Dimensions { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn decode_error_to_status(board_id: Uuid, err: &SnapshotDecodeError) -> StatusCode {
    warn!(%board_id, error = %err, "rejected snapshot upload");
    StatusCode::BAD_REQUEST
}

#[cfg(test)]
#[path = "snapshots_test.rs"]
mod tests;
