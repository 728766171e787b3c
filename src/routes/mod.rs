//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The relay exposes three things under one Axum router: a health probe,
//! binary snapshot load/save per board, and the per-board sync websocket.

pub mod snapshots;
pub mod ws;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full relay router with CORS and request tracing.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let snapshot_limit = DefaultBodyLimit::max(state.config.max_snapshot_bytes);

    Router::new()
        .route(
            "/api/boards/{id}/snapshot",
            get(snapshots::get_snapshot)
                .put(snapshots::put_snapshot)
                .layer(snapshot_limit),
        )
        .route("/api/boards/{id}/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
