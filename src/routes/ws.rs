//! WebSocket handler — the board sync relay.
//!
//! DESIGN
//! ======
//! A client connects to `/api/boards/{id}/ws?author=<id>` and joins that
//! board's room. Each inbound text frame must decode as a sync message
//! (append, undo, redo, clear). Valid messages are stamped with the
//! connection's author and a per-board sequence number, fanned out to the
//! whole room (sender included) in one total order, and acknowledged to the
//! sender with a `done` carrying the same `seq`. Anything else is answered
//! with an `error` frame and goes nowhere.
//!
//! An author may only append, undo or redo as itself; the relay never
//! trusts `from` or the author fields a client sends.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → join room → send `session:connected`
//! 2. Inbound frames → validate → relay → reply
//! 3. Room frames → forward to the socket
//! 4. Close or eviction → part room

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::action::AuthorId;
use crate::frame::{Data, ErrorCode, FRAME_SEQ, Frame, Status};
use crate::services::room;
use crate::state::AppState;
use crate::sync::{SyncError, SyncMessage};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("connected as {connected}, cannot act as {claimed}")]
    AuthorMismatch { claimed: AuthorId, connected: AuthorId },
    #[error("frame addressed to board {0}")]
    BoardMismatch(Uuid),
    #[error("expected a request frame")]
    NotRequest,
    #[error("board {0} has no room for this connection")]
    RoomClosed(Uuid),
}

impl ErrorCode for RelayError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Sync(e) => e.error_code(),
            Self::AuthorMismatch { .. } => "E_AUTHOR_MISMATCH",
            Self::BoardMismatch(_) => "E_BOARD_MISMATCH",
            Self::NotRequest => "E_NOT_REQUEST",
            Self::RoomClosed(_) => "E_ROOM_CLOSED",
        }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(author) = params.get("author").map(|a| a.trim()).filter(|a| !a.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "author required").into_response();
    };
    let author = AuthorId::from(author);
    ws.on_upgrade(move |socket| run_ws(socket, state, board_id, author))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, board_id: Uuid, author: AuthorId) {
    let client_id = Uuid::new_v4();

    // The room holds the only sender; eviction closes this receiver.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(state.config.client_queue_capacity);
    let peers = room::join_room(&state, board_id, client_id, author.clone(), client_tx).await;

    let welcome = Frame::request("session:connected", Data::new())
        .with_board_id(board_id)
        .with_data("client_id", client_id.to_string())
        .with_data("author", author.as_str())
        .with_data("peers", peers);

    if send_frame(&mut socket, &welcome).await.is_ok() {
        info!(%board_id, %client_id, %author, "ws: client connected");
        loop {
            tokio::select! {
                msg = socket.recv() => {
                    let Some(Ok(msg)) = msg else { break };
                    match msg {
                        Message::Text(text) => {
                            for reply in process_inbound_text(&state, board_id, client_id, &author, text.as_str()).await {
                                if let Err(e) = send_frame(&mut socket, &reply).await {
                                    debug!(%client_id, error = %e, "ws: reply not delivered");
                                }
                            }
                        }
                        Message::Binary(_) => warn!(%client_id, "ws: ignoring binary frame"),
                        Message::Close(_) => break,
                        Message::Ping(_) | Message::Pong(_) => {}
                    }
                }
                frame = client_rx.recv() => {
                    let Some(frame) = frame else {
                        warn!(%board_id, %client_id, "ws: evicted from room; closing");
                        break;
                    };
                    if send_frame(&mut socket, &frame).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    room::part_room(&state, board_id, client_id).await;
    info!(%board_id, %client_id, "ws: client disconnected");
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            error!(id = %frame.id, syscall = %frame.syscall, error = %e, "ws: frame not serializable");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await
}

// =============================================================================
// FRAME PROCESSING
// =============================================================================

/// Validate and relay one inbound text frame; returns the frames owed to
/// the sender. Kept apart from the socket so it can be tested directly.
async fn process_inbound_text(state: &AppState, board_id: Uuid, client_id: Uuid, author: &AuthorId, text: &str) -> Vec<Frame> {
    let mut req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };

    match validate(&req, board_id, author) {
        Ok(message) => debug!(%client_id, id = %req.id, syscall = message.syscall(), "ws: recv frame"),
        Err(e) => {
            warn!(%client_id, id = %req.id, syscall = %req.syscall, error = %e, "ws: rejected frame");
            return vec![req.error_from(&e)];
        }
    }

    req.from = Some(author.to_string());
    req.board_id = Some(board_id);
    let Some(fanout) = room::relay(state, board_id, &req).await else {
        warn!(%board_id, %client_id, id = %req.id, "ws: relay without a room");
        return vec![req.error_from(&RelayError::RoomClosed(board_id))];
    };
    debug!(%board_id, id = %req.id, seq = fanout.seq, delivered = fanout.delivered, "ws: relayed");

    vec![req.done().with_data(FRAME_SEQ, fanout.seq)]
}

fn validate(req: &Frame, board_id: Uuid, author: &AuthorId) -> Result<SyncMessage, RelayError> {
    if req.status != Status::Request {
        return Err(RelayError::NotRequest);
    }
    if let Some(other) = req.board_id.filter(|id| *id != board_id) {
        return Err(RelayError::BoardMismatch(other));
    }
    let message = SyncMessage::from_frame(req)?;
    if let Some(claimed) = message.author().filter(|claimed| *claimed != author) {
        return Err(RelayError::AuthorMismatch { claimed: claimed.clone(), connected: author.clone() });
    }
    Ok(message)
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
