//! Room service — join, part and ordered fan-out for a board's clients.
//!
//! DESIGN
//! ======
//! The relay never renders. It only has to guarantee that every client of
//! a board receives the board's sync frames in one total order. Fan-out
//! therefore happens under the rooms write lock, so two relays on the same
//! board can never interleave their pushes into different client queues.
//! Each relayed frame is stamped with the room's next sequence number and
//! goes to every client, its sender included; a replica applies its own
//! edits when they come back, in the same order as everybody else.
//!
//! ERROR HANDLING
//! ==============
//! A client whose queue is full or closed has fallen out of the order and
//! is evicted. Dropping its sender ends its socket task, and the client has
//! to reconnect and reload the board.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::action::AuthorId;
use crate::frame::{FRAME_SEQ, Frame};
use crate::state::{AppState, ConnectedClient, Room};

/// Add a client to `board_id`'s room, opening the room if needed. Returns
/// how many other clients were already present.
pub async fn join_room(state: &AppState, board_id: Uuid, client_id: Uuid, author: AuthorId, tx: mpsc::Sender<Frame>) -> usize {
    let mut rooms = state.rooms.write().await;
    let room = rooms.entry(board_id).or_insert_with(Room::new);
    let peers = room.clients.len();
    info!(%board_id, %client_id, %author, peers, "client joined room");
    room.clients.insert(client_id, ConnectedClient { author, tx });
    peers
}

/// Remove a client; the room closes when its last client leaves.
pub async fn part_room(state: &AppState, board_id: Uuid, client_id: Uuid) {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(&board_id) else {
        return;
    };
    room.clients.remove(&client_id);
    info!(%board_id, %client_id, remaining = room.clients.len(), "client left room");

    if room.clients.is_empty() {
        rooms.remove(&board_id);
        info!(%board_id, "room closed");
    }
}

/// Result of one fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fanout {
    /// Sequence number stamped on the relayed frame.
    pub seq: u64,
    pub delivered: usize,
}

/// Stamp `frame` with the room's next sequence number and push it to every
/// client of the room. `None` when the room does not exist.
pub async fn relay(state: &AppState, board_id: Uuid, frame: &Frame) -> Option<Fanout> {
    let mut rooms = state.rooms.write().await;
    let room = rooms.get_mut(&board_id)?;

    room.relayed += 1;
    let seq = room.relayed;
    let frame = frame.clone().with_data(FRAME_SEQ, seq);

    let mut delivered = 0;
    let mut evicted = Vec::new();
    for (client_id, client) in &room.clients {
        match client.tx.try_send(frame.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                warn!(%board_id, %client_id, "client queue full; evicting");
                evicted.push(*client_id);
            }
            Err(TrySendError::Closed(_)) => evicted.push(*client_id),
        }
    }
    for client_id in &evicted {
        room.clients.remove(client_id);
    }

    if room.clients.is_empty() {
        rooms.remove(&board_id);
        info!(%board_id, "room closed");
    }
    Some(Fanout { seq, delivered })
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
