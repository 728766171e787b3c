//! Shared relay state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the snapshot store, the relay configuration and a map of live
//! rooms. A room is the set of websocket clients currently editing one
//! board; it exists only while at least one client is connected.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::action::AuthorId;
use crate::config::Config;
use crate::frame::Frame;
use crate::store::SnapshotStore;

// =============================================================================
// ROOM
// =============================================================================

/// One connected websocket client.
pub struct ConnectedClient {
    /// The only author this client may append, undo or redo as.
    pub author: AuthorId,
    /// Outbound frame queue drained by the client's socket task.
    pub tx: mpsc::Sender<Frame>,
}

/// Live clients of one board.
#[derive(Default)]
pub struct Room {
    pub clients: HashMap<Uuid, ConnectedClient>,
    /// Frames relayed since the room opened; the last sequence number used.
    pub relayed: u64,
}

impl Room {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Clone is required by Axum; every field is Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SnapshotStore>,
    pub rooms: Arc<RwLock<HashMap<Uuid, Room>>>,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn SnapshotStore>, config: Config) -> Self {
        Self { store, rooms: Arc::new(RwLock::new(HashMap::new())), config: Arc::new(config) }
    }

    /// Number of clients currently in `board_id`'s room.
    pub async fn room_size(&self, board_id: Uuid) -> usize {
        self.rooms.read().await.get(&board_id).map_or(0, |room| room.clients.len())
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::store::MemoryStore;

    /// `AppState` over a fresh in-memory store with default configuration.
    #[must_use]
    pub fn test_app_state() -> AppState {
        AppState::new(Arc::new(MemoryStore::new()), Config::default())
    }

    /// Register a client in `board_id`'s room and return its id and inbox.
    pub async fn seed_client(state: &AppState, board_id: Uuid, author: &str, capacity: usize) -> (Uuid, mpsc::Receiver<Frame>) {
        let client_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(capacity);
        crate::services::room::join_room(state, board_id, client_id, AuthorId::from(author), tx).await;
        (client_id, rx)
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
