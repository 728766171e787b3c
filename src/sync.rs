//! Sync — the messages boards exchange and the channel that carries them.
//!
//! DESIGN
//! ======
//! Every local log mutation is published as one [`SyncMessage`]. Replicas
//! apply received messages to their own log in the order the channel
//! delivers them.
//!
//! A [`RelayLink`] is sequenced: the relay numbers each message of a board
//! and echoes it to every client, the publisher included. A board on a
//! sequenced channel does not touch its log when it publishes; its own edits
//! land when they come back, so every replica applies the same messages in
//! the same order. On an unsequenced channel edits apply immediately and the
//! caller owns the ordering.
//!
//! On the wire a message is a request [`Frame`]:
//!
//! | Syscall         | Data                 |
//! |-----------------|----------------------|
//! | `action:append` | `action` (object)    |
//! | `action:undo`   | `author` (string)    |
//! | `action:redo`   | `author` (string)    |
//! | `board:clear`   | (none)               |

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::action::{Action, AuthorId};
use crate::frame::{Data, Frame};

pub const SYSCALL_APPEND: &str = "action:append";
pub const SYSCALL_UNDO: &str = "action:undo";
pub const SYSCALL_REDO: &str = "action:redo";
pub const SYSCALL_CLEAR: &str = "board:clear";

const FIELD_ACTION: &str = "action";
const FIELD_AUTHOR: &str = "author";

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("unknown syscall: {0}")]
    UnknownSyscall(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("sync channel closed")]
    Closed,
}

impl crate::frame::ErrorCode for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownSyscall(_) => "E_UNKNOWN_SYSCALL",
            Self::MissingField(_) => "E_MISSING_FIELD",
            Self::Payload(_) => "E_INVALID_PAYLOAD",
            Self::Closed => "E_CHANNEL_CLOSED",
        }
    }
}

// =============================================================================
// MESSAGE
// =============================================================================

/// One replicated log mutation.
#[derive(Debug, Clone)]
pub enum SyncMessage {
    Append(Action),
    Undo { author: AuthorId },
    Redo { author: AuthorId },
    Clear,
}

impl SyncMessage {
    #[must_use]
    pub fn syscall(&self) -> &'static str {
        match self {
            Self::Append(_) => SYSCALL_APPEND,
            Self::Undo { .. } => SYSCALL_UNDO,
            Self::Redo { .. } => SYSCALL_REDO,
            Self::Clear => SYSCALL_CLEAR,
        }
    }

    /// The author whose history this message touches. `Clear` has none.
    #[must_use]
    pub fn author(&self) -> Option<&AuthorId> {
        match self {
            Self::Append(action) => Some(action.author()),
            Self::Undo { author } | Self::Redo { author } => Some(author),
            Self::Clear => None,
        }
    }

    /// Encode as a request frame addressed to `board_id`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Payload` if the action cannot be serialized.
    pub fn to_frame(&self, board_id: Uuid) -> Result<Frame, SyncError> {
        let mut data = Data::new();
        match self {
            Self::Append(action) => {
                data.insert(FIELD_ACTION.into(), serde_json::to_value(action)?);
            }
            Self::Undo { author } | Self::Redo { author } => {
                data.insert(FIELD_AUTHOR.into(), serde_json::Value::String(author.to_string()));
            }
            Self::Clear => {}
        }
        Ok(Frame::request(self.syscall(), data).with_board_id(board_id))
    }

    /// Decode a request frame.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the syscall is not a sync syscall or the data
    /// does not carry a valid payload for it.
    pub fn from_frame(frame: &Frame) -> Result<Self, SyncError> {
        match frame.syscall.as_str() {
            SYSCALL_APPEND => {
                let value = frame.data.get(FIELD_ACTION).ok_or(SyncError::MissingField(FIELD_ACTION))?;
                Ok(Self::Append(Action::deserialize(value)?))
            }
            SYSCALL_UNDO => Ok(Self::Undo { author: author_field(frame)? }),
            SYSCALL_REDO => Ok(Self::Redo { author: author_field(frame)? }),
            SYSCALL_CLEAR => Ok(Self::Clear),
            other => Err(SyncError::UnknownSyscall(other.to_owned())),
        }
    }
}

fn author_field(frame: &Frame) -> Result<AuthorId, SyncError> {
    frame
        .data
        .get(FIELD_AUTHOR)
        .and_then(serde_json::Value::as_str)
        .map(AuthorId::from)
        .ok_or(SyncError::MissingField(FIELD_AUTHOR))
}

// =============================================================================
// CHANNEL
// =============================================================================

/// Outbound half of a board's sync channel.
#[async_trait]
pub trait SyncChannel: Send + Sync {
    /// # Errors
    ///
    /// Returns `SyncError` if the message cannot be encoded or delivered.
    async fn publish(&mut self, board_id: Uuid, message: &SyncMessage) -> Result<(), SyncError>;

    /// True when every published message comes back in the board's total
    /// order, so the publisher must wait for it instead of applying it.
    fn sequenced(&self) -> bool {
        false
    }
}

/// Channel for a board nobody else is editing. Drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

#[async_trait]
impl SyncChannel for Offline {
    async fn publish(&mut self, _board_id: Uuid, _message: &SyncMessage) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Outbound queue of a relay connection, drained by its websocket writer.
/// Frames the relay sends back go to [`BoardController::receive_frame`].
///
/// [`BoardController::receive_frame`]: crate::board::BoardController::receive_frame
#[derive(Debug, Clone)]
pub struct RelayLink {
    tx: mpsc::Sender<Frame>,
}

impl RelayLink {
    #[must_use]
    pub fn new(tx: mpsc::Sender<Frame>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl SyncChannel for RelayLink {
    async fn publish(&mut self, board_id: Uuid, message: &SyncMessage) -> Result<(), SyncError> {
        let mut frame = message.to_frame(board_id)?;
        if let Some(author) = message.author() {
            frame = frame.with_from(author.as_str());
        }
        self.tx.send(frame).await.map_err(|_| SyncError::Closed)
    }

    fn sequenced(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
