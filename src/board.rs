//! Board — one author's replica of a shared board.
//!
//! DESIGN
//! ======
//! A [`BoardController`] ties together the author's identity, the shared
//! [`ActionLog`], the surface it renders to and the outbound sync channel.
//! Remote [`SyncMessage`]s are applied to the log and never republished.
//!
//! On an unsequenced channel local edits mutate the log first and are then
//! published. On a sequenced channel ([`SyncChannel::sequenced`]) a local
//! edit is only published; it lands when the relay echoes it back through
//! [`BoardController::receive_frame`], in the same position on every
//! replica. Frames arrive numbered; duplicates are dropped and a gap is an
//! error, since the replica can no longer match its peers without a reload.
//!
//! The controller is not shareable. [`spawn_board`] moves it into a task
//! that serves commands from a bounded queue, so local edits and remote
//! messages are applied strictly one at a time in arrival order and callers
//! hold a cheap clonable [`BoardHandle`].
//!
//! ERROR HANDLING
//! ==============
//! A surface failure leaves the log and surface as they were (the log rolls
//! back) and nothing is published. On an unsequenced channel a sync failure
//! happens after the local edit has landed; it is reported so the caller can
//! resync, but the edit is not undone. On a sequenced channel an edit that
//! never reached the relay never lands anywhere.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::action::{Action, AuthorId, EraserPass, FreeDrawStroke, RasterPatch};
use crate::frame::{ErrorCode, FRAME_SEQ, Frame, Status};
use crate::log::{ActionLog, SnapshotPolicy};
use crate::raster::{RasterError, Rect};
use crate::snapshot::Snapshot;
use crate::store::{SnapshotStore, StoreError};
use crate::surface::{Surface, SurfaceError};
use crate::sync::{SyncChannel, SyncError, SyncMessage};

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("author {0} cannot write to this board")]
    ReadOnly(AuthorId),
    #[error("board worker stopped")]
    WorkerClosed,
    #[error("relay rejected the edit: {code}: {message}")]
    Rejected { code: String, message: String },
    #[error("expected frame {expected}, got {got}")]
    OutOfSequence { expected: u64, got: u64 },
}

impl From<RasterError> for BoardError {
    fn from(e: RasterError) -> Self {
        Self::Surface(SurfaceError::Raster(e))
    }
}

impl ErrorCode for BoardError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Surface(e) => e.error_code(),
            Self::Sync(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
            Self::ReadOnly(_) => "E_READ_ONLY",
            Self::WorkerClosed => "E_BOARD_CLOSED",
            Self::Rejected { .. } => "E_RELAY_REJECTED",
            Self::OutOfSequence { .. } => "E_OUT_OF_SEQUENCE",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Surface(e) => e.retryable(),
            Self::Sync(e) => e.retryable(),
            Self::Store(e) => e.retryable(),
            Self::ReadOnly(_) | Self::WorkerClosed | Self::Rejected { .. } | Self::OutOfSequence { .. } => false,
        }
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct BoardController<S, C> {
    board_id: Uuid,
    me: AuthorId,
    log: ActionLog,
    surface: S,
    sync: C,
    can_write: bool,
    /// Sequence number of the last relayed frame applied.
    last_seq: Option<u64>,
}

impl<S, C> fmt::Debug for BoardController<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoardController")
            .field("board_id", &self.board_id)
            .field("me", &self.me)
            .field("entries", &self.log.len())
            .field("can_write", &self.can_write)
            .field("last_seq", &self.last_seq)
            .finish_non_exhaustive()
    }
}

impl<S: Surface, C: SyncChannel> BoardController<S, C> {
    pub fn new(board_id: Uuid, me: AuthorId, surface: S, sync: C, policy: SnapshotPolicy) -> Self {
        Self { board_id, me, log: ActionLog::new(policy), surface, sync, can_write: true, last_seq: None }
    }

    pub fn board_id(&self) -> Uuid {
        self.board_id
    }

    pub fn me(&self) -> &AuthorId {
        &self.me
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    pub fn can_write(&self) -> bool {
        self.can_write
    }

    /// A read-only author still receives remote edits.
    pub fn set_can_write(&mut self, can_write: bool) {
        self.can_write = can_write;
        info!(board_id = %self.board_id, author = %self.me, can_write, "write access changed");
    }

    pub fn can_undo(&self) -> bool {
        self.log.can_undo(&self.me)
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo(&self.me)
    }

    // --- Local edits ---

    /// Commit a finished free-hand stroke. Strokes that moved are smoothed
    /// first; an empty stroke is ignored.
    ///
    /// # Errors
    ///
    /// `ReadOnly`, or the surface/sync failure that stopped the commit.
    pub async fn commit_stroke(&mut self, mut stroke: FreeDrawStroke) -> Result<Option<Uuid>, BoardError> {
        self.ensure_writable()?;
        if stroke.is_empty() {
            return Ok(None);
        }
        if stroke.has_drawn() {
            stroke.smoothify();
        }
        let action = Action::free_draw(self.me.clone(), stroke);
        self.commit(action).await.map(Some)
    }

    /// Erase `pass` and commit the damaged rectangle as one patch. Nothing
    /// is committed when the pass misses the surface.
    ///
    /// # Errors
    ///
    /// `ReadOnly`, or the surface/sync failure that stopped the commit.
    pub async fn commit_erase(&mut self, pass: &EraserPass) -> Result<Option<Uuid>, BoardError> {
        self.ensure_writable()?;
        let (width, height) = self.surface.dimensions();
        let Some(rect) = pass.damage_rect().and_then(|r| r.intersect(&Rect::covering(width, height))) else {
            return Ok(None);
        };
        let mut block = self.surface.read_rect(rect).await?;
        pass.erase_from(&mut block, rect);
        let patch = RasterPatch::new(rect, block)?;
        self.commit(Action::raster_patch(self.me.clone(), patch)).await.map(Some)
    }

    /// Undo this author's latest live action. `None` when there is nothing
    /// to undo. On a sequenced channel the undo lands with its echo.
    ///
    /// # Errors
    ///
    /// `ReadOnly`, or the surface/sync failure that stopped the undo.
    pub async fn undo(&mut self) -> Result<Option<Uuid>, BoardError> {
        self.ensure_writable()?;
        let target = if self.sync.sequenced() {
            self.log.undo_candidate(&self.me)
        } else {
            self.log.undo(&self.me, &mut self.surface).await?
        };
        let Some(id) = target else {
            return Ok(None);
        };
        self.publish(SyncMessage::Undo { author: self.me.clone() }).await?;
        Ok(Some(id))
    }

    /// Redo this author's most recently undone action.
    ///
    /// # Errors
    ///
    /// `ReadOnly`, or the surface/sync failure that stopped the redo.
    pub async fn redo(&mut self) -> Result<Option<Uuid>, BoardError> {
        self.ensure_writable()?;
        let target = if self.sync.sequenced() {
            self.log.redo_candidate(&self.me)
        } else {
            self.log.redo(&self.me, &mut self.surface).await?
        };
        let Some(id) = target else {
            return Ok(None);
        };
        self.publish(SyncMessage::Redo { author: self.me.clone() }).await?;
        Ok(Some(id))
    }

    /// Wipe the board and every author's history.
    ///
    /// # Errors
    ///
    /// `ReadOnly`, or the surface/sync failure that stopped the clear.
    pub async fn clear(&mut self) -> Result<(), BoardError> {
        self.ensure_writable()?;
        if !self.sync.sequenced() {
            self.log.clear(&mut self.surface).await?;
        }
        self.publish(SyncMessage::Clear).await
    }

    // --- Remote edits ---

    /// Apply a message received from another replica.
    ///
    /// # Errors
    ///
    /// Returns the surface failure; the log is unchanged in that case.
    pub async fn receive(&mut self, message: SyncMessage) -> Result<(), BoardError> {
        debug!(board_id = %self.board_id, syscall = message.syscall(), "remote message");
        match message {
            SyncMessage::Append(action) => self.log.append(action, &mut self.surface).await?,
            SyncMessage::Undo { author } => {
                if self.log.undo(&author, &mut self.surface).await?.is_none() {
                    warn!(board_id = %self.board_id, %author, "remote undo had nothing to undo");
                }
            }
            SyncMessage::Redo { author } => {
                if self.log.redo(&author, &mut self.surface).await?.is_none() {
                    warn!(board_id = %self.board_id, %author, "remote redo had nothing to redo");
                }
            }
            SyncMessage::Clear => self.log.clear(&mut self.surface).await?,
        }
        Ok(())
    }

    /// Handle a frame the relay sent back: a numbered sync request (our own
    /// echo or a peer's edit), or the reply to one of our requests.
    ///
    /// # Errors
    ///
    /// `Rejected` for an error reply, `OutOfSequence` when frames were
    /// lost, or the decode/surface failure of the message. A failed frame
    /// can be offered again.
    pub async fn receive_frame(&mut self, frame: &Frame) -> Result<(), BoardError> {
        match frame.status {
            Status::Done => Ok(()),
            Status::Error => {
                let code = frame.error_code().unwrap_or("E_UNKNOWN").to_owned();
                let message = frame.error_message().unwrap_or_default().to_owned();
                warn!(board_id = %self.board_id, parent_id = ?frame.parent_id, %code, %message, "relay rejected an edit");
                Err(BoardError::Rejected { code, message })
            }
            Status::Request => {
                let seq = frame.seq().ok_or(SyncError::MissingField(FRAME_SEQ))?;
                if let Some(last) = self.last_seq {
                    if seq <= last {
                        debug!(board_id = %self.board_id, seq, last, "duplicate frame skipped");
                        return Ok(());
                    }
                    if seq != last + 1 {
                        return Err(BoardError::OutOfSequence { expected: last + 1, got: seq });
                    }
                }
                self.receive(SyncMessage::from_frame(frame)?).await?;
                self.last_seq = Some(seq);
                Ok(())
            }
        }
    }

    // --- Persistence ---

    /// Start over from the stored snapshot, or from an empty board when none
    /// exists. Returns whether a snapshot was found.
    ///
    /// # Errors
    ///
    /// Returns the store or surface failure.
    pub async fn load(&mut self, store: &dyn SnapshotStore) -> Result<bool, BoardError> {
        self.last_seq = None;
        match store.get(self.board_id).await? {
            Some(snapshot) => {
                self.log.reset_to(snapshot, &mut self.surface).await?;
                Ok(true)
            }
            None => {
                self.log.clear(&mut self.surface).await?;
                info!(board_id = %self.board_id, "no stored snapshot; starting empty");
                Ok(false)
            }
        }
    }

    /// Store the current surface as the board's snapshot.
    ///
    /// # Errors
    ///
    /// Returns the store or surface failure.
    pub async fn save(&self, store: &dyn SnapshotStore) -> Result<(), BoardError> {
        let snapshot = self.surface.capture().await?;
        store.put(self.board_id, &snapshot).await?;
        info!(board_id = %self.board_id, entries = self.log.len(), "board saved");
        Ok(())
    }

    // --- Internals ---

    fn ensure_writable(&self) -> Result<(), BoardError> {
        if self.can_write {
            Ok(())
        } else {
            Err(BoardError::ReadOnly(self.me.clone()))
        }
    }

    async fn commit(&mut self, action: Action) -> Result<Uuid, BoardError> {
        let id = action.id;
        if !self.sync.sequenced() {
            self.log.append(action.clone(), &mut self.surface).await?;
        }
        self.publish(SyncMessage::Append(action)).await?;
        Ok(id)
    }

    async fn publish(&mut self, message: SyncMessage) -> Result<(), BoardError> {
        if let Err(e) = self.sync.publish(self.board_id, &message).await {
            warn!(board_id = %self.board_id, syscall = message.syscall(), error = %e, "publish failed; peers are behind");
            return Err(e.into());
        }
        Ok(())
    }
}

// =============================================================================
// WORKER
// =============================================================================

type Reply<T> = oneshot::Sender<Result<T, BoardError>>;

enum Command {
    CommitStroke(FreeDrawStroke, Reply<Option<Uuid>>),
    CommitErase(EraserPass, Reply<Option<Uuid>>),
    Undo(Reply<Option<Uuid>>),
    Redo(Reply<Option<Uuid>>),
    Clear(Reply<()>),
    Receive(SyncMessage, Reply<()>),
    ReceiveFrame(Frame, Reply<()>),
    Load(Arc<dyn SnapshotStore>, Reply<bool>),
    Save(Arc<dyn SnapshotStore>, Reply<()>),
    Capture(Reply<Snapshot>),
    SetCanWrite(bool, Reply<()>),
}

/// Clonable handle to a board served by [`spawn_board`].
#[derive(Clone)]
pub struct BoardHandle {
    board_id: Uuid,
    tx: mpsc::Sender<Command>,
}

/// Move `controller` into a worker task fed by a queue of `capacity`
/// commands. The worker stops once every handle is dropped and yields the
/// controller back through the join handle.
pub fn spawn_board<S, C>(controller: BoardController<S, C>, capacity: usize) -> (BoardHandle, JoinHandle<BoardController<S, C>>)
where
    S: Surface + 'static,
    C: SyncChannel + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = BoardHandle { board_id: controller.board_id, tx };
    let worker = tokio::spawn(run_board(controller, rx));
    (handle, worker)
}

async fn run_board<S: Surface, C: SyncChannel>(
    mut board: BoardController<S, C>,
    mut rx: mpsc::Receiver<Command>,
) -> BoardController<S, C> {
    info!(board_id = %board.board_id, author = %board.me, "board worker started");
    while let Some(command) = rx.recv().await {
        match command {
            Command::CommitStroke(stroke, reply) => send(reply, board.commit_stroke(stroke).await),
            Command::CommitErase(pass, reply) => send(reply, board.commit_erase(&pass).await),
            Command::Undo(reply) => send(reply, board.undo().await),
            Command::Redo(reply) => send(reply, board.redo().await),
            Command::Clear(reply) => send(reply, board.clear().await),
            Command::Receive(message, reply) => send(reply, board.receive(message).await),
            Command::ReceiveFrame(frame, reply) => send(reply, board.receive_frame(&frame).await),
            Command::Load(store, reply) => send(reply, board.load(store.as_ref()).await),
            Command::Save(store, reply) => send(reply, board.save(store.as_ref()).await),
            Command::Capture(reply) => send(reply, board.surface.capture().await.map_err(BoardError::from)),
            Command::SetCanWrite(can_write, reply) => {
                board.set_can_write(can_write);
                send(reply, Ok(()));
            }
        }
    }
    info!(board_id = %board.board_id, entries = board.log.len(), "board worker stopped");
    board
}

fn send<T>(reply: Reply<T>, result: Result<T, BoardError>) {
    if reply.send(result).is_err() {
        debug!("board caller went away before the reply");
    }
}

impl BoardHandle {
    #[must_use]
    pub fn board_id(&self) -> Uuid {
        self.board_id
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, BoardError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(command(tx)).await.map_err(|_| BoardError::WorkerClosed)?;
        rx.await.map_err(|_| BoardError::WorkerClosed)?
    }

    /// # Errors
    ///
    /// See [`BoardController::commit_stroke`]; `WorkerClosed` if the worker is gone.
    pub async fn commit_stroke(&self, stroke: FreeDrawStroke) -> Result<Option<Uuid>, BoardError> {
        self.request(|reply| Command::CommitStroke(stroke, reply)).await
    }

    /// # Errors
    ///
    /// See [`BoardController::commit_erase`]; `WorkerClosed` if the worker is gone.
    pub async fn commit_erase(&self, pass: EraserPass) -> Result<Option<Uuid>, BoardError> {
        self.request(|reply| Command::CommitErase(pass, reply)).await
    }

    /// # Errors
    ///
    /// See [`BoardController::undo`]; `WorkerClosed` if the worker is gone.
    pub async fn undo(&self) -> Result<Option<Uuid>, BoardError> {
        self.request(Command::Undo).await
    }

    /// # Errors
    ///
    /// See [`BoardController::redo`]; `WorkerClosed` if the worker is gone.
    pub async fn redo(&self) -> Result<Option<Uuid>, BoardError> {
        self.request(Command::Redo).await
    }

    /// # Errors
    ///
    /// See [`BoardController::clear`]; `WorkerClosed` if the worker is gone.
    pub async fn clear(&self) -> Result<(), BoardError> {
        self.request(Command::Clear).await
    }

    /// # Errors
    ///
    /// See [`BoardController::receive`]; `WorkerClosed` if the worker is gone.
    pub async fn receive(&self, message: SyncMessage) -> Result<(), BoardError> {
        self.request(|reply| Command::Receive(message, reply)).await
    }

    /// # Errors
    ///
    /// See [`BoardController::receive_frame`]; `WorkerClosed` if the worker is gone.
    pub async fn receive_frame(&self, frame: Frame) -> Result<(), BoardError> {
        self.request(|reply| Command::ReceiveFrame(frame, reply)).await
    }

    /// # Errors
    ///
    /// See [`BoardController::load`]; `WorkerClosed` if the worker is gone.
    pub async fn load(&self, store: Arc<dyn SnapshotStore>) -> Result<bool, BoardError> {
        self.request(|reply| Command::Load(store, reply)).await
    }

    /// # Errors
    ///
    /// See [`BoardController::save`]; `WorkerClosed` if the worker is gone.
    pub async fn save(&self, store: Arc<dyn SnapshotStore>) -> Result<(), BoardError> {
        self.request(|reply| Command::Save(store, reply)).await
    }

    /// Current surface contents.
    ///
    /// # Errors
    ///
    /// The surface's capture failure; `WorkerClosed` if the worker is gone.
    pub async fn capture(&self) -> Result<Snapshot, BoardError> {
        self.request(Command::Capture).await
    }

    /// # Errors
    ///
    /// `WorkerClosed` if the worker is gone.
    pub async fn set_can_write(&self, can_write: bool) -> Result<(), BoardError> {
        self.request(|reply| Command::SetCanWrite(can_write, reply)).await
    }
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
