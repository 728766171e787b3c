//! Action log — shared edit history with per-author selective undo/redo.
//!
//! DESIGN
//! ======
//! The log is an append-only sequence of `(action, undone)` entries. Position
//! is the only ordering key and entries are never removed except by a full
//! [`ActionLog::clear`]. Each author sees a private LIFO stack: `undo` flips
//! that author's newest live entry, `redo` flips back the entry that author
//! undid most recently. Other authors' entries are never flipped.
//!
//! After a flip at position `p` the surface is rebuilt by a forward replay:
//! restore the nearest live entry before `p` that carries a post-snapshot
//! (or the origin / an empty surface when there is none), then apply every
//! live entry from there to the end of the log, in order.
//!
//! SNAPSHOT VALIDITY
//! =================
//! A flip at `p` clears every cached post-snapshot at positions `>= p`. A
//! snapshot at `q` is therefore valid exactly when nothing at or before `q`
//! has flipped since it was captured, and undone entries never hold one.
//! [`SnapshotPolicy`] decides how often append and replay cache new ones.
//!
//! ERROR HANDLING
//! ==============
//! Every mutation captures a rollback snapshot first. If the surface fails
//! midway, the entry's flag (or the pending append) is reverted, evicted
//! snapshots are put back, and the rollback is restored, so the log never
//! disagrees with the pixels.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::action::{Action, AuthorId};
use crate::snapshot::Snapshot;
use crate::surface::{Surface, SurfaceError};

/// Live entries between cached snapshots when no policy is given.
pub const DEFAULT_SNAPSHOT_INTERVAL: usize = 4;

// =============================================================================
// POLICY
// =============================================================================

/// How often the log caches post-snapshots. Trades memory for undo latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotPolicy {
    /// Cache after this many live entries since the last valid snapshot.
    /// `0` never caches, `1` caches every entry.
    pub interval: usize,
}

impl SnapshotPolicy {
    pub const NEVER: SnapshotPolicy = SnapshotPolicy { interval: 0 };
    pub const EVERY_ACTION: SnapshotPolicy = SnapshotPolicy { interval: 1 };

    #[must_use]
    pub const fn every(interval: usize) -> Self {
        Self { interval }
    }

    fn is_due(self, live_since_snapshot: usize) -> bool {
        self.interval > 0 && live_since_snapshot >= self.interval
    }
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self::every(DEFAULT_SNAPSHOT_INTERVAL)
    }
}

// =============================================================================
// LOG
// =============================================================================

#[derive(Debug)]
struct Entry {
    action: Action,
    undone: bool,
    /// Undo clock value when this entry was last undone; orders redo.
    undo_seq: u64,
}

#[derive(Debug, Default)]
pub struct ActionLog {
    entries: Vec<Entry>,
    /// Surface state the first entry was applied on top of (a loaded board).
    origin: Option<Snapshot>,
    policy: SnapshotPolicy,
    undo_clock: u64,
}

impl ActionLog {
    #[must_use]
    pub fn new(policy: SnapshotPolicy) -> Self {
        Self { entries: Vec::new(), origin: None, policy, undo_clock: 0 }
    }

    #[must_use]
    pub fn policy(&self) -> SnapshotPolicy {
        self.policy
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in log order with their `undone` flag.
    pub fn iter(&self) -> impl Iterator<Item = (&Action, bool)> {
        self.entries.iter().map(|e| (&e.action, e.undone))
    }

    /// Number of entries currently holding a cached post-snapshot.
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.entries.iter().filter(|e| e.action.has_post_snapshot()).count()
    }

    #[must_use]
    pub fn origin(&self) -> Option<&Snapshot> {
        self.origin.as_ref()
    }

    // --- Append ---

    /// Append `action` and apply it on top of the current surface.
    ///
    /// The surface must already reflect every live entry. On failure the
    /// surface is rolled back and nothing is appended.
    ///
    /// # Errors
    ///
    /// Returns the surface failure that prevented the apply.
    pub async fn append<S: Surface + ?Sized>(&mut self, mut action: Action, surface: &mut S) -> Result<(), SurfaceError> {
        let rollback = surface.capture().await?;
        if let Err(e) = action.apply(surface).await {
            roll_back(surface, &rollback).await;
            return Err(e);
        }

        if self.policy.is_due(self.live_since_snapshot(self.entries.len()) + 1) {
            match surface.capture().await {
                Ok(snapshot) => action.set_post_snapshot(snapshot),
                Err(e) => warn!(error = %e, action_id = %action.id, "post-snapshot capture failed; continuing without cache"),
            }
        }

        debug!(
            action_id = %action.id,
            author = %action.author(),
            position = self.entries.len(),
            cached = action.has_post_snapshot(),
            "action appended"
        );
        self.entries.push(Entry { action, undone: false, undo_seq: 0 });
        Ok(())
    }

    // --- Undo / redo ---

    /// True if `author` has at least one live entry.
    #[must_use]
    pub fn can_undo(&self, author: &AuthorId) -> bool {
        self.undo_target(author).is_some()
    }

    /// True if `author` has at least one undone entry.
    #[must_use]
    pub fn can_redo(&self, author: &AuthorId) -> bool {
        self.redo_target(author).is_some()
    }

    /// Id of the action `undo(author)` would flip next.
    #[must_use]
    pub fn undo_candidate(&self, author: &AuthorId) -> Option<Uuid> {
        self.undo_target(author).map(|i| self.entries[i].action.id)
    }

    /// Id of the action `redo(author)` would flip next.
    #[must_use]
    pub fn redo_candidate(&self, author: &AuthorId) -> Option<Uuid> {
        self.redo_target(author).map(|i| self.entries[i].action.id)
    }

    /// Undo `author`'s most recent live entry. Returns the undone action's id,
    /// or `None` (and does nothing) when the author has nothing to undo.
    ///
    /// # Errors
    ///
    /// Returns the surface failure; the entry stays live in that case.
    pub async fn undo<S: Surface + ?Sized>(&mut self, author: &AuthorId, surface: &mut S) -> Result<Option<Uuid>, SurfaceError> {
        let Some(position) = self.undo_target(author) else {
            return Ok(None);
        };
        let stamp = self.undo_clock + 1;
        self.flip(position, true, stamp, surface).await?;
        self.undo_clock = stamp;
        Ok(Some(self.entries[position].action.id))
    }

    /// Redo the entry `author` undid most recently. Returns the redone
    /// action's id, or `None` when the author has nothing to redo.
    ///
    /// # Errors
    ///
    /// Returns the surface failure; the entry stays undone in that case.
    pub async fn redo<S: Surface + ?Sized>(&mut self, author: &AuthorId, surface: &mut S) -> Result<Option<Uuid>, SurfaceError> {
        let Some(position) = self.redo_target(author) else {
            return Ok(None);
        };
        self.flip(position, false, 0, surface).await?;
        Ok(Some(self.entries[position].action.id))
    }

    // --- Reset ---

    /// Drop every entry and reset the surface to an empty baseline.
    ///
    /// # Errors
    ///
    /// Returns the surface failure; the log is left intact in that case.
    pub async fn clear<S: Surface + ?Sized>(&mut self, surface: &mut S) -> Result<(), SurfaceError> {
        surface.clear().await?;
        let dropped = self.entries.len();
        self.entries.clear();
        self.origin = None;
        self.undo_clock = 0;
        info!(dropped, "action log cleared");
        Ok(())
    }

    /// Drop every entry and start over from `snapshot` (a freshly loaded
    /// board). Replays with no cached baseline restart from this origin.
    ///
    /// # Errors
    ///
    /// Returns the surface failure; the log is left intact in that case.
    pub async fn reset_to<S: Surface + ?Sized>(&mut self, snapshot: Snapshot, surface: &mut S) -> Result<(), SurfaceError> {
        snapshot.apply(surface).await?;
        let dropped = self.entries.len();
        self.entries.clear();
        self.undo_clock = 0;
        info!(dropped, width = snapshot.width(), height = snapshot.height(), "action log reset to loaded board");
        self.origin = Some(snapshot);
        Ok(())
    }

    // --- Internals ---

    fn undo_target(&self, author: &AuthorId) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|e| !e.undone && e.action.author() == author)
    }

    fn redo_target(&self, author: &AuthorId) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.undone && e.action.author() == author)
            .max_by_key(|(_, e)| e.undo_seq)
            .map(|(i, _)| i)
    }

    /// Live entries in `entries[..end]` after the last cached snapshot.
    fn live_since_snapshot(&self, end: usize) -> usize {
        self.entries[..end]
            .iter()
            .rev()
            .take_while(|e| !e.action.has_post_snapshot())
            .filter(|e| !e.undone)
            .count()
    }

    async fn flip<S: Surface + ?Sized>(
        &mut self,
        position: usize,
        undone: bool,
        undo_seq: u64,
        surface: &mut S,
    ) -> Result<(), SurfaceError> {
        let rollback = surface.capture().await?;

        let entry = &mut self.entries[position];
        let previous = (entry.undone, entry.undo_seq);
        entry.undone = undone;
        entry.undo_seq = undo_seq;

        let evicted: Vec<(usize, Snapshot)> = self.entries[position..]
            .iter_mut()
            .enumerate()
            .filter_map(|(offset, e)| e.action.take_post_snapshot().map(|s| (position + offset, s)))
            .collect();

        match self.replay(position, surface).await {
            Ok(replay) => {
                for (index, snapshot) in replay.captured {
                    self.entries[index].action.set_post_snapshot(snapshot);
                }
                debug!(
                    position,
                    undone,
                    baseline = ?replay.baseline,
                    replayed = replay.applied,
                    evicted = evicted.len(),
                    "entry flipped"
                );
                Ok(())
            }
            Err(e) => {
                let entry = &mut self.entries[position];
                (entry.undone, entry.undo_seq) = previous;
                for (index, snapshot) in evicted {
                    self.entries[index].action.set_post_snapshot(snapshot);
                }
                roll_back(surface, &rollback).await;
                Err(e)
            }
        }
    }

    /// Rebuild the surface from the nearest valid baseline before `position`
    /// through the end of the log, skipping undone entries.
    async fn replay<S: Surface + ?Sized>(&self, position: usize, surface: &mut S) -> Result<Replay, SurfaceError> {
        let baseline = self.entries[..position]
            .iter()
            .rposition(|e| !e.undone && e.action.has_post_snapshot());

        let start = match baseline {
            Some(index) => {
                self.entries[index].action.apply_post_snapshot(surface).await?;
                index + 1
            }
            None => {
                match &self.origin {
                    Some(origin) => origin.apply(surface).await?,
                    None => surface.clear().await?,
                }
                0
            }
        };

        let mut replay = Replay { baseline, applied: 0, captured: Vec::new() };
        let mut live_since = 0;
        for (offset, entry) in self.entries[start..].iter().enumerate() {
            if entry.undone {
                continue;
            }
            entry.action.apply(surface).await?;
            replay.applied += 1;
            live_since += 1;

            if self.policy.is_due(live_since) {
                match surface.capture().await {
                    Ok(snapshot) => {
                        replay.captured.push((start + offset, snapshot));
                        live_since = 0;
                    }
                    Err(e) => warn!(error = %e, "post-snapshot capture failed during replay"),
                }
            }
        }
        Ok(replay)
    }
}

/// Outcome of one baseline-to-tail replay.
struct Replay {
    baseline: Option<usize>,
    applied: usize,
    /// Snapshots taken along the way, committed only if the replay succeeds.
    captured: Vec<(usize, Snapshot)>,
}

async fn roll_back<S: Surface + ?Sized>(surface: &mut S, rollback: &Snapshot) {
    if let Err(e) = rollback.apply(surface).await {
        error!(error = %e, "rollback restore failed; surface may not match the log");
    }
}

#[cfg(test)]
#[path = "log_test.rs"]
mod tests;
