//! Store — durable home of each board's latest snapshot.
//!
//! DESIGN
//! ======
//! Persistence only ever sees full-surface snapshots. The action log itself
//! is session state: loading a board starts a fresh log whose origin is the
//! stored snapshot, so undo history never crosses a save.
//!
//! [`MemoryStore`] backs tests and database-less relays; [`PgSnapshotStore`]
//! keeps one row per board in `board_snapshots`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::raster::{Raster, RasterError};
use crate::snapshot::Snapshot;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored snapshot is corrupt: {0}")]
    Corrupt(#[from] RasterError),
    #[error("snapshot dimensions {width}x{height} out of range")]
    Dimensions { width: i64, height: i64 },
}

impl crate::frame::ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Database(_) => "E_DATABASE",
            Self::Corrupt(_) => "E_SNAPSHOT_CORRUPT",
            Self::Dimensions { .. } => "E_SNAPSHOT_DIMENSIONS",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Latest saved snapshot of `board_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend fails or holds unreadable data.
    async fn get(&self, board_id: Uuid) -> Result<Option<Snapshot>, StoreError>;

    /// Replace the saved snapshot of `board_id`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend fails.
    async fn put(&self, board_id: Uuid, snapshot: &Snapshot) -> Result<(), StoreError>;
}

// =============================================================================
// MEMORY
// =============================================================================

/// Process-local store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    boards: Arc<RwLock<HashMap<Uuid, Snapshot>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.boards.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.boards.read().await.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn get(&self, board_id: Uuid) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.boards.read().await.get(&board_id).cloned())
    }

    async fn put(&self, board_id: Uuid, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.boards.write().await.insert(board_id, snapshot.clone());
        debug!(%board_id, "snapshot stored in memory");
        Ok(())
    }
}

// =============================================================================
// POSTGRES
// =============================================================================

#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn get(&self, board_id: Uuid) -> Result<Option<Snapshot>, StoreError> {
        let row = sqlx::query_as::<_, (i32, i32, Vec<u8>)>(
            "SELECT width, height, pixels FROM board_snapshots WHERE board_id = $1",
        )
        .bind(board_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((width, height, pixels)) = row else {
            return Ok(None);
        };
        let (Ok(w), Ok(h)) = (u32::try_from(width), u32::try_from(height)) else {
            return Err(StoreError::Dimensions { width: width.into(), height: height.into() });
        };
        Ok(Some(Snapshot::new(Raster::from_rgba(w, h, pixels)?)))
    }

    async fn put(&self, board_id: Uuid, snapshot: &Snapshot) -> Result<(), StoreError> {
        let (Ok(width), Ok(height)) = (i32::try_from(snapshot.width()), i32::try_from(snapshot.height())) else {
            return Err(StoreError::Dimensions {
                width: snapshot.width().into(),
                height: snapshot.height().into(),
            });
        };

        sqlx::query(
            "INSERT INTO board_snapshots (board_id, width, height, pixels, updated_at)
             VALUES ($1, $2, $3, $4, now())
             ON CONFLICT (board_id) DO UPDATE
             SET width = EXCLUDED.width,
                 height = EXCLUDED.height,
                 pixels = EXCLUDED.pixels,
                 updated_at = now()",
        )
        .bind(board_id)
        .bind(width)
        .bind(height)
        .bind(snapshot.raster().as_bytes())
        .execute(&self.pool)
        .await?;

        debug!(%board_id, width, height, "snapshot persisted");
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
