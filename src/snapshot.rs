//! Snapshot — immutable full-surface capture.
//!
//! A snapshot is a shared reference to a frozen [`Raster`]; cloning one is
//! cheap and never copies pixels. Applying a snapshot overwrites the whole
//! surface, so applying the same snapshot twice yields the same bytes.
//!
//! Snapshots are also the persisted form of a board: [`Snapshot::encode`]
//! produces `"CHBS"`, big-endian `u32` width and height, then raw RGBA.

use std::fmt;
use std::sync::Arc;

use crate::raster::{Raster, RasterError};
use crate::surface::{Surface, SurfaceError};

const MAGIC: &[u8; 4] = b"CHBS";
const HEADER_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotDecodeError {
    #[error("snapshot is {0} bytes, shorter than its header")]
    Truncated(usize),
    #[error("snapshot magic mismatch")]
    Magic,
    #[error(transparent)]
    Raster(#[from] RasterError),
}

impl crate::frame::ErrorCode for SnapshotDecodeError {
    fn error_code(&self) -> &'static str {
        "E_SNAPSHOT_DECODE"
    }
}

#[derive(Clone)]
pub struct Snapshot {
    raster: Arc<Raster>,
}

impl Snapshot {
    #[must_use]
    pub fn new(raster: Raster) -> Self {
        Self { raster: Arc::new(raster) }
    }

    /// Capture the current state of `surface`.
    ///
    /// # Errors
    ///
    /// Propagates the surface's capture failure.
    pub async fn capture<S: Surface + ?Sized>(surface: &S) -> Result<Self, SurfaceError> {
        surface.capture().await
    }

    /// Overwrite `surface` with this capture.
    ///
    /// # Errors
    ///
    /// Propagates the surface's restore failure.
    pub async fn apply<S: Surface + ?Sized>(&self, surface: &mut S) -> Result<(), SurfaceError> {
        surface.restore(self).await
    }

    #[must_use]
    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let pixels = self.raster.as_bytes();
        let mut out = Vec::with_capacity(HEADER_LEN + pixels.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.width().to_be_bytes());
        out.extend_from_slice(&self.height().to_be_bytes());
        out.extend_from_slice(pixels);
        out
    }

    /// Decode the output of [`Snapshot::encode`].
    ///
    /// # Errors
    ///
    /// Fails on a short buffer, wrong magic, or a pixel length that does not
    /// match the header dimensions.
    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotDecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(SnapshotDecodeError::Truncated(bytes.len()));
        }
        let (header, pixels) = bytes.split_at(HEADER_LEN);
        if &header[..4] != MAGIC {
            return Err(SnapshotDecodeError::Magic);
        }
        let width = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        let height = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        let raster = Raster::from_rgba(width, height, pixels.to_vec())?;
        Ok(Self::new(raster))
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.raster, &other.raster) || self.raster == other.raster
    }
}

impl Eq for Snapshot {}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod tests;
