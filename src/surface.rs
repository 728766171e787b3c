//! Surface — the raster target the action log mutates.
//!
//! DESIGN
//! ======
//! The log is the surface's only writer. Every primitive is async so a
//! browser- or GPU-backed surface can suspend on image decode and readback;
//! the in-process [`Raster`] implementation completes immediately. Primitives
//! must validate their input before touching pixels, so a failed call leaves
//! the surface exactly as it was.

use async_trait::async_trait;

use crate::raster::{Color, Point, Raster, RasterError, Rect};
use crate::snapshot::Snapshot;

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error("surface unavailable: {0}")]
    Unavailable(String),
}

impl crate::frame::ErrorCode for SurfaceError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Raster(_) => "E_RASTER",
            Self::Unavailable(_) => "E_SURFACE_UNAVAILABLE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// One round-capped line segment to paint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: Point,
    pub to: Point,
    pub width: f64,
    pub color: Color,
}

/// Draw, patch, capture and restore primitives of a shared drawing surface.
#[async_trait]
pub trait Surface: Send + Sync {
    /// Width and height in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Reset to the empty baseline.
    async fn clear(&mut self) -> Result<(), SurfaceError>;

    async fn draw_segment(&mut self, segment: &Segment) -> Result<(), SurfaceError>;

    /// Replace the pixels of `rect` with `pixels`.
    async fn patch(&mut self, rect: Rect, pixels: &Raster) -> Result<(), SurfaceError>;

    /// Read back the pixels of `rect`.
    async fn read_rect(&self, rect: Rect) -> Result<Raster, SurfaceError>;

    /// Capture the full surface.
    async fn capture(&self) -> Result<Snapshot, SurfaceError>;

    /// Overwrite the full surface (dimensions included) with `snapshot`.
    async fn restore(&mut self, snapshot: &Snapshot) -> Result<(), SurfaceError>;
}

#[async_trait]
impl Surface for Raster {
    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    async fn clear(&mut self) -> Result<(), SurfaceError> {
        Raster::clear(self);
        Ok(())
    }

    async fn draw_segment(&mut self, segment: &Segment) -> Result<(), SurfaceError> {
        self.stroke_segment(segment.from, segment.to, segment.width, segment.color);
        Ok(())
    }

    async fn patch(&mut self, rect: Rect, pixels: &Raster) -> Result<(), SurfaceError> {
        self.blit(rect, pixels)?;
        Ok(())
    }

    async fn read_rect(&self, rect: Rect) -> Result<Raster, SurfaceError> {
        Ok(self.extract(rect))
    }

    async fn capture(&self) -> Result<Snapshot, SurfaceError> {
        Ok(Snapshot::new(self.clone()))
    }

    async fn restore(&mut self, snapshot: &Snapshot) -> Result<(), SurfaceError> {
        self.clone_from(snapshot.raster());
        Ok(())
    }
}
