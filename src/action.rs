//! Action — one replayable edit contributed by one author.
//!
//! An [`Action`] pairs an immutable author with a closed set of edit kinds
//! ([`ActionKind`]). Each kind knows how to replay itself forward onto a
//! [`Surface`]; the log never needs an inverse. Actions also carry an optional
//! cache of the full surface right after they were applied, which the log
//! uses as a replay baseline. The cache is skipped on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::raster::{Color, Point, Raster, RasterError, Rect};
use crate::snapshot::Snapshot;
use crate::surface::{Segment, Surface, SurfaceError};

/// Base stroke width in pixels before pressure scaling.
pub const DEFAULT_LINE_WIDTH: f64 = 1.5;

/// A stroke counts as drawn once a point strays this far from the first one.
const DRAWN_THRESHOLD: f64 = 1.0;

// =============================================================================
// AUTHOR
// =============================================================================

/// Identity of a contributing author.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(String);

impl AuthorId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AuthorId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for AuthorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// =============================================================================
// FREE DRAW
// =============================================================================

/// One sampled pointer position of a free-hand stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f64,
    pub y: f64,
    /// Pen pressure in `[0, 1]`.
    pub pressure: f64,
    pub color: Color,
}

impl StrokePoint {
    #[must_use]
    pub fn new(x: f64, y: f64, pressure: f64, color: Color) -> Self {
        Self { x, y, pressure, color }
    }

    fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// A completed free-hand stroke, replayed as pressure-scaled line segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeDrawStroke {
    pub line_width: f64,
    points: Vec<StrokePoint>,
}

impl Default for FreeDrawStroke {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_WIDTH)
    }
}

impl FreeDrawStroke {
    #[must_use]
    pub fn new(line_width: f64) -> Self {
        Self { line_width, points: Vec::new() }
    }

    pub fn add_point(&mut self, point: StrokePoint) {
        self.points.push(point);
    }

    #[must_use]
    pub fn points(&self) -> &[StrokePoint] {
        &self.points
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True once the pointer moved more than a pixel away from where it started.
    #[must_use]
    pub fn has_drawn(&self) -> bool {
        let Some(first) = self.points.first() else {
            return false;
        };
        self.points
            .iter()
            .any(|p| (p.x - first.x).abs() > DRAWN_THRESHOLD || (p.y - first.y).abs() > DRAWN_THRESHOLD)
    }

    /// Replace interior points by a three-point moving average. Endpoints stay.
    pub fn smoothify(&mut self) {
        if self.points.len() < 3 {
            return;
        }
        let original = self.points.clone();
        for (i, window) in original.windows(3).enumerate() {
            let p = &mut self.points[i + 1];
            p.x = (window[0].x + window[1].x + window[2].x) / 3.0;
            p.y = (window[0].y + window[1].y + window[2].y) / 3.0;
        }
    }

    /// Damage rectangle covering every point, grown by `margin` pixels.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn bounding_rect(&self, margin: f64) -> Option<Rect> {
        let first = self.points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Rect::new(
            (min_x - margin).floor() as i32,
            (min_y - margin).floor() as i32,
            (max_x + margin).ceil() as i32,
            (max_y + margin).ceil() as i32,
        ))
    }

    /// The segments this stroke paints, in order.
    ///
    /// Segment `i` joins point `i - 1` to point `i` in point `i`'s color, with
    /// width and opacity scaled by its pressure. A stroke that never moved is
    /// a single dot at its first point.
    #[must_use]
    pub fn segments(&self) -> Vec<Segment> {
        let Some(first) = self.points.first() else {
            return Vec::new();
        };
        if !self.has_drawn() {
            return vec![Segment {
                from: first.position(),
                to: first.position(),
                width: self.line_width * 2.0,
                color: first.color,
            }];
        }
        self.points
            .windows(2)
            .map(|pair| {
                let (a, b) = (&pair[0], &pair[1]);
                Segment {
                    from: a.position(),
                    to: b.position(),
                    width: self.line_width * (1.0 + 2.0 * b.pressure),
                    color: b.color.with_opacity(0.9 + 0.1 * b.pressure),
                }
            })
            .collect()
    }

    async fn apply<S: Surface + ?Sized>(&self, surface: &mut S) -> Result<(), SurfaceError> {
        for segment in self.segments() {
            surface.draw_segment(&segment).await?;
        }
        Ok(())
    }
}

// =============================================================================
// RASTER PATCH
// =============================================================================

/// A captured block of pixels to blit back into a rectangle of the surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterPatch {
    rect: Rect,
    pixels: Raster,
}

impl RasterPatch {
    /// # Errors
    ///
    /// Returns `RasterError::BlockSize` if `pixels` does not match `rect`.
    pub fn new(rect: Rect, pixels: Raster) -> Result<Self, RasterError> {
        if pixels.width() != rect.width() || pixels.height() != rect.height() {
            return Err(RasterError::BlockSize {
                width: rect.width(),
                height: rect.height(),
                actual_width: pixels.width(),
                actual_height: pixels.height(),
            });
        }
        Ok(Self { rect, pixels })
    }

    #[must_use]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    #[must_use]
    pub fn pixels(&self) -> &Raster {
        &self.pixels
    }
}

// =============================================================================
// ERASER
// =============================================================================

/// Eraser width with no pen pressure.
pub const ERASER_BASE_WIDTH: f64 = 10.0;

/// Extra eraser width at full pressure.
pub const ERASER_PRESSURE_WIDTH: f64 = 30.0;

/// A finished eraser gesture. It is never logged itself: the board erases
/// it onto a copy of the damaged rectangle and logs the result as a
/// [`RasterPatch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EraserPass {
    points: Vec<(Point, f64)>,
}

impl EraserPass {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pointer sample; pressure in `[0, 1]` widens the eraser.
    pub fn add_point(&mut self, x: f64, y: f64, pressure: f64) {
        let width = ERASER_BASE_WIDTH + ERASER_PRESSURE_WIDTH * pressure.clamp(0.0, 1.0);
        self.points.push((Point::new(x, y), width));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest rectangle holding every pixel the pass can clear.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn damage_rect(&self) -> Option<Rect> {
        let (first, _) = self.points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        let mut radius: f64 = 0.5;
        for (p, width) in &self.points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
            radius = radius.max(width / 2.0);
        }
        Some(Rect::new(
            (min_x - radius).floor() as i32,
            (min_y - radius).floor() as i32,
            (max_x + radius).ceil() as i32,
            (max_y + radius).ceil() as i32,
        ))
    }

    /// Erase the pass from `block`, a copy of the surface pixels in `rect`.
    pub fn erase_from(&self, block: &mut Raster, rect: Rect) {
        let local = |p: Point| Point::new(p.x - f64::from(rect.x1), p.y - f64::from(rect.y1));
        if let [(p, width)] = self.points.as_slice() {
            block.erase_segment(local(*p), local(*p), *width);
            return;
        }
        for pair in self.points.windows(2) {
            let ((a, _), (b, width)) = (pair[0], pair[1]);
            block.erase_segment(local(a), local(b), width);
        }
    }
}

// =============================================================================
// ACTION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    FreeDraw(FreeDrawStroke),
    RasterPatch(RasterPatch),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    author: AuthorId,
    kind: ActionKind,
    #[serde(skip)]
    post_snapshot: Option<Snapshot>,
}

impl Action {
    #[must_use]
    pub fn new(author: AuthorId, kind: ActionKind) -> Self {
        Self { id: Uuid::new_v4(), author, kind, post_snapshot: None }
    }

    #[must_use]
    pub fn free_draw(author: AuthorId, stroke: FreeDrawStroke) -> Self {
        Self::new(author, ActionKind::FreeDraw(stroke))
    }

    #[must_use]
    pub fn raster_patch(author: AuthorId, patch: RasterPatch) -> Self {
        Self::new(author, ActionKind::RasterPatch(patch))
    }

    #[must_use]
    pub fn author(&self) -> &AuthorId {
        &self.author
    }

    #[must_use]
    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Replay the forward effect onto `surface`.
    ///
    /// # Errors
    ///
    /// Propagates surface failures (e.g. a patch whose pixels do not fit).
    pub async fn apply<S: Surface + ?Sized>(&self, surface: &mut S) -> Result<(), SurfaceError> {
        match &self.kind {
            ActionKind::FreeDraw(stroke) => stroke.apply(surface).await,
            ActionKind::RasterPatch(patch) => surface.patch(patch.rect, &patch.pixels).await,
        }
    }

    /// Cache the current surface as this action's post-state. Callers invoke
    /// this right after [`Action::apply`]; an existing cache is kept.
    ///
    /// # Errors
    ///
    /// Propagates the surface's capture failure.
    pub async fn capture_post_snapshot<S: Surface + ?Sized>(&mut self, surface: &S) -> Result<(), SurfaceError> {
        if self.post_snapshot.is_none() {
            self.post_snapshot = Some(surface.capture().await?);
        }
        Ok(())
    }

    #[must_use]
    pub fn has_post_snapshot(&self) -> bool {
        self.post_snapshot.is_some()
    }

    /// Restore `surface` from the cached post-state. Returns `Ok(false)` and
    /// leaves the surface alone when there is no cache.
    ///
    /// # Errors
    ///
    /// Propagates the surface's restore failure.
    pub async fn apply_post_snapshot<S: Surface + ?Sized>(&self, surface: &mut S) -> Result<bool, SurfaceError> {
        let Some(snapshot) = &self.post_snapshot else {
            return Ok(false);
        };
        snapshot.apply(surface).await?;
        Ok(true)
    }

    pub(crate) fn set_post_snapshot(&mut self, snapshot: Snapshot) {
        self.post_snapshot = Some(snapshot);
    }

    pub(crate) fn take_post_snapshot(&mut self) -> Option<Snapshot> {
        self.post_snapshot.take()
    }
}

#[cfg(test)]
#[path = "action_test.rs"]
mod tests;
